//! General band storage and LU factorization with partial pivoting
//!
//! Column-major LAPACK band layout: `A(i, j)` lives in row `kl + ku + i - j`
//! of column `j`, leaving `kl` extra rows above the band for the fill-in that
//! row interchanges produce.

use nalgebra::DVector;

use super::{SolverError, PIVOT_TOL};

/// Band matrix with `kl` sub- and `ku` super-diagonals
#[derive(Debug, Clone)]
pub struct BandMatrix {
    n: usize,
    kl: usize,
    ku: usize,
    ldab: usize,
    data: Vec<f64>,
}

impl BandMatrix {
    /// Create a zero band matrix
    pub fn new(n: usize, kl: usize, ku: usize) -> Self {
        let ldab = 2 * kl + ku + 1;
        Self {
            n,
            kl,
            ku,
            ldab,
            data: vec![0.0; ldab * n],
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// (sub-diagonals, super-diagonals)
    pub fn bandwidth(&self) -> (usize, usize) {
        (self.kl, self.ku)
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        j * self.ldab + self.kl + self.ku + i - j
    }

    #[inline]
    fn in_band(&self, i: usize, j: usize) -> bool {
        i <= j + self.kl && j <= i + self.ku
    }

    /// Accumulate into `A(i, j)`, which must lie inside the band
    pub fn add(&mut self, i: usize, j: usize, value: f64) -> Result<(), SolverError> {
        if !self.in_band(i, j) {
            return Err(SolverError::OutsideStorage { row: i, col: j });
        }
        let idx = self.index(i, j);
        self.data[idx] += value;
        Ok(())
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if self.in_band(i, j) {
            self.data[self.index(i, j)]
        } else {
            0.0
        }
    }

    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    pub fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.n);
        for j in 0..self.n {
            let xj = x[j];
            if xj == 0.0 {
                continue;
            }
            let lo = j.saturating_sub(self.ku);
            let hi = (j + self.kl).min(self.n - 1);
            for i in lo..=hi {
                y[i] += self.data[self.index(i, j)] * xj;
            }
        }
        y
    }

    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_fn(self.n, |i, _| self.get(i, i))
    }

    /// LU factorization with partial pivoting (unblocked, dgbtf2 order)
    pub fn factor(&self) -> Result<BandLu, SolverError> {
        let n = self.n;
        let (kl, ku) = (self.kl, self.ku);
        let kv = kl + ku;
        let ldab = self.ldab;
        let mut ab = self.data.clone();
        let mut ipiv = vec![0usize; n];
        let scale = self.data.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let at = |i: usize, j: usize| j * ldab + kv + i - j;

        let mut ju = 0usize;
        for j in 0..n {
            let km = kl.min(n - 1 - j);

            // pivot search in column j, rows j..=j+km
            let mut jp = 0;
            let mut best = ab[at(j, j)].abs();
            for p in 1..=km {
                let v = ab[at(j + p, j)].abs();
                if v > best {
                    best = v;
                    jp = p;
                }
            }
            ipiv[j] = j + jp;
            if best <= PIVOT_TOL * scale || best == 0.0 {
                return Err(SolverError::Singular { row: j });
            }

            ju = ju.max((j + ku + jp).min(n - 1));
            if jp != 0 {
                for c in j..=ju {
                    ab.swap(at(j, c), at(j + jp, c));
                }
            }

            if km > 0 {
                let pivot = ab[at(j, j)];
                for r in j + 1..=j + km {
                    ab[at(r, j)] /= pivot;
                }
                for c in j + 1..=ju {
                    let a_jc = ab[at(j, c)];
                    if a_jc != 0.0 {
                        for r in j + 1..=j + km {
                            ab[at(r, c)] -= ab[at(r, j)] * a_jc;
                        }
                    }
                }
            }
        }

        Ok(BandLu {
            n,
            kl,
            kv,
            ldab,
            data: ab,
            ipiv,
        })
    }
}

/// Factors produced by [`BandMatrix::factor`]
#[derive(Debug, Clone)]
pub struct BandLu {
    n: usize,
    kl: usize,
    kv: usize,
    ldab: usize,
    data: Vec<f64>,
    ipiv: Vec<usize>,
}

impl BandLu {
    #[inline]
    fn at(&self, i: usize, j: usize) -> f64 {
        self.data[j * self.ldab + self.kv + i - j]
    }

    /// Solve `A x = b` with the stored factors
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        let n = self.n;
        let mut x = b.clone();

        // L y = P b
        for j in 0..n {
            let km = self.kl.min(n - 1 - j);
            let l = self.ipiv[j];
            if l != j {
                x.swap_rows(l, j);
            }
            let xj = x[j];
            if xj != 0.0 {
                for r in j + 1..=j + km {
                    x[r] -= self.at(r, j) * xj;
                }
            }
        }

        // U x = y, U has kl + ku super-diagonals
        for j in (0..n).rev() {
            x[j] /= self.at(j, j);
            let xj = x[j];
            if xj != 0.0 {
                for r in j.saturating_sub(self.kv)..j {
                    x[r] -= self.at(r, j) * xj;
                }
            }
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_band_lu_needs_pivoting() {
        // zero leading diagonal forces a row swap
        #[rustfmt::skip]
        let dense = DMatrix::from_row_slice(4, 4, &[
            0.0, 2.0, 0.0, 0.0,
            1.0, 1.0, 3.0, 0.0,
            0.0, 4.0, 1.0, 1.0,
            0.0, 0.0, 2.0, 5.0,
        ]);
        let mut band = BandMatrix::new(4, 1, 1);
        for i in 0..4 {
            for j in 0..4 {
                if dense[(i, j)] != 0.0 {
                    band.add(i, j, dense[(i, j)]).unwrap();
                }
            }
        }
        let x_true = DVector::from_vec(vec![1.0, -2.0, 3.0, 0.5]);
        let b = &dense * &x_true;
        assert_relative_eq!(band.matvec(&x_true), b.clone(), epsilon = 1e-12);

        let x = band.factor().unwrap().solve(&b);
        assert_relative_eq!(x, x_true, epsilon = 1e-12);
    }

    #[test]
    fn test_band_singular_reports_row() {
        let mut band = BandMatrix::new(3, 1, 1);
        band.add(0, 0, 1.0).unwrap();
        band.add(1, 1, 1.0).unwrap();
        assert!(matches!(band.factor(), Err(SolverError::Singular { row: 2 })));
    }

    #[test]
    fn test_entry_outside_band_rejected() {
        let mut band = BandMatrix::new(4, 1, 1);
        band.add(1, 2, 1.0).unwrap();
        assert_eq!(band.add(0, 2, 1.0), Err(SolverError::OutsideStorage { row: 0, col: 2 }));
        assert_eq!(band.add(3, 1, 1.0), Err(SolverError::OutsideStorage { row: 3, col: 1 }));
        assert_eq!(band.get(1, 2), 1.0);
    }
}
