//! Skyline (profile) storage and Cholesky factorization
//!
//! Only the lower profile of a symmetric matrix is stored: row `i` holds
//! columns `i - heights[i] ..= i`. Assembled stiffness matrices are banded
//! enough that this beats dense storage by a wide margin.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use super::{SolverError, PIVOT_TOL};

/// Symmetric matrix in row-oriented skyline storage
#[derive(Debug, Clone)]
pub struct SkylineMatrix {
    size: usize,
    heights: Vec<usize>,
    rows: Vec<Vec<f64>>,
}

impl SkylineMatrix {
    /// Create a zero matrix with the given row heights
    pub fn new(heights: Vec<usize>) -> Self {
        let rows = heights.iter().map(|h| vec![0.0; h + 1]).collect();
        Self {
            size: heights.len(),
            heights,
            rows,
        }
    }

    /// Build from the lower triangle of a CSR matrix
    pub fn from_csr(csr: &CsrMatrix<f64>) -> Self {
        let size = csr.nrows();

        let mut heights = vec![0usize; size];
        for (row, col, _) in csr.triplet_iter() {
            if col < row {
                heights[row] = heights[row].max(row - col);
            }
        }

        let mut matrix = Self::new(heights);
        for (row, col, &val) in csr.triplet_iter() {
            if col <= row {
                let start = row - matrix.heights[row];
                matrix.rows[row][col - start] += val;
            }
        }
        matrix
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn heights(&self) -> &[usize] {
        &self.heights
    }

    /// Number of stored entries
    pub fn profile_len(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    /// Accumulate into the lower triangle; upper entries are implied
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<(), SolverError> {
        if col > row {
            return Ok(());
        }
        let start = row - self.heights[row];
        if col < start {
            return Err(SolverError::OutsideStorage { row, col });
        }
        self.rows[row][col - start] += value;
        Ok(())
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (row, col) = if col > row { (col, row) } else { (row, col) };
        let start = row - self.heights[row];
        if col < start {
            return 0.0;
        }
        self.rows[row][col - start]
    }

    pub fn zero(&mut self) {
        for row in &mut self.rows {
            row.fill(0.0);
        }
    }

    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_fn(self.size, |i, _| self.rows[i][self.heights[i]])
    }

    /// Symmetric product `A x`
    pub fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.size);
        for i in 0..self.size {
            let start = i - self.heights[i];
            let row = &self.rows[i];
            let mut sum = 0.0;
            for (k, &a) in row.iter().enumerate() {
                let j = start + k;
                sum += a * x[j];
                if j != i {
                    y[j] += a * x[i];
                }
            }
            y[i] += sum;
        }
        y
    }

    /// Cholesky factorization `A = L L^T` within the profile
    pub fn factor(&self) -> Result<SkylineCholesky, SolverError> {
        let mut l = self.clone();
        let n = self.size;
        let scale = (0..n).fold(0.0f64, |m, i| m.max(self.get(i, i).abs()));

        for i in 0..n {
            let hi = l.heights[i];
            let start_i = i - hi;

            // L[i, j] for j < i
            for j in start_i..i {
                let start_j = j - l.heights[j];
                let start = start_i.max(start_j);
                let mut sum = 0.0;
                for k in start..j {
                    sum += l.rows[i][k - start_i] * l.rows[j][k - start_j];
                }
                let diag_j = l.rows[j][l.heights[j]];
                let idx = j - start_i;
                l.rows[i][idx] = (l.rows[i][idx] - sum) / diag_j;
            }

            // L[i, i]
            let sum: f64 = l.rows[i][..hi].iter().map(|v| v * v).sum();
            let diag = l.rows[i][hi] - sum;
            if diag.abs() <= PIVOT_TOL * scale || diag == 0.0 {
                return Err(SolverError::Singular { row: i });
            }
            if diag < 0.0 {
                return Err(SolverError::NotPositiveDefinite { row: Some(i) });
            }
            l.rows[i][hi] = diag.sqrt();
        }

        Ok(SkylineCholesky { l })
    }
}

/// Cholesky factor in the profile of the original matrix
#[derive(Debug, Clone)]
pub struct SkylineCholesky {
    l: SkylineMatrix,
}

impl SkylineCholesky {
    /// Solve `L L^T x = b`
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        let l = &self.l;
        let mut x = b.clone();

        // Forward substitution: L y = b
        for i in 0..l.size {
            let hi = l.heights[i];
            let start = i - hi;
            let mut sum = 0.0;
            for (k, &v) in l.rows[i][..hi].iter().enumerate() {
                sum += v * x[start + k];
            }
            x[i] = (x[i] - sum) / l.rows[i][hi];
        }

        // Backward substitution: L^T x = y
        for i in (0..l.size).rev() {
            let hi = l.heights[i];
            let start = i - hi;
            x[i] /= l.rows[i][hi];
            let xi = x[i];
            for (k, &v) in l.rows[i][..hi].iter().enumerate() {
                x[start + k] -= v * xi;
            }
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra_sparse::CooMatrix;

    fn tridiagonal(n: usize) -> SkylineMatrix {
        let mut heights = vec![1; n];
        heights[0] = 0;
        let mut m = SkylineMatrix::new(heights);
        for i in 0..n {
            m.add(i, i, 4.0).unwrap();
            if i > 0 {
                m.add(i, i - 1, -1.0).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_skyline_cholesky_solve() {
        let m = tridiagonal(5);
        let x_true = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = m.matvec(&x_true);
        assert_relative_eq!(b[0], 4.0 - 2.0);

        let x = m.factor().unwrap().solve(&b);
        assert_relative_eq!(x, x_true, epsilon = 1e-12);
    }

    #[test]
    fn test_from_csr_uses_lower_profile() {
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, 2.0);
        coo.push(2, 0, 1.0);
        coo.push(0, 2, 1.0);
        coo.push(1, 1, 3.0);
        coo.push(2, 2, 2.0);
        let sky = SkylineMatrix::from_csr(&CsrMatrix::from(&coo));
        assert_eq!(sky.heights(), &[0, 0, 2]);
        assert_relative_eq!(sky.get(0, 2), 1.0);
        assert_eq!(sky.profile_len(), 5);
    }

    #[test]
    fn test_indefinite_rejected() {
        let mut m = SkylineMatrix::new(vec![0, 1]);
        m.add(0, 0, 1.0).unwrap();
        m.add(1, 0, 2.0).unwrap();
        m.add(1, 1, 1.0).unwrap();
        assert!(matches!(
            m.factor(),
            Err(SolverError::NotPositiveDefinite { row: Some(1) })
        ));
    }

    #[test]
    fn test_entry_outside_profile_rejected() {
        let mut m = SkylineMatrix::new(vec![0, 1, 1]);
        m.add(2, 1, 1.0).unwrap();
        // upper entries are implied by symmetry
        m.add(0, 2, 5.0).unwrap();
        assert_eq!(m.add(2, 0, 1.0), Err(SolverError::OutsideStorage { row: 2, col: 0 }));
        assert_eq!(m.get(2, 0), 0.0);
    }
}
