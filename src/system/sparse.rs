//! General sparse storage: COO accumulation, CSR for products and solves

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Sparse matrix assembled as a list of (row, col, value) triplets
///
/// Repeated entries accumulate when converted to CSR.
#[derive(Debug, Clone)]
pub struct SparseTriplets {
    size: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl SparseTriplets {
    /// Create an empty matrix, reserving room for `nnz_hint` entries
    pub fn new(size: usize, nnz_hint: usize) -> Self {
        Self {
            size,
            entries: Vec::with_capacity(nnz_hint),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Add a value to the matrix (accumulates if already exists)
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value.abs() > 1e-15 {
            self.entries.push((row, col, value));
        }
    }

    pub fn zero(&mut self) {
        self.entries.clear();
    }

    /// Number of stored triplets (duplicates counted)
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Convert to CSR format, summing duplicates
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.size, self.size);
        for &(row, col, val) in &self.entries {
            coo.push(row, col, val);
        }
        CsrMatrix::from(&coo)
    }

    /// Convert to dense matrix (for comparison/debugging)
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut mat = DMatrix::zeros(self.size, self.size);
        for &(row, col, val) in &self.entries {
            mat[(row, col)] += val;
        }
        mat
    }

    pub fn diagonal(&self) -> DVector<f64> {
        let mut diag = DVector::zeros(self.size);
        for &(row, col, val) in &self.entries {
            if row == col {
                diag[row] += val;
            }
        }
        diag
    }
}

/// Sparse matrix-vector multiplication
#[inline]
pub fn csr_matvec(csr: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let n = csr.nrows();
    let mut y = DVector::zeros(n);

    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    for row in 0..n {
        let mut sum = 0.0;
        for idx in row_offsets[row]..row_offsets[row + 1] {
            sum += values[idx] * x[col_indices[idx]];
        }
        y[row] = sum;
    }

    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_duplicates_accumulate() {
        let mut m = SparseTriplets::new(2, 8);
        m.add(0, 0, 1.0);
        m.add(0, 0, 2.0);
        m.add(1, 0, -1.0);
        m.add(1, 1, 1e-20);
        assert_eq!(m.nnz(), 3);

        let csr = m.to_csr();
        assert_eq!(csr.nnz(), 2);
        let y = csr_matvec(&csr, &DVector::from_vec(vec![1.0, 1.0]));
        assert_relative_eq!(y[0], 3.0);
        assert_relative_eq!(y[1], -1.0);
        assert_relative_eq!(m.to_dense()[(0, 0)], 3.0);
    }
}
