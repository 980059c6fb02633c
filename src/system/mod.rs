//! Linear system of equations and its solvers
//!
//! [`LinearSoe`] owns the matrix `A`, the right-hand side `b` and the
//! solution `x`. Groups scatter-add their local contributions through a
//! [`ScatterMap`]; the storage scheme and the solver are chosen
//! independently where they are compatible.

mod band;
mod iterative;
mod profile;
mod sparse;

pub use band::{BandLu, BandMatrix};
pub use iterative::{conjugate_gradient, gmres};
pub use profile::{SkylineCholesky, SkylineMatrix};
pub use sparse::{csr_matvec, SparseTriplets};

use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn, LU};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AnalysisError, AnalysisResult};

/// Relative pivot size below which a matrix is treated as singular
pub(crate) const PIVOT_TOL: f64 = 1e-14;

/// Failures reported by the linear solvers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("matrix is singular (zero pivot at row {row})")]
    Singular { row: usize },

    #[error("matrix is not positive definite (row {row:?})")]
    NotPositiveDefinite { row: Option<usize> },

    #[error("iterative solver did not converge in {iterations} iterations (relative residual {residual:.3e})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("iterative solver broke down at iteration {iteration}")]
    Breakdown { iteration: usize },

    #[error("solver {solver} cannot work on {storage} storage")]
    Incompatible { solver: String, storage: String },

    #[error("entry ({row}, {col}) lies outside the storage sized for this system")]
    OutsideStorage { row: usize, col: usize },
}

/// Local-to-global equation map of one group
///
/// `None` marks a DOF without an equation; it is skipped during scatter.
/// The stamp records the numbering the map was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatterMap {
    pub eqns: Vec<Option<usize>>,
    pub stamp: u64,
}

impl ScatterMap {
    pub fn new(eqns: Vec<Option<usize>>, stamp: u64) -> Self {
        Self { eqns, stamp }
    }

    pub fn len(&self) -> usize {
        self.eqns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eqns.is_empty()
    }

    /// Equation numbers actually present
    pub fn equations(&self) -> impl Iterator<Item = usize> + '_ {
        self.eqns.iter().flatten().copied()
    }
}

/// Storage scheme of the system matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageScheme {
    /// Dense `n x n`
    FullGeneral,
    /// Band with room for pivoting fill
    #[default]
    BandGeneral,
    /// Symmetric skyline, lower profile only
    ProfileSpd,
    /// COO accumulation, CSR for solves
    SparseGeneral,
}

/// Linear solver bound to the system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SolverKind {
    FullLu,
    FullCholesky,
    BandLu,
    ProfileCholesky,
    /// Skyline Cholesky built from the CSR matrix
    SparseCholesky,
    ConjugateGradient { tolerance: f64, max_iterations: usize },
    Gmres { tolerance: f64, max_iterations: usize, restart: usize },
}

impl Default for SolverKind {
    fn default() -> Self {
        Self::BandLu
    }
}

impl SolverKind {
    /// Jacobi preconditioned conjugate gradient with default controls
    pub fn cg() -> Self {
        Self::ConjugateGradient {
            tolerance: 1e-10,
            max_iterations: 1000,
        }
    }

    /// Jacobi preconditioned GMRES(30) with default controls
    pub fn gmres() -> Self {
        Self::Gmres {
            tolerance: 1e-10,
            max_iterations: 1000,
            restart: 30,
        }
    }

    pub fn is_iterative(&self) -> bool {
        matches!(self, Self::ConjugateGradient { .. } | Self::Gmres { .. })
    }

    /// True for solvers that fail on indefinite matrices
    pub fn requires_spd(&self) -> bool {
        matches!(
            self,
            Self::FullCholesky
                | Self::ProfileCholesky
                | Self::SparseCholesky
                | Self::ConjugateGradient { .. }
        )
    }

    pub fn compatible_with(&self, scheme: StorageScheme) -> bool {
        match self {
            Self::FullLu | Self::FullCholesky => scheme == StorageScheme::FullGeneral,
            Self::BandLu => scheme == StorageScheme::BandGeneral,
            Self::ProfileCholesky => scheme == StorageScheme::ProfileSpd,
            Self::SparseCholesky => scheme == StorageScheme::SparseGeneral,
            Self::ConjugateGradient { .. } | Self::Gmres { .. } => true,
        }
    }
}

/// Matrix storage for each scheme
#[derive(Debug, Clone)]
enum Storage {
    Full(DMatrix<f64>),
    Band(BandMatrix),
    Profile(SkylineMatrix),
    Sparse(SparseTriplets),
}

impl Storage {
    fn build(scheme: StorageScheme, size: usize, graph: &[Vec<usize>]) -> Self {
        match scheme {
            StorageScheme::FullGeneral => Self::Full(DMatrix::zeros(size, size)),
            StorageScheme::BandGeneral => {
                let width = graph
                    .iter()
                    .filter_map(|eqns| {
                        let lo = eqns.iter().min()?;
                        let hi = eqns.iter().max()?;
                        Some(hi - lo)
                    })
                    .max()
                    .unwrap_or(0);
                Self::Band(BandMatrix::new(size, width, width))
            }
            StorageScheme::ProfileSpd => {
                let mut heights = vec![0usize; size];
                for eqns in graph {
                    if let Some(&lo) = eqns.iter().min() {
                        for &e in eqns {
                            heights[e] = heights[e].max(e - lo);
                        }
                    }
                }
                Self::Profile(SkylineMatrix::new(heights))
            }
            StorageScheme::SparseGeneral => {
                let nnz: usize = graph.iter().map(|e| e.len() * e.len()).sum();
                Self::Sparse(SparseTriplets::new(size, nnz))
            }
        }
    }

    fn add(&mut self, i: usize, j: usize, v: f64) -> Result<(), SolverError> {
        match self {
            Self::Full(m) => m[(i, j)] += v,
            Self::Band(m) => m.add(i, j, v)?,
            Self::Profile(m) => m.add(i, j, v)?,
            Self::Sparse(m) => m.add(i, j, v),
        }
        Ok(())
    }

    fn zero(&mut self) {
        match self {
            Self::Full(m) => m.fill(0.0),
            Self::Band(m) => m.zero(),
            Self::Profile(m) => m.zero(),
            Self::Sparse(m) => m.zero(),
        }
    }

    fn diagonal(&self) -> DVector<f64> {
        match self {
            Self::Full(m) => m.diagonal(),
            Self::Band(m) => m.diagonal(),
            Self::Profile(m) => m.diagonal(),
            Self::Sparse(m) => m.diagonal(),
        }
    }

    fn to_dense(&self) -> DMatrix<f64> {
        match self {
            Self::Full(m) => m.clone(),
            Self::Band(m) => {
                let n = m.size();
                DMatrix::from_fn(n, n, |i, j| m.get(i, j))
            }
            Self::Profile(m) => {
                let n = m.size();
                DMatrix::from_fn(n, n, |i, j| m.get(i, j))
            }
            Self::Sparse(m) => m.to_dense(),
        }
    }
}

/// Factorization kept between solves until `A` changes
#[derive(Debug, Clone)]
enum Factorization {
    Lu(LU<f64, Dyn, Dyn>),
    Cholesky(Cholesky<f64, Dyn>),
    Band(BandLu),
    Skyline(SkylineCholesky),
}

/// The linear system `A x = b`
#[derive(Debug, Clone)]
pub struct LinearSoe {
    scheme: StorageScheme,
    solver: SolverKind,
    storage: Storage,
    b: DVector<f64>,
    x: DVector<f64>,
    stamp: Option<u64>,
    factorization: Option<Factorization>,
    num_factorizations: usize,
}

impl LinearSoe {
    /// Create an empty system; fails if solver and storage do not fit
    pub fn new(scheme: StorageScheme, solver: SolverKind) -> AnalysisResult<Self> {
        if !solver.compatible_with(scheme) {
            return Err(AnalysisError::Solver(SolverError::Incompatible {
                solver: format!("{:?}", solver),
                storage: format!("{:?}", scheme),
            }));
        }
        Ok(Self {
            scheme,
            solver,
            storage: Storage::build(scheme, 0, &[]),
            b: DVector::zeros(0),
            x: DVector::zeros(0),
            stamp: None,
            factorization: None,
            num_factorizations: 0,
        })
    }

    /// (Re)allocate for `size` equations
    ///
    /// `graph` lists the equations coupled by each group; band widths and
    /// skyline heights are derived from it. `stamp` identifies the numbering
    /// every scatter map must carry from now on.
    pub fn set_size(&mut self, size: usize, graph: &[Vec<usize>], stamp: u64) {
        self.storage = Storage::build(self.scheme, size, graph);
        self.b = DVector::zeros(size);
        self.x = DVector::zeros(size);
        self.stamp = Some(stamp);
        self.factorization = None;
        match &self.storage {
            Storage::Band(m) => debug!("band storage: n = {}, half bandwidth = {:?}", size, m.bandwidth()),
            Storage::Profile(m) => debug!("profile storage: n = {}, profile = {}", size, m.profile_len()),
            _ => debug!("{:?} storage: n = {}", self.scheme, size),
        }
    }

    pub fn size(&self) -> usize {
        self.b.len()
    }

    pub fn scheme(&self) -> StorageScheme {
        self.scheme
    }

    pub fn solver(&self) -> SolverKind {
        self.solver
    }

    /// Stamp of the numbering the system is sized for
    pub fn stamp(&self) -> Option<u64> {
        self.stamp
    }

    /// (sub, super) half bandwidth for band storage
    pub fn bandwidth(&self) -> Option<(usize, usize)> {
        match &self.storage {
            Storage::Band(m) => Some(m.bandwidth()),
            _ => None,
        }
    }

    /// Factorizations performed since creation
    pub fn num_factorizations(&self) -> usize {
        self.num_factorizations
    }

    fn check_map(&self, map: &ScatterMap, local: usize) -> AnalysisResult<()> {
        let system_stamp = self.stamp.ok_or(AnalysisError::DomainNotNumbered)?;
        if map.stamp != system_stamp {
            return Err(AnalysisError::StaleNumbering {
                map_stamp: map.stamp,
                system_stamp,
            });
        }
        if map.len() != local {
            return Err(AnalysisError::SizeMismatch {
                context: "scatter map",
                expected: map.len(),
                actual: local,
            });
        }
        Ok(())
    }

    // ========================
    // Assembly
    // ========================

    pub fn zero_a(&mut self) {
        self.storage.zero();
        self.factorization = None;
    }

    pub fn zero_b(&mut self) {
        self.b.fill(0.0);
    }

    /// Scatter-add `factor * m` at the map's equations
    pub fn add_a(&mut self, m: &DMatrix<f64>, map: &ScatterMap, factor: f64) -> AnalysisResult<()> {
        self.check_map(map, m.nrows())?;
        if m.ncols() != m.nrows() {
            return Err(AnalysisError::SizeMismatch {
                context: "local matrix columns",
                expected: m.nrows(),
                actual: m.ncols(),
            });
        }
        self.factorization = None;
        for (li, gi) in map.eqns.iter().enumerate() {
            let Some(gi) = *gi else { continue };
            for (lj, gj) in map.eqns.iter().enumerate() {
                let Some(gj) = *gj else { continue };
                let v = m[(li, lj)];
                if v != 0.0 {
                    self.storage.add(gi, gj, factor * v)?;
                }
            }
        }
        Ok(())
    }

    /// Scatter-add `factor * v` at the map's equations
    pub fn add_b(&mut self, v: &DVector<f64>, map: &ScatterMap, factor: f64) -> AnalysisResult<()> {
        self.check_map(map, v.len())?;
        for (li, gi) in map.eqns.iter().enumerate() {
            if let Some(gi) = *gi {
                self.b[gi] += factor * v[li];
            }
        }
        Ok(())
    }

    /// Replace the right-hand side
    pub fn set_b(&mut self, b: &DVector<f64>) -> AnalysisResult<()> {
        if b.len() != self.b.len() {
            return Err(AnalysisError::SizeMismatch {
                context: "right-hand side",
                expected: self.b.len(),
                actual: b.len(),
            });
        }
        self.b.copy_from(b);
        Ok(())
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }

    /// Dense copy of `A`
    pub fn a_dense(&self) -> DMatrix<f64> {
        self.storage.to_dense()
    }

    /// Product `A v`
    pub fn matvec(&self, v: &DVector<f64>) -> DVector<f64> {
        match &self.storage {
            Storage::Full(m) => m * v,
            Storage::Band(m) => m.matvec(v),
            Storage::Profile(m) => m.matvec(v),
            Storage::Sparse(m) => csr_matvec(&m.to_csr(), v),
        }
    }

    // ========================
    // Solve
    // ========================

    /// Solve `A x = b`, storing `x`
    pub fn solve(&mut self) -> AnalysisResult<()> {
        let rhs = self.b.clone();
        self.x = self.solve_for(&rhs)?;
        Ok(())
    }

    /// Solve `A y = rhs` without touching `b` or `x`
    ///
    /// Direct solvers reuse the last factorization until `A` is zeroed or
    /// added to.
    pub fn solve_for(&mut self, rhs: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        if rhs.len() != self.size() {
            return Err(AnalysisError::SizeMismatch {
                context: "right-hand side",
                expected: self.size(),
                actual: rhs.len(),
            });
        }
        if self.size() == 0 {
            return Ok(DVector::zeros(0));
        }

        match self.solver {
            SolverKind::ConjugateGradient {
                tolerance,
                max_iterations,
            } => {
                let diag = self.storage.diagonal();
                let y = self.iterate(|apply| {
                    conjugate_gradient(apply, &diag, rhs, tolerance, max_iterations)
                })?;
                return Ok(y);
            }
            SolverKind::Gmres {
                tolerance,
                max_iterations,
                restart,
            } => {
                let diag = self.storage.diagonal();
                let y = self.iterate(|apply| {
                    gmres(apply, &diag, rhs, tolerance, max_iterations, restart)
                })?;
                return Ok(y);
            }
            _ => {}
        }

        if self.factorization.is_none() {
            self.factorization = Some(self.factor()?);
            self.num_factorizations += 1;
        }
        match &self.factorization {
            Some(Factorization::Lu(lu)) => Ok(lu
                .solve(rhs)
                .ok_or(SolverError::Singular { row: self.size() - 1 })?),
            Some(Factorization::Cholesky(chol)) => Ok(chol.solve(rhs)),
            Some(Factorization::Band(lu)) => Ok(lu.solve(rhs)),
            Some(Factorization::Skyline(chol)) => Ok(chol.solve(rhs)),
            None => Err(AnalysisError::DomainNotNumbered),
        }
    }

    fn iterate<S>(&self, solve: S) -> Result<DVector<f64>, SolverError>
    where
        S: Fn(&dyn Fn(&DVector<f64>) -> DVector<f64>) -> Result<DVector<f64>, SolverError>,
    {
        match &self.storage {
            Storage::Sparse(m) => {
                let csr = m.to_csr();
                solve(&|v| csr_matvec(&csr, v))
            }
            Storage::Full(m) => solve(&|v| m * v),
            Storage::Band(m) => solve(&|v| m.matvec(v)),
            Storage::Profile(m) => solve(&|v| m.matvec(v)),
        }
    }

    fn factor(&self) -> Result<Factorization, SolverError> {
        match (&self.solver, &self.storage) {
            (SolverKind::FullLu, Storage::Full(m)) => {
                let scale = m.amax();
                let lu = m.clone().lu();
                let u = lu.u();
                for i in 0..u.nrows() {
                    let pivot = u[(i, i)].abs();
                    if pivot == 0.0 || pivot <= PIVOT_TOL * scale {
                        return Err(SolverError::Singular { row: i });
                    }
                }
                Ok(Factorization::Lu(lu))
            }
            (SolverKind::FullCholesky, Storage::Full(m)) => m
                .clone()
                .cholesky()
                .map(Factorization::Cholesky)
                .ok_or(SolverError::NotPositiveDefinite { row: None }),
            (SolverKind::BandLu, Storage::Band(m)) => m.factor().map(Factorization::Band),
            (SolverKind::ProfileCholesky, Storage::Profile(m)) => {
                m.factor().map(Factorization::Skyline)
            }
            (SolverKind::SparseCholesky, Storage::Sparse(m)) => {
                SkylineMatrix::from_csr(&m.to_csr())
                    .factor()
                    .map(Factorization::Skyline)
            }
            (solver, _) => Err(SolverError::Incompatible {
                solver: format!("{:?}", solver),
                storage: format!("{:?}", self.scheme),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spring_chain(scheme: StorageScheme, solver: SolverKind) -> LinearSoe {
        // three springs in series, left end fixed
        let mut soe = LinearSoe::new(scheme, solver).unwrap();
        let graph = vec![vec![0], vec![0, 1], vec![1, 2]];
        soe.set_size(3, &graph, 7);
        let k = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        soe.add_a(&k, &ScatterMap::new(vec![None, Some(0)], 7), 100.0).unwrap();
        soe.add_a(&k, &ScatterMap::new(vec![Some(0), Some(1)], 7), 100.0).unwrap();
        soe.add_a(&k, &ScatterMap::new(vec![Some(1), Some(2)], 7), 100.0).unwrap();
        soe.add_b(&DVector::from_element(1, 10.0), &ScatterMap::new(vec![Some(2)], 7), 1.0)
            .unwrap();
        soe
    }

    #[test]
    fn test_every_solver_solves_chain() {
        let pairs = [
            (StorageScheme::FullGeneral, SolverKind::FullLu),
            (StorageScheme::FullGeneral, SolverKind::FullCholesky),
            (StorageScheme::BandGeneral, SolverKind::BandLu),
            (StorageScheme::ProfileSpd, SolverKind::ProfileCholesky),
            (StorageScheme::SparseGeneral, SolverKind::SparseCholesky),
            (StorageScheme::SparseGeneral, SolverKind::cg()),
            (StorageScheme::BandGeneral, SolverKind::gmres()),
        ];
        for (scheme, solver) in pairs {
            let mut soe = spring_chain(scheme, solver);
            soe.solve().unwrap();
            assert_relative_eq!(soe.x()[0], 0.1, epsilon = 1e-9);
            assert_relative_eq!(soe.x()[1], 0.2, epsilon = 1e-9);
            assert_relative_eq!(soe.x()[2], 0.3, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_incompatible_pair_rejected() {
        let err = LinearSoe::new(StorageScheme::ProfileSpd, SolverKind::BandLu).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_stale_map_rejected() {
        let mut soe = spring_chain(StorageScheme::FullGeneral, SolverKind::FullLu);
        let k = DMatrix::identity(1, 1);
        let err = soe
            .add_a(&k, &ScatterMap::new(vec![Some(0)], 6), 1.0)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::StaleNumbering {
                map_stamp: 6,
                system_stamp: 7
            }
        ));
    }

    #[test]
    fn test_factorization_reused_until_a_changes() {
        let mut soe = spring_chain(StorageScheme::ProfileSpd, SolverKind::ProfileCholesky);
        soe.solve().unwrap();
        let y = soe.solve_for(&DVector::from_vec(vec![0.0, 0.0, 20.0])).unwrap();
        assert_relative_eq!(y[2], 0.6, epsilon = 1e-12);
        assert_eq!(soe.num_factorizations(), 1);

        soe.zero_a();
        soe.add_a(
            &DMatrix::identity(3, 3),
            &ScatterMap::new(vec![Some(0), Some(1), Some(2)], 7),
            1.0,
        )
        .unwrap();
        soe.solve().unwrap();
        assert_eq!(soe.num_factorizations(), 2);
    }

    #[test]
    fn test_singular_reported() {
        let mut soe = LinearSoe::new(StorageScheme::FullGeneral, SolverKind::FullLu).unwrap();
        soe.set_size(2, &[vec![0, 1]], 0);
        soe.add_a(
            &DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]),
            &ScatterMap::new(vec![Some(0), Some(1)], 0),
            1.0,
        )
        .unwrap();
        let err = soe.solve().unwrap_err();
        assert!(matches!(err, AnalysisError::Solver(SolverError::Singular { row: 1 })));
    }
}
