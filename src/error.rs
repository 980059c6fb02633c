//! Error types for the analysis core

use thiserror::Error;

use crate::system::SolverError;

/// Coarse classification of an [`AnalysisError`].
///
/// Callers use it to decide between retrying a step (numerical or
/// convergence failures), fixing the setup (configuration) or treating the
/// failure as a bug (model consistency).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Incompatible or missing components, detected at setup
    Configuration,
    /// Lookup or modelling errors (unknown tags, duplicates, bad sizes)
    Model,
    /// Singular / indefinite matrix, iterative solver failure
    Numerical,
    /// Iteration cap reached without meeting the tolerance
    Convergence,
    /// Assembly attempted with stale or absent numbering
    ModelConsistency,
}

/// Main error type for analysis operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Node {0} not found in domain")]
    NodeNotFound(usize),

    #[error("Element {0} not found in domain")]
    ElementNotFound(usize),

    #[error("Constraint {0} not found in domain")]
    ConstraintNotFound(usize),

    #[error("Load pattern {0} not found in domain")]
    LoadPatternNotFound(usize),

    #[error("Duplicate tag {0} already exists")]
    DuplicateTag(usize),

    #[error("Node {node} has no DOF {dof} (it has {ndof})")]
    InvalidDof { node: usize, dof: usize, ndof: usize },

    #[error("Size mismatch in {context}: expected {expected}, got {actual}")]
    SizeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Constraint handler cannot represent constraints {tags:?}: {reason}")]
    UnsupportedConstraints { tags: Vec<usize>, reason: String },

    #[error("Integrator misuse: {0}")]
    IntegratorUsage(String),

    #[error("Linear solver failed: {0}")]
    Solver(#[from] SolverError),

    #[error("Convergence failed after {iterations} iterations (norm = {norm:.3e})")]
    ConvergenceFailed { iterations: usize, norm: f64 },

    #[error("Arc-length constraint has complex roots (discriminant = {0:.3e})")]
    ComplexRoots(f64),

    #[error("Stale numbering: map built for stamp {map_stamp}, system sized for stamp {system_stamp}")]
    StaleNumbering { map_stamp: u64, system_stamp: u64 },

    #[error("Domain changed since last numbering; call domain_changed first")]
    DomainNotNumbered,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Classify the error per the taxonomy in [`ErrorKind`]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound(_)
            | Self::ElementNotFound(_)
            | Self::ConstraintNotFound(_)
            | Self::LoadPatternNotFound(_)
            | Self::DuplicateTag(_)
            | Self::InvalidDof { .. }
            | Self::SizeMismatch { .. }
            | Self::InvalidInput(_)
            | Self::SerializationError(_) => ErrorKind::Model,
            Self::Configuration(_)
            | Self::UnsupportedConstraints { .. }
            | Self::IntegratorUsage(_)
            | Self::Solver(SolverError::Incompatible { .. }) => ErrorKind::Configuration,
            Self::StaleNumbering { .. }
            | Self::DomainNotNumbered
            | Self::Solver(SolverError::OutsideStorage { .. }) => ErrorKind::ModelConsistency,
            Self::Solver(_) => ErrorKind::Numerical,
            Self::ConvergenceFailed { .. } | Self::ComplexRoots(_) => ErrorKind::Convergence,
        }
    }

    /// True for failures a caller may recover from by changing the step
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Numerical | ErrorKind::Convergence)
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
