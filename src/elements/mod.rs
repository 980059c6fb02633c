//! Element capability set and reference elements
//!
//! The analysis core only talks to elements through [`Element`]: given the
//! trial state of its nodes an element reports tangent, mass and damping
//! matrices and its resisting force. Rayleigh damping is composed outside the
//! element from the factors stored beside it in the domain.

mod spring;
mod truss;

pub use spring::{Spring, SpringLaw};
pub use truss::{MassFormulation, Truss};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisResult;

/// Trial nodal state handed to an element, concatenated in node order
#[derive(Debug, Clone)]
pub struct ElementState {
    pub disp: DVector<f64>,
    pub vel: DVector<f64>,
    pub accel: DVector<f64>,
    /// Trial minus committed displacement
    pub incr_disp: DVector<f64>,
}

/// Rayleigh damping factors: `C = aM*M + bK*K + bK0*K0 + bKc*Kc`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RayleighFactors {
    pub alpha_m: f64,
    pub beta_k: f64,
    pub beta_k0: f64,
    pub beta_kc: f64,
}

impl RayleighFactors {
    /// Create factors for `aM*M + bK*K`
    pub fn new(alpha_m: f64, beta_k: f64) -> Self {
        Self {
            alpha_m,
            beta_k,
            ..Self::default()
        }
    }

    /// Add initial and committed stiffness proportional terms
    pub fn with_stiffness_terms(mut self, beta_k0: f64, beta_kc: f64) -> Self {
        self.beta_k0 = beta_k0;
        self.beta_kc = beta_kc;
        self
    }

    pub fn is_zero(&self) -> bool {
        self.alpha_m == 0.0 && self.beta_k == 0.0 && self.beta_k0 == 0.0 && self.beta_kc == 0.0
    }
}

/// What the analysis needs from an element
///
/// Matrices are `num_dof x num_dof` and vectors `num_dof`, with the DOFs of
/// the element's nodes concatenated in `node_tags` order.
pub trait Element: std::fmt::Debug + Send + Sync {
    /// Tags of the connected nodes
    fn node_tags(&self) -> &[usize];

    /// Total number of element DOFs
    fn num_dof(&self) -> usize;

    /// Called once when the element is added to a domain, with the
    /// coordinates and DOF count of each node
    fn setup(&mut self, _coords: &[&[f64]], _node_dofs: &[usize]) -> AnalysisResult<()> {
        Ok(())
    }

    /// Bring the element to the given trial state
    fn update(&mut self, state: &ElementState) -> AnalysisResult<()>;

    fn tangent_stiff(&self) -> DMatrix<f64>;

    fn initial_stiff(&self) -> DMatrix<f64>;

    /// Tangent at the last committed state
    fn committed_stiff(&self) -> DMatrix<f64>;

    fn mass(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.num_dof(), self.num_dof())
    }

    /// Element damping, without any Rayleigh contribution
    fn damp(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.num_dof(), self.num_dof())
    }

    /// Internal force minus applied element load
    fn resisting_force(&self) -> DVector<f64>;

    fn zero_load(&mut self);

    fn add_load(&mut self, load: &DVector<f64>, factor: f64) -> AnalysisResult<()>;

    fn commit_state(&mut self);

    fn revert_to_last_commit(&mut self);

    fn revert_to_start(&mut self);
}
