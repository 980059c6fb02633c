//! Integrators - turn one load or time step into linear systems to solve
//!
//! Static integrators advance a load factor (directly, through a controlled
//! displacement or along an arc length). Transient integrators advance time
//! and request the effective tangent `c1*K + c2*C + c3*M` of their scheme.

mod alpha;
mod central_difference;
mod static_control;

pub use alpha::AlphaMethod;
pub use central_difference::CentralDifference;
pub use static_control::{ArcLength, DisplacementControl, LoadControl, StaticIntegrator};

pub use crate::elements::RayleighFactors;

use log::warn;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisContext, AssemblyRequest, StiffnessKind};
use crate::error::{AnalysisError, AnalysisResult};

/// Integrator selection and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegratorConfig {
    /// Load factor increment, adapted by `desired_iterations / last` and
    /// clamped to `[min_increment, max_increment]`
    LoadControl {
        increment: f64,
        desired_iterations: usize,
        min_increment: f64,
        max_increment: f64,
    },
    /// Prescribed increment of one nodal DOF, load factor found per iteration
    DisplacementControl {
        node: usize,
        dof: usize,
        increment: f64,
        desired_iterations: usize,
        min_increment: f64,
        max_increment: f64,
    },
    /// Spherical arc length `|dU|^2 + alpha^2 dlambda^2 = s^2`
    ArcLength { arc_length: f64, alpha: f64 },
    Newmark { beta: f64, gamma: f64 },
    /// Hilber-Hughes-Taylor, `alpha` in `[2/3, 1]`
    Hht { alpha: f64 },
    GeneralizedAlpha { alpha_m: f64, alpha_f: f64 },
    CentralDifference,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self::load_control(1.0)
    }
}

impl IntegratorConfig {
    /// Constant load factor increment
    pub fn load_control(increment: f64) -> Self {
        Self::LoadControl {
            increment,
            desired_iterations: 1,
            min_increment: increment,
            max_increment: increment,
        }
    }

    /// Load control whose increment adapts to the iterations of the last step
    pub fn adaptive_load_control(increment: f64, desired_iterations: usize, min: f64, max: f64) -> Self {
        Self::LoadControl {
            increment,
            desired_iterations,
            min_increment: min,
            max_increment: max,
        }
    }

    /// Constant displacement increment of DOF `dof` of `node`
    pub fn displacement_control(node: usize, dof: usize, increment: f64) -> Self {
        Self::DisplacementControl {
            node,
            dof,
            increment,
            desired_iterations: 1,
            min_increment: increment,
            max_increment: increment,
        }
    }

    pub fn arc_length(arc_length: f64, alpha: f64) -> Self {
        Self::ArcLength { arc_length, alpha }
    }

    pub fn newmark(beta: f64, gamma: f64) -> Self {
        Self::Newmark { beta, gamma }
    }

    /// Newmark average acceleration (trapezoidal rule)
    pub fn average_acceleration() -> Self {
        Self::newmark(0.25, 0.5)
    }

    pub fn hht(alpha: f64) -> Self {
        Self::Hht { alpha }
    }

    pub fn generalized_alpha(alpha_m: f64, alpha_f: f64) -> Self {
        Self::GeneralizedAlpha { alpha_m, alpha_f }
    }

    /// Generalized-alpha from the spectral radius at infinite frequency
    pub fn generalized_alpha_rho(rho_inf: f64) -> Self {
        Self::generalized_alpha((2.0 - rho_inf) / (1.0 + rho_inf), 1.0 / (1.0 + rho_inf))
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Newmark { .. } | Self::Hht { .. } | Self::GeneralizedAlpha { .. } | Self::CentralDifference
        )
    }

    /// True for schemes that allow exactly one update per step
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::CentralDifference)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        let invalid = |msg: String| Err(AnalysisError::Configuration(msg));
        match *self {
            Self::LoadControl {
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            }
            | Self::DisplacementControl {
                increment,
                desired_iterations,
                min_increment,
                max_increment,
                ..
            } => {
                if !increment.is_finite() || increment == 0.0 {
                    return invalid(format!("increment must be finite and nonzero, got {}", increment));
                }
                if desired_iterations == 0 {
                    return invalid("desired iterations must be at least 1".into());
                }
                if min_increment > max_increment {
                    return invalid(format!(
                        "minimum increment {} exceeds maximum {}",
                        min_increment, max_increment
                    ));
                }
                Ok(())
            }
            Self::ArcLength { arc_length, alpha } => {
                if !(arc_length > 0.0) || alpha < 0.0 {
                    return invalid(format!(
                        "arc length needs s > 0 and alpha >= 0, got {} and {}",
                        arc_length, alpha
                    ));
                }
                Ok(())
            }
            Self::Newmark { beta, gamma } => {
                if !(beta > 0.0) || gamma < 0.0 {
                    return invalid(format!("Newmark needs beta > 0 and gamma >= 0, got {} and {}", beta, gamma));
                }
                if gamma < 0.5 {
                    warn!("Newmark gamma = {} < 0.5 introduces negative numerical damping", gamma);
                }
                Ok(())
            }
            Self::Hht { alpha } => {
                if !(2.0 / 3.0..=1.0).contains(&alpha) {
                    return invalid(format!("HHT alpha must lie in [2/3, 1], got {}", alpha));
                }
                Ok(())
            }
            Self::GeneralizedAlpha { alpha_m, alpha_f } => {
                if !(alpha_m > 0.0) || !(alpha_f > 0.0) {
                    return invalid(format!(
                        "generalized-alpha needs positive factors, got {} and {}",
                        alpha_m, alpha_f
                    ));
                }
                Ok(())
            }
            Self::CentralDifference => Ok(()),
        }
    }

    /// Runtime integrator for this configuration
    pub fn build(&self, rayleigh: Option<RayleighFactors>) -> Integrator {
        match *self {
            Self::LoadControl {
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            } => Integrator::Static(StaticIntegrator::LoadControl(LoadControl::new(
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            ))),
            Self::DisplacementControl {
                node,
                dof,
                increment,
                desired_iterations,
                min_increment,
                max_increment,
            } => Integrator::Static(StaticIntegrator::DisplacementControl(
                DisplacementControl::new(node, dof, increment)
                    .with_adaptation(desired_iterations, min_increment, max_increment),
            )),
            Self::ArcLength { arc_length, alpha } => {
                Integrator::Static(StaticIntegrator::ArcLength(ArcLength::new(arc_length, alpha)))
            }
            Self::Newmark { beta, gamma } => {
                Integrator::Transient(TransientIntegrator::Alpha(AlphaMethod::newmark(beta, gamma).with_rayleigh(rayleigh)))
            }
            Self::Hht { alpha } => {
                Integrator::Transient(TransientIntegrator::Alpha(AlphaMethod::hht(alpha).with_rayleigh(rayleigh)))
            }
            Self::GeneralizedAlpha { alpha_m, alpha_f } => Integrator::Transient(TransientIntegrator::Alpha(
                AlphaMethod::generalized_alpha(alpha_m, alpha_f).with_rayleigh(rayleigh),
            )),
            Self::CentralDifference => Integrator::Transient(TransientIntegrator::CentralDifference(
                CentralDifference::new().with_rayleigh(rayleigh),
            )),
        }
    }
}

/// Transient schemes
#[derive(Debug, Clone)]
pub enum TransientIntegrator {
    Alpha(AlphaMethod),
    CentralDifference(CentralDifference),
}

/// Runtime integrator
#[derive(Debug, Clone)]
pub enum Integrator {
    Static(StaticIntegrator),
    Transient(TransientIntegrator),
}

impl Integrator {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Reseed from the committed domain state after renumbering
    pub fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::Static(s) => s.domain_changed(ctx),
            Self::Transient(TransientIntegrator::Alpha(t)) => t.domain_changed(ctx),
            Self::Transient(TransientIntegrator::CentralDifference(t)) => t.domain_changed(ctx),
        }
    }

    /// Start a step; `dt` is ignored by static integrators
    pub fn new_step(&mut self, ctx: &mut AnalysisContext, dt: f64) -> AnalysisResult<()> {
        match self {
            Self::Static(s) => s.new_step(ctx),
            Self::Transient(TransientIntegrator::Alpha(t)) => t.new_step(ctx, dt),
            Self::Transient(TransientIntegrator::CentralDifference(t)) => t.new_step(ctx, dt),
        }
    }

    /// Assemble this integrator's effective tangent
    pub fn form_tangent(&mut self, ctx: &mut AnalysisContext, kind: StiffnessKind) -> AnalysisResult<()> {
        let request = match self {
            Self::Static(_) => AssemblyRequest::stiffness(),
            Self::Transient(TransientIntegrator::Alpha(t)) => t.tangent_request(),
            Self::Transient(TransientIntegrator::CentralDifference(t)) => t.tangent_request(),
        };
        ctx.form_tangent(&request.with_stiffness(kind))
    }

    /// Assemble the unbalance at the current trial state
    pub fn form_unbalance(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        let request = match self {
            Self::Static(_) => AssemblyRequest::stiffness(),
            Self::Transient(_) => AssemblyRequest::stiffness().with_inertia(),
        };
        ctx.form_unbalance(&request)
    }

    /// Apply a solved correction, returning the increment actually applied
    pub fn update(&mut self, ctx: &mut AnalysisContext, dx: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        if dx.len() != ctx.num_eqn() {
            return Err(AnalysisError::SizeMismatch {
                context: "integrator update",
                expected: ctx.num_eqn(),
                actual: dx.len(),
            });
        }
        match self {
            Self::Static(s) => s.update(ctx, dx),
            Self::Transient(TransientIntegrator::Alpha(t)) => t.update(ctx, dx),
            Self::Transient(TransientIntegrator::CentralDifference(t)) => t.update(ctx, dx),
        }
    }

    /// Accept the step
    pub fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::Static(s) => s.commit(ctx),
            Self::Transient(TransientIntegrator::Alpha(t)) => t.commit(ctx),
            Self::Transient(TransientIntegrator::CentralDifference(t)) => t.commit(ctx),
        }
    }

    /// Forget the trial step; the domain is reverted by the caller
    pub fn revert_to_last_commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::Static(s) => s.revert_to_last_commit(ctx),
            Self::Transient(TransientIntegrator::Alpha(t)) => t.revert_to_last_commit(),
            Self::Transient(TransientIntegrator::CentralDifference(t)) => t.revert_to_last_commit(),
        }
    }
}

/// Error for stepping an integrator that was never seeded
pub(crate) fn not_seeded(expected: usize, actual: usize) -> AnalysisError {
    AnalysisError::IntegratorUsage(format!(
        "integrator holds {} equations but the model has {}; call domain_changed first",
        actual, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_generalized_alpha_from_rho() {
        match IntegratorConfig::generalized_alpha_rho(1.0) {
            IntegratorConfig::GeneralizedAlpha { alpha_m, alpha_f } => {
                assert_relative_eq!(alpha_m, 0.5);
                assert_relative_eq!(alpha_f, 0.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        assert!(IntegratorConfig::hht(0.5).validate().is_err());
        assert!(IntegratorConfig::hht(0.9).validate().is_ok());
        assert!(IntegratorConfig::newmark(0.0, 0.5).validate().is_err());
        assert!(IntegratorConfig::adaptive_load_control(0.1, 4, 0.5, 0.01).validate().is_err());
        assert!(IntegratorConfig::CentralDifference.is_explicit());
        assert!(!IntegratorConfig::average_acceleration().is_explicit());
    }
}
