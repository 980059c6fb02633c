//! Line searches along a Newton direction
//!
//! With `s(eta) = -dU . R(U + eta dU)` a search looks for `s(eta) = 0`,
//! stopping once `|s(eta) / s(0)|` drops below the tolerance.

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisContext;
use crate::error::{AnalysisError, AnalysisResult};
use crate::integrator::Integrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineSearchMethod {
    /// `eta <- eta s0 / (s0 - s)`
    #[default]
    InitialInterpolated,
    /// Bracket a sign change, then halve the bracket
    Bisection,
    /// Secant through the last two iterates
    Secant,
}

/// Line search controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSearch {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub min_eta: f64,
    pub max_eta: f64,
    pub print: bool,
    pub method: LineSearchMethod,
}

impl Default for LineSearch {
    fn default() -> Self {
        Self {
            tolerance: 0.8,
            max_iterations: 10,
            min_eta: 0.1,
            max_eta: 10.0,
            print: false,
            method: LineSearchMethod::InitialInterpolated,
        }
    }
}

impl LineSearch {
    pub fn new(method: LineSearchMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_eta_bounds(mut self, min_eta: f64, max_eta: f64) -> Self {
        self.min_eta = min_eta;
        self.max_eta = max_eta;
        self
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if !(self.tolerance > 0.0) || !(self.min_eta > 0.0) || self.min_eta > self.max_eta {
            return Err(AnalysisError::Configuration(format!(
                "line search needs tolerance > 0 and 0 < min_eta <= max_eta, got {}, {}, {}",
                self.tolerance, self.min_eta, self.max_eta
            )));
        }
        Ok(())
    }

    fn clamp(&self, eta: f64) -> f64 {
        if eta.is_finite() {
            eta.clamp(self.min_eta, self.max_eta)
        } else {
            1.0
        }
    }

    /// Apply `dx` scaled by the chosen `eta`, returning the total increment
    ///
    /// `r0` is the unbalance `dx` was solved from. On return the system's
    /// right-hand side holds the unbalance at the final state.
    pub(crate) fn search(
        &self,
        ctx: &mut AnalysisContext,
        integrator: &mut Integrator,
        dx: &DVector<f64>,
        r0: &DVector<f64>,
    ) -> AnalysisResult<DVector<f64>> {
        let s0 = -dx.dot(r0);
        let mut applied = integrator.update(ctx, dx)?;
        integrator.form_unbalance(ctx)?;
        let mut s = -dx.dot(ctx.soe.b());

        if s0 == 0.0 || (s / s0).abs() <= self.tolerance {
            return Ok(applied);
        }

        let mut eta = 1.0;

        match self.method {
            LineSearchMethod::InitialInterpolated => {
                for i in 0..self.max_iterations {
                    let next = self.clamp(eta * s0 / (s0 - s));
                    s = move_along(ctx, integrator, dx, &mut applied, next - eta)?;
                    eta = next;
                    self.report(i, eta, s / s0);
                    if (s / s0).abs() <= self.tolerance {
                        break;
                    }
                }
            }
            LineSearchMethod::Secant => {
                let (mut eta_prev, mut s_prev) = (0.0, s0);
                for i in 0..self.max_iterations {
                    let next = self.clamp(eta - s * (eta_prev - eta) / (s_prev - s));
                    let s_next = move_along(ctx, integrator, dx, &mut applied, next - eta)?;
                    (eta_prev, s_prev) = (eta, s);
                    (eta, s) = (next, s_next);
                    self.report(i, eta, s / s0);
                    if (s / s0).abs() <= self.tolerance {
                        break;
                    }
                }
            }
            LineSearchMethod::Bisection => {
                let (mut eta_l, mut eta_u, mut s_u) = (0.0, eta, s);
                // expand until s changes sign
                while s_u * s0 > 0.0 && eta_u < self.max_eta {
                    let next = (eta_u * 4.0).min(self.max_eta);
                    s_u = move_along(ctx, integrator, dx, &mut applied, next - eta)?;
                    eta_l = eta_u;
                    eta_u = next;
                    eta = next;
                }
                if s_u * s0 < 0.0 {
                    for i in 0..self.max_iterations {
                        let next = 0.5 * (eta_l + eta_u);
                        s = move_along(ctx, integrator, dx, &mut applied, next - eta)?;
                        eta = next;
                        self.report(i, eta, s / s0);
                        if (s / s0).abs() <= self.tolerance {
                            break;
                        }
                        if s * s0 > 0.0 {
                            eta_l = eta;
                        } else {
                            eta_u = eta;
                        }
                    }
                }
            }
        }
        Ok(applied)
    }

    fn report(&self, iteration: usize, eta: f64, ratio: f64) {
        if self.print {
            debug!("line search {}: eta = {:.4}, s/s0 = {:.4e}", iteration + 1, eta, ratio);
        }
    }
}

/// Move `delta` further along `dx` and return the new `s`
fn move_along(
    ctx: &mut AnalysisContext,
    integrator: &mut Integrator,
    dx: &DVector<f64>,
    applied: &mut DVector<f64>,
    delta: f64,
) -> AnalysisResult<f64> {
    let incr = integrator.update(ctx, &(dx * delta))?;
    *applied += incr;
    integrator.form_unbalance(ctx)?;
    Ok(-dx.dot(ctx.soe.b()))
}
