//! Solution algorithms - drive one step to equilibrium
//!
//! Every algorithm follows the same pattern: form the tangent and the
//! unbalance through the integrator, solve, hand the correction back to the
//! integrator and ask the convergence test whether to go on.

mod convergence;
mod line_search;

pub use convergence::{ConvergenceTest, TestConfig, TestKind, TestStatus};
pub use line_search::{LineSearch, LineSearchMethod};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisContext, StiffnessKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::integrator::Integrator;

/// Algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlgorithmConfig {
    /// One tangent, one solve, one update; no convergence test
    Linear,
    /// Tangent re-formed every iteration
    NewtonRaphson { tangent: StiffnessKind },
    /// Tangent formed once per step and its factorization reused
    ModifiedNewton { tangent: StiffnessKind },
    /// Newton-Raphson with a line search on every correction
    NewtonLineSearch { search: LineSearch },
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self::newton()
    }
}

impl AlgorithmConfig {
    pub fn newton() -> Self {
        Self::NewtonRaphson {
            tangent: StiffnessKind::Current,
        }
    }

    pub fn modified_newton() -> Self {
        Self::ModifiedNewton {
            tangent: StiffnessKind::Current,
        }
    }

    pub fn newton_line_search(search: LineSearch) -> Self {
        Self::NewtonLineSearch { search }
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        match self {
            Self::NewtonLineSearch { search } => search.validate(),
            _ => Ok(()),
        }
    }
}

/// Iterations and final norm of one converged step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub iterations: usize,
    pub norm: f64,
}

/// Runtime algorithm with its convergence test
#[derive(Debug, Clone)]
pub struct Algorithm {
    config: AlgorithmConfig,
    test: ConvergenceTest,
}

impl Algorithm {
    pub fn new(config: AlgorithmConfig, test: TestConfig) -> Self {
        Self {
            config,
            test: ConvergenceTest::new(test),
        }
    }

    pub fn config(&self) -> &AlgorithmConfig {
        &self.config
    }

    pub fn test(&self) -> &ConvergenceTest {
        &self.test
    }

    /// Drive the current step to convergence
    pub fn solve_step(
        &mut self,
        ctx: &mut AnalysisContext,
        integrator: &mut Integrator,
    ) -> AnalysisResult<StepOutcome> {
        match self.config {
            AlgorithmConfig::Linear => linear(ctx, integrator),
            AlgorithmConfig::NewtonRaphson { tangent } => self.newton(ctx, integrator, tangent, false, None),
            AlgorithmConfig::ModifiedNewton { tangent } => self.newton(ctx, integrator, tangent, true, None),
            AlgorithmConfig::NewtonLineSearch { search } => {
                self.newton(ctx, integrator, StiffnessKind::Current, false, Some(search))
            }
        }
    }

    fn newton(
        &mut self,
        ctx: &mut AnalysisContext,
        integrator: &mut Integrator,
        tangent: StiffnessKind,
        modified: bool,
        search: Option<LineSearch>,
    ) -> AnalysisResult<StepOutcome> {
        integrator.form_unbalance(ctx)?;
        self.test.start(ctx.soe.b());
        if modified {
            integrator.form_tangent(ctx, tangent)?;
        }

        loop {
            if !modified {
                integrator.form_tangent(ctx, tangent)?;
            }
            let r0 = search.map(|_| ctx.soe.b().clone());
            ctx.soe.solve()?;
            let dx = ctx.soe.x().clone();

            let applied = match (search, r0) {
                (Some(search), Some(r0)) => search.search(ctx, integrator, &dx, &r0)?,
                _ => {
                    let applied = integrator.update(ctx, &dx)?;
                    integrator.form_unbalance(ctx)?;
                    applied
                }
            };

            match self.test.test(&applied, ctx.soe.b()) {
                TestStatus::Continue => continue,
                TestStatus::Converged => {
                    debug!(
                        "converged in {} iterations (norm {:.3e})",
                        self.test.iteration(),
                        self.test.last_norm()
                    );
                    return Ok(StepOutcome {
                        iterations: self.test.iteration(),
                        norm: self.test.last_norm(),
                    });
                }
                TestStatus::Failed => {
                    return Err(AnalysisError::ConvergenceFailed {
                        iterations: self.test.iteration(),
                        norm: self.test.last_norm(),
                    });
                }
            }
        }
    }
}

fn linear(ctx: &mut AnalysisContext, integrator: &mut Integrator) -> AnalysisResult<StepOutcome> {
    integrator.form_tangent(ctx, StiffnessKind::Current)?;
    integrator.form_unbalance(ctx)?;
    ctx.soe.solve()?;
    let dx = ctx.soe.x().clone();
    let applied = integrator.update(ctx, &dx)?;
    Ok(StepOutcome {
        iterations: 1,
        norm: applied.norm(),
    })
}
