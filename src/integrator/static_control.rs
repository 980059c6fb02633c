//! Static integrators: load control, displacement control, arc length
//!
//! The load factor is passed to the domain as its pseudo-time, so load
//! patterns scale with it through their time series. Displacement control
//! and arc length need the reference load `dR/dlambda`, taken as the
//! difference of two unbalance assemblies one load factor apart.

use log::debug;
use nalgebra::DVector;

use crate::analysis::{AnalysisContext, AssemblyRequest};
use crate::error::{AnalysisError, AnalysisResult};
use crate::system::SolverError;

/// Increment size adapted to the iterations of the last step
#[derive(Debug, Clone, Copy)]
struct StepSize {
    increment: f64,
    desired: usize,
    min: f64,
    max: f64,
    updates: usize,
    last_updates: usize,
}

impl StepSize {
    fn new(increment: f64) -> Self {
        Self {
            increment,
            desired: 1,
            min: increment,
            max: increment,
            updates: 0,
            last_updates: 0,
        }
    }

    /// Increment for the next step: `inc * desired / last`, clamped
    fn next(&mut self) -> f64 {
        if self.last_updates > 0 && self.min < self.max {
            let scaled = self.increment * self.desired as f64 / self.last_updates as f64;
            self.increment = scaled.clamp(self.min, self.max);
        }
        self.updates = 0;
        self.increment
    }

    fn finish(&mut self) {
        self.last_updates = self.updates;
    }
}

/// Reference load `R(lambda + 1) - R(lambda)`, leaving loads at `lambda`
fn reference_load(ctx: &mut AnalysisContext, lambda: f64) -> AnalysisResult<DVector<f64>> {
    let request = AssemblyRequest::stiffness();
    ctx.apply_load(lambda + 1.0)?;
    ctx.form_unbalance(&request)?;
    let upper = ctx.soe.b().clone();
    ctx.apply_load(lambda)?;
    ctx.form_unbalance(&request)?;
    let phat = upper - ctx.soe.b();
    if phat.norm() == 0.0 {
        return Err(AnalysisError::Configuration(
            "no reference load: every load pattern is zero".into(),
        ));
    }
    Ok(phat)
}

// ========================
// Load control
// ========================

#[derive(Debug, Clone)]
pub struct LoadControl {
    step: StepSize,
    lambda: f64,
    committed_lambda: f64,
}

impl LoadControl {
    pub fn new(increment: f64, desired_iterations: usize, min: f64, max: f64) -> Self {
        let mut step = StepSize::new(increment);
        step.desired = desired_iterations;
        step.min = min;
        step.max = max;
        Self {
            step,
            lambda: 0.0,
            committed_lambda: 0.0,
        }
    }

    pub fn load_factor(&self) -> f64 {
        self.lambda
    }

    /// Increment the next step will start from
    pub fn increment(&self) -> f64 {
        self.step.increment
    }

    fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        self.committed_lambda = ctx.domain.committed_time();
        self.lambda = self.committed_lambda;
        Ok(())
    }

    fn new_step(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        let increment = self.step.next();
        self.lambda = self.committed_lambda + increment;
        debug!("load control: lambda = {:.6}", self.lambda);
        ctx.apply_load(self.lambda)?;
        ctx.update_domain()
    }

    fn update(&mut self, ctx: &mut AnalysisContext, dx: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        ctx.incr_response(Some(dx), None, None)?;
        ctx.update_domain()?;
        self.step.updates += 1;
        Ok(dx.clone())
    }

    fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        ctx.commit();
        self.committed_lambda = self.lambda;
        self.step.finish();
        Ok(())
    }

    fn revert_to_last_commit(&mut self) {
        self.lambda = self.committed_lambda;
        self.step.updates = 0;
    }
}

// ========================
// Displacement control
// ========================

#[derive(Debug, Clone)]
pub struct DisplacementControl {
    node: usize,
    dof: usize,
    step: StepSize,
    eqn: usize,
    lambda: f64,
    committed_lambda: f64,
    phat: DVector<f64>,
}

impl DisplacementControl {
    pub fn new(node: usize, dof: usize, increment: f64) -> Self {
        Self {
            node,
            dof,
            step: StepSize::new(increment),
            eqn: 0,
            lambda: 0.0,
            committed_lambda: 0.0,
            phat: DVector::zeros(0),
        }
    }

    pub fn with_adaptation(mut self, desired_iterations: usize, min: f64, max: f64) -> Self {
        self.step.desired = desired_iterations;
        self.step.min = min;
        self.step.max = max;
        self
    }

    pub fn load_factor(&self) -> f64 {
        self.lambda
    }

    fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        self.eqn = ctx.model.equation_of(self.node, self.dof).ok_or_else(|| {
            AnalysisError::Configuration(format!(
                "controlled DOF {} of node {} has no equation",
                self.dof, self.node
            ))
        })?;
        self.committed_lambda = ctx.domain.committed_time();
        self.lambda = self.committed_lambda;
        self.phat = DVector::zeros(0);
        Ok(())
    }

    fn controlled(&self, d_uhat: &DVector<f64>) -> AnalysisResult<f64> {
        let value = d_uhat[self.eqn];
        if value.abs() < f64::EPSILON * d_uhat.amax().max(f64::MIN_POSITIVE) {
            return Err(SolverError::Singular { row: self.eqn }.into());
        }
        Ok(value)
    }

    fn new_step(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        let increment = self.step.next();
        self.phat = reference_load(ctx, self.committed_lambda)?;
        ctx.form_tangent(&AssemblyRequest::stiffness())?;
        let d_uhat = ctx.soe.solve_for(&self.phat)?;

        let d_lambda = increment / self.controlled(&d_uhat)?;
        self.lambda = self.committed_lambda + d_lambda;
        debug!("displacement control: lambda = {:.6}", self.lambda);

        ctx.incr_response(Some(&(d_uhat * d_lambda)), None, None)?;
        ctx.update_domain()?;
        ctx.apply_load(self.lambda)
    }

    fn update(&mut self, ctx: &mut AnalysisContext, du_bar: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        let d_uhat = ctx.soe.solve_for(&self.phat)?;
        let d_lambda = -du_bar[self.eqn] / self.controlled(&d_uhat)?;
        let du = du_bar + d_uhat * d_lambda;

        self.lambda += d_lambda;
        ctx.incr_response(Some(&du), None, None)?;
        ctx.update_domain()?;
        ctx.apply_load(self.lambda)?;
        self.step.updates += 1;
        Ok(du)
    }

    fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        ctx.commit();
        self.committed_lambda = self.lambda;
        self.step.finish();
        Ok(())
    }

    fn revert_to_last_commit(&mut self) {
        self.lambda = self.committed_lambda;
        self.step.updates = 0;
    }
}

// ========================
// Arc length
// ========================

#[derive(Debug, Clone)]
pub struct ArcLength {
    arc_length: f64,
    alpha: f64,
    lambda: f64,
    committed_lambda: f64,
    delta_lambda_step: f64,
    sign: f64,
    phat: DVector<f64>,
    delta_u_step: DVector<f64>,
}

impl ArcLength {
    pub fn new(arc_length: f64, alpha: f64) -> Self {
        Self {
            arc_length,
            alpha,
            lambda: 0.0,
            committed_lambda: 0.0,
            delta_lambda_step: 0.0,
            sign: 1.0,
            phat: DVector::zeros(0),
            delta_u_step: DVector::zeros(0),
        }
    }

    pub fn load_factor(&self) -> f64 {
        self.lambda
    }

    fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        self.committed_lambda = ctx.domain.committed_time();
        self.lambda = self.committed_lambda;
        self.phat = DVector::zeros(0);
        self.delta_u_step = DVector::zeros(ctx.num_eqn());
        Ok(())
    }

    fn new_step(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        self.phat = reference_load(ctx, self.committed_lambda)?;
        ctx.form_tangent(&AssemblyRequest::stiffness())?;
        let d_uhat = ctx.soe.solve_for(&self.phat)?;

        let alpha2 = self.alpha * self.alpha;
        let d_lambda = self.sign * self.arc_length / (d_uhat.dot(&d_uhat) + alpha2).sqrt();
        self.delta_lambda_step = d_lambda;
        self.lambda = self.committed_lambda + d_lambda;
        self.delta_u_step = d_uhat * d_lambda;
        debug!("arc length: predictor lambda = {:.6}", self.lambda);

        ctx.incr_response(Some(&self.delta_u_step), None, None)?;
        ctx.update_domain()?;
        ctx.apply_load(self.lambda)
    }

    fn update(&mut self, ctx: &mut AnalysisContext, du_bar: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        let d_uhat = ctx.soe.solve_for(&self.phat)?;
        let alpha2 = self.alpha * self.alpha;

        let a = alpha2 + d_uhat.dot(&d_uhat);
        let b = 2.0 * (alpha2 * self.delta_lambda_step + d_uhat.dot(du_bar) + self.delta_u_step.dot(&d_uhat));
        let c = 2.0 * self.delta_u_step.dot(du_bar) + du_bar.dot(du_bar);
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return Err(AnalysisError::ComplexRoots(discriminant));
        }

        let root = discriminant.sqrt();
        let d_lambda1 = (-b + root) / (2.0 * a);
        let d_lambda2 = (-b - root) / (2.0 * a);

        // keep the root that continues in the direction of the step so far
        let theta1 = self.delta_u_step.dot(&self.delta_u_step)
            + du_bar.dot(&self.delta_u_step)
            + d_lambda1 * self.delta_u_step.dot(&d_uhat);
        let d_lambda = if theta1 > 0.0 { d_lambda1 } else { d_lambda2 };

        let du = du_bar + d_uhat * d_lambda;
        self.delta_u_step += &du;
        self.delta_lambda_step += d_lambda;
        self.lambda += d_lambda;

        ctx.incr_response(Some(&du), None, None)?;
        ctx.update_domain()?;
        ctx.apply_load(self.lambda)?;
        self.sign = if self.delta_lambda_step < 0.0 { -1.0 } else { 1.0 };
        Ok(du)
    }

    fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        ctx.commit();
        self.committed_lambda = self.lambda;
        Ok(())
    }

    fn revert_to_last_commit(&mut self) {
        self.lambda = self.committed_lambda;
        self.delta_lambda_step = 0.0;
        self.delta_u_step.fill(0.0);
    }
}

// ========================
// Dispatch
// ========================

/// Static integrators
#[derive(Debug, Clone)]
pub enum StaticIntegrator {
    LoadControl(LoadControl),
    DisplacementControl(DisplacementControl),
    ArcLength(ArcLength),
}

impl StaticIntegrator {
    pub fn load_factor(&self) -> f64 {
        match self {
            Self::LoadControl(i) => i.load_factor(),
            Self::DisplacementControl(i) => i.load_factor(),
            Self::ArcLength(i) => i.load_factor(),
        }
    }

    pub(crate) fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::LoadControl(i) => i.domain_changed(ctx),
            Self::DisplacementControl(i) => i.domain_changed(ctx),
            Self::ArcLength(i) => i.domain_changed(ctx),
        }
    }

    pub(crate) fn new_step(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::LoadControl(i) => i.new_step(ctx),
            Self::DisplacementControl(i) => i.new_step(ctx),
            Self::ArcLength(i) => i.new_step(ctx),
        }
    }

    pub(crate) fn update(&mut self, ctx: &mut AnalysisContext, dx: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        match self {
            Self::LoadControl(i) => i.update(ctx, dx),
            Self::DisplacementControl(i) => i.update(ctx, dx),
            Self::ArcLength(i) => i.update(ctx, dx),
        }
    }

    pub(crate) fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::LoadControl(i) => i.commit(ctx),
            Self::DisplacementControl(i) => i.commit(ctx),
            Self::ArcLength(i) => i.commit(ctx),
        }
    }

    pub(crate) fn revert_to_last_commit(&mut self, _ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        match self {
            Self::LoadControl(i) => i.revert_to_last_commit(),
            Self::DisplacementControl(i) => i.revert_to_last_commit(),
            Self::ArcLength(i) => i.revert_to_last_commit(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_size_adapts_and_clamps() {
        let mut step = StepSize::new(0.1);
        step.desired = 4;
        step.min = 0.01;
        step.max = 0.15;

        assert_relative_eq!(step.next(), 0.1);
        step.updates = 2;
        step.finish();
        // 0.1 * 4 / 2 = 0.2, clamped
        assert_relative_eq!(step.next(), 0.15);
        step.updates = 12;
        step.finish();
        assert_relative_eq!(step.next(), 0.05);
    }

    #[test]
    fn test_constant_step_size() {
        let mut step = StepSize::new(-0.5);
        step.updates = 7;
        step.finish();
        assert_relative_eq!(step.next(), -0.5);
    }
}
