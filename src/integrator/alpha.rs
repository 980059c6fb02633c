//! Alpha-method family: Newmark, HHT and generalized-alpha
//!
//! All three share one core with parameters `(alpha_m, alpha_f, beta, gamma)`.
//! Equilibrium is enforced at the interpolated state
//!
//! ```text
//! U_a   = (1 - af) U_t   + af U
//! V_a   = (1 - af) V_t   + af V
//! A_a   = (1 - am) A_t   + am A
//! ```
//!
//! with loads evaluated at `t + af dt`. Newmark is `am = af = 1`.

use log::debug;
use nalgebra::DVector;

use super::{not_seeded, RayleighFactors};
use crate::analysis::{AnalysisContext, AssemblyRequest, ResponseKind};
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone)]
pub struct AlphaMethod {
    alpha_m: f64,
    alpha_f: f64,
    beta: f64,
    gamma: f64,
    rayleigh: Option<RayleighFactors>,

    dt: f64,
    time: f64,
    u: DVector<f64>,
    v: DVector<f64>,
    a: DVector<f64>,
    ut: DVector<f64>,
    vt: DVector<f64>,
    at: DVector<f64>,
}

impl AlphaMethod {
    pub fn new(alpha_m: f64, alpha_f: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha_m,
            alpha_f,
            beta,
            gamma,
            rayleigh: None,
            dt: 0.0,
            time: 0.0,
            u: DVector::zeros(0),
            v: DVector::zeros(0),
            a: DVector::zeros(0),
            ut: DVector::zeros(0),
            vt: DVector::zeros(0),
            at: DVector::zeros(0),
        }
    }

    pub fn newmark(beta: f64, gamma: f64) -> Self {
        Self::new(1.0, 1.0, beta, gamma)
    }

    pub fn hht(alpha: f64) -> Self {
        Self::new(1.0, alpha, (2.0 - alpha).powi(2) / 4.0, 1.5 - alpha)
    }

    pub fn generalized_alpha(alpha_m: f64, alpha_f: f64) -> Self {
        let d = 1.0 + alpha_m - alpha_f;
        Self::new(alpha_m, alpha_f, d * d / 4.0, 0.5 + alpha_m - alpha_f)
    }

    pub fn with_rayleigh(mut self, factors: Option<RayleighFactors>) -> Self {
        self.rayleigh = factors;
        self
    }

    /// `(alpha_m, alpha_f, beta, gamma)`
    pub fn parameters(&self) -> (f64, f64, f64, f64) {
        (self.alpha_m, self.alpha_f, self.beta, self.gamma)
    }

    /// Trial displacement, velocity and acceleration at the end of the step
    pub fn trial(&self) -> (&DVector<f64>, &DVector<f64>, &DVector<f64>) {
        (&self.u, &self.v, &self.a)
    }

    pub(crate) fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        if let Some(factors) = self.rayleigh {
            ctx.domain.set_rayleigh_factors(factors);
        }
        self.ut = ctx.response(ResponseKind::Disp, true)?;
        self.vt = ctx.response(ResponseKind::Vel, true)?;
        self.at = ctx.response(ResponseKind::Accel, true)?;
        self.u = self.ut.clone();
        self.v = self.vt.clone();
        self.a = self.at.clone();
        self.time = ctx.domain.committed_time();
        Ok(())
    }

    /// Effective tangent coefficients for the current step size
    pub(crate) fn tangent_request(&self) -> AssemblyRequest {
        let dt = self.dt;
        AssemblyRequest::new(
            self.alpha_f,
            self.alpha_f * self.gamma / (self.beta * dt),
            self.alpha_m / (self.beta * dt * dt),
        )
    }

    pub(crate) fn new_step(&mut self, ctx: &mut AnalysisContext, dt: f64) -> AnalysisResult<()> {
        if !(dt > 0.0) {
            return Err(AnalysisError::InvalidInput(format!("time step must be positive, got {}", dt)));
        }
        if self.ut.len() != ctx.num_eqn() {
            return Err(not_seeded(ctx.num_eqn(), self.ut.len()));
        }
        self.dt = dt;
        let (beta, gamma) = (self.beta, self.gamma);

        // displacement predictor: U = U_t
        self.u.copy_from(&self.ut);
        self.v = &self.vt * (1.0 - gamma / beta) + &self.at * (dt * (1.0 - 0.5 * gamma / beta));
        self.a = &self.vt * (-1.0 / (beta * dt)) + &self.at * (1.0 - 0.5 / beta);

        self.set_interpolated(ctx)?;
        ctx.apply_load(self.time + self.alpha_f * dt)
    }

    pub(crate) fn update(&mut self, ctx: &mut AnalysisContext, du: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        if self.dt == 0.0 {
            return Err(AnalysisError::IntegratorUsage("update called before new_step".into()));
        }
        let dt = self.dt;
        self.u += du;
        self.v += du * (self.gamma / (self.beta * dt));
        self.a += du * (1.0 / (self.beta * dt * dt));
        self.set_interpolated(ctx)?;
        Ok(du.clone())
    }

    fn set_interpolated(&self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        let (am, af) = (self.alpha_m, self.alpha_f);
        let u = &self.ut * (1.0 - af) + &self.u * af;
        let v = &self.vt * (1.0 - af) + &self.v * af;
        let a = &self.at * (1.0 - am) + &self.a * am;
        ctx.set_response(Some(&u), Some(&v), Some(&a))?;
        ctx.update_domain()
    }

    pub(crate) fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        if self.dt == 0.0 {
            return Err(AnalysisError::IntegratorUsage("commit called before new_step".into()));
        }
        ctx.set_response(Some(&self.u), Some(&self.v), Some(&self.a))?;
        ctx.update_domain()?;
        let time = self.time + self.dt;
        ctx.apply_load(time)?;
        ctx.commit();
        self.time = time;

        self.ut.copy_from(&self.u);
        self.vt.copy_from(&self.v);
        self.at.copy_from(&self.a);
        debug!("alpha method: committed t = {:.6}", self.time);
        Ok(())
    }

    pub(crate) fn revert_to_last_commit(&mut self) -> AnalysisResult<()> {
        self.u.copy_from(&self.ut);
        self.v.copy_from(&self.vt);
        self.a.copy_from(&self.at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_families() {
        let (am, af, beta, gamma) = AlphaMethod::hht(1.0).parameters();
        assert_relative_eq!(am, 1.0);
        assert_relative_eq!(af, 1.0);
        assert_relative_eq!(beta, 0.25);
        assert_relative_eq!(gamma, 0.5);

        let (_, _, beta, gamma) = AlphaMethod::hht(0.9).parameters();
        assert_relative_eq!(beta, 1.21 / 4.0, epsilon = 1e-14);
        assert_relative_eq!(gamma, 0.6, epsilon = 1e-14);

        // generalized-alpha with am = af reduces to average acceleration
        let (_, _, beta, gamma) = AlphaMethod::generalized_alpha(0.5, 0.5).parameters();
        assert_relative_eq!(beta, 0.25);
        assert_relative_eq!(gamma, 0.5);
    }

    #[test]
    fn test_tangent_coefficients() {
        let mut newmark = AlphaMethod::newmark(0.25, 0.5);
        newmark.dt = 0.1;
        let request = newmark.tangent_request();
        assert_relative_eq!(request.c1, 1.0);
        assert_relative_eq!(request.c2, 20.0, epsilon = 1e-12);
        assert_relative_eq!(request.c3, 400.0, epsilon = 1e-9);
    }
}
