//! Explicit central difference
//!
//! Equilibrium at `t` with
//!
//! ```text
//! V_t = (U_{t+dt} - U_{t-dt}) / 2dt
//! A_t = (U_{t+dt} - 2 U_t + U_{t-dt}) / dt^2
//! ```
//!
//! gives `(M/dt^2 + C/2dt) x = P_t - F(U_t) - M A* - C V*` for
//! `x = U_{t+dt} - U_t`, where `A*` and `V*` are the known parts. Stiffness
//! never enters the left-hand side, so each step is exactly one solve and
//! one update.

use log::{debug, warn};
use nalgebra::DVector;

use super::{not_seeded, RayleighFactors};
use crate::analysis::{AnalysisContext, AssemblyRequest, ResponseKind};
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Default)]
pub struct CentralDifference {
    rayleigh: Option<RayleighFactors>,
    dt: f64,
    time: f64,
    u_prev: Option<DVector<f64>>,
    ut: DVector<f64>,
    vt: DVector<f64>,
    at: DVector<f64>,
    u_next: Option<DVector<f64>>,
    updated: bool,
}

impl CentralDifference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rayleigh(mut self, factors: Option<RayleighFactors>) -> Self {
        self.rayleigh = factors;
        self
    }

    pub(crate) fn domain_changed(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        if let Some(mut factors) = self.rayleigh {
            if factors.beta_k0 != 0.0 || factors.beta_kc != 0.0 {
                warn!(
                    "central difference ignores initial and committed stiffness damping (bK0 = {}, bKc = {})",
                    factors.beta_k0, factors.beta_kc
                );
                factors.beta_k0 = 0.0;
                factors.beta_kc = 0.0;
            }
            ctx.domain.set_rayleigh_factors(factors);
        }
        self.ut = ctx.response(ResponseKind::Disp, true)?;
        self.vt = ctx.response(ResponseKind::Vel, true)?;
        self.at = ctx.response(ResponseKind::Accel, true)?;
        self.u_prev = None;
        self.u_next = None;
        self.updated = false;
        self.time = ctx.domain.committed_time();
        Ok(())
    }

    pub(crate) fn tangent_request(&self) -> AssemblyRequest {
        AssemblyRequest::new(0.0, 0.5 / self.dt, 1.0 / (self.dt * self.dt))
    }

    pub(crate) fn new_step(&mut self, ctx: &mut AnalysisContext, dt: f64) -> AnalysisResult<()> {
        if !(dt > 0.0) {
            return Err(AnalysisError::InvalidInput(format!("time step must be positive, got {}", dt)));
        }
        if self.ut.len() != ctx.num_eqn() {
            return Err(not_seeded(ctx.num_eqn(), self.ut.len()));
        }
        if self.u_prev.is_some() && self.dt != dt {
            warn!("central difference step changed from {} to {}", self.dt, dt);
        }
        self.dt = dt;

        // U_{-dt} from a Taylor expansion of the initial state
        let u_prev = self
            .u_prev
            .get_or_insert_with(|| &self.ut - &self.vt * dt + &self.at * (0.5 * dt * dt));
        let d = &self.ut - &*u_prev;
        let vel = &d * (0.5 / dt);
        let accel = &d * (-1.0 / (dt * dt));

        self.u_next = None;
        self.updated = false;
        ctx.set_response(Some(&self.ut), Some(&vel), Some(&accel))?;
        ctx.update_domain()?;
        ctx.apply_load(self.time)
    }

    pub(crate) fn update(&mut self, ctx: &mut AnalysisContext, x: &DVector<f64>) -> AnalysisResult<DVector<f64>> {
        if self.updated {
            return Err(AnalysisError::IntegratorUsage(
                "central difference allows a single update per step".into(),
            ));
        }
        let u_prev = self
            .u_prev
            .as_ref()
            .ok_or_else(|| AnalysisError::IntegratorUsage("update called before new_step".into()))?;
        let dt = self.dt;

        let u_next = &self.ut + x;
        let vel = (&u_next - u_prev) * (0.5 / dt);
        let accel = (&u_next - &self.ut * 2.0 + u_prev) * (1.0 / (dt * dt));

        ctx.set_response(Some(&u_next), Some(&vel), Some(&accel))?;
        ctx.update_domain()?;
        self.vt = vel;
        self.at = accel;
        self.u_next = Some(u_next);
        self.updated = true;
        Ok(x.clone())
    }

    pub(crate) fn commit(&mut self, ctx: &mut AnalysisContext) -> AnalysisResult<()> {
        let u_next = self
            .u_next
            .take()
            .ok_or_else(|| AnalysisError::IntegratorUsage("commit called without an update".into()))?;
        let time = self.time + self.dt;
        ctx.apply_load(time)?;
        ctx.commit();
        self.time = time;

        self.u_prev = Some(std::mem::replace(&mut self.ut, u_next));
        self.updated = false;
        debug!("central difference: committed t = {:.6}", self.time);
        Ok(())
    }

    pub(crate) fn revert_to_last_commit(&mut self) -> AnalysisResult<()> {
        self.u_next = None;
        self.updated = false;
        Ok(())
    }
}
