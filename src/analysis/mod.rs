//! Analysis orchestration
//!
//! The pieces here turn a [`Domain`] into a numbered system of equations:
//! the [`ConstraintHandler`] builds DOF and FE groups, the [`Numberer`]
//! assigns equation numbers and the [`AnalysisModel`] assembles their
//! contributions into a [`LinearSoe`]. [`Analysis`] ties them to an
//! integrator, an algorithm and a convergence test.

mod dof_group;
mod eigen;
mod fe_group;
mod handler;
mod model;
mod numberer;

pub use dof_group::{DofGroup, DofGroupKind, DofRef, EquationId};
pub use eigen::eigen_analysis;
pub use fe_group::{FeGroup, FeGroupKind};
pub use handler::ConstraintHandler;
pub use model::{AnalysisModel, ResponseKind};
pub use numberer::Numberer;

use log::{info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, AlgorithmConfig, TestConfig};
use crate::domain::{ConstraintRef, Domain};
use crate::elements::RayleighFactors;
use crate::error::{AnalysisError, AnalysisResult};
use crate::integrator::{Integrator, IntegratorConfig};
use crate::results::{AnalysisReport, EigenResults, StepReport};
use crate::system::{LinearSoe, SolverKind, StorageScheme};

// ========================
// Assembly requests
// ========================

/// Stiffness matrix an assembly asks elements for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StiffnessKind {
    /// Tangent at the current trial state
    #[default]
    Current,
    /// Stiffness at the initial state
    Initial,
}

/// What one assembly pass asks every group for
///
/// The tangent is `c1*K + c2*C + c3*M`. The unbalance includes inertia and
/// damping forces when `inertia` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyRequest {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub stiffness: StiffnessKind,
    pub inertia: bool,
}

impl AssemblyRequest {
    pub fn new(c1: f64, c2: f64, c3: f64) -> Self {
        Self {
            c1,
            c2,
            c3,
            stiffness: StiffnessKind::Current,
            inertia: false,
        }
    }

    /// Plain stiffness `K`
    pub fn stiffness() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    /// Plain mass `M`
    pub fn mass() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn with_stiffness(mut self, kind: StiffnessKind) -> Self {
        self.stiffness = kind;
        self
    }

    pub fn with_inertia(mut self) -> Self {
        self.inertia = true;
        self
    }
}

/// How FE group contributions are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssemblyMode {
    #[default]
    Sequential,
    /// Contributions computed per partition in parallel, then added to the
    /// system in partition order
    Partitioned { partitions: usize },
}

/// Everything an integrator or algorithm works on during one step
pub struct AnalysisContext<'a> {
    pub domain: &'a mut Domain,
    pub model: &'a mut AnalysisModel,
    pub soe: &'a mut LinearSoe,
    pub mode: AssemblyMode,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        domain: &'a mut Domain,
        model: &'a mut AnalysisModel,
        soe: &'a mut LinearSoe,
        mode: AssemblyMode,
    ) -> Self {
        Self {
            domain,
            model,
            soe,
            mode,
        }
    }

    pub fn form_tangent(&mut self, request: &AssemblyRequest) -> AnalysisResult<()> {
        self.model.form_tangent(self.domain, self.soe, request, self.mode)
    }

    pub fn form_unbalance(&mut self, request: &AssemblyRequest) -> AnalysisResult<()> {
        self.model.form_unbalance(self.domain, self.soe, request, self.mode)
    }

    /// Apply loads at `time` (or load factor) with fixities imposed
    pub fn apply_load(&mut self, time: f64) -> AnalysisResult<()> {
        self.model.apply_load(self.domain, time)
    }

    pub fn num_eqn(&self) -> usize {
        self.model.num_eqn()
    }

    /// Equation vector of a nodal response
    pub fn response(&self, kind: ResponseKind, committed: bool) -> AnalysisResult<DVector<f64>> {
        self.model.response_vector(self.domain, kind, committed)
    }

    pub fn set_response(
        &mut self,
        disp: Option<&DVector<f64>>,
        vel: Option<&DVector<f64>>,
        accel: Option<&DVector<f64>>,
    ) -> AnalysisResult<()> {
        self.model.set_response(self.domain, disp, vel, accel)
    }

    pub fn incr_response(
        &mut self,
        disp: Option<&DVector<f64>>,
        vel: Option<&DVector<f64>>,
        accel: Option<&DVector<f64>>,
    ) -> AnalysisResult<()> {
        self.model.incr_response(self.domain, disp, vel, accel)
    }

    /// Push trial nodal state into the elements
    pub fn update_domain(&mut self) -> AnalysisResult<()> {
        self.domain.update()
    }

    pub fn commit(&mut self) {
        self.model.commit(self.domain);
    }

    pub fn revert_to_last_commit(&mut self) -> AnalysisResult<()> {
        self.model.revert_to_last_commit(self.domain)
    }
}

// ========================
// Configuration
// ========================

/// Complete analysis setup
///
/// This is the unit that gets serialised; runtime state lives in
/// [`Analysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub storage: StorageScheme,
    pub solver: SolverKind,
    pub numberer: Numberer,
    pub assembly: AssemblyMode,
    pub rayleigh: Option<RayleighFactors>,
    pub handler: ConstraintHandler,
    pub integrator: IntegratorConfig,
    pub algorithm: AlgorithmConfig,
    pub test: TestConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            storage: StorageScheme::BandGeneral,
            solver: SolverKind::BandLu,
            numberer: Numberer::ReverseCuthillMcKee,
            assembly: AssemblyMode::Sequential,
            rayleigh: None,
            handler: ConstraintHandler::Plain,
            integrator: IntegratorConfig::load_control(1.0),
            algorithm: AlgorithmConfig::default(),
            test: TestConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Static analysis with the given integrator
    pub fn static_analysis(integrator: IntegratorConfig) -> Self {
        Self::default().with_integrator(integrator)
    }

    /// Transient analysis with the given integrator
    pub fn transient_analysis(integrator: IntegratorConfig) -> Self {
        let algorithm = if integrator.is_explicit() {
            AlgorithmConfig::Linear
        } else {
            AlgorithmConfig::default()
        };
        Self::default()
            .with_integrator(integrator)
            .with_algorithm(algorithm)
    }

    pub fn with_system(mut self, storage: StorageScheme, solver: SolverKind) -> Self {
        self.storage = storage;
        self.solver = solver;
        self
    }

    pub fn with_numberer(mut self, numberer: Numberer) -> Self {
        self.numberer = numberer;
        self
    }

    pub fn with_assembly(mut self, assembly: AssemblyMode) -> Self {
        self.assembly = assembly;
        self
    }

    pub fn with_rayleigh(mut self, factors: RayleighFactors) -> Self {
        self.rayleigh = Some(factors);
        self
    }

    pub fn with_handler(mut self, handler: ConstraintHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_integrator(mut self, integrator: IntegratorConfig) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmConfig) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_test(mut self, test: TestConfig) -> Self {
        self.test = test;
        self
    }

    /// Check every component and every pairing
    pub fn validate(&self) -> AnalysisResult<()> {
        self.handler.validate()?;
        self.integrator.validate()?;
        self.algorithm.validate()?;
        self.test.validate()?;

        if !self.solver.compatible_with(self.storage) {
            return Err(AnalysisError::Configuration(format!(
                "solver {:?} cannot work on {:?} storage",
                self.solver, self.storage
            )));
        }
        if let AssemblyMode::Partitioned { partitions: 0 } = self.assembly {
            return Err(AnalysisError::Configuration(
                "partitioned assembly needs at least one partition".into(),
            ));
        }

        let lagrange = matches!(self.handler, ConstraintHandler::Lagrange { .. });
        if lagrange && self.solver.requires_spd() {
            return Err(AnalysisError::Configuration(format!(
                "Lagrange multipliers make the system indefinite; {:?} needs a positive definite matrix",
                self.solver
            )));
        }
        if self.integrator.is_explicit() {
            if self.algorithm != AlgorithmConfig::Linear {
                return Err(AnalysisError::Configuration(format!(
                    "explicit integrator allows one update per step and cannot be driven by {:?}",
                    self.algorithm
                )));
            }
            if lagrange {
                return Err(AnalysisError::Configuration(
                    "explicit integrator cannot use Lagrange multipliers (zero mass on multiplier equations)"
                        .into(),
                ));
            }
        }
        if self.rayleigh.is_some() && !self.integrator.is_transient() {
            warn!("Rayleigh factors are ignored by static integrators");
        }
        Ok(())
    }

    pub fn to_json(&self) -> AnalysisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ========================
// Analysis driver
// ========================

/// A configured analysis: model, system, integrator and algorithm
#[derive(Debug)]
pub struct Analysis {
    config: AnalysisConfig,
    model: AnalysisModel,
    soe: LinearSoe,
    integrator: Integrator,
    algorithm: Algorithm,
}

impl Analysis {
    /// Build every component; fails on incompatible pairings
    pub fn new(config: AnalysisConfig) -> AnalysisResult<Self> {
        config.validate()?;
        let soe = LinearSoe::new(config.storage, config.solver)?;
        let integrator = config.integrator.build(config.rayleigh);
        let algorithm = Algorithm::new(config.algorithm, config.test);
        Ok(Self {
            config,
            model: AnalysisModel::new(),
            soe,
            integrator,
            algorithm,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    pub fn soe(&self) -> &LinearSoe {
        &self.soe
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    /// Renumber, resize the system and reseed the integrator
    pub fn domain_changed(&mut self, domain: &mut Domain) -> AnalysisResult<usize> {
        let n = self.model.domain_changed(
            domain,
            &self.config.handler,
            &self.config.numberer,
            &mut self.soe,
        )?;
        if let Some((lo, hi)) = self.soe.bandwidth() {
            info!("system bandwidth: {} below, {} above the diagonal", lo, hi);
        }
        let mut ctx = AnalysisContext::new(domain, &mut self.model, &mut self.soe, self.config.assembly);
        self.integrator.domain_changed(&mut ctx)?;
        Ok(n)
    }

    fn ensure_current(&mut self, domain: &mut Domain) -> AnalysisResult<()> {
        if !self.model.is_current(domain) {
            self.domain_changed(domain)?;
        }
        Ok(())
    }

    /// Run `steps` static steps
    pub fn analyze_static(&mut self, domain: &mut Domain, steps: usize) -> AnalysisResult<AnalysisReport> {
        if self.integrator.is_transient() {
            return Err(AnalysisError::Configuration(
                "analyze_static needs a static integrator".into(),
            ));
        }
        self.run(domain, steps, 0.0)
    }

    /// Run `steps` transient steps of size `dt`
    pub fn analyze_transient(
        &mut self,
        domain: &mut Domain,
        steps: usize,
        dt: f64,
    ) -> AnalysisResult<AnalysisReport> {
        if !self.integrator.is_transient() {
            return Err(AnalysisError::Configuration(
                "analyze_transient needs a transient integrator".into(),
            ));
        }
        if !(dt > 0.0) {
            return Err(AnalysisError::InvalidInput(format!("time step must be positive, got {}", dt)));
        }
        self.run(domain, steps, dt)
    }

    fn run(&mut self, domain: &mut Domain, steps: usize, dt: f64) -> AnalysisResult<AnalysisReport> {
        let mut report = AnalysisReport::default();
        for step in 1..=steps {
            self.ensure_current(domain)?;
            let mut ctx = AnalysisContext::new(domain, &mut self.model, &mut self.soe, self.config.assembly);

            let outcome = self
                .integrator
                .new_step(&mut ctx, dt)
                .and_then(|_| self.algorithm.solve_step(&mut ctx, &mut self.integrator))
                .and_then(|outcome| self.integrator.commit(&mut ctx).map(|_| outcome));

            match outcome {
                Ok(outcome) => {
                    report.push(StepReport {
                        step,
                        iterations: outcome.iterations,
                        norm: outcome.norm,
                        time: ctx.domain.time(),
                    });
                }
                Err(err) => {
                    warn!("step {} failed: {}", step, err);
                    ctx.revert_to_last_commit()?;
                    self.integrator.revert_to_last_commit(&mut ctx)?;
                    return Err(err);
                }
            }
        }
        info!(
            "analysis finished: {} steps, {} iterations, time {:.6}",
            report.steps.len(),
            report.total_iterations(),
            domain.time()
        );
        report.final_time = domain.time();
        Ok(report)
    }

    /// Lowest `num_modes` eigenpairs of `K phi = lambda M phi`
    pub fn eigen(&mut self, domain: &mut Domain, num_modes: usize) -> AnalysisResult<EigenResults> {
        self.ensure_current(domain)?;
        eigen_analysis(domain, &self.model, &mut self.soe, num_modes, self.config.assembly)
    }

    /// Committed Lagrange multipliers (constraint forces) of `constraint`
    pub fn lagrange_multipliers(&self, constraint: ConstraintRef) -> Option<&DVector<f64>> {
        self.model.committed_multiplier(constraint)
    }
}
