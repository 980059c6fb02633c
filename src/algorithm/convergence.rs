//! Convergence tests

use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Quantity a convergence test measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    /// `|R|`
    NormUnbalance,
    /// `|dU|`
    NormDispIncr,
    /// `0.5 |dU . R|`
    EnergyIncr,
    /// `|R| / |R_0|`, `R_0` the unbalance at the start of the step
    RelativeNormUnbalance,
    /// `|dU| / |dU_1|`, `dU_1` the first increment of the step
    RelativeNormDispIncr,
}

/// Convergence test setup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub print: bool,
    pub kind: TestKind,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::norm_unbalance(1e-8, 25)
    }
}

impl TestConfig {
    pub fn new(kind: TestKind, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
            print: false,
            kind,
        }
    }

    pub fn norm_unbalance(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(TestKind::NormUnbalance, tolerance, max_iterations)
    }

    pub fn norm_disp_incr(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(TestKind::NormDispIncr, tolerance, max_iterations)
    }

    pub fn energy_incr(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(TestKind::EnergyIncr, tolerance, max_iterations)
    }

    pub fn relative_norm_unbalance(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(TestKind::RelativeNormUnbalance, tolerance, max_iterations)
    }

    pub fn relative_norm_disp_incr(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(TestKind::RelativeNormDispIncr, tolerance, max_iterations)
    }

    /// Log every iteration's norm at debug level
    pub fn with_print(mut self) -> Self {
        self.print = true;
        self
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if !(self.tolerance > 0.0) || self.max_iterations == 0 {
            return Err(AnalysisError::Configuration(format!(
                "convergence test needs tolerance > 0 and at least one iteration, got {} and {}",
                self.tolerance, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// Result of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Continue,
    Converged,
    Failed,
}

/// Convergence test with its per-step norm history
#[derive(Debug, Clone)]
pub struct ConvergenceTest {
    config: TestConfig,
    iteration: usize,
    reference: Option<f64>,
    norms: Vec<f64>,
}

impl ConvergenceTest {
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            iteration: 0,
            reference: None,
            norms: Vec::with_capacity(config.max_iterations),
        }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Reset for a new step; `unbalance` is the residual before iterating
    pub fn start(&mut self, unbalance: &DVector<f64>) {
        self.iteration = 0;
        self.norms.clear();
        self.reference = match self.config.kind {
            TestKind::RelativeNormUnbalance => Some(unbalance.norm()),
            _ => None,
        };
    }

    /// Check one iteration: `dx` the applied increment, `unbalance` the new residual
    pub fn test(&mut self, dx: &DVector<f64>, unbalance: &DVector<f64>) -> TestStatus {
        self.iteration += 1;
        let norm = match self.config.kind {
            TestKind::NormUnbalance => unbalance.norm(),
            TestKind::NormDispIncr => dx.norm(),
            TestKind::EnergyIncr => 0.5 * dx.dot(unbalance).abs(),
            TestKind::RelativeNormUnbalance => relative(unbalance.norm(), self.reference),
            TestKind::RelativeNormDispIncr => {
                let reference = *self.reference.get_or_insert(dx.norm());
                relative(dx.norm(), Some(reference))
            }
        };
        self.norms.push(norm);

        if self.config.print {
            debug!(
                "{:?} iteration {}: norm = {:.6e} (tolerance {:.1e})",
                self.config.kind, self.iteration, norm, self.config.tolerance
            );
        }

        if norm <= self.config.tolerance {
            TestStatus::Converged
        } else if self.iteration >= self.config.max_iterations || !norm.is_finite() {
            TestStatus::Failed
        } else {
            TestStatus::Continue
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Norms of the current step, one per iteration
    pub fn norms(&self) -> &[f64] {
        &self.norms
    }

    pub fn last_norm(&self) -> f64 {
        self.norms.last().copied().unwrap_or(0.0)
    }
}

/// `value / reference`, or `value` when the reference is zero
fn relative(value: f64, reference: Option<f64>) -> f64 {
    match reference {
        Some(r) if r > 0.0 => value / r,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_norm_unbalance_tri_state() {
        let mut test = ConvergenceTest::new(TestConfig::norm_unbalance(1e-6, 3));
        test.start(&DVector::from_element(2, 1.0));
        let dx = DVector::zeros(2);

        assert_eq!(test.test(&dx, &DVector::from_element(2, 1e-3)), TestStatus::Continue);
        assert_eq!(test.test(&dx, &DVector::from_element(2, 1e-9)), TestStatus::Converged);

        test.start(&DVector::from_element(2, 1.0));
        let r = DVector::from_element(2, 1.0);
        assert_eq!(test.test(&dx, &r), TestStatus::Continue);
        assert_eq!(test.test(&dx, &r), TestStatus::Continue);
        assert_eq!(test.test(&dx, &r), TestStatus::Failed);
        assert_eq!(test.norms().len(), 3);
    }

    #[test]
    fn test_relative_and_energy_norms() {
        let mut test = ConvergenceTest::new(TestConfig::relative_norm_unbalance(1e-3, 10));
        test.start(&DVector::from_vec(vec![3.0, 4.0]));
        test.test(&DVector::zeros(2), &DVector::from_vec(vec![0.0, 0.5]));
        assert_relative_eq!(test.last_norm(), 0.1);

        let mut test = ConvergenceTest::new(TestConfig::energy_incr(1e-3, 10));
        test.start(&DVector::zeros(2));
        test.test(&DVector::from_vec(vec![1.0, -2.0]), &DVector::from_vec(vec![2.0, 3.0]));
        assert_relative_eq!(test.last_norm(), 2.0);

        let mut test = ConvergenceTest::new(TestConfig::relative_norm_disp_incr(1e-3, 10));
        test.start(&DVector::zeros(1));
        test.test(&DVector::from_element(1, 2.0), &DVector::zeros(1));
        test.test(&DVector::from_element(1, 0.5), &DVector::zeros(1));
        assert_relative_eq!(test.last_norm(), 0.25);
    }
}
