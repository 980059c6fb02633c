//! Result types for analysis runs

use std::f64::consts::PI;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Outcome of one committed step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step number, starting at 1
    pub step: usize,
    /// Iterations the algorithm needed
    pub iterations: usize,
    /// Final convergence norm (increment norm for the linear algorithm)
    pub norm: f64,
    /// Domain time (or load factor) after the commit
    pub time: f64,
}

/// Summary of an `analyze_static` or `analyze_transient` run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub steps: Vec<StepReport>,
    /// Domain time (or load factor) at the end of the run
    pub final_time: f64,
}

impl AnalysisReport {
    pub fn push(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    pub fn total_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.iterations).sum()
    }

    pub fn max_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.iterations).max().unwrap_or(0)
    }
}

/// Eigenpairs from a modal analysis, ordered by ascending eigenvalue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EigenResults {
    /// Eigenvalues `omega^2`
    pub eigenvalues: Vec<f64>,
    /// Mode shapes in equation order, mass-normalized
    pub modes: Vec<DVector<f64>>,
}

impl EigenResults {
    pub fn new(eigenvalues: Vec<f64>, modes: Vec<DVector<f64>>) -> Self {
        Self { eigenvalues, modes }
    }

    pub fn num_modes(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Circular frequencies (rad/s)
    pub fn angular_frequencies(&self) -> Vec<f64> {
        self.eigenvalues.iter().map(|&l| l.max(0.0).sqrt()).collect()
    }

    /// Natural frequencies (Hz)
    pub fn frequencies(&self) -> Vec<f64> {
        self.angular_frequencies()
            .into_iter()
            .map(|w| w / (2.0 * PI))
            .collect()
    }

    /// Natural periods (s); infinite for a zero eigenvalue
    pub fn periods(&self) -> Vec<f64> {
        self.frequencies()
            .into_iter()
            .map(|f| if f > 0.0 { 1.0 / f } else { f64::INFINITY })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_frequencies_and_periods() {
        let results = EigenResults::new(vec![4.0 * PI * PI, 0.0], vec![]);
        let f = results.frequencies();
        assert_relative_eq!(f[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(results.periods()[0], 1.0, epsilon = 1e-12);
        assert!(results.periods()[1].is_infinite());
    }

    #[test]
    fn test_report_totals() {
        let mut report = AnalysisReport::default();
        for (step, iterations) in [(1, 3), (2, 5)] {
            report.push(StepReport {
                step,
                iterations,
                norm: 0.0,
                time: step as f64,
            });
        }
        assert_eq!(report.total_iterations(), 8);
        assert_eq!(report.max_iterations(), 5);
    }
}
