//! Two-node spring acting along one nodal DOF

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{Element, ElementState};
use crate::error::{AnalysisError, AnalysisResult};

/// Force-deformation law of a [`Spring`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpringLaw {
    /// `f = k * d`
    Linear { k: f64 },
    /// `f = k * d + k3 * d^3`; hardening for `k3 > 0`, softening for `k3 < 0`
    Cubic { k: f64, k3: f64 },
}

impl SpringLaw {
    pub fn force(&self, d: f64) -> f64 {
        match *self {
            Self::Linear { k } => k * d,
            Self::Cubic { k, k3 } => k * d + k3 * d * d * d,
        }
    }

    pub fn tangent(&self, d: f64) -> f64 {
        match *self {
            Self::Linear { k } => k,
            Self::Cubic { k, k3 } => k + 3.0 * k3 * d * d,
        }
    }
}

/// Spring between nodes `i` and `j` on DOF `dof` of both nodes
///
/// Deformation is `u_j[dof] - u_i[dof]`.
#[derive(Debug, Clone)]
pub struct Spring {
    nodes: [usize; 2],
    dof: usize,
    law: SpringLaw,
    /// Viscous dashpot coefficient in parallel with the spring
    c: f64,
    node_dofs: usize,
    trial_def: f64,
    committed_def: f64,
    load: DVector<f64>,
}

impl Spring {
    /// Create a new spring
    pub fn new(i: usize, j: usize, dof: usize, law: SpringLaw) -> Self {
        Self {
            nodes: [i, j],
            dof,
            law,
            c: 0.0,
            node_dofs: dof + 1,
            trial_def: 0.0,
            committed_def: 0.0,
            load: DVector::zeros(2 * (dof + 1)),
        }
    }

    /// Linear spring of stiffness `k`
    pub fn linear(i: usize, j: usize, dof: usize, k: f64) -> Self {
        Self::new(i, j, dof, SpringLaw::Linear { k })
    }

    /// Add a parallel dashpot
    pub fn with_damping(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn law(&self) -> SpringLaw {
        self.law
    }

    /// Current trial deformation
    pub fn deformation(&self) -> f64 {
        self.trial_def
    }

    /// Current spring force
    pub fn force(&self) -> f64 {
        self.law.force(self.trial_def)
    }

    fn direction(&self) -> DVector<f64> {
        let mut b = DVector::zeros(2 * self.node_dofs);
        b[self.dof] = -1.0;
        b[self.node_dofs + self.dof] = 1.0;
        b
    }

    fn matrix_for(&self, k: f64) -> DMatrix<f64> {
        let b = self.direction();
        &b * b.transpose() * k
    }
}

impl Element for Spring {
    fn node_tags(&self) -> &[usize] {
        &self.nodes
    }

    fn num_dof(&self) -> usize {
        2 * self.node_dofs
    }

    fn setup(&mut self, _coords: &[&[f64]], node_dofs: &[usize]) -> AnalysisResult<()> {
        let (ni, nj) = match node_dofs {
            [ni, nj] => (*ni, *nj),
            _ => {
                return Err(AnalysisError::SizeMismatch {
                    context: "spring nodes",
                    expected: 2,
                    actual: node_dofs.len(),
                })
            }
        };
        if ni != nj {
            return Err(AnalysisError::InvalidInput(format!(
                "spring nodes {} and {} have different DOF counts ({} and {})",
                self.nodes[0], self.nodes[1], ni, nj
            )));
        }
        if self.dof >= ni {
            return Err(AnalysisError::InvalidDof {
                node: self.nodes[0],
                dof: self.dof,
                ndof: ni,
            });
        }
        self.node_dofs = ni;
        self.load = DVector::zeros(2 * ni);
        Ok(())
    }

    fn update(&mut self, state: &ElementState) -> AnalysisResult<()> {
        if state.disp.len() != self.num_dof() {
            return Err(AnalysisError::SizeMismatch {
                context: "spring state",
                expected: self.num_dof(),
                actual: state.disp.len(),
            });
        }
        self.trial_def = self.direction().dot(&state.disp);
        Ok(())
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.matrix_for(self.law.tangent(self.trial_def))
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.matrix_for(self.law.tangent(0.0))
    }

    fn committed_stiff(&self) -> DMatrix<f64> {
        self.matrix_for(self.law.tangent(self.committed_def))
    }

    fn damp(&self) -> DMatrix<f64> {
        self.matrix_for(self.c)
    }

    fn resisting_force(&self) -> DVector<f64> {
        self.direction() * self.law.force(self.trial_def) - &self.load
    }

    fn zero_load(&mut self) {
        self.load.fill(0.0);
    }

    fn add_load(&mut self, load: &DVector<f64>, factor: f64) -> AnalysisResult<()> {
        if load.len() != self.load.len() {
            return Err(AnalysisError::SizeMismatch {
                context: "spring load",
                expected: self.load.len(),
                actual: load.len(),
            });
        }
        self.load.axpy(factor, load, 1.0);
        Ok(())
    }

    fn commit_state(&mut self) {
        self.committed_def = self.trial_def;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial_def = self.committed_def;
    }

    fn revert_to_start(&mut self) {
        self.trial_def = 0.0;
        self.committed_def = 0.0;
        self.load.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(disp: Vec<f64>) -> ElementState {
        let n = disp.len();
        ElementState {
            disp: DVector::from_vec(disp),
            vel: DVector::zeros(n),
            accel: DVector::zeros(n),
            incr_disp: DVector::zeros(n),
        }
    }

    #[test]
    fn test_cubic_spring_tangent() {
        let mut spring = Spring::new(1, 2, 0, SpringLaw::Cubic { k: 100.0, k3: 10.0 });
        spring.setup(&[&[0.0], &[1.0]], &[1, 1]).unwrap();
        spring.update(&state(vec![0.0, 2.0])).unwrap();

        assert_relative_eq!(spring.force(), 280.0);
        let k = spring.tangent_stiff();
        assert_relative_eq!(k[(1, 1)], 220.0);
        assert_relative_eq!(k[(0, 1)], -220.0);
        assert_relative_eq!(spring.initial_stiff()[(1, 1)], 100.0);

        let f = spring.resisting_force();
        assert_relative_eq!(f[0], -280.0);
        assert_relative_eq!(f[1], 280.0);
    }

    #[test]
    fn test_spring_on_second_dof() {
        let mut spring = Spring::linear(1, 2, 1, 5.0);
        spring.setup(&[&[0.0, 0.0], &[1.0, 0.0]], &[2, 2]).unwrap();
        assert_eq!(spring.num_dof(), 4);
        spring.update(&state(vec![9.0, 0.0, 9.0, 0.5])).unwrap();
        assert_relative_eq!(spring.force(), 2.5);
    }

    #[test]
    fn test_spring_rejects_bad_dof() {
        let mut spring = Spring::linear(1, 2, 2, 5.0);
        assert!(spring.setup(&[&[0.0], &[1.0]], &[2, 2]).is_err());
    }
}
