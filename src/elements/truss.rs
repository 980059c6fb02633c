//! Linear elastic truss in 2D or 3D

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{Element, ElementState};
use crate::error::{AnalysisError, AnalysisResult};

/// Mass matrix formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MassFormulation {
    #[default]
    Lumped,
    Consistent,
}

/// Two-node axial bar
///
/// Acts on the first `ndm` DOFs of each node, where `ndm` is the number of
/// node coordinates. Extra nodal DOFs (rotations) get no contribution.
#[derive(Debug, Clone)]
pub struct Truss {
    nodes: [usize; 2],
    /// Young's modulus (E)
    pub e: f64,
    /// Cross-sectional area (A)
    pub a: f64,
    /// Mass per unit length
    pub rho: f64,
    pub mass_formulation: MassFormulation,

    node_dofs: usize,
    ndm: usize,
    length: f64,
    cosines: Vec<f64>,
    disp: DVector<f64>,
    load: DVector<f64>,
}

impl Truss {
    /// Create a new truss
    pub fn new(i: usize, j: usize, e: f64, a: f64) -> Self {
        Self {
            nodes: [i, j],
            e,
            a,
            rho: 0.0,
            mass_formulation: MassFormulation::Lumped,
            node_dofs: 0,
            ndm: 0,
            length: 0.0,
            cosines: Vec::new(),
            disp: DVector::zeros(0),
            load: DVector::zeros(0),
        }
    }

    /// Set mass per unit length
    pub fn with_mass(mut self, rho: f64, formulation: MassFormulation) -> Self {
        self.rho = rho;
        self.mass_formulation = formulation;
        self
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Axial force, tension positive
    pub fn axial_force(&self) -> f64 {
        let n = self.node_dofs;
        let elongation: f64 = (0..self.ndm)
            .map(|d| self.cosines[d] * (self.disp[n + d] - self.disp[d]))
            .sum();
        self.e * self.a / self.length * elongation
    }

    fn stiffness(&self) -> DMatrix<f64> {
        let n = self.node_dofs;
        let mut k = DMatrix::zeros(2 * n, 2 * n);
        let ea_l = self.e * self.a / self.length;
        for r in 0..self.ndm {
            for c in 0..self.ndm {
                let v = ea_l * self.cosines[r] * self.cosines[c];
                k[(r, c)] = v;
                k[(n + r, n + c)] = v;
                k[(r, n + c)] = -v;
                k[(n + r, c)] = -v;
            }
        }
        k
    }
}

impl Element for Truss {
    fn node_tags(&self) -> &[usize] {
        &self.nodes
    }

    fn num_dof(&self) -> usize {
        2 * self.node_dofs
    }

    fn setup(&mut self, coords: &[&[f64]], node_dofs: &[usize]) -> AnalysisResult<()> {
        if coords.len() != 2 || node_dofs.len() != 2 {
            return Err(AnalysisError::SizeMismatch {
                context: "truss nodes",
                expected: 2,
                actual: coords.len(),
            });
        }
        let ndm = coords[0].len();
        if coords[1].len() != ndm || !(1..=3).contains(&ndm) {
            return Err(AnalysisError::InvalidInput(format!(
                "truss {:?} needs nodes with matching 1, 2 or 3 coordinates",
                self.nodes
            )));
        }
        if node_dofs[0] != node_dofs[1] || node_dofs[0] < ndm {
            return Err(AnalysisError::InvalidInput(format!(
                "truss {:?} needs at least {} DOFs per node, got {:?}",
                self.nodes, ndm, node_dofs
            )));
        }
        let delta: Vec<f64> = (0..ndm).map(|d| coords[1][d] - coords[0][d]).collect();
        let length = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        if length <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "truss {:?} has zero length",
                self.nodes
            )));
        }

        self.ndm = ndm;
        self.node_dofs = node_dofs[0];
        self.length = length;
        self.cosines = delta.iter().map(|d| d / length).collect();
        self.disp = DVector::zeros(2 * self.node_dofs);
        self.load = DVector::zeros(2 * self.node_dofs);
        Ok(())
    }

    fn update(&mut self, state: &ElementState) -> AnalysisResult<()> {
        if state.disp.len() != self.num_dof() {
            return Err(AnalysisError::SizeMismatch {
                context: "truss state",
                expected: self.num_dof(),
                actual: state.disp.len(),
            });
        }
        self.disp.copy_from(&state.disp);
        Ok(())
    }

    fn tangent_stiff(&self) -> DMatrix<f64> {
        self.stiffness()
    }

    fn initial_stiff(&self) -> DMatrix<f64> {
        self.stiffness()
    }

    fn committed_stiff(&self) -> DMatrix<f64> {
        self.stiffness()
    }

    fn mass(&self) -> DMatrix<f64> {
        let n = self.node_dofs;
        let mut m = DMatrix::zeros(2 * n, 2 * n);
        if self.rho == 0.0 {
            return m;
        }
        let total = self.rho * self.length;
        for d in 0..self.ndm {
            match self.mass_formulation {
                MassFormulation::Lumped => {
                    m[(d, d)] = total / 2.0;
                    m[(n + d, n + d)] = total / 2.0;
                }
                MassFormulation::Consistent => {
                    m[(d, d)] = total / 3.0;
                    m[(n + d, n + d)] = total / 3.0;
                    m[(d, n + d)] = total / 6.0;
                    m[(n + d, d)] = total / 6.0;
                }
            }
        }
        m
    }

    fn resisting_force(&self) -> DVector<f64> {
        self.stiffness() * &self.disp - &self.load
    }

    fn zero_load(&mut self) {
        self.load.fill(0.0);
    }

    fn add_load(&mut self, load: &DVector<f64>, factor: f64) -> AnalysisResult<()> {
        if load.len() != self.load.len() {
            return Err(AnalysisError::SizeMismatch {
                context: "truss load",
                expected: self.load.len(),
                actual: load.len(),
            });
        }
        self.load.axpy(factor, load, 1.0);
        Ok(())
    }

    // Linear elastic: nothing to commit
    fn commit_state(&mut self) {}

    fn revert_to_last_commit(&mut self) {}

    fn revert_to_start(&mut self) {
        self.disp.fill(0.0);
        self.load.fill(0.0);
    }
}
