//! Node - committed and trial kinematic state at a point

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Displacement, velocity and acceleration of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub disp: DVector<f64>,
    pub vel: DVector<f64>,
    pub accel: DVector<f64>,
}

impl Response {
    /// Zero response for `ndof` degrees of freedom
    pub fn zeros(ndof: usize) -> Self {
        Self {
            disp: DVector::zeros(ndof),
            vel: DVector::zeros(ndof),
            accel: DVector::zeros(ndof),
        }
    }
}

/// A node in the finite element domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Coordinates (1, 2 or 3 components)
    pub coords: Vec<f64>,

    ndof: usize,
    committed: Response,
    trial: Response,
    mass: DMatrix<f64>,

    /// Mass-proportional Rayleigh factor broadcast by the integrator
    #[serde(skip)]
    pub(crate) alpha_m: f64,

    /// Nodal load assembled from the active load patterns
    #[serde(skip)]
    unbalanced_load: Option<DVector<f64>>,

    #[serde(skip)]
    reaction: Option<DVector<f64>>,

    #[serde(skip)]
    eigenvectors: Vec<DVector<f64>>,
}

impl Node {
    /// Create a node with `ndof` degrees of freedom at the given coordinates
    pub fn new(ndof: usize, coords: &[f64]) -> Self {
        Self {
            coords: coords.to_vec(),
            ndof,
            committed: Response::zeros(ndof),
            trial: Response::zeros(ndof),
            mass: DMatrix::zeros(ndof, ndof),
            alpha_m: 0.0,
            unbalanced_load: None,
            reaction: None,
            eigenvectors: Vec::new(),
        }
    }

    /// Lumped nodal mass on every DOF
    pub fn with_mass(mut self, m: f64) -> Self {
        self.mass = DMatrix::from_diagonal_element(self.ndof, self.ndof, m);
        self
    }

    /// Start from a given displacement (committed and trial)
    pub fn with_initial_disp(mut self, disp: &[f64]) -> Self {
        for (i, &d) in disp.iter().take(self.ndof).enumerate() {
            self.committed.disp[i] = d;
            self.trial.disp[i] = d;
        }
        self
    }

    /// Start from a given velocity (committed and trial)
    pub fn with_initial_vel(mut self, vel: &[f64]) -> Self {
        for (i, &v) in vel.iter().take(self.ndof).enumerate() {
            self.committed.vel[i] = v;
            self.trial.vel[i] = v;
        }
        self
    }

    /// Start from a given acceleration (committed and trial)
    pub fn with_initial_accel(mut self, accel: &[f64]) -> Self {
        for (i, &a) in accel.iter().take(self.ndof).enumerate() {
            self.committed.accel[i] = a;
            self.trial.accel[i] = a;
        }
        self
    }

    pub fn num_dof(&self) -> usize {
        self.ndof
    }

    /// Calculate distance to another node
    pub fn distance_to(&self, other: &Node) -> f64 {
        self.coords
            .iter()
            .zip(other.coords.iter())
            .map(|(a, b)| (b - a) * (b - a))
            .sum::<f64>()
            .sqrt()
    }

    // ========================
    // Mass
    // ========================

    pub fn mass(&self) -> &DMatrix<f64> {
        &self.mass
    }

    pub fn set_mass(&mut self, mass: DMatrix<f64>) {
        if mass.nrows() == self.ndof && mass.ncols() == self.ndof {
            self.mass = mass;
        }
    }

    pub fn has_mass(&self) -> bool {
        self.mass.iter().any(|m| *m != 0.0)
    }

    // ========================
    // Response
    // ========================

    pub fn committed(&self) -> &Response {
        &self.committed
    }

    pub fn trial(&self) -> &Response {
        &self.trial
    }

    pub fn trial_disp(&self) -> &DVector<f64> {
        &self.trial.disp
    }

    pub fn trial_vel(&self) -> &DVector<f64> {
        &self.trial.vel
    }

    pub fn trial_accel(&self) -> &DVector<f64> {
        &self.trial.accel
    }

    /// Trial displacement minus committed displacement
    pub fn incr_disp(&self) -> DVector<f64> {
        &self.trial.disp - &self.committed.disp
    }

    pub fn set_trial_disp(&mut self, disp: &DVector<f64>) {
        self.trial.disp.copy_from(disp);
    }

    pub fn set_trial_vel(&mut self, vel: &DVector<f64>) {
        self.trial.vel.copy_from(vel);
    }

    pub fn set_trial_accel(&mut self, accel: &DVector<f64>) {
        self.trial.accel.copy_from(accel);
    }

    pub fn incr_trial_disp(&mut self, incr: &DVector<f64>) {
        self.trial.disp += incr;
    }

    pub fn incr_trial_vel(&mut self, incr: &DVector<f64>) {
        self.trial.vel += incr;
    }

    pub fn incr_trial_accel(&mut self, incr: &DVector<f64>) {
        self.trial.accel += incr;
    }

    pub fn commit_state(&mut self) {
        self.committed = self.trial.clone();
    }

    pub fn revert_to_last_commit(&mut self) {
        self.trial = self.committed.clone();
    }

    pub fn revert_to_start(&mut self) {
        self.committed = Response::zeros(self.ndof);
        self.trial = Response::zeros(self.ndof);
        self.unbalanced_load = None;
        self.reaction = None;
    }

    // ========================
    // Loads and reactions
    // ========================

    pub fn zero_unbalanced_load(&mut self) {
        self.unbalanced_load = None;
    }

    pub fn add_unbalanced_load(&mut self, load: &DVector<f64>, factor: f64) {
        let ndof = self.ndof;
        let current = self
            .unbalanced_load
            .get_or_insert_with(|| DVector::zeros(ndof));
        current.axpy(factor, load, 1.0);
    }

    /// Applied nodal load (zero when no pattern loads the node)
    pub fn unbalanced_load(&self) -> DVector<f64> {
        self.unbalanced_load
            .clone()
            .unwrap_or_else(|| DVector::zeros(self.ndof))
    }

    /// Applied load minus nodal inertia (and mass-proportional damping)
    pub fn unbalanced_load_inc_inertia(&self) -> DVector<f64> {
        let mut load = self.unbalanced_load();
        if self.has_mass() {
            load -= &self.mass * &self.trial.accel;
            if self.alpha_m != 0.0 {
                load -= (&self.mass * &self.trial.vel) * self.alpha_m;
            }
        }
        load
    }

    pub fn reaction(&self) -> Option<&DVector<f64>> {
        self.reaction.as_ref()
    }

    pub(crate) fn set_reaction(&mut self, reaction: DVector<f64>) {
        self.reaction = Some(reaction);
    }

    // ========================
    // Eigenvectors
    // ========================

    pub fn eigenvector(&self, mode: usize) -> Option<&DVector<f64>> {
        self.eigenvectors.get(mode)
    }

    pub(crate) fn set_eigenvectors(&mut self, modes: Vec<DVector<f64>>) {
        self.eigenvectors = modes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_commit_and_revert() {
        let mut node = Node::new(2, &[0.0, 0.0]);
        node.incr_trial_disp(&DVector::from_vec(vec![1.0, 2.0]));
        assert_eq!(node.incr_disp(), DVector::from_vec(vec![1.0, 2.0]));

        node.commit_state();
        node.incr_trial_disp(&DVector::from_vec(vec![1.0, 0.0]));
        node.revert_to_last_commit();
        assert_eq!(node.trial_disp()[0], 1.0);
        assert_eq!(node.incr_disp().norm(), 0.0);
    }

    #[test]
    fn test_node_distance() {
        let n1 = Node::new(2, &[0.0, 0.0]);
        let n2 = Node::new(2, &[3.0, 4.0]);
        assert!((n1.distance_to(&n2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_inertia_in_unbalance() {
        let mut node = Node::new(1, &[0.0]).with_mass(2.0);
        node.add_unbalanced_load(&DVector::from_element(1, 10.0), 1.0);
        node.set_trial_accel(&DVector::from_element(1, 3.0));
        assert_eq!(node.unbalanced_load_inc_inertia()[0], 4.0);
    }
}
