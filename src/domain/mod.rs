//! Domain - nodes, elements, constraints and load patterns
//!
//! The domain owns every modelling object in tag-indexed arenas. The analysis
//! side never holds references into it; DOF and FE groups store tags and
//! resolve them on each call. Every structural mutation bumps [`Domain::stamp`],
//! which the analysis compares with the stamp it last numbered for.

mod arena;
mod constraint;
mod load;
mod node;

pub use arena::Arena;
pub use constraint::{ConstraintRef, MpConstraint, SpConstraint};
pub use load::{ElementLoad, LoadPattern, NodalLoad, TimeSeries};
pub use node::{Node, Response};

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::elements::{Element, ElementState, RayleighFactors};
use crate::error::{AnalysisError, AnalysisResult};

/// An element together with its domain-side bookkeeping
#[derive(Debug)]
pub struct ElementSlot {
    element: Box<dyn Element>,
    active: bool,
    rayleigh: RayleighFactors,
}

impl ElementSlot {
    pub fn element(&self) -> &dyn Element {
        self.element.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn rayleigh(&self) -> &RayleighFactors {
        &self.rayleigh
    }

    /// Element damping plus its Rayleigh terms
    pub fn damping(&self) -> DMatrix<f64> {
        let element = self.element.as_ref();
        let factors = &self.rayleigh;
        let mut c = element.damp();
        if factors.alpha_m != 0.0 {
            c += element.mass() * factors.alpha_m;
        }
        if factors.beta_k != 0.0 {
            c += element.tangent_stiff() * factors.beta_k;
        }
        if factors.beta_k0 != 0.0 {
            c += element.initial_stiff() * factors.beta_k0;
        }
        if factors.beta_kc != 0.0 {
            c += element.committed_stiff() * factors.beta_kc;
        }
        c
    }
}

/// The finite element domain
#[derive(Debug, Default)]
pub struct Domain {
    nodes: Arena<Node>,
    elements: Arena<ElementSlot>,
    sp_constraints: Arena<SpConstraint>,
    mp_constraints: Arena<MpConstraint>,
    load_patterns: Arena<LoadPattern>,

    stamp: u64,
    time: f64,
    committed_time: f64,
}

impl Domain {
    /// Create a new empty domain
    pub fn new() -> Self {
        Self::default()
    }

    /// Change counter, bumped by every structural mutation
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    fn touch(&mut self) {
        self.stamp += 1;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn committed_time(&self) -> f64 {
        self.committed_time
    }

    /// Set the current (pseudo) time without re-evaluating loads
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    // ========================
    // Nodes
    // ========================

    /// Add a node to the domain
    pub fn add_node(&mut self, tag: usize, node: Node) -> AnalysisResult<()> {
        if !self.nodes.insert(tag, node) {
            return Err(AnalysisError::DuplicateTag(tag));
        }
        self.touch();
        Ok(())
    }

    /// Remove a node that no element or constraint refers to
    pub fn remove_node(&mut self, tag: usize) -> AnalysisResult<Node> {
        let in_use = self
            .elements
            .iter()
            .any(|(_, slot)| slot.element.node_tags().contains(&tag))
            || self.sp_constraints.iter().any(|(_, sp)| sp.node == tag)
            || self
                .mp_constraints
                .iter()
                .any(|(_, mp)| mp.retained == tag || mp.constrained == tag);
        if in_use {
            return Err(AnalysisError::InvalidInput(format!(
                "node {} is still referenced by an element or constraint",
                tag
            )));
        }
        let node = self.nodes.remove(tag).ok_or(AnalysisError::NodeNotFound(tag))?;
        self.touch();
        Ok(node)
    }

    pub fn node(&self, tag: usize) -> AnalysisResult<&Node> {
        self.nodes.get(tag).ok_or(AnalysisError::NodeNotFound(tag))
    }

    pub fn node_mut(&mut self, tag: usize) -> AnalysisResult<&mut Node> {
        self.nodes.get_mut(tag).ok_or(AnalysisError::NodeNotFound(tag))
    }

    /// Nodes in ascending tag order
    pub fn nodes(&self) -> impl Iterator<Item = (usize, &Node)> + '_ {
        self.nodes.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    // ========================
    // Elements
    // ========================

    /// Add an element; its nodes must already exist
    pub fn add_element<E: Element + 'static>(&mut self, tag: usize, element: E) -> AnalysisResult<()> {
        if self.elements.contains(tag) {
            return Err(AnalysisError::DuplicateTag(tag));
        }
        let mut element = Box::new(element);

        let mut coords: Vec<&[f64]> = Vec::new();
        let mut node_dofs = Vec::new();
        for &n in element.node_tags() {
            let node = self.nodes.get(n).ok_or(AnalysisError::NodeNotFound(n))?;
            coords.push(&node.coords);
            node_dofs.push(node.num_dof());
        }
        element.setup(&coords, &node_dofs)?;

        let expected: usize = node_dofs.iter().sum();
        if element.num_dof() != expected {
            return Err(AnalysisError::SizeMismatch {
                context: "element DOFs",
                expected,
                actual: element.num_dof(),
            });
        }

        self.elements.insert(
            tag,
            ElementSlot {
                element,
                active: true,
                rayleigh: RayleighFactors::default(),
            },
        );
        self.touch();
        Ok(())
    }

    pub fn remove_element(&mut self, tag: usize) -> AnalysisResult<Box<dyn Element>> {
        let slot = self
            .elements
            .remove(tag)
            .ok_or(AnalysisError::ElementNotFound(tag))?;
        self.touch();
        Ok(slot.element)
    }

    pub fn element(&self, tag: usize) -> AnalysisResult<&dyn Element> {
        self.elements
            .get(tag)
            .map(|slot| slot.element.as_ref())
            .ok_or(AnalysisError::ElementNotFound(tag))
    }

    pub fn element_slot(&self, tag: usize) -> AnalysisResult<&ElementSlot> {
        self.elements.get(tag).ok_or(AnalysisError::ElementNotFound(tag))
    }

    /// All elements, active or not, in ascending tag order
    pub fn elements(&self) -> impl Iterator<Item = (usize, &ElementSlot)> + '_ {
        self.elements.iter()
    }

    /// Active elements in ascending tag order
    pub fn active_elements(&self) -> impl Iterator<Item = (usize, &ElementSlot)> + '_ {
        self.elements.iter().filter(|(_, slot)| slot.active)
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Take an element out of the analysis; its nodes stay
    pub fn deactivate_element(&mut self, tag: usize) -> AnalysisResult<()> {
        self.set_element_active(tag, false)
    }

    /// Put a deactivated element back into the analysis
    pub fn activate_element(&mut self, tag: usize) -> AnalysisResult<()> {
        self.set_element_active(tag, true)
    }

    fn set_element_active(&mut self, tag: usize, active: bool) -> AnalysisResult<()> {
        let slot = self
            .elements
            .get_mut(tag)
            .ok_or(AnalysisError::ElementNotFound(tag))?;
        if slot.active != active {
            slot.active = active;
            self.touch();
        }
        Ok(())
    }

    /// Broadcast Rayleigh factors to every element and node
    pub fn set_rayleigh_factors(&mut self, factors: RayleighFactors) {
        for slot in self.elements.values_mut() {
            slot.rayleigh = factors;
        }
        for node in self.nodes.values_mut() {
            node.alpha_m = factors.alpha_m;
        }
    }

    // ========================
    // Constraints
    // ========================

    /// Add a single-point constraint
    pub fn add_sp(&mut self, tag: usize, sp: SpConstraint) -> AnalysisResult<()> {
        let node = self.node(sp.node)?;
        if sp.dof >= node.num_dof() {
            return Err(AnalysisError::InvalidDof {
                node: sp.node,
                dof: sp.dof,
                ndof: node.num_dof(),
            });
        }
        if !self.sp_constraints.insert(tag, sp) {
            return Err(AnalysisError::DuplicateTag(tag));
        }
        self.touch();
        Ok(())
    }

    /// Fix the listed DOFs of a node, returning the new constraint tags
    pub fn fix(&mut self, node: usize, dofs: &[usize]) -> AnalysisResult<Vec<usize>> {
        let mut tags = Vec::with_capacity(dofs.len());
        for &dof in dofs {
            let tag = self.sp_constraints.tags().last().map_or(0, |t| t + 1);
            self.add_sp(tag, SpConstraint::fixed(node, dof))?;
            tags.push(tag);
        }
        Ok(tags)
    }

    pub fn remove_sp(&mut self, tag: usize) -> AnalysisResult<SpConstraint> {
        let sp = self
            .sp_constraints
            .remove(tag)
            .ok_or(AnalysisError::ConstraintNotFound(tag))?;
        self.touch();
        Ok(sp)
    }

    pub fn sp_constraints(&self) -> impl Iterator<Item = (usize, &SpConstraint)> + '_ {
        self.sp_constraints.iter()
    }

    pub fn sp(&self, tag: usize) -> AnalysisResult<&SpConstraint> {
        self.sp_constraints
            .get(tag)
            .ok_or(AnalysisError::ConstraintNotFound(tag))
    }

    /// Add a multi-point constraint
    pub fn add_mp(&mut self, tag: usize, mp: MpConstraint) -> AnalysisResult<()> {
        let retained = self.node(mp.retained)?;
        let constrained = self.node(mp.constrained)?;
        if mp.retained == mp.constrained {
            return Err(AnalysisError::InvalidInput(format!(
                "constraint {} ties node {} to itself",
                tag, mp.retained
            )));
        }
        for (&dof, node_tag, ndof) in mp
            .retained_dofs
            .iter()
            .map(|d| (d, mp.retained, retained.num_dof()))
            .chain(
                mp.constrained_dofs
                    .iter()
                    .map(|d| (d, mp.constrained, constrained.num_dof())),
            )
        {
            if dof >= ndof {
                return Err(AnalysisError::InvalidDof {
                    node: node_tag,
                    dof,
                    ndof,
                });
            }
        }
        if mp.matrix.shape() != (mp.constrained_dofs.len(), mp.retained_dofs.len()) {
            return Err(AnalysisError::SizeMismatch {
                context: "constraint matrix rows",
                expected: mp.constrained_dofs.len(),
                actual: mp.matrix.nrows(),
            });
        }
        if !self.mp_constraints.insert(tag, mp) {
            return Err(AnalysisError::DuplicateTag(tag));
        }
        self.touch();
        Ok(())
    }

    pub fn remove_mp(&mut self, tag: usize) -> AnalysisResult<MpConstraint> {
        let mp = self
            .mp_constraints
            .remove(tag)
            .ok_or(AnalysisError::ConstraintNotFound(tag))?;
        self.touch();
        Ok(mp)
    }

    pub fn mp_constraints(&self) -> impl Iterator<Item = (usize, &MpConstraint)> + '_ {
        self.mp_constraints.iter()
    }

    pub fn mp(&self, tag: usize) -> AnalysisResult<&MpConstraint> {
        self.mp_constraints
            .get(tag)
            .ok_or(AnalysisError::ConstraintNotFound(tag))
    }

    // ========================
    // Loads
    // ========================

    /// Add a load pattern; nodes and elements it loads must exist
    pub fn add_load_pattern(&mut self, tag: usize, pattern: LoadPattern) -> AnalysisResult<()> {
        for load in &pattern.nodal_loads {
            let node = self.node(load.node)?;
            if load.values.len() != node.num_dof() {
                return Err(AnalysisError::SizeMismatch {
                    context: "nodal load",
                    expected: node.num_dof(),
                    actual: load.values.len(),
                });
            }
        }
        for load in &pattern.element_loads {
            let element = self.element(load.element)?;
            if load.values.len() != element.num_dof() {
                return Err(AnalysisError::SizeMismatch {
                    context: "element load",
                    expected: element.num_dof(),
                    actual: load.values.len(),
                });
            }
        }
        if !self.load_patterns.insert(tag, pattern) {
            return Err(AnalysisError::DuplicateTag(tag));
        }
        self.touch();
        Ok(())
    }

    pub fn remove_load_pattern(&mut self, tag: usize) -> AnalysisResult<LoadPattern> {
        let pattern = self
            .load_patterns
            .remove(tag)
            .ok_or(AnalysisError::LoadPatternNotFound(tag))?;
        self.touch();
        Ok(pattern)
    }

    pub fn load_patterns(&self) -> impl Iterator<Item = (usize, &LoadPattern)> + '_ {
        self.load_patterns.iter()
    }

    /// Set the time and re-evaluate every load pattern at it
    pub fn apply_load(&mut self, time: f64) -> AnalysisResult<()> {
        self.time = time;
        for node in self.nodes.values_mut() {
            node.zero_unbalanced_load();
        }
        for slot in self.elements.values_mut() {
            slot.element.zero_load();
        }

        for (_, pattern) in self.load_patterns.iter() {
            let factor = pattern.factor(time);
            for load in &pattern.nodal_loads {
                self.nodes
                    .get_mut(load.node)
                    .ok_or(AnalysisError::NodeNotFound(load.node))?
                    .add_unbalanced_load(&load.values, factor);
            }
            for load in &pattern.element_loads {
                self.elements
                    .get_mut(load.element)
                    .ok_or(AnalysisError::ElementNotFound(load.element))?
                    .element
                    .add_load(&load.values, factor)?;
            }
        }
        Ok(())
    }

    // ========================
    // State
    // ========================

    /// Trial state of an element's nodes, concatenated in node order
    pub fn element_state(&self, element: &dyn Element) -> AnalysisResult<ElementState> {
        gather_state(&self.nodes, element.node_tags())
    }

    /// Push the trial nodal state into every active element
    pub fn update(&mut self) -> AnalysisResult<()> {
        let nodes = &self.nodes;
        for slot in self.elements.values_mut() {
            if slot.active {
                let state = gather_state(nodes, slot.element.node_tags())?;
                slot.element.update(&state)?;
            }
        }
        Ok(())
    }

    /// Commit the trial state of nodes and elements
    pub fn commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.commit_state();
        }
        for slot in self.elements.values_mut() {
            if slot.active {
                slot.element.commit_state();
            }
        }
        self.committed_time = self.time;
    }

    /// Return to the last committed state
    pub fn revert_to_last_commit(&mut self) -> AnalysisResult<()> {
        for node in self.nodes.values_mut() {
            node.revert_to_last_commit();
        }
        for slot in self.elements.values_mut() {
            if slot.active {
                slot.element.revert_to_last_commit();
            }
        }
        self.time = self.committed_time;
        self.apply_load(self.committed_time)?;
        self.update()
    }

    /// Return every node and element to its initial state
    pub fn revert_to_start(&mut self) {
        for node in self.nodes.values_mut() {
            node.revert_to_start();
        }
        for slot in self.elements.values_mut() {
            slot.element.revert_to_start();
        }
        self.time = 0.0;
        self.committed_time = 0.0;
        debug!("domain reverted to start");
    }

    /// Compute nodal reactions from the current trial state
    ///
    /// Reaction = sum of element resisting forces minus applied nodal load.
    /// With `include_inertia` the element and nodal inertia and damping
    /// forces (Rayleigh terms included) are added as well.
    pub fn calculate_reactions(&mut self, include_inertia: bool) -> AnalysisResult<()> {
        let mut reactions: Vec<(usize, DVector<f64>)> = self
            .nodes
            .iter()
            .map(|(tag, node)| {
                let r = if include_inertia {
                    -node.unbalanced_load_inc_inertia()
                } else {
                    -node.unbalanced_load()
                };
                (tag, r)
            })
            .collect();
        let index: std::collections::HashMap<usize, usize> = reactions
            .iter()
            .enumerate()
            .map(|(i, (tag, _))| (*tag, i))
            .collect();

        for (_, slot) in self.active_elements() {
            let element = slot.element.as_ref();
            let mut force = element.resisting_force();
            if include_inertia {
                let state = gather_state(&self.nodes, element.node_tags())?;
                force += element.mass() * &state.accel;
                force += slot.damping() * &state.vel;
            }
            let mut offset = 0;
            for &n in element.node_tags() {
                let i = *index.get(&n).ok_or(AnalysisError::NodeNotFound(n))?;
                let r = &mut reactions[i].1;
                let ndof = r.len();
                *r += force.rows(offset, ndof);
                offset += ndof;
            }
        }

        for (tag, r) in reactions {
            if let Some(node) = self.nodes.get_mut(tag) {
                node.set_reaction(r);
            }
        }
        Ok(())
    }
}

fn gather_state(nodes: &Arena<Node>, tags: &[usize]) -> AnalysisResult<ElementState> {
    let mut disp = Vec::new();
    let mut vel = Vec::new();
    let mut accel = Vec::new();
    let mut incr = Vec::new();
    for &tag in tags {
        let node = nodes.get(tag).ok_or(AnalysisError::NodeNotFound(tag))?;
        disp.extend(node.trial_disp().iter());
        vel.extend(node.trial_vel().iter());
        accel.extend(node.trial_accel().iter());
        incr.extend(node.incr_disp().iter());
    }
    Ok(ElementState {
        disp: DVector::from_vec(disp),
        vel: DVector::from_vec(vel),
        accel: DVector::from_vec(accel),
        incr_disp: DVector::from_vec(incr),
    })
}
