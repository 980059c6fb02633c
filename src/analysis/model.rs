//! Analysis Model - owns the DOF and FE groups for one numbering of the domain

use std::collections::HashMap;

use log::info;
use nalgebra::{DMatrix, DVector};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::dof_group::{DofGroup, EquationId};
use super::fe_group::FeGroup;
use super::handler::ConstraintHandler;
use super::numberer::Numberer;
use super::{AssemblyMode, AssemblyRequest};
use crate::domain::{ConstraintRef, Domain};
use crate::error::{AnalysisError, AnalysisResult};
use crate::system::LinearSoe;

/// Which nodal response a vector refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Disp,
    Vel,
    Accel,
}

/// DOF groups, FE groups and the numbering that ties them to the system
#[derive(Debug, Default)]
pub struct AnalysisModel {
    dof_groups: Vec<DofGroup>,
    fe_groups: Vec<FeGroup>,
    node_index: HashMap<usize, usize>,
    multipliers: HashMap<ConstraintRef, usize>,
    num_eqn: usize,
    stamp: Option<u64>,
}

impl AnalysisModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================
    // Numbering
    // ========================

    /// Rebuild groups and numbering for the current domain and size `soe`
    ///
    /// Multiplier values of constraints that survive the change are kept.
    pub fn domain_changed(
        &mut self,
        domain: &Domain,
        handler: &ConstraintHandler,
        numberer: &Numberer,
        soe: &mut LinearSoe,
    ) -> AnalysisResult<usize> {
        let mut groups = handler.handle(domain)?;
        let num_eqn = numberer.number(&mut groups.dof_groups, &groups.fe_groups);
        let stamp = domain.stamp();

        let ids: Vec<Vec<EquationId>> = groups.dof_groups.iter().map(|g| g.ids().to_vec()).collect();
        for group in &mut groups.dof_groups {
            group.build_map(&ids, stamp);
        }
        for fe in &mut groups.fe_groups {
            fe.build_map(&ids, stamp);
        }

        for (constraint, &index) in &groups.multipliers {
            let old = self
                .multipliers
                .get(constraint)
                .and_then(|&i| self.dof_groups.get(i))
                .and_then(|g| Some((g.trial_multipliers()?.clone(), g.committed_multipliers()?.clone())));
            if let (Some((trial, committed)), Some((t, c))) = (old, groups.dof_groups[index].multipliers_mut()) {
                if trial.len() == t.len() {
                    t.copy_from(&trial);
                    c.copy_from(&committed);
                }
            }
        }

        self.dof_groups = groups.dof_groups;
        self.fe_groups = groups.fe_groups;
        self.node_index = groups.node_index;
        self.multipliers = groups.multipliers;
        self.num_eqn = num_eqn;
        self.stamp = Some(stamp);

        soe.set_size(num_eqn, &self.sparsity(), stamp);
        info!(
            "numbered domain (stamp {}): {} equations, {} DOF groups, {} FE groups",
            stamp,
            num_eqn,
            self.dof_groups.len(),
            self.fe_groups.len()
        );
        Ok(num_eqn)
    }

    /// True if the numbering matches the domain's current stamp
    pub fn is_current(&self, domain: &Domain) -> bool {
        self.stamp == Some(domain.stamp())
    }

    pub fn check_current(&self, domain: &Domain) -> AnalysisResult<()> {
        if self.is_current(domain) {
            Ok(())
        } else {
            Err(AnalysisError::DomainNotNumbered)
        }
    }

    pub fn num_eqn(&self) -> usize {
        self.num_eqn
    }

    pub fn dof_groups(&self) -> &[DofGroup] {
        &self.dof_groups
    }

    pub fn fe_groups(&self) -> &[FeGroup] {
        &self.fe_groups
    }

    /// DOF group of node `tag`
    pub fn node_group(&self, tag: usize) -> Option<&DofGroup> {
        self.node_index.get(&tag).map(|&i| &self.dof_groups[i])
    }

    /// Equation of DOF `dof` of node `node`, `None` if it has none
    pub fn equation_of(&self, node: usize, dof: usize) -> Option<usize> {
        self.node_group(node)?.id(dof).equation()
    }

    /// Current Lagrange multipliers of `constraint`
    pub fn multiplier(&self, constraint: ConstraintRef) -> Option<&DVector<f64>> {
        let &index = self.multipliers.get(&constraint)?;
        self.dof_groups[index].trial_multipliers()
    }

    /// Committed Lagrange multipliers of `constraint`
    pub fn committed_multiplier(&self, constraint: ConstraintRef) -> Option<&DVector<f64>> {
        let &index = self.multipliers.get(&constraint)?;
        self.dof_groups[index].committed_multipliers()
    }

    pub fn has_multipliers(&self) -> bool {
        !self.multipliers.is_empty()
    }

    /// Equations coupled by each group, for sizing the system
    pub fn sparsity(&self) -> Vec<Vec<usize>> {
        self.dof_groups
            .iter()
            .map(|g| g.scatter_map())
            .chain(self.fe_groups.iter().map(|fe| fe.scatter_map()))
            .map(|map| map.equations().collect::<Vec<_>>())
            .filter(|eqns| !eqns.is_empty())
            .collect()
    }

    // ========================
    // Assembly
    // ========================

    /// Zero `A` and assemble the effective tangent
    ///
    /// Contributions are added in FE group order, then DOF group order,
    /// whatever the assembly mode.
    pub fn form_tangent(
        &self,
        domain: &Domain,
        soe: &mut LinearSoe,
        request: &AssemblyRequest,
        mode: AssemblyMode,
    ) -> AnalysisResult<()> {
        self.check_current(domain)?;
        soe.zero_a();

        let contributions = self.collect(mode, |fe| fe.tangent(domain, &self.dof_groups, request))?;
        for (fe, k) in self.fe_groups.iter().zip(&contributions) {
            soe.add_a(k, fe.scatter_map(), 1.0)?;
        }
        for group in &self.dof_groups {
            if let Some(m) = group.tangent(domain, request)? {
                soe.add_a(&m, group.scatter_map(), 1.0)?;
            }
        }
        Ok(())
    }

    /// Zero `b` and assemble the unbalance
    pub fn form_unbalance(
        &self,
        domain: &Domain,
        soe: &mut LinearSoe,
        request: &AssemblyRequest,
        mode: AssemblyMode,
    ) -> AnalysisResult<()> {
        self.check_current(domain)?;
        soe.zero_b();

        for group in &self.dof_groups {
            if let Some(p) = group.unbalance(domain, request)? {
                soe.add_b(&p, group.scatter_map(), 1.0)?;
            }
        }
        let contributions = self.collect(mode, |fe| fe.unbalance(domain, &self.dof_groups, request))?;
        for (fe, r) in self.fe_groups.iter().zip(&contributions) {
            soe.add_b(r, fe.scatter_map(), 1.0)?;
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn collect<T, F>(&self, mode: AssemblyMode, f: F) -> AnalysisResult<Vec<T>>
    where
        T: Send,
        F: Fn(&FeGroup) -> AnalysisResult<T> + Sync,
    {
        match mode {
            AssemblyMode::Sequential => self.fe_groups.iter().map(f).collect(),
            AssemblyMode::Partitioned { partitions } => {
                let chunk = chunk_size(self.fe_groups.len(), partitions);
                let parts: Vec<Vec<T>> = self
                    .fe_groups
                    .par_chunks(chunk)
                    .map(|part| part.iter().map(&f).collect::<AnalysisResult<Vec<T>>>())
                    .collect::<AnalysisResult<Vec<_>>>()?;
                Ok(parts.into_iter().flatten().collect())
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn collect<T, F>(&self, mode: AssemblyMode, f: F) -> AnalysisResult<Vec<T>>
    where
        F: Fn(&FeGroup) -> AnalysisResult<T>,
    {
        match mode {
            AssemblyMode::Sequential => self.fe_groups.iter().map(f).collect(),
            AssemblyMode::Partitioned { partitions } => {
                let chunk = chunk_size(self.fe_groups.len(), partitions);
                let mut out = Vec::with_capacity(self.fe_groups.len());
                for part in self.fe_groups.chunks(chunk) {
                    for fe in part {
                        out.push(f(fe)?);
                    }
                }
                Ok(out)
            }
        }
    }

    // ========================
    // Loads and response
    // ========================

    /// Apply loads at `time` and hold fixed DOFs at their imposed values
    pub fn apply_load(&self, domain: &mut Domain, time: f64) -> AnalysisResult<()> {
        domain.apply_load(time)?;
        for group in &self.dof_groups {
            let Some(tag) = group.node_tag() else { continue };
            let imposed: Vec<(usize, f64)> = (0..group.num_dof())
                .filter_map(|dof| group.imposed(dof).map(|v| (dof, v)))
                .collect();
            if imposed.is_empty() {
                continue;
            }
            let node = domain.node_mut(tag)?;
            let mut disp = node.trial_disp().clone();
            for (dof, v) in imposed {
                disp[dof] = v;
            }
            node.set_trial_disp(&disp);
        }
        Ok(())
    }

    /// Values of a group's reduced DOFs taken from the equation vector
    fn column_values(&self, group: &DofGroup, x: &DVector<f64>, use_imposed: bool) -> DVector<f64> {
        DVector::from_iterator(
            group.columns().len(),
            group.columns().iter().zip(&group.scatter_map().eqns).map(|(r, eq)| match eq {
                Some(e) => x[*e],
                None if use_imposed => self.dof_groups[r.group].imposed(r.dof).unwrap_or(0.0),
                None => 0.0,
            }),
        )
    }

    fn expand(group: &DofGroup, values: DVector<f64>) -> DVector<f64> {
        match group.transform() {
            Some(t) => t * values,
            None => values,
        }
    }

    /// Set trial node responses (and multipliers, from `disp`) to equation vectors
    pub fn set_response(
        &mut self,
        domain: &mut Domain,
        disp: Option<&DVector<f64>>,
        vel: Option<&DVector<f64>>,
        accel: Option<&DVector<f64>>,
    ) -> AnalysisResult<()> {
        self.check_current(domain)?;
        self.check_len(disp)?;
        self.check_len(vel)?;
        self.check_len(accel)?;

        for group in &self.dof_groups {
            let Some(tag) = group.node_tag() else { continue };
            let node = domain.node_mut(tag)?;
            if let Some(x) = disp {
                node.set_trial_disp(&Self::expand(group, self.column_values(group, x, true)));
            }
            if let Some(x) = vel {
                node.set_trial_vel(&Self::expand(group, self.column_values(group, x, false)));
            }
            if let Some(x) = accel {
                node.set_trial_accel(&Self::expand(group, self.column_values(group, x, false)));
            }
        }

        if let Some(x) = disp {
            for group in &mut self.dof_groups {
                let eqns = group.scatter_map().eqns.clone();
                if let Some((trial, _)) = group.multipliers_mut() {
                    for (i, eq) in eqns.iter().enumerate() {
                        trial[i] = eq.map_or(0.0, |e| x[e]);
                    }
                }
            }
        }
        Ok(())
    }

    /// Add equation-vector increments to trial node responses and multipliers
    pub fn incr_response(
        &mut self,
        domain: &mut Domain,
        disp: Option<&DVector<f64>>,
        vel: Option<&DVector<f64>>,
        accel: Option<&DVector<f64>>,
    ) -> AnalysisResult<()> {
        self.check_current(domain)?;
        self.check_len(disp)?;
        self.check_len(vel)?;
        self.check_len(accel)?;

        for group in &self.dof_groups {
            let Some(tag) = group.node_tag() else { continue };
            let node = domain.node_mut(tag)?;
            if let Some(x) = disp {
                node.incr_trial_disp(&Self::expand(group, self.column_values(group, x, false)));
            }
            if let Some(x) = vel {
                node.incr_trial_vel(&Self::expand(group, self.column_values(group, x, false)));
            }
            if let Some(x) = accel {
                node.incr_trial_accel(&Self::expand(group, self.column_values(group, x, false)));
            }
        }

        if let Some(x) = disp {
            for group in &mut self.dof_groups {
                let eqns = group.scatter_map().eqns.clone();
                if let Some((trial, _)) = group.multipliers_mut() {
                    for (i, eq) in eqns.iter().enumerate() {
                        if let Some(e) = eq {
                            trial[i] += x[*e];
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Node-space values of an equation vector, per node tag
    pub(crate) fn nodal_values(&self, x: &DVector<f64>) -> Vec<(usize, DVector<f64>)> {
        self.dof_groups
            .iter()
            .filter_map(|g| Some((g.node_tag()?, Self::expand(g, self.column_values(g, x, false)))))
            .collect()
    }

    fn check_len(&self, x: Option<&DVector<f64>>) -> AnalysisResult<()> {
        match x {
            Some(x) if x.len() != self.num_eqn => Err(AnalysisError::SizeMismatch {
                context: "equation vector",
                expected: self.num_eqn,
                actual: x.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Gather a nodal response into an equation vector
    ///
    /// Multiplier equations carry the multipliers when `kind` is
    /// [`ResponseKind::Disp`] and zero otherwise.
    pub fn response_vector(
        &self,
        domain: &Domain,
        kind: ResponseKind,
        committed: bool,
    ) -> AnalysisResult<DVector<f64>> {
        let mut x = DVector::zeros(self.num_eqn);
        for group in &self.dof_groups {
            match group.node_tag() {
                Some(tag) => {
                    let node = domain.node(tag)?;
                    let response = if committed { node.committed() } else { node.trial() };
                    let values = match kind {
                        ResponseKind::Disp => &response.disp,
                        ResponseKind::Vel => &response.vel,
                        ResponseKind::Accel => &response.accel,
                    };
                    for (dof, id) in group.ids().iter().enumerate() {
                        if let Some(e) = id.equation() {
                            x[e] = values[dof];
                        }
                    }
                }
                None if kind == ResponseKind::Disp => {
                    let values = if committed {
                        group.committed_multipliers()
                    } else {
                        group.trial_multipliers()
                    };
                    if let Some(values) = values {
                        for (i, id) in group.ids().iter().enumerate() {
                            if let Some(e) = id.equation() {
                                x[e] = values[i];
                            }
                        }
                    }
                }
                None => {}
            }
        }
        Ok(x)
    }

    // ========================
    // State lifecycle
    // ========================

    /// Commit the domain and the multipliers
    pub fn commit(&mut self, domain: &mut Domain) {
        domain.commit();
        for group in &mut self.dof_groups {
            if let Some((trial, committed)) = group.multipliers_mut() {
                committed.copy_from(trial);
            }
        }
    }

    pub fn revert_to_last_commit(&mut self, domain: &mut Domain) -> AnalysisResult<()> {
        domain.revert_to_last_commit()?;
        for group in &mut self.dof_groups {
            if let Some((trial, committed)) = group.multipliers_mut() {
                trial.copy_from(committed);
            }
        }
        Ok(())
    }

    pub fn revert_to_start(&mut self, domain: &mut Domain) {
        domain.revert_to_start();
        for group in &mut self.dof_groups {
            if let Some((trial, committed)) = group.multipliers_mut() {
                trial.fill(0.0);
                committed.fill(0.0);
            }
        }
    }

    /// Dense effective tangent over the equations, for inspection
    pub fn dense_tangent(
        &self,
        domain: &Domain,
        soe: &mut LinearSoe,
        request: &AssemblyRequest,
    ) -> AnalysisResult<DMatrix<f64>> {
        self.form_tangent(domain, soe, request, AssemblyMode::Sequential)?;
        Ok(soe.a_dense())
    }
}

fn chunk_size(len: usize, partitions: usize) -> usize {
    len.div_ceil(partitions.max(1)).max(1)
}
