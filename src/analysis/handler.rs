//! Constraint handlers - how fixities and multi-point constraints enter the system

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{info, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::dof_group::{DofGroup, DofRef};
use super::fe_group::{FeGroup, FeGroupKind};
use crate::domain::{ConstraintRef, Domain};
use crate::error::{AnalysisError, AnalysisResult};

/// Constraint handling strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstraintHandler {
    /// Fixities remove equations; multi-point constraints are rejected
    Plain,
    /// Stiff springs tie constrained DOFs to their prescribed values
    Penalty { alpha_sp: f64, alpha_mp: f64 },
    /// One multiplier equation per constrained DOF
    Lagrange { alpha_sp: f64, alpha_mp: f64 },
    /// Constrained DOFs are eliminated in favour of retained DOFs
    Transformation,
}

impl Default for ConstraintHandler {
    fn default() -> Self {
        Self::Plain
    }
}

/// Groups produced for one domain snapshot
#[derive(Debug, Default)]
pub(crate) struct Groups {
    pub dof_groups: Vec<DofGroup>,
    pub fe_groups: Vec<FeGroup>,
    pub node_index: HashMap<usize, usize>,
    pub multipliers: HashMap<ConstraintRef, usize>,
}

impl ConstraintHandler {
    /// Penalty handler with the same factor for both constraint kinds
    pub fn penalty(alpha: f64) -> Self {
        Self::Penalty {
            alpha_sp: alpha,
            alpha_mp: alpha,
        }
    }

    /// Lagrange handler with unit scaling
    pub fn lagrange() -> Self {
        Self::Lagrange {
            alpha_sp: 1.0,
            alpha_mp: 1.0,
        }
    }

    /// Check the handler's own parameters
    pub fn validate(&self) -> AnalysisResult<()> {
        match *self {
            Self::Penalty { alpha_sp, alpha_mp } | Self::Lagrange { alpha_sp, alpha_mp } => {
                if alpha_sp <= 0.0 || alpha_mp <= 0.0 {
                    return Err(AnalysisError::Configuration(format!(
                        "constraint factors must be positive, got {} and {}",
                        alpha_sp, alpha_mp
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Build DOF and FE groups for the current domain
    pub(crate) fn handle(&self, domain: &Domain) -> AnalysisResult<Groups> {
        let mut groups = Groups::default();

        for (tag, node) in domain.nodes() {
            let index = groups.dof_groups.len();
            groups.dof_groups.push(DofGroup::node(index, tag, node.num_dof()));
            groups.node_index.insert(tag, index);
        }

        match *self {
            Self::Plain => self.plain(domain, &mut groups)?,
            Self::Penalty { alpha_sp, alpha_mp } => penalty(domain, &mut groups, alpha_sp, alpha_mp)?,
            Self::Lagrange { alpha_sp, alpha_mp } => lagrange(domain, &mut groups, alpha_sp, alpha_mp)?,
            Self::Transformation => transformation(domain, &mut groups)?,
        }

        // element groups go first so that constraint groups follow them
        let mut elements = Vec::new();
        for (tag, slot) in domain.active_elements() {
            let node_groups = slot
                .element()
                .node_tags()
                .iter()
                .map(|n| {
                    groups
                        .node_index
                        .get(n)
                        .map(|&i| &groups.dof_groups[i])
                        .ok_or(AnalysisError::NodeNotFound(*n))
                })
                .collect::<AnalysisResult<Vec<_>>>()?;
            elements.push(FeGroup::element(tag, &node_groups));
        }
        elements.append(&mut groups.fe_groups);
        groups.fe_groups = elements;

        Ok(groups)
    }

    fn plain(&self, domain: &Domain, groups: &mut Groups) -> AnalysisResult<()> {
        let mp_tags: Vec<usize> = domain.mp_constraints().map(|(tag, _)| tag).collect();
        if !mp_tags.is_empty() {
            return Err(AnalysisError::UnsupportedConstraints {
                tags: mp_tags,
                reason: "plain handler only handles single-point constraints".into(),
            });
        }
        fix_sp(domain, groups)
    }
}

fn node_group(groups: &Groups, tag: usize) -> AnalysisResult<usize> {
    groups
        .node_index
        .get(&tag)
        .copied()
        .ok_or(AnalysisError::NodeNotFound(tag))
}

/// Remove fixed DOFs from numbering, remembering their imposed values
fn fix_sp(domain: &Domain, groups: &mut Groups) -> AnalysisResult<()> {
    for (_, sp) in domain.sp_constraints() {
        let g = node_group(groups, sp.node)?;
        groups.dof_groups[g].constrain(sp.dof, Some(sp.value));
    }
    Ok(())
}

fn penalty(domain: &Domain, groups: &mut Groups, alpha_sp: f64, alpha_mp: f64) -> AnalysisResult<()> {
    for (tag, sp) in domain.sp_constraints() {
        let g = node_group(groups, sp.node)?;
        groups.fe_groups.push(FeGroup::new(
            FeGroupKind::PenaltySp {
                tag,
                alpha: alpha_sp,
            },
            vec![DofRef {
                group: g,
                dof: sp.dof,
            }],
            None,
        ));
    }
    for (tag, mp) in domain.mp_constraints() {
        let dofs = mp_dofs(groups, mp.constrained, &mp.constrained_dofs, mp.retained, &mp.retained_dofs)?;
        groups.fe_groups.push(FeGroup::new(
            FeGroupKind::PenaltyMp {
                tag,
                alpha: alpha_mp,
            },
            dofs,
            None,
        ));
    }
    Ok(())
}

fn lagrange(domain: &Domain, groups: &mut Groups, alpha_sp: f64, alpha_mp: f64) -> AnalysisResult<()> {
    for (tag, sp) in domain.sp_constraints() {
        let g = node_group(groups, sp.node)?;
        let m = add_multiplier_group(groups, ConstraintRef::Sp(tag), 1);
        groups.fe_groups.push(FeGroup::new(
            FeGroupKind::LagrangeSp {
                tag,
                alpha: alpha_sp,
                multiplier: m,
            },
            vec![DofRef { group: g, dof: sp.dof }, DofRef { group: m, dof: 0 }],
            None,
        ));
    }
    for (tag, mp) in domain.mp_constraints() {
        let mut dofs = mp_dofs(groups, mp.constrained, &mp.constrained_dofs, mp.retained, &mp.retained_dofs)?;
        let nc = mp.num_constrained();
        let m = add_multiplier_group(groups, ConstraintRef::Mp(tag), nc);
        dofs.extend((0..nc).map(|dof| DofRef { group: m, dof }));
        groups.fe_groups.push(FeGroup::new(
            FeGroupKind::LagrangeMp {
                tag,
                alpha: alpha_mp,
                multiplier: m,
            },
            dofs,
            None,
        ));
    }
    Ok(())
}

fn add_multiplier_group(groups: &mut Groups, constraint: ConstraintRef, n: usize) -> usize {
    let index = groups.dof_groups.len();
    groups
        .dof_groups
        .push(DofGroup::multiplier(index, constraint, n));
    groups.multipliers.insert(constraint, index);
    index
}

fn mp_dofs(
    groups: &Groups,
    constrained: usize,
    constrained_dofs: &[usize],
    retained: usize,
    retained_dofs: &[usize],
) -> AnalysisResult<Vec<DofRef>> {
    let gc = node_group(groups, constrained)?;
    let gr = node_group(groups, retained)?;
    Ok(constrained_dofs
        .iter()
        .map(|&dof| DofRef { group: gc, dof })
        .chain(retained_dofs.iter().map(|&dof| DofRef { group: gr, dof }))
        .collect())
}

/// Check that every multi-point constraint can be eliminated
fn check_transformable(domain: &Domain) -> AnalysisResult<()> {
    let mut offending = BTreeSet::new();
    let mut reasons = Vec::new();

    // (node, dof) -> constraints eliminating it
    let mut eliminated: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for (tag, mp) in domain.mp_constraints() {
        for &dof in &mp.constrained_dofs {
            eliminated.entry((mp.constrained, dof)).or_default().push(tag);
        }
    }
    for ((node, dof), tags) in &eliminated {
        if tags.len() > 1 {
            offending.extend(tags.iter().copied());
            reasons.push(format!("DOF {} of node {} is constrained more than once", dof, node));
        }
    }

    let constrained_nodes: BTreeMap<usize, usize> = domain
        .mp_constraints()
        .map(|(tag, mp)| (mp.constrained, tag))
        .collect();
    for (tag, mp) in domain.mp_constraints() {
        if let Some(&other) = constrained_nodes.get(&mp.retained) {
            offending.insert(tag);
            offending.insert(other);
            reasons.push(format!(
                "retained node {} is itself constrained (chained constraints)",
                mp.retained
            ));
        }
    }

    for (tag, sp) in domain.sp_constraints() {
        if let Some(mps) = eliminated.get(&(sp.node, sp.dof)) {
            offending.insert(tag);
            offending.extend(mps.iter().copied());
            reasons.push(format!(
                "DOF {} of node {} is both fixed and constrained",
                sp.dof, sp.node
            ));
        }
    }

    if offending.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::UnsupportedConstraints {
            tags: offending.into_iter().collect(),
            reason: reasons.join("; "),
        })
    }
}

fn transformation(domain: &Domain, groups: &mut Groups) -> AnalysisResult<()> {
    check_transformable(domain)?;
    fix_sp(domain, groups)?;

    // constrained node -> constraints acting on it
    let mut by_node: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (tag, mp) in domain.mp_constraints() {
        by_node.entry(mp.constrained).or_default().push(tag);
    }

    for (node_tag, mp_tags) in by_node {
        let g = node_group(groups, node_tag)?;
        let ndof = groups.dof_groups[g].num_dof();

        let mut dependent = vec![false; ndof];
        for &tag in &mp_tags {
            for &dof in &domain.mp(tag)?.constrained_dofs {
                dependent[dof] = true;
            }
        }

        // own independent DOFs first, then each constraint's retained DOFs
        let mut columns: Vec<DofRef> = (0..ndof)
            .filter(|&d| !dependent[d])
            .map(|dof| DofRef { group: g, dof })
            .collect();
        let mut entries: Vec<(usize, usize, f64)> = columns
            .iter()
            .enumerate()
            .map(|(c, r)| (r.dof, c, 1.0))
            .collect();

        for &tag in &mp_tags {
            let mp = domain.mp(tag)?;
            let gr = node_group(groups, mp.retained)?;
            let first = columns.len();
            columns.extend(mp.retained_dofs.iter().map(|&dof| DofRef { group: gr, dof }));
            for (i, &row) in mp.constrained_dofs.iter().enumerate() {
                for j in 0..mp.retained_dofs.len() {
                    let v = mp.matrix[(i, j)];
                    if v != 0.0 {
                        entries.push((row, first + j, v));
                    }
                }
            }
        }

        let mut t = DMatrix::zeros(ndof, columns.len());
        for (r, c, v) in entries {
            t[(r, c)] = v;
        }

        let group = &mut groups.dof_groups[g];
        for (dof, &dep) in dependent.iter().enumerate() {
            if dep {
                group.constrain(dof, None);
            }
        }
        group.set_transform(columns, t);
    }

    let ignored = domain
        .sp_constraints()
        .filter(|(_, sp)| !sp.is_homogeneous())
        .count();
    if ignored > 0 {
        info!("transformation handler: {} imposed displacement(s) held constant", ignored);
    }
    if domain.mp_constraints().next().is_none() {
        warn!("transformation handler used without multi-point constraints");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EquationId;
    use crate::domain::{MpConstraint, Node, SpConstraint};

    fn chain_domain() -> Domain {
        let mut domain = Domain::new();
        for tag in 1..=3 {
            domain.add_node(tag, Node::new(2, &[tag as f64, 0.0])).unwrap();
        }
        domain
    }

    #[test]
    fn test_plain_rejects_mp() {
        let mut domain = chain_domain();
        domain.add_mp(7, MpConstraint::equal_dof(1, 2, &[0])).unwrap();
        let err = ConstraintHandler::Plain.handle(&domain).unwrap_err();
        match err {
            AnalysisError::UnsupportedConstraints { tags, .. } => assert_eq!(tags, vec![7]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_transformation_rejects_chain_and_fixity() {
        let mut domain = chain_domain();
        domain.add_mp(1, MpConstraint::equal_dof(1, 2, &[0])).unwrap();
        domain.add_mp(2, MpConstraint::equal_dof(2, 3, &[1])).unwrap();
        domain.add_sp(5, SpConstraint::fixed(2, 0)).unwrap();

        let err = ConstraintHandler::Transformation.handle(&domain).unwrap_err();
        match err {
            AnalysisError::UnsupportedConstraints { tags, .. } => assert_eq!(tags, vec![1, 2, 5]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_transformation_builds_node_map() {
        let mut domain = chain_domain();
        domain.add_mp(1, MpConstraint::equal_dof(1, 2, &[1])).unwrap();

        let groups = ConstraintHandler::Transformation.handle(&domain).unwrap();
        let g2 = &groups.dof_groups[groups.node_index[&2]];
        assert_eq!(g2.ids()[1], EquationId::Constrained);
        assert_eq!(g2.ids()[0], EquationId::Free);
        let t = g2.transform().unwrap();
        assert_eq!(t.shape(), (2, 3));
        // u_y of node 2 follows column 2 = u_y of node 1
        assert_eq!(t[(1, 2)], 1.0);
        assert_eq!(g2.columns()[2], DofRef { group: 0, dof: 1 });
    }

    #[test]
    fn test_lagrange_adds_multiplier_groups_last() {
        let mut domain = chain_domain();
        domain.add_sp(1, SpConstraint::fixed(1, 0)).unwrap();
        domain.add_mp(1, MpConstraint::equal_dof(1, 2, &[0, 1])).unwrap();

        let groups = ConstraintHandler::lagrange().handle(&domain).unwrap();
        assert_eq!(groups.dof_groups.len(), 5);
        let m = groups.multipliers[&ConstraintRef::Mp(1)];
        assert_eq!(groups.dof_groups[m].num_dof(), 2);
        assert!(groups.dof_groups[3].is_multiplier());
    }
}
