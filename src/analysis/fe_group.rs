//! FE Group - one element or one constraint contribution to the system

use nalgebra::{DMatrix, DVector};

use super::dof_group::{DofGroup, DofRef, EquationId};
use super::{AssemblyRequest, StiffnessKind};
use crate::domain::Domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::system::ScatterMap;

/// Source of an FE group's contribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeGroupKind {
    Element { tag: usize },
    PenaltySp { tag: usize, alpha: f64 },
    PenaltyMp { tag: usize, alpha: f64 },
    /// `multiplier` is the index of the multiplier DOF group
    LagrangeSp { tag: usize, alpha: f64, multiplier: usize },
    LagrangeMp { tag: usize, alpha: f64, multiplier: usize },
}

/// Local contribution plus its scatter map
///
/// Contributions are computed from the domain without mutating anything, so
/// groups can be evaluated in parallel and added in a fixed order.
#[derive(Debug, Clone)]
pub struct FeGroup {
    kind: FeGroupKind,
    dofs: Vec<DofRef>,
    transform: Option<DMatrix<f64>>,
    map: ScatterMap,
}

impl FeGroup {
    pub(crate) fn new(kind: FeGroupKind, dofs: Vec<DofRef>, transform: Option<DMatrix<f64>>) -> Self {
        Self {
            kind,
            dofs,
            transform,
            map: ScatterMap::new(Vec::new(), 0),
        }
    }

    /// Element group over the reduced DOFs of its nodes' groups
    pub(crate) fn element(tag: usize, groups: &[&DofGroup]) -> Self {
        let mut dofs = Vec::new();
        let rows: usize = groups.iter().map(|g| g.num_dof()).sum();
        let cols: usize = groups.iter().map(|g| g.columns().len()).sum();
        let transformed = groups.iter().any(|g| g.transform().is_some());
        let mut t = if transformed {
            Some(DMatrix::zeros(rows, cols))
        } else {
            None
        };

        let (mut r0, mut c0) = (0, 0);
        for group in groups {
            let n = group.num_dof();
            let m = group.columns().len();
            if let Some(t) = t.as_mut() {
                match group.transform() {
                    Some(block) => t.view_mut((r0, c0), (n, m)).copy_from(block),
                    None => t.view_mut((r0, c0), (n, m)).fill_with_identity(),
                }
            }
            dofs.extend_from_slice(group.columns());
            r0 += n;
            c0 += m;
        }

        Self::new(FeGroupKind::Element { tag }, dofs, t)
    }

    pub fn kind(&self) -> &FeGroupKind {
        &self.kind
    }

    /// Reduced local DOFs, in local matrix order
    pub fn dofs(&self) -> &[DofRef] {
        &self.dofs
    }

    pub fn scatter_map(&self) -> &ScatterMap {
        &self.map
    }

    pub(crate) fn build_map(&mut self, groups_ids: &[Vec<EquationId>], stamp: u64) {
        let eqns = self
            .dofs
            .iter()
            .map(|r| groups_ids[r.group][r.dof].equation())
            .collect();
        self.map = ScatterMap::new(eqns, stamp);
    }

    /// Indices of the DOF groups this group couples
    pub fn coupled_groups(&self) -> Vec<usize> {
        let mut groups: Vec<usize> = self.dofs.iter().map(|r| r.group).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    fn reduce_matrix(&self, m: DMatrix<f64>) -> DMatrix<f64> {
        match &self.transform {
            Some(t) => t.transpose() * m * t,
            None => m,
        }
    }

    fn reduce_vector(&self, v: DVector<f64>) -> DVector<f64> {
        match &self.transform {
            Some(t) => t.transpose() * v,
            None => v,
        }
    }

    // ========================
    // Contributions
    // ========================

    /// Effective tangent `c1*K + c2*C + c3*M` in reduced local DOFs
    pub fn tangent(
        &self,
        domain: &Domain,
        _groups: &[DofGroup],
        request: &AssemblyRequest,
    ) -> AnalysisResult<DMatrix<f64>> {
        match self.kind {
            FeGroupKind::Element { tag } => {
                let slot = domain.element_slot(tag)?;
                let element = slot.element();
                let n = element.num_dof();
                let mut k = DMatrix::zeros(n, n);

                if request.c1 != 0.0 {
                    let stiff = match request.stiffness {
                        StiffnessKind::Current => element.tangent_stiff(),
                        StiffnessKind::Initial => element.initial_stiff(),
                    };
                    k += stiff * request.c1;
                }
                if request.c2 != 0.0 {
                    k += domain.element_slot(tag)?.damping() * request.c2;
                }
                if request.c3 != 0.0 {
                    k += element.mass() * request.c3;
                }
                Ok(self.reduce_matrix(k))
            }
            FeGroupKind::PenaltySp { alpha, .. } => {
                Ok(DMatrix::from_element(1, 1, alpha * request.c1))
            }
            FeGroupKind::PenaltyMp { tag, alpha } => {
                let c = domain.mp(tag)?.constraint_matrix();
                Ok(c.transpose() * c * (alpha * request.c1))
            }
            FeGroupKind::LagrangeSp { alpha, .. } => {
                let a = alpha * request.c1;
                Ok(DMatrix::from_row_slice(2, 2, &[0.0, a, a, 0.0]))
            }
            FeGroupKind::LagrangeMp { tag, alpha, .. } => {
                let c = domain.mp(tag)?.constraint_matrix() * (alpha * request.c1);
                let (nc, m) = c.shape();
                let mut k = DMatrix::zeros(m + nc, m + nc);
                k.view_mut((0, m), (m, nc)).copy_from(&c.transpose());
                k.view_mut((m, 0), (nc, m)).copy_from(&c);
                Ok(k)
            }
        }
    }

    /// Residual contribution in reduced local DOFs
    pub fn unbalance(
        &self,
        domain: &Domain,
        groups: &[DofGroup],
        request: &AssemblyRequest,
    ) -> AnalysisResult<DVector<f64>> {
        match self.kind {
            FeGroupKind::Element { tag } => {
                let element = domain.element(tag)?;
                let mut force = element.resisting_force();
                if request.inertia {
                    let state = domain.element_state(element)?;
                    force += element.mass() * &state.accel;
                    force += domain.element_slot(tag)?.damping() * &state.vel;
                }
                Ok(self.reduce_vector(-force))
            }
            FeGroupKind::PenaltySp { tag, alpha } => {
                let sp = domain.sp(tag)?;
                let u = domain.node(sp.node)?.trial_disp()[sp.dof];
                Ok(DVector::from_element(1, alpha * (sp.value - u)))
            }
            FeGroupKind::PenaltyMp { tag, alpha } => {
                let mp = domain.mp(tag)?;
                let c = mp.constraint_matrix();
                let u = constrained_disp(domain, tag)?;
                Ok(c.transpose() * (&c * u) * -alpha)
            }
            FeGroupKind::LagrangeSp {
                tag,
                alpha,
                multiplier,
            } => {
                let sp = domain.sp(tag)?;
                let u = domain.node(sp.node)?.trial_disp()[sp.dof];
                let lambda = multiplier_values(groups, multiplier)?[0];
                Ok(DVector::from_vec(vec![
                    -alpha * lambda,
                    alpha * (sp.value - u),
                ]))
            }
            FeGroupKind::LagrangeMp {
                tag,
                alpha,
                multiplier,
            } => {
                let c = domain.mp(tag)?.constraint_matrix() * alpha;
                let u = constrained_disp(domain, tag)?;
                let lambda = multiplier_values(groups, multiplier)?;
                let m = c.ncols();
                let mut r = DVector::zeros(m + c.nrows());
                r.rows_mut(0, m).copy_from(&(-(c.transpose() * lambda)));
                r.rows_mut(m, c.nrows()).copy_from(&(-(&c * u)));
                Ok(r)
            }
        }
    }
}

/// `[u_c; u_r]` trial displacements over the DOFs a constraint ties
fn constrained_disp(domain: &Domain, tag: usize) -> AnalysisResult<DVector<f64>> {
    let mp = domain.mp(tag)?;
    let uc = domain.node(mp.constrained)?.trial_disp();
    let ur = domain.node(mp.retained)?.trial_disp();
    let values: Vec<f64> = mp
        .constrained_dofs
        .iter()
        .map(|&d| uc[d])
        .chain(mp.retained_dofs.iter().map(|&d| ur[d]))
        .collect();
    Ok(DVector::from_vec(values))
}

fn multiplier_values(groups: &[DofGroup], index: usize) -> AnalysisResult<&DVector<f64>> {
    groups
        .get(index)
        .and_then(|g| g.trial_multipliers())
        .ok_or_else(|| AnalysisError::InvalidInput(format!("DOF group {} holds no multipliers", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MpConstraint, Node};
    use crate::elements::{RayleighFactors, Spring};
    use approx::assert_relative_eq;

    #[test]
    fn test_element_effective_tangent() {
        let mut domain = Domain::new();
        domain.add_node(1, Node::new(1, &[0.0])).unwrap();
        domain.add_node(2, Node::new(1, &[1.0])).unwrap();
        domain
            .add_element(1, Spring::linear(1, 2, 0, 10.0).with_damping(2.0))
            .unwrap();
        domain.set_rayleigh_factors(RayleighFactors::new(0.0, 0.1));

        let g1 = DofGroup::node(0, 1, 1);
        let g2 = DofGroup::node(1, 2, 1);
        let fe = FeGroup::element(1, &[&g1, &g2]);
        let groups = vec![g1.clone(), g2.clone()];

        // c1 K + c2 (c + 0.1 K)
        let k = fe
            .tangent(&domain, &groups, &AssemblyRequest::new(1.0, 0.5, 0.0))
            .unwrap();
        assert_relative_eq!(k[(0, 0)], 10.0 + 0.5 * (2.0 + 1.0));
    }

    #[test]
    fn test_penalty_mp_residual_vanishes_when_satisfied() {
        let mut domain = Domain::new();
        domain.add_node(1, Node::new(1, &[0.0])).unwrap();
        domain.add_node(2, Node::new(1, &[0.0])).unwrap();
        domain.add_mp(1, MpConstraint::equal_dof(1, 2, &[0])).unwrap();
        for tag in [1, 2] {
            domain
                .node_mut(tag)
                .unwrap()
                .set_trial_disp(&DVector::from_element(1, 0.3));
        }

        let fe = FeGroup::new(
            FeGroupKind::PenaltyMp { tag: 1, alpha: 1e6 },
            vec![DofRef { group: 1, dof: 0 }, DofRef { group: 0, dof: 0 }],
            None,
        );
        let r = fe
            .unbalance(&domain, &[], &AssemblyRequest::stiffness())
            .unwrap();
        assert_relative_eq!(r.norm(), 0.0);

        let k = fe
            .tangent(&domain, &[], &AssemblyRequest::stiffness())
            .unwrap();
        assert_relative_eq!(k[(0, 1)], -1e6);
    }
}
