//! DOF Group - the analysis-side view of one node (or one set of multipliers)

use nalgebra::{DMatrix, DVector};

use super::AssemblyRequest;
use crate::domain::{ConstraintRef, Domain};
use crate::error::AnalysisResult;
use crate::system::ScatterMap;

/// Equation assigned to one DOF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquationId {
    /// Free, waiting for the numberer
    Free,
    /// No equation: fixed, or eliminated by a transformation
    Constrained,
    /// Global equation number
    Equation(usize),
}

impl EquationId {
    pub fn equation(&self) -> Option<usize> {
        match self {
            Self::Equation(e) => Some(*e),
            _ => None,
        }
    }
}

/// Reference to DOF `dof` of DOF group `group`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DofRef {
    pub group: usize,
    pub dof: usize,
}

/// What a DOF group stands for
#[derive(Debug, Clone)]
pub enum DofGroupKind {
    /// Displacement DOFs of a node
    Node { tag: usize },
    /// Lagrange multipliers of one constraint
    Multiplier {
        constraint: ConstraintRef,
        trial: DVector<f64>,
        committed: DVector<f64>,
    },
}

/// Analysis-side group of DOFs
///
/// `columns` are the group's reduced DOFs. Without a transformation they are
/// the group's own DOFs; a node eliminated by a multi-point constraint
/// instead exposes its remaining own DOFs plus the retained node's DOFs, and
/// `transform` maps the reduced values back onto the node.
#[derive(Debug, Clone)]
pub struct DofGroup {
    kind: DofGroupKind,
    ids: Vec<EquationId>,
    imposed: Vec<Option<f64>>,
    columns: Vec<DofRef>,
    transform: Option<DMatrix<f64>>,
    map: ScatterMap,
}

impl DofGroup {
    /// Create the group of node `tag`, stored at `index`
    pub fn node(index: usize, tag: usize, ndof: usize) -> Self {
        Self::with_kind(index, DofGroupKind::Node { tag }, ndof)
    }

    /// Create a group of `n` multipliers for `constraint`, stored at `index`
    pub fn multiplier(index: usize, constraint: ConstraintRef, n: usize) -> Self {
        Self::with_kind(
            index,
            DofGroupKind::Multiplier {
                constraint,
                trial: DVector::zeros(n),
                committed: DVector::zeros(n),
            },
            n,
        )
    }

    fn with_kind(index: usize, kind: DofGroupKind, n: usize) -> Self {
        Self {
            kind,
            ids: vec![EquationId::Free; n],
            imposed: vec![None; n],
            columns: (0..n).map(|dof| DofRef { group: index, dof }).collect(),
            transform: None,
            map: ScatterMap::new(Vec::new(), 0),
        }
    }

    pub fn kind(&self) -> &DofGroupKind {
        &self.kind
    }

    /// Node tag, `None` for multiplier groups
    pub fn node_tag(&self) -> Option<usize> {
        match self.kind {
            DofGroupKind::Node { tag } => Some(tag),
            DofGroupKind::Multiplier { .. } => None,
        }
    }

    pub fn is_multiplier(&self) -> bool {
        matches!(self.kind, DofGroupKind::Multiplier { .. })
    }

    pub fn num_dof(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[EquationId] {
        &self.ids
    }

    pub fn id(&self, dof: usize) -> EquationId {
        self.ids.get(dof).copied().unwrap_or(EquationId::Constrained)
    }

    pub(crate) fn ids_mut(&mut self) -> &mut [EquationId] {
        &mut self.ids
    }

    /// Mark `dof` as having no equation, held at `value` if given
    pub(crate) fn constrain(&mut self, dof: usize, value: Option<f64>) {
        self.ids[dof] = EquationId::Constrained;
        self.imposed[dof] = value;
    }

    pub fn imposed(&self, dof: usize) -> Option<f64> {
        self.imposed.get(dof).copied().flatten()
    }

    pub fn columns(&self) -> &[DofRef] {
        &self.columns
    }

    pub fn transform(&self) -> Option<&DMatrix<f64>> {
        self.transform.as_ref()
    }

    pub(crate) fn set_transform(&mut self, columns: Vec<DofRef>, transform: DMatrix<f64>) {
        self.columns = columns;
        self.transform = Some(transform);
    }

    pub fn scatter_map(&self) -> &ScatterMap {
        &self.map
    }

    pub(crate) fn build_map(&mut self, groups_ids: &[Vec<EquationId>], stamp: u64) {
        let eqns = self
            .columns
            .iter()
            .map(|r| groups_ids[r.group][r.dof].equation())
            .collect();
        self.map = ScatterMap::new(eqns, stamp);
    }

    // ========================
    // Multipliers
    // ========================

    pub fn trial_multipliers(&self) -> Option<&DVector<f64>> {
        match &self.kind {
            DofGroupKind::Multiplier { trial, .. } => Some(trial),
            DofGroupKind::Node { .. } => None,
        }
    }

    pub fn committed_multipliers(&self) -> Option<&DVector<f64>> {
        match &self.kind {
            DofGroupKind::Multiplier { committed, .. } => Some(committed),
            DofGroupKind::Node { .. } => None,
        }
    }

    pub(crate) fn multipliers_mut(&mut self) -> Option<(&mut DVector<f64>, &mut DVector<f64>)> {
        match &mut self.kind {
            DofGroupKind::Multiplier {
                trial, committed, ..
            } => Some((trial, committed)),
            DofGroupKind::Node { .. } => None,
        }
    }

    // ========================
    // Contributions
    // ========================

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

    /// Nodal mass contribution `c3*M + c2*aM*M`, `None` if there is nothing
    pub fn tangent(
        &self,
        domain: &Domain,
        request: &AssemblyRequest,
    ) -> AnalysisResult<Option<DMatrix<f64>>> {
        let Some(tag) = self.node_tag() else {
            return Ok(None);
        };
        let node = domain.node(tag)?;
        let factor = request.c3 + request.c2 * node.alpha_m;
        if factor == 0.0 || !node.has_mass() {
            return Ok(None);
        }
        Ok(Some(self.reduce_matrix(node.mass() * factor)))
    }

    /// Applied nodal load, less nodal inertia when the request asks for it
    pub fn unbalance(
        &self,
        domain: &Domain,
        request: &AssemblyRequest,
    ) -> AnalysisResult<Option<DVector<f64>>> {
        let Some(tag) = self.node_tag() else {
            return Ok(None);
        };
        let node = domain.node(tag)?;
        let load = if request.inertia {
            node.unbalanced_load_inc_inertia()
        } else {
            node.unbalanced_load()
        };
        Ok(Some(self.reduce_vector(load)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Node;
    use approx::assert_relative_eq;

    #[test]
    fn test_mass_contribution_scaled() {
        let mut domain = Domain::new();
        domain.add_node(1, Node::new(2, &[0.0, 0.0]).with_mass(3.0)).unwrap();
        let group = DofGroup::node(0, 1, 2);

        let request = AssemblyRequest::new(1.0, 0.0, 4.0);
        let m = group.tangent(&domain, &request).unwrap().unwrap();
        assert_relative_eq!(m[(0, 0)], 12.0);
        assert_relative_eq!(m[(0, 1)], 0.0);

        assert!(group
            .tangent(&domain, &AssemblyRequest::stiffness())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_map_skips_constrained() {
        let mut group = DofGroup::node(0, 1, 3);
        group.constrain(1, Some(0.0));
        group.ids_mut()[0] = EquationId::Equation(4);
        group.ids_mut()[2] = EquationId::Equation(5);
        let ids = vec![group.ids().to_vec()];
        group.build_map(&ids, 9);
        assert_eq!(group.scatter_map().eqns, vec![Some(4), None, Some(5)]);
        assert_eq!(group.imposed(1), Some(0.0));
    }
}
