//! DOF numberers - assign global equation numbers to free DOFs

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use super::dof_group::{DofGroup, EquationId};
use super::fe_group::FeGroup;

/// Equation ordering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Numberer {
    /// Node groups in ascending node tag order
    Plain,
    /// Reverse Cuthill-McKee over the DOF group graph
    #[default]
    ReverseCuthillMcKee,
}

impl Numberer {
    /// Number every free DOF, returning the equation count
    ///
    /// Multiplier groups always come after all node groups. Constrained DOFs
    /// keep [`EquationId::Constrained`].
    pub fn number(&self, groups: &mut [DofGroup], fe_groups: &[FeGroup]) -> usize {
        let node_groups: Vec<usize> = (0..groups.len())
            .filter(|&g| !groups[g].is_multiplier())
            .collect();

        let mut order = match self {
            Self::Plain => node_groups,
            Self::ReverseCuthillMcKee => reverse_cuthill_mckee(groups, fe_groups),
        };
        order.extend((0..groups.len()).filter(|&g| groups[g].is_multiplier()));

        let mut next = 0;
        for g in order {
            for id in groups[g].ids_mut() {
                if *id != EquationId::Constrained {
                    *id = EquationId::Equation(next);
                    next += 1;
                }
            }
        }
        debug!("{:?} numbering: {} equations", self, next);
        next
    }
}

/// Group order from a breadth-first sweep, reversed
///
/// Each connected component restarts from its lowest-degree unvisited group.
fn reverse_cuthill_mckee(groups: &[DofGroup], fe_groups: &[FeGroup]) -> Vec<usize> {
    let n = groups.len();
    let is_node = |g: usize| !groups[g].is_multiplier();

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for fe in fe_groups {
        let coupled: Vec<usize> = fe.coupled_groups().into_iter().filter(|&g| is_node(g)).collect();
        for &a in &coupled {
            for &b in &coupled {
                if a != b {
                    adj[a].push(b);
                }
            }
        }
    }
    for neighbors in &mut adj {
        neighbors.sort_unstable();
        neighbors.dedup();
    }

    let degrees: Vec<usize> = adj.iter().map(|v| v.len()).collect();
    for neighbors in &mut adj {
        neighbors.sort_by_key(|&i| degrees[i]);
    }

    let total = (0..n).filter(|&g| is_node(g)).count();
    let mut visited = vec![false; n];
    let mut result = Vec::with_capacity(total);
    let mut queue = VecDeque::new();

    while result.len() < total {
        let Some(start) = (0..n)
            .filter(|&g| is_node(g) && !visited[g])
            .min_by_key(|&g| degrees[g])
        else {
            break;
        };
        visited[start] = true;
        queue.push_back(start);

        while let Some(g) = queue.pop_front() {
            result.push(g);
            for &neighbor in &adj[g] {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
    }

    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dof_group::DofRef;
    use crate::analysis::fe_group::FeGroupKind;
    use crate::domain::ConstraintRef;

    /// Path graph whose groups are stored in scrambled order
    fn scrambled_chain() -> (Vec<DofGroup>, Vec<FeGroup>) {
        let groups: Vec<DofGroup> = (0..6).map(|i| DofGroup::node(i, i + 1, 1)).collect();
        let path = [0, 5, 1, 4, 2, 3];
        let fe_groups = path
            .windows(2)
            .enumerate()
            .map(|(tag, w)| {
                FeGroup::new(
                    FeGroupKind::Element { tag },
                    vec![DofRef { group: w[0], dof: 0 }, DofRef { group: w[1], dof: 0 }],
                    None,
                )
            })
            .collect();
        (groups, fe_groups)
    }

    fn bandwidth(groups: &[DofGroup], fe_groups: &[FeGroup]) -> usize {
        fe_groups
            .iter()
            .map(|fe| {
                let eqns: Vec<usize> = fe
                    .dofs()
                    .iter()
                    .filter_map(|r| groups[r.group].id(r.dof).equation())
                    .collect();
                eqns.iter().max().unwrap_or(&0) - eqns.iter().min().unwrap_or(&0)
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_numbering_is_bijective() {
        let (mut groups, fe_groups) = scrambled_chain();
        groups[2].constrain(0, Some(0.0));
        let n = Numberer::ReverseCuthillMcKee.number(&mut groups, &fe_groups);
        assert_eq!(n, 5);

        let mut eqns: Vec<usize> = groups.iter().filter_map(|g| g.id(0).equation()).collect();
        eqns.sort_unstable();
        assert_eq!(eqns, (0..5).collect::<Vec<_>>());
        assert_eq!(groups[2].id(0), EquationId::Constrained);
    }

    #[test]
    fn test_rcm_reduces_bandwidth() {
        let (mut groups, fe_groups) = scrambled_chain();
        Numberer::Plain.number(&mut groups, &fe_groups);
        assert_eq!(bandwidth(&groups, &fe_groups), 5);

        let (mut groups, fe_groups) = scrambled_chain();
        Numberer::ReverseCuthillMcKee.number(&mut groups, &fe_groups);
        assert_eq!(bandwidth(&groups, &fe_groups), 1);
    }

    #[test]
    fn test_multipliers_numbered_last() {
        let (mut groups, fe_groups) = scrambled_chain();
        groups.push(DofGroup::multiplier(6, ConstraintRef::Sp(1), 1));
        let n = Numberer::ReverseCuthillMcKee.number(&mut groups, &fe_groups);
        assert_eq!(n, 7);
        assert_eq!(groups[6].id(0), EquationId::Equation(6));
    }
}
