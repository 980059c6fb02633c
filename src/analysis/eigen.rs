//! Generalized eigenvalue analysis `K phi = lambda M phi`
//!
//! Both matrices are assembled through the regular model into dense form.
//! With `K = L L^T` the problem becomes the standard symmetric one
//! `L^-1 M L^-T y = mu y` with `mu = 1 / lambda`, which tolerates a singular
//! (lumped, partly massless) `M`: massless directions give `mu = 0` and are
//! dropped.

use log::{debug, info};
use nalgebra::{DVector, SymmetricEigen};

use super::model::AnalysisModel;
use super::{AssemblyMode, AssemblyRequest};
use crate::domain::Domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::results::EigenResults;
use crate::system::{LinearSoe, SolverError};

/// Relative size below which `mu` counts as a massless direction
const MASSLESS_TOL: f64 = 1e-12;

/// Lowest `num_modes` eigenpairs, mass-normalized, written to the nodes
pub fn eigen_analysis(
    domain: &mut Domain,
    model: &AnalysisModel,
    soe: &mut LinearSoe,
    num_modes: usize,
    mode: AssemblyMode,
) -> AnalysisResult<EigenResults> {
    model.check_current(domain)?;
    if model.has_multipliers() {
        return Err(AnalysisError::Configuration(
            "eigen analysis needs a handler without multipliers".into(),
        ));
    }
    let n = model.num_eqn();
    if num_modes == 0 || num_modes > n {
        return Err(AnalysisError::InvalidInput(format!(
            "requested {} modes from {} equations",
            num_modes, n
        )));
    }

    model.form_tangent(domain, soe, &AssemblyRequest::stiffness(), mode)?;
    let k = soe.a_dense();
    model.form_tangent(domain, soe, &AssemblyRequest::mass(), mode)?;
    let m = soe.a_dense();
    soe.zero_a();

    let l = k
        .cholesky()
        .ok_or(SolverError::NotPositiveDefinite { row: None })?
        .l();
    let y = l
        .solve_lower_triangular(&m)
        .ok_or(SolverError::Singular { row: 0 })?;
    let a = l
        .solve_lower_triangular(&y.transpose())
        .ok_or(SolverError::Singular { row: 0 })?;
    let a = (&a + a.transpose()) * 0.5;

    let eig = SymmetricEigen::new(a);
    let mu_max = eig.eigenvalues.iter().copied().fold(0.0_f64, f64::max);

    let mut order: Vec<usize> = (0..n)
        .filter(|&i| eig.eigenvalues[i] > MASSLESS_TOL * mu_max)
        .collect();
    order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));
    if order.len() < num_modes {
        return Err(AnalysisError::InvalidInput(format!(
            "only {} modes carry mass, {} requested",
            order.len(),
            num_modes
        )));
    }
    order.truncate(num_modes);

    let mut eigenvalues = Vec::with_capacity(num_modes);
    let mut modes = Vec::with_capacity(num_modes);
    for &i in &order {
        let mu = eig.eigenvalues[i];
        let y: DVector<f64> = eig.eigenvectors.column(i).into_owned();
        let phi = l
            .tr_solve_lower_triangular(&y)
            .ok_or(SolverError::Singular { row: 0 })?
            / mu.sqrt();
        debug!("mode {}: lambda = {:.6e}", modes.len() + 1, 1.0 / mu);
        eigenvalues.push(1.0 / mu);
        modes.push(phi);
    }

    let mut per_node: Vec<(usize, Vec<DVector<f64>>)> = Vec::new();
    for phi in &modes {
        for (index, (tag, values)) in model.nodal_values(phi).into_iter().enumerate() {
            if per_node.len() <= index {
                per_node.push((tag, Vec::with_capacity(num_modes)));
            }
            per_node[index].1.push(values);
        }
    }
    for (tag, vectors) in per_node {
        domain.node_mut(tag)?.set_eigenvectors(vectors);
    }

    info!("eigen analysis: {} modes, first lambda = {:.6e}", num_modes, eigenvalues[0]);
    Ok(EigenResults::new(eigenvalues, modes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ConstraintHandler, Numberer};
    use crate::domain::{Node, SpConstraint};
    use crate::elements::Spring;
    use crate::system::{SolverKind, StorageScheme};
    use approx::assert_relative_eq;

    #[test]
    fn test_two_dof_chain() {
        // fixed - k - m - k - m
        let mut domain = Domain::new();
        domain.add_node(1, Node::new(1, &[0.0])).unwrap();
        domain.add_node(2, Node::new(1, &[1.0]).with_mass(1.0)).unwrap();
        domain.add_node(3, Node::new(1, &[2.0]).with_mass(1.0)).unwrap();
        domain.add_element(1, Spring::linear(1, 2, 0, 1.0)).unwrap();
        domain.add_element(2, Spring::linear(2, 3, 0, 1.0)).unwrap();
        domain.add_sp(1, SpConstraint::fixed(1, 0)).unwrap();

        let mut soe = LinearSoe::new(StorageScheme::BandGeneral, SolverKind::BandLu).unwrap();
        let mut model = AnalysisModel::new();
        model
            .domain_changed(&domain, &ConstraintHandler::Plain, &Numberer::Plain, &mut soe)
            .unwrap();

        let results = eigen_analysis(&mut domain, &model, &mut soe, 2, AssemblyMode::Sequential).unwrap();
        let s5 = 5.0_f64.sqrt();
        assert_relative_eq!(results.eigenvalues[0], (3.0 - s5) / 2.0, epsilon = 1e-10);
        assert_relative_eq!(results.eigenvalues[1], (3.0 + s5) / 2.0, epsilon = 1e-10);

        // unit modal mass with M = I
        assert_relative_eq!(results.modes[0].norm(), 1.0, epsilon = 1e-10);
        assert!(domain.node(3).unwrap().eigenvector(1).is_some());
    }
}
