//! Single-point and multi-point kinematic constraints

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Identifies a constraint in the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintRef {
    /// Single-point constraint tag
    Sp(usize),
    /// Multi-point constraint tag
    Mp(usize),
}

impl ConstraintRef {
    pub fn tag(&self) -> usize {
        match self {
            Self::Sp(tag) | Self::Mp(tag) => *tag,
        }
    }
}

/// Single-point constraint: one nodal DOF held at an imposed value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpConstraint {
    pub node: usize,
    pub dof: usize,
    /// Imposed displacement (zero for a homogeneous fixity)
    pub value: f64,
}

impl SpConstraint {
    /// Homogeneous fixity u[dof] = 0
    pub fn fixed(node: usize, dof: usize) -> Self {
        Self {
            node,
            dof,
            value: 0.0,
        }
    }

    /// Imposed displacement u[dof] = value
    pub fn imposed(node: usize, dof: usize, value: f64) -> Self {
        Self { node, dof, value }
    }

    pub fn is_homogeneous(&self) -> bool {
        self.value == 0.0
    }
}

/// Multi-point constraint `u_c = C_cr * u_r`
///
/// Rows of `matrix` follow `constrained_dofs` on the constrained node,
/// columns follow `retained_dofs` on the retained node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpConstraint {
    pub retained: usize,
    pub constrained: usize,
    pub retained_dofs: Vec<usize>,
    pub constrained_dofs: Vec<usize>,
    pub matrix: DMatrix<f64>,
}

impl MpConstraint {
    /// General linear constraint between two nodes
    pub fn new(
        retained: usize,
        constrained: usize,
        retained_dofs: Vec<usize>,
        constrained_dofs: Vec<usize>,
        matrix: DMatrix<f64>,
    ) -> Self {
        Self {
            retained,
            constrained,
            retained_dofs,
            constrained_dofs,
            matrix,
        }
    }

    /// Listed DOFs of the constrained node follow the retained node
    pub fn equal_dof(retained: usize, constrained: usize, dofs: &[usize]) -> Self {
        let n = dofs.len();
        Self::new(
            retained,
            constrained,
            dofs.to_vec(),
            dofs.to_vec(),
            DMatrix::identity(n, n),
        )
    }

    /// Translations of the constrained node follow the retained node
    pub fn rigid_rod(retained: usize, constrained: usize, ndm: usize) -> Self {
        let dofs: Vec<usize> = (0..ndm).collect();
        Self::equal_dof(retained, constrained, &dofs)
    }

    /// Planar rigid offset for nodes with (ux, uy, rz)
    ///
    /// `offset` is the constrained node position minus the retained node
    /// position.
    pub fn rigid_beam_2d(retained: usize, constrained: usize, offset: [f64; 2]) -> Self {
        let [dx, dy] = offset;
        #[rustfmt::skip]
        let matrix = DMatrix::from_row_slice(3, 3, &[
            1.0, 0.0, -dy,
            0.0, 1.0,  dx,
            0.0, 0.0, 1.0,
        ]);
        Self::new(retained, constrained, vec![0, 1, 2], vec![0, 1, 2], matrix)
    }

    /// Spatial rigid offset for nodes with (ux, uy, uz, rx, ry, rz)
    ///
    /// Linearised: `u_c = u_r + theta_r x offset`, rotations equal.
    pub fn rigid_beam_3d(retained: usize, constrained: usize, offset: [f64; 3]) -> Self {
        let [dx, dy, dz] = offset;
        #[rustfmt::skip]
        let matrix = DMatrix::from_row_slice(6, 6, &[
            1.0, 0.0, 0.0, 0.0,  dz, -dy,
            0.0, 1.0, 0.0, -dz, 0.0,  dx,
            0.0, 0.0, 1.0,  dy, -dx, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ]);
        let dofs: Vec<usize> = (0..6).collect();
        Self::new(retained, constrained, dofs.clone(), dofs, matrix)
    }

    pub fn num_constrained(&self) -> usize {
        self.constrained_dofs.len()
    }

    /// Constraint matrix `[I | -C_cr]` acting on `[u_c; u_r]`
    pub fn constraint_matrix(&self) -> DMatrix<f64> {
        let nc = self.constrained_dofs.len();
        let nr = self.retained_dofs.len();
        let mut c = DMatrix::zeros(nc, nc + nr);
        for i in 0..nc {
            c[(i, i)] = 1.0;
            for j in 0..nr {
                c[(i, nc + j)] = -self.matrix[(i, j)];
            }
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn test_rigid_beam_2d_rotation() {
        let mp = MpConstraint::rigid_beam_2d(1, 2, [2.0, 0.0]);
        // small rotation of the retained node lifts the offset node
        let ur = DVector::from_vec(vec![0.0, 0.0, 0.01]);
        let uc = &mp.matrix * ur;
        assert!((uc[1] - 0.02).abs() < 1e-12);
        assert!((uc[2] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_constraint_matrix_layout() {
        let mp = MpConstraint::equal_dof(1, 2, &[0, 1]);
        let c = mp.constraint_matrix();
        assert_eq!(c.shape(), (2, 4));
        assert_eq!(c[(0, 0)], 1.0);
        assert_eq!(c[(0, 2)], -1.0);
        assert_eq!(c[(1, 3)], -1.0);
    }
}
