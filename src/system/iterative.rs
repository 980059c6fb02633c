//! Krylov solvers working through a matrix-vector product
//!
//! Both solvers use a Jacobi (diagonal) preconditioner and measure
//! convergence on the true residual relative to `||b||`.

use nalgebra::{DMatrix, DVector};

use super::SolverError;

fn jacobi(diag: &DVector<f64>) -> DVector<f64> {
    diag.map(|d| if d.abs() < 1e-15 { 1.0 } else { 1.0 / d })
}

/// Preconditioned conjugate gradient for symmetric positive definite systems
pub fn conjugate_gradient<F>(
    apply: F,
    diag: &DVector<f64>,
    b: &DVector<f64>,
    tol: f64,
    max_iter: usize,
) -> Result<DVector<f64>, SolverError>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = b.len();
    let b_norm = b.norm();
    let mut x = DVector::zeros(n);
    if b_norm == 0.0 {
        return Ok(x);
    }
    let inv_diag = jacobi(diag);

    let mut r = b.clone();
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut r_dot_z = r.dot(&z);

    for iter in 0..max_iter {
        let ap = apply(&p);
        let p_dot_ap = p.dot(&ap);
        if p_dot_ap.abs() < 1e-300 {
            return Err(SolverError::Breakdown { iteration: iter });
        }

        let alpha = r_dot_z / p_dot_ap;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        if r.norm() <= tol * b_norm {
            return Ok(x);
        }

        z = r.component_mul(&inv_diag);
        let r_dot_z_new = r.dot(&z);
        let beta = r_dot_z_new / r_dot_z;
        r_dot_z = r_dot_z_new;

        p = &z + beta * &p;
    }

    Err(SolverError::NotConverged {
        iterations: max_iter,
        residual: r.norm() / b_norm,
    })
}

/// Restarted GMRES(m) with right Jacobi preconditioning
pub fn gmres<F>(
    apply: F,
    diag: &DVector<f64>,
    b: &DVector<f64>,
    tol: f64,
    max_iter: usize,
    restart: usize,
) -> Result<DVector<f64>, SolverError>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let n = b.len();
    let b_norm = b.norm();
    let mut x = DVector::zeros(n);
    if b_norm == 0.0 {
        return Ok(x);
    }
    let inv_diag = jacobi(diag);
    let m = restart.max(1).min(n.max(1));
    let mut total = 0usize;
    let mut residual = b_norm;

    while total < max_iter {
        let r = b - apply(&x);
        let beta = r.norm();
        residual = beta;
        if beta <= tol * b_norm {
            return Ok(x);
        }

        let mut basis: Vec<DVector<f64>> = vec![r / beta];
        let mut h = DMatrix::<f64>::zeros(m + 1, m);
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];
        let mut g = DVector::<f64>::zeros(m + 1);
        g[0] = beta;
        let mut k = 0;

        for j in 0..m {
            total += 1;
            let mut w = apply(&basis[j].component_mul(&inv_diag));

            // modified Gram-Schmidt
            for (i, v) in basis.iter().enumerate() {
                let hij = w.dot(v);
                h[(i, j)] = hij;
                w.axpy(-hij, v, 1.0);
            }
            let h_next = w.norm();
            h[(j + 1, j)] = h_next;

            for i in 0..j {
                let t = cs[i] * h[(i, j)] + sn[i] * h[(i + 1, j)];
                h[(i + 1, j)] = -sn[i] * h[(i, j)] + cs[i] * h[(i + 1, j)];
                h[(i, j)] = t;
            }

            let denom = h[(j, j)].hypot(h[(j + 1, j)]);
            if denom == 0.0 {
                return Err(SolverError::Breakdown { iteration: total });
            }
            cs[j] = h[(j, j)] / denom;
            sn[j] = h[(j + 1, j)] / denom;
            h[(j, j)] = denom;
            h[(j + 1, j)] = 0.0;
            g[j + 1] = -sn[j] * g[j];
            g[j] *= cs[j];

            k = j + 1;
            residual = g[j + 1].abs();
            if residual <= tol * b_norm || h_next <= 1e-300 || total >= max_iter {
                break;
            }
            basis.push(w / h_next);
        }

        // back substitution on the k x k triangle
        let mut y = DVector::<f64>::zeros(k);
        for i in (0..k).rev() {
            let mut sum = g[i];
            for c in i + 1..k {
                sum -= h[(i, c)] * y[c];
            }
            y[i] = sum / h[(i, i)];
        }
        let mut update = DVector::<f64>::zeros(n);
        for (i, v) in basis.iter().take(k).enumerate() {
            update.axpy(y[i], v, 1.0);
        }
        x += update.component_mul(&inv_diag);

        if residual <= tol * b_norm {
            return Ok(x);
        }
    }

    Err(SolverError::NotConverged {
        iterations: total,
        residual: residual / b_norm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn system() -> (DMatrix<f64>, DVector<f64>) {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(3, 3, &[
            4.0, -1.0,  0.0,
           -1.0,  4.0, -1.0,
            0.0, -1.0,  4.0,
        ]);
        (a, DVector::from_vec(vec![1.0, 2.0, 3.0]))
    }

    #[test]
    fn test_cg_solve() {
        let (a, b) = system();
        let x = conjugate_gradient(|v| &a * v, &a.diagonal(), &b, 1e-12, 100).unwrap();
        assert_relative_eq!(&a * &x, b, epsilon = 1e-10);
    }

    #[test]
    fn test_gmres_unsymmetric() {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(3, 3, &[
            3.0, 1.0, 0.0,
            -1.0, 2.0, 1.0,
            0.0, 2.0, 5.0,
        ]);
        let b = DVector::from_vec(vec![1.0, 0.0, -1.0]);
        let x = gmres(|v| &a * v, &a.diagonal(), &b, 1e-12, 50, 2).unwrap();
        assert_relative_eq!(&a * &x, b, epsilon = 1e-10);
    }

    #[test]
    fn test_cg_iteration_cap() {
        let (a, b) = system();
        let err = conjugate_gradient(|v| &a * v, &a.diagonal(), &b, 1e-14, 1).unwrap_err();
        assert!(matches!(err, SolverError::NotConverged { iterations: 1, .. }));
    }
}
