use approx::assert_relative_eq;
use fea_analysis::error::AnalysisError;
use fea_analysis::system::{LinearSoe, ScatterMap, SolverError, SolverKind, StorageScheme};
use nalgebra::{DMatrix, DVector};

const N: usize = 50;
const HALF_BAND: usize = 3;
const STAMP: u64 = 11;

/// Diagonally dominant banded matrix; symmetric unless `skew` is nonzero
fn banded(skew: f64) -> DMatrix<f64> {
    DMatrix::from_fn(N, N, |i, j| {
        let d = i.abs_diff(j);
        if i == j {
            6.0 + (i % 5) as f64
        } else if d <= HALF_BAND {
            let base = -1.0 / d as f64;
            if i < j {
                base + skew
            } else {
                base - skew
            }
        } else {
            0.0
        }
    })
}

fn exact() -> DVector<f64> {
    DVector::from_fn(N, |i, _| ((i + 1) as f64).sin() + 0.1 * i as f64)
}

/// Assemble `a` entry-pair by entry-pair, the way groups scatter into the system
fn assemble(scheme: StorageScheme, solver: SolverKind, a: &DMatrix<f64>) -> LinearSoe {
    let mut pairs = Vec::new();
    for i in 0..N {
        for j in i + 1..(i + HALF_BAND + 1).min(N) {
            pairs.push((i, j));
        }
    }
    let mut graph: Vec<Vec<usize>> = (0..N).map(|i| vec![i]).collect();
    graph.extend(pairs.iter().map(|&(i, j)| vec![i, j]));

    let mut soe = LinearSoe::new(scheme, solver).unwrap();
    soe.set_size(N, &graph, STAMP);
    for i in 0..N {
        let map = ScatterMap::new(vec![Some(i)], STAMP);
        soe.add_a(&DMatrix::from_element(1, 1, a[(i, i)]), &map, 1.0).unwrap();
    }
    for &(i, j) in &pairs {
        let block = DMatrix::from_row_slice(2, 2, &[0.0, a[(i, j)], a[(j, i)], 0.0]);
        let map = ScatterMap::new(vec![Some(i), Some(j)], STAMP);
        soe.add_a(&block, &map, 1.0).unwrap();
    }
    soe.set_b(&(a * exact())).unwrap();
    soe
}

fn relative_error(x: &DVector<f64>) -> f64 {
    let x_exact = exact();
    (x - &x_exact).norm() / x_exact.norm()
}

#[test]
fn test_direct_solvers_spd() {
    let a = banded(0.0);
    for (scheme, solver) in [
        (StorageScheme::FullGeneral, SolverKind::FullLu),
        (StorageScheme::FullGeneral, SolverKind::FullCholesky),
        (StorageScheme::BandGeneral, SolverKind::BandLu),
        (StorageScheme::ProfileSpd, SolverKind::ProfileCholesky),
        (StorageScheme::SparseGeneral, SolverKind::SparseCholesky),
    ] {
        let mut soe = assemble(scheme, solver, &a);
        assert_relative_eq!(soe.a_dense(), a, epsilon = 1e-14);
        soe.solve().unwrap();
        let err = relative_error(soe.x());
        assert!(err < 1e-10, "{:?}/{:?}: relative error {:.3e}", scheme, solver, err);
    }
}

/// Dense `B^T B + N I` from a fixed linear congruential sequence
fn dense_spd(seed: u64) -> DMatrix<f64> {
    let mut state = seed;
    let b = DMatrix::from_fn(N, N, |_, _| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    });
    b.transpose() * &b + DMatrix::identity(N, N) * N as f64
}

#[test]
fn test_direct_solvers_dense_spd() {
    let a = dense_spd(2024);
    let all: Vec<usize> = (0..N).collect();
    let map = ScatterMap::new(all.iter().map(|&i| Some(i)).collect(), STAMP);

    for (scheme, solver) in [
        (StorageScheme::FullGeneral, SolverKind::FullLu),
        (StorageScheme::FullGeneral, SolverKind::FullCholesky),
        (StorageScheme::BandGeneral, SolverKind::BandLu),
        (StorageScheme::ProfileSpd, SolverKind::ProfileCholesky),
        (StorageScheme::SparseGeneral, SolverKind::SparseCholesky),
    ] {
        // one group coupling every equation fills the band and the profile
        let mut soe = LinearSoe::new(scheme, solver).unwrap();
        soe.set_size(N, &[all.clone()], STAMP);
        soe.add_a(&a, &map, 1.0).unwrap();
        soe.set_b(&(&a * exact())).unwrap();
        assert_relative_eq!(soe.a_dense(), a, epsilon = 1e-12);

        soe.solve().unwrap();
        let err = relative_error(soe.x());
        assert!(err <= 1e-10, "{:?}/{:?}: relative error {:.3e}", scheme, solver, err);
    }
}

#[test]
fn test_iterative_solvers_spd() {
    let a = banded(0.0);
    for (scheme, solver) in [
        (StorageScheme::SparseGeneral, SolverKind::cg()),
        (StorageScheme::ProfileSpd, SolverKind::cg()),
        (StorageScheme::SparseGeneral, SolverKind::gmres()),
        (StorageScheme::BandGeneral, SolverKind::gmres()),
    ] {
        let mut soe = assemble(scheme, solver, &a);
        soe.solve().unwrap();
        let err = relative_error(soe.x());
        assert!(err < 1e-8, "{:?}/{:?}: relative error {:.3e}", scheme, solver, err);
    }
}

#[test]
fn test_unsymmetric_systems() {
    let a = banded(0.3);
    for (scheme, solver) in [
        (StorageScheme::FullGeneral, SolverKind::FullLu),
        (StorageScheme::BandGeneral, SolverKind::BandLu),
        (StorageScheme::SparseGeneral, SolverKind::gmres()),
    ] {
        let mut soe = assemble(scheme, solver, &a);
        soe.solve().unwrap();
        let err = relative_error(soe.x());
        assert!(err < 1e-8, "{:?}/{:?}: relative error {:.3e}", scheme, solver, err);
    }
}

#[test]
fn test_factorization_reused_across_right_hand_sides() {
    let a = banded(0.0);
    let mut soe = assemble(StorageScheme::BandGeneral, SolverKind::BandLu, &a);
    soe.solve().unwrap();
    let y = soe.solve_for(&(&a * DVector::from_element(N, 1.0))).unwrap();
    assert_relative_eq!(y, DVector::from_element(N, 1.0), epsilon = 1e-10);
    assert_eq!(soe.num_factorizations(), 1);

    // touching A forces a new factorization
    soe.add_a(&DMatrix::from_element(1, 1, 1.0), &ScatterMap::new(vec![Some(0)], STAMP), 1.0)
        .unwrap();
    soe.solve().unwrap();
    assert_eq!(soe.num_factorizations(), 2);
}

#[test]
fn test_stale_map_rejected() {
    let mut soe = assemble(StorageScheme::BandGeneral, SolverKind::BandLu, &banded(0.0));
    let stale = ScatterMap::new(vec![Some(0)], STAMP - 1);
    let err = soe.add_a(&DMatrix::identity(1, 1), &stale, 1.0).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::StaleNumbering {
            map_stamp: 10,
            system_stamp: STAMP
        }
    ));
    let err = soe.add_b(&DVector::from_element(1, 1.0), &stale, 1.0).unwrap_err();
    assert!(matches!(err, AnalysisError::StaleNumbering { .. }));
}

#[test]
fn test_singular_and_indefinite_reported() {
    let mut soe = LinearSoe::new(StorageScheme::BandGeneral, SolverKind::BandLu).unwrap();
    soe.set_size(2, &[vec![0, 1]], 1);
    let map = ScatterMap::new(vec![Some(0), Some(1)], 1);
    soe.add_a(&DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]), &map, 1.0)
        .unwrap();
    let err = soe.solve().unwrap_err();
    assert!(matches!(err, AnalysisError::Solver(SolverError::Singular { .. })));
    assert!(err.is_recoverable());

    let mut soe = LinearSoe::new(StorageScheme::ProfileSpd, SolverKind::ProfileCholesky).unwrap();
    soe.set_size(2, &[vec![0, 1]], 1);
    soe.add_a(&DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]), &map, 1.0)
        .unwrap();
    let err = soe.solve().unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Solver(SolverError::NotPositiveDefinite { .. })
    ));
}

#[test]
fn test_coupling_outside_sized_storage_rejected() {
    // sized for a chain 0-1-2, then asked to couple 0 and 2
    for (scheme, solver) in [
        (StorageScheme::BandGeneral, SolverKind::BandLu),
        (StorageScheme::ProfileSpd, SolverKind::ProfileCholesky),
    ] {
        let mut soe = LinearSoe::new(scheme, solver).unwrap();
        soe.set_size(3, &[vec![0, 1], vec![1, 2]], 1);
        let map = ScatterMap::new(vec![Some(0), Some(2)], 1);
        let err = soe
            .add_a(&DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]), &map, 1.0)
            .unwrap_err();
        assert!(
            matches!(err, AnalysisError::Solver(SolverError::OutsideStorage { .. })),
            "{:?}: {:?}",
            scheme,
            err
        );
        assert!(!err.is_recoverable());
    }
}

#[test]
fn test_incompatible_pairing_rejected() {
    let err = LinearSoe::new(StorageScheme::BandGeneral, SolverKind::ProfileCholesky).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Solver(SolverError::Incompatible { .. })
    ));
}
