//! Benchmarks for assembly and the linear solvers

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fea_analysis::prelude::*;

/// Planar truss girder with `panels` panels, pinned at the left, roller at the right
fn create_truss_girder(panels: usize) -> Domain {
    let mut domain = Domain::new();
    let bottom = |i: usize| 2 * i + 1;
    let top = |i: usize| 2 * i + 2;

    for i in 0..=panels {
        let x = i as f64 * 4.0;
        domain.add_node(bottom(i), Node::new(2, &[x, 0.0])).unwrap();
        domain.add_node(top(i), Node::new(2, &[x, 3.0])).unwrap();
    }

    let (e, a) = (200e9, 2.5e-3);
    let mut tag = 0;
    let mut add = |domain: &mut Domain, i: usize, j: usize| {
        tag += 1;
        domain.add_element(tag, Truss::new(i, j, e, a)).unwrap();
    };
    for i in 0..=panels {
        add(&mut domain, bottom(i), top(i));
        if i < panels {
            add(&mut domain, bottom(i), bottom(i + 1));
            add(&mut domain, top(i), top(i + 1));
            add(&mut domain, bottom(i), top(i + 1));
        }
    }

    domain.fix(bottom(0), &[0, 1]).unwrap();
    domain.fix(bottom(panels), &[1]).unwrap();

    let mut pattern = LoadPattern::new(TimeSeries::linear());
    for i in 1..panels {
        pattern = pattern.with_nodal_load(bottom(i), &[0.0, -50e3]);
    }
    domain.add_load_pattern(1, pattern).unwrap();
    domain
}

fn run_linear(panels: usize, storage: StorageScheme, solver: SolverKind) {
    let mut domain = create_truss_girder(panels);
    let config = AnalysisConfig::static_analysis(IntegratorConfig::load_control(1.0))
        .with_system(storage, solver)
        .with_algorithm(AlgorithmConfig::Linear);
    let mut analysis = Analysis::new(config).unwrap();
    analysis.analyze_static(&mut domain, 1).unwrap();
    black_box(&domain);
}

fn benchmark_small_girder(c: &mut Criterion) {
    c.bench_function("girder_10_panels_band", |b| {
        b.iter(|| run_linear(10, StorageScheme::BandGeneral, SolverKind::BandLu))
    });
}

fn benchmark_solvers(c: &mut Criterion) {
    let mut group = c.benchmark_group("girder_200_panels");
    group.bench_function("band_lu", |b| {
        b.iter(|| run_linear(200, StorageScheme::BandGeneral, SolverKind::BandLu))
    });
    group.bench_function("profile_cholesky", |b| {
        b.iter(|| run_linear(200, StorageScheme::ProfileSpd, SolverKind::ProfileCholesky))
    });
    group.bench_function("sparse_cholesky", |b| {
        b.iter(|| run_linear(200, StorageScheme::SparseGeneral, SolverKind::SparseCholesky))
    });
    group.bench_function("sparse_cg", |b| {
        b.iter(|| run_linear(200, StorageScheme::SparseGeneral, SolverKind::cg()))
    });
    group.finish();
}

fn benchmark_partitioned_assembly(c: &mut Criterion) {
    c.bench_function("girder_500_panels_partitioned", |b| {
        b.iter(|| {
            let mut domain = create_truss_girder(500);
            let config = AnalysisConfig::default()
                .with_assembly(AssemblyMode::Partitioned { partitions: 8 })
                .with_algorithm(AlgorithmConfig::Linear);
            let mut analysis = Analysis::new(config).unwrap();
            analysis.analyze_static(&mut domain, 1).unwrap();
            black_box(&domain);
        })
    });
}

criterion_group!(
    benches,
    benchmark_small_girder,
    benchmark_solvers,
    benchmark_partitioned_assembly,
);

criterion_main!(benches);
