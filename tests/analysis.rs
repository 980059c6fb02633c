use approx::assert_relative_eq;
use fea_analysis::analysis::AssemblyRequest;
use fea_analysis::prelude::*;
use fea_analysis::system::LinearSoe;

/// Springs in series along x, node 1 fixed, unit load at the free end
fn chain(n: usize, k: f64) -> Domain {
    let mut domain = Domain::new();
    for tag in 1..=n + 1 {
        domain.add_node(tag, Node::new(1, &[tag as f64]).with_mass(1.0)).unwrap();
    }
    for tag in 1..=n {
        domain.add_element(tag, Spring::linear(tag, tag + 1, 0, k)).unwrap();
    }
    domain.fix(1, &[0]).unwrap();
    domain
        .add_load_pattern(1, LoadPattern::new(TimeSeries::linear()).with_nodal_load(n + 1, &[1.0]))
        .unwrap();
    domain
}

fn displacements(domain: &Domain) -> Vec<f64> {
    domain.nodes().map(|(_, node)| node.committed().disp[0]).collect()
}

#[test]
fn test_chain_matches_closed_form() {
    let (n, k) = (20, 50.0);
    for numberer in [Numberer::Plain, Numberer::ReverseCuthillMcKee] {
        let mut domain = chain(n, k);
        let config = AnalysisConfig::default().with_numberer(numberer);
        let mut analysis = Analysis::new(config).unwrap();
        analysis.analyze_static(&mut domain, 1).unwrap();

        assert_eq!(analysis.model().num_eqn(), n);
        for (i, u) in displacements(&domain).into_iter().enumerate() {
            assert_relative_eq!(u, i as f64 / k, epsilon = 1e-12);
        }
        // a chain numbered well has a half bandwidth of one
        if numberer == Numberer::ReverseCuthillMcKee {
            assert_eq!(analysis.soe().bandwidth(), Some((1, 1)));
        }
    }
}

#[test]
fn test_partitioned_assembly_is_deterministic() {
    let run = |assembly: AssemblyMode| {
        let mut domain = chain(40, 10.0);
        let config = AnalysisConfig::default().with_assembly(assembly);
        let mut analysis = Analysis::new(config).unwrap();
        analysis.analyze_static(&mut domain, 3).unwrap();
        displacements(&domain)
    };

    let sequential = run(AssemblyMode::Sequential);
    for partitions in [1, 3, 8] {
        let partitioned = run(AssemblyMode::Partitioned { partitions });
        assert_eq!(partitioned, sequential);
    }
}

#[test]
fn test_stale_numbering_detected() {
    let mut domain = chain(3, 10.0);
    let mut model = AnalysisModel::new();
    let mut soe = LinearSoe::new(StorageScheme::BandGeneral, SolverKind::BandLu).unwrap();
    model
        .domain_changed(&domain, &ConstraintHandler::Plain, &Numberer::Plain, &mut soe)
        .unwrap();
    let old_map = model.fe_groups()[0].scatter_map().clone();

    // structural change: the model must be renumbered before assembling
    domain.remove_element(3).unwrap();
    let err = model
        .form_tangent(&domain, &mut soe, &AssemblyRequest::stiffness(), AssemblyMode::Sequential)
        .unwrap_err();
    assert!(matches!(err, AnalysisError::DomainNotNumbered));

    model
        .domain_changed(&domain, &ConstraintHandler::Plain, &Numberer::Plain, &mut soe)
        .unwrap();
    let m = nalgebra::DMatrix::zeros(old_map.len(), old_map.len());
    let err = soe.add_a(&m, &old_map, 1.0).unwrap_err();
    assert!(matches!(err, AnalysisError::StaleNumbering { .. }));
}

#[test]
fn test_deactivated_element_leaves_system() {
    let k = 100.0;
    let mut domain = Domain::new();
    domain.add_node(1, Node::new(1, &[0.0])).unwrap();
    domain.add_node(2, Node::new(1, &[1.0])).unwrap();
    domain.add_element(1, Spring::linear(1, 2, 0, k)).unwrap();
    domain.add_element(2, Spring::linear(1, 2, 0, k)).unwrap();
    domain.fix(1, &[0]).unwrap();
    domain
        .add_load_pattern(1, LoadPattern::new(TimeSeries::linear()).with_nodal_load(2, &[10.0]))
        .unwrap();

    let mut analysis = Analysis::new(AnalysisConfig::default()).unwrap();
    analysis.analyze_static(&mut domain, 1).unwrap();
    assert_relative_eq!(domain.node(2).unwrap().committed().disp[0], 10.0 / (2.0 * k), epsilon = 1e-12);

    // one spring left, load factor 2
    domain.deactivate_element(2).unwrap();
    assert!(!analysis.model().is_current(&domain));
    analysis.analyze_static(&mut domain, 1).unwrap();
    assert!(analysis.model().is_current(&domain));
    assert_eq!(analysis.model().fe_groups().len(), 1);
    assert_relative_eq!(domain.node(2).unwrap().committed().disp[0], 20.0 / k, epsilon = 1e-12);
}

#[test]
fn test_added_node_picked_up_between_steps() {
    let mut domain = chain(2, 10.0);
    let mut analysis = Analysis::new(AnalysisConfig::default()).unwrap();
    analysis.analyze_static(&mut domain, 1).unwrap();
    assert_eq!(analysis.model().num_eqn(), 2);

    domain.add_node(4, Node::new(1, &[4.0])).unwrap();
    domain.add_element(3, Spring::linear(3, 4, 0, 10.0)).unwrap();
    analysis.analyze_static(&mut domain, 1).unwrap();
    assert_eq!(analysis.model().num_eqn(), 3);

    // the load stays on node 3, so the new spring carries nothing
    let u = displacements(&domain);
    assert_relative_eq!(u[2], 2.0 * 2.0 / 10.0, epsilon = 1e-12);
    assert_relative_eq!(u[3], u[2], epsilon = 1e-12);
}

#[test]
fn test_eigen_two_dof_chain() {
    let mut domain = chain(2, 1.0);
    let mut analysis = Analysis::new(AnalysisConfig::default()).unwrap();
    let results = analysis.eigen(&mut domain, 2).unwrap();

    let s5 = 5.0_f64.sqrt();
    assert_eq!(results.num_modes(), 2);
    assert_relative_eq!(results.eigenvalues[0], (3.0 - s5) / 2.0, epsilon = 1e-10);
    assert_relative_eq!(results.eigenvalues[1], (3.0 + s5) / 2.0, epsilon = 1e-10);
    assert_relative_eq!(
        results.angular_frequencies()[0],
        ((3.0 - s5) / 2.0).sqrt(),
        epsilon = 1e-10
    );

    // unit mass matrix: mass-normalized modes have unit norm
    for mode in &results.modes {
        assert_relative_eq!(mode.norm(), 1.0, epsilon = 1e-10);
    }
    assert!(domain.node(3).unwrap().eigenvector(1).is_some());
    assert!(analysis.eigen(&mut domain, 3).is_err());
}

#[test]
fn test_eigen_rejects_lagrange_multipliers() {
    let mut domain = chain(2, 1.0);
    let config = AnalysisConfig::default().with_handler(ConstraintHandler::lagrange());
    let mut analysis = Analysis::new(config).unwrap();
    let err = analysis.eigen(&mut domain, 1).unwrap_err();
    assert!(matches!(err, AnalysisError::Configuration(_)));
}

#[test]
fn test_config_json_round_trip() {
    let config = AnalysisConfig::transient_analysis(IntegratorConfig::hht(0.8))
        .with_system(StorageScheme::SparseGeneral, SolverKind::gmres())
        .with_numberer(Numberer::Plain)
        .with_assembly(AssemblyMode::Partitioned { partitions: 4 })
        .with_rayleigh(RayleighFactors::new(0.1, 0.002))
        .with_handler(ConstraintHandler::penalty(1e10))
        .with_algorithm(AlgorithmConfig::newton_line_search(LineSearch::new(LineSearchMethod::Bisection)))
        .with_test(TestConfig::energy_incr(1e-12, 40).with_print());

    let json = config.to_json().unwrap();
    let restored = AnalysisConfig::from_json(&json).unwrap();
    assert_eq!(restored, config);
    assert!(Analysis::new(restored).is_ok());

    let err = AnalysisConfig::from_json("{\"storage\": 3}").unwrap_err();
    assert!(matches!(err, AnalysisError::SerializationError(_)));
}

#[test]
fn test_two_bar_truss() {
    let (e, a, p) = (200e9, 1e-3, 10e3);
    let mut domain = Domain::new();
    domain.add_node(1, Node::new(2, &[0.0, 0.0])).unwrap();
    domain.add_node(2, Node::new(2, &[2.0, 0.0])).unwrap();
    domain.add_node(3, Node::new(2, &[1.0, 1.0])).unwrap();
    domain.add_element(1, Truss::new(1, 3, e, a)).unwrap();
    domain.add_element(2, Truss::new(2, 3, e, a)).unwrap();
    domain.fix(1, &[0, 1]).unwrap();
    domain.fix(2, &[0, 1]).unwrap();
    domain
        .add_load_pattern(1, LoadPattern::new(TimeSeries::linear()).with_nodal_load(3, &[0.0, -p]))
        .unwrap();

    let config = AnalysisConfig::default()
        .with_system(StorageScheme::ProfileSpd, SolverKind::ProfileCholesky)
        .with_algorithm(AlgorithmConfig::Linear);
    let mut analysis = Analysis::new(config).unwrap();
    analysis.analyze_static(&mut domain, 1).unwrap();

    // each bar shortens by p / sqrt(2) * L / EA, with L = sqrt(2)
    let u = &domain.node(3).unwrap().committed().disp;
    assert_relative_eq!(u[0], 0.0, epsilon = 1e-15);
    assert_relative_eq!(u[1], -p * 2.0_f64.sqrt() / (e * a), max_relative = 1e-10);

    domain.calculate_reactions(false).unwrap();
    let r1 = domain.node(1).unwrap().reaction().unwrap().clone();
    assert_relative_eq!(r1[1], p / 2.0, max_relative = 1e-10);
    assert_relative_eq!(r1[0], p / 2.0, max_relative = 1e-10);
}
