//! FEA Analysis Example - oscillator and hardening-spring pushover

use anyhow::Result;
use fea_analysis::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    oscillator()?;
    pushover()?;
    Ok(())
}

/// Single degree of freedom oscillator released from an initial displacement
///
///   |--/\/\/\--[m]
///     k = 4 pi^2, m = 1  (period 1 s)
fn oscillator() -> Result<()> {
    println!("=== Free vibration: Newmark average acceleration ===\n");

    let mut domain = Domain::new();
    domain.add_node(1, Node::new(1, &[0.0]))?;
    domain.add_node(2, Node::new(1, &[1.0]).with_mass(1.0).with_initial_disp(&[1.0]))?;
    domain.add_element(1, Spring::linear(1, 2, 0, 4.0 * std::f64::consts::PI.powi(2)))?;
    domain.fix(1, &[0])?;

    let config = AnalysisConfig::transient_analysis(IntegratorConfig::average_acceleration());
    let mut analysis = Analysis::new(config)?;

    let modes = analysis.eigen(&mut domain, 1)?;
    println!("Period from eigen analysis: {:.6} s", modes.periods()[0]);

    let dt = 0.01;
    for quarter in 1..=4 {
        analysis.analyze_transient(&mut domain, 25, dt)?;
        let node = domain.node(2)?;
        println!(
            "t = {:.2} s: u = {:+.4}, v = {:+.4}",
            quarter as f64 * 0.25,
            node.committed().disp[0],
            node.committed().vel[0]
        );
    }
    println!();
    Ok(())
}

/// Cubic hardening spring pushed to a load factor of 1
fn pushover() -> Result<()> {
    println!("=== Pushover: hardening spring, Newton-Raphson ===\n");

    let mut domain = Domain::new();
    domain.add_node(1, Node::new(1, &[0.0]))?;
    domain.add_node(2, Node::new(1, &[1.0]))?;
    domain.add_element(1, Spring::new(1, 2, 0, SpringLaw::Cubic { k: 100.0, k3: 1000.0 }))?;
    domain.fix(1, &[0])?;
    domain.add_load_pattern(1, LoadPattern::new(TimeSeries::linear()).with_nodal_load(2, &[150.0]))?;

    let config = AnalysisConfig::static_analysis(IntegratorConfig::load_control(0.1))
        .with_test(TestConfig::norm_unbalance(1e-10, 20));
    let mut analysis = Analysis::new(config)?;
    let report = analysis.analyze_static(&mut domain, 10)?;

    println!("{:>6} {:>10} {:>12}", "step", "iters", "lambda");
    for step in &report.steps {
        println!("{:>6} {:>10} {:>12.6}", step.step, step.iterations, step.time);
    }
    println!(
        "\nFinal displacement: {:.6} ({} iterations total)",
        domain.node(2)?.committed().disp[0],
        report.total_iterations()
    );
    Ok(())
}
