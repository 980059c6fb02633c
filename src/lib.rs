//! FEA Analysis - the analysis core of a finite element engine
//!
//! Given a [`domain::Domain`] of nodes, elements, constraints and load
//! patterns, this library:
//! - numbers the unknowns (plain or reverse Cuthill-McKee)
//! - enforces constraints (plain, penalty, Lagrange, transformation)
//! - assembles and solves the linear system (band, profile, sparse, iterative)
//! - integrates in load (load, displacement and arc-length control) or in
//!   time (Newmark, HHT, generalized-alpha, central difference)
//! - iterates to equilibrium (linear, Newton-Raphson, modified Newton,
//!   Newton with line search)
//! - extracts modes from `K phi = lambda M phi`
//!
//! ## Example
//! ```rust
//! use fea_analysis::prelude::*;
//!
//! let mut domain = Domain::new();
//! domain.add_node(1, Node::new(1, &[0.0])).unwrap();
//! domain.add_node(2, Node::new(1, &[1.0])).unwrap();
//! domain.add_element(1, Spring::linear(1, 2, 0, 100.0)).unwrap();
//! domain.fix(1, &[0]).unwrap();
//! domain
//!     .add_load_pattern(1, LoadPattern::new(TimeSeries::linear()).with_nodal_load(2, &[10.0]))
//!     .unwrap();
//!
//! let config = AnalysisConfig::static_analysis(IntegratorConfig::load_control(1.0));
//! let mut analysis = Analysis::new(config).unwrap();
//! analysis.analyze_static(&mut domain, 1).unwrap();
//!
//! let u = domain.node(2).unwrap().committed().disp[0];
//! assert!((u - 0.1).abs() < 1e-12);
//! ```

pub mod algorithm;
pub mod analysis;
pub mod domain;
pub mod elements;
pub mod error;
pub mod integrator;
pub mod results;
pub mod system;

// Re-export common types
pub mod prelude {
    pub use crate::algorithm::{AlgorithmConfig, LineSearch, LineSearchMethod, TestConfig, TestKind};
    pub use crate::analysis::{
        Analysis, AnalysisConfig, AnalysisModel, AssemblyMode, ConstraintHandler, Numberer, StiffnessKind,
    };
    pub use crate::domain::{Domain, LoadPattern, MpConstraint, Node, SpConstraint, TimeSeries};
    pub use crate::elements::{Element, MassFormulation, RayleighFactors, Spring, SpringLaw, Truss};
    pub use crate::error::{AnalysisError, AnalysisResult};
    pub use crate::integrator::IntegratorConfig;
    pub use crate::results::{AnalysisReport, EigenResults, StepReport};
    pub use crate::system::{SolverKind, StorageScheme};
}
