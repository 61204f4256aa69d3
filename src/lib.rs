//! # Subgraph Solver
//!
//! Linear least-squares solving for factor graphs with a spanning-tree preconditioned
//! conjugate gradient method.
//!
//! A linear factor graph is split into a spanning tree and a set of loop-closing
//! constraints. The tree is solved exactly by sequential QR elimination, and its
//! triangular factor is used as a change of variables under which conjugate gradient on
//! the remaining constraints converges quickly. This suits pose graphs, grids and other
//! sparse problems whose factors each connect one or two variables.
//!
//! ## Features
//!
//! - **Graph splitting**: Kruskal-style spanning forest over binary factors, unary factors
//!   always kept in the tree
//! - **Sequential elimination**: dense QR per variable producing a Gaussian Bayes net
//! - **Generic conjugate gradient**: restarts, minimum iteration count and mixed
//!   relative/absolute stopping
//! - **Direct reference solvers**: sparse Cholesky and sparse QR on the full system via faer
//!
//! ## Example
//!
//! ```
//! use subgraph_solver::{BetweenFactor, PriorFactor, SubgraphSolver, SubgraphSolverConfig};
//! use subgraph_solver::core::{GaussianFactorGraph, Key, Ordering};
//! use nalgebra::dvector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = GaussianFactorGraph::new();
//! graph.add(&PriorFactor::new(Key::symbol('x', 0), dvector![0.0, 0.0]))?;
//! graph.add(&BetweenFactor::new(Key::symbol('x', 0), Key::symbol('x', 1), dvector![1.0, 0.0]))?;
//!
//! let solver = SubgraphSolver::new(
//!     &graph,
//!     SubgraphSolverConfig::default(),
//!     &Ordering::natural(&graph),
//! )?;
//! let solution = solver.optimize();
//! assert!((solution.at(Key::symbol('x', 1))?[0] - 1.0).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod optimizer;

pub use core::{GaussianFactorGraph, Key, Ordering, VectorValues};
pub use error::{ErrorKind, SubgraphError, SubgraphResult};

pub use factors::{BetweenFactor, Factor, JacobianFactor, PriorFactor};

pub use linalg::{
    GaussianBayesNet, LinearSolverType, SparseCholeskySolver, SparseLinearSolver, SparseQRSolver,
    solve_direct,
};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level, level_for_verbosity};
pub use optimizer::{
    ConjugateGradientConfig, ConvergenceStatus, IterativeSolver, SubgraphSolver,
    SubgraphSolverConfig, SubgraphSolverSummary, Verbosity,
};
