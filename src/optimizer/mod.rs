//! Iterative solvers for linear least-squares factor graphs.
//!
//! The pieces, from the bottom up:
//! - [`conjugate_gradient`]: a generic conjugate gradient loop over any [`LinearSystem`]
//! - [`graph_splitter`]: partitions a graph into a spanning tree and loop-closing constraints
//! - [`subgraph_preconditioner`]: the change of variables defined by the eliminated tree
//! - [`subgraph_solver`]: the public entry point composing all of the above

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use nalgebra::DVector;
use thiserror::Error;
use tracing::error;

use crate::core::{GaussianFactorGraph, Key, KeyInfo, VectorValues};

pub mod conjugate_gradient;
pub mod graph_splitter;
pub mod subgraph_preconditioner;
pub mod subgraph_solver;

pub use conjugate_gradient::{
    ConjugateGradientConfig, ConjugateGradientSummary, KrylovVector, LinearSystem,
    conjugate_gradient,
};
pub use graph_splitter::{SplitGraph, split_graph};
pub use subgraph_preconditioner::SubgraphPreconditioner;
pub use subgraph_solver::{SubgraphSolver, SubgraphSolverConfig, SubgraphSolverSummary};

/// How much an iterative solver reports through `tracing`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Nothing beyond errors
    #[default]
    Silent,
    /// One line per solve: sizes, iterations and outcome
    Summary,
    /// Additionally one line per iteration
    Iteration,
}

impl Display for Verbosity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Silent => write!(f, "SILENT"),
            Verbosity::Summary => write!(f, "SUMMARY"),
            Verbosity::Iteration => write!(f, "ITERATION"),
        }
    }
}

/// Why an iterative solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Residual fell below the configured tolerance
    Converged,
    /// Iteration cap reached first
    MaxIterationsReached,
    /// The search direction had zero, negative or non-finite curvature, which only an
    /// operator that is not positive definite or non-finite input can produce
    Stagnated,
}

impl Display for ConvergenceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceStatus::Converged => write!(f, "Converged"),
            ConvergenceStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            ConvergenceStatus::Stagnated => write!(f, "Stagnated"),
        }
    }
}

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// config.validate().map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying error that caused it
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Common interface of iterative linear solvers driven by an outer optimization loop.
pub trait IterativeSolver {
    /// Solve a damped linear system.
    ///
    /// `lambda` holds per-variable damping for the outer loop. Implementations that solve a
    /// fixed, pre-built system may ignore every argument.
    fn optimize_graph(
        &self,
        graph: &GaussianFactorGraph,
        key_info: &KeyInfo,
        lambda: &BTreeMap<Key, DVector<f64>>,
        initial: &VectorValues,
    ) -> VectorValues;
}
