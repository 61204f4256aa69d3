//! Subgraph-preconditioned conjugate gradient solver.
//!
//! The solver splits a linear factor graph into a spanning tree and the loop-closing
//! constraints, eliminates the tree directly, and runs conjugate gradient on the
//! preconditioned system defined by the tree's Bayes net. For pose graphs with few loop
//! closures this converges in a handful of iterations while only ever factorizing a tree.
//!
//! # Example
//!
//! ```
//! use subgraph_solver::core::{GaussianFactorGraph, Key, Ordering};
//! use subgraph_solver::factors::{BetweenFactor, PriorFactor};
//! use subgraph_solver::optimizer::{SubgraphSolver, SubgraphSolverConfig};
//! use nalgebra::dvector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let x = |i| Key::symbol('x', i);
//! let mut graph = GaussianFactorGraph::new();
//! graph.add(&PriorFactor::new(x(0), dvector![0.0]))?;
//! graph.add(&BetweenFactor::new(x(0), x(1), dvector![1.0]))?;
//! graph.add(&BetweenFactor::new(x(1), x(2), dvector![1.0]))?;
//! graph.add(&BetweenFactor::new(x(0), x(2), dvector![2.1]))?;
//!
//! let ordering = Ordering::natural(&graph);
//! let solver = SubgraphSolver::new(&graph, SubgraphSolverConfig::default(), &ordering)?;
//! let solution = solver.optimize();
//! assert_eq!(solution.len(), 3);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use nalgebra::DVector;
use tracing::info;
use web_time as time;

use crate::core::{GaussianFactorGraph, Key, KeyInfo, Ordering, VectorValues};
use crate::error::SubgraphResult;
use crate::linalg::{GaussianBayesNet, eliminate_sequential};
use crate::optimizer::{
    ConjugateGradientConfig, ConjugateGradientSummary, IterativeSolver, SubgraphPreconditioner,
    Verbosity, conjugate_gradient, split_graph,
};

/// Configuration of a [`SubgraphSolver`]; the solver is configured entirely by its inner
/// conjugate gradient loop.
pub type SubgraphSolverConfig = ConjugateGradientConfig;

/// Result details of [`SubgraphSolver::optimize_with_summary`].
#[derive(Debug, Clone)]
pub struct SubgraphSolverSummary {
    /// Outcome of the conjugate gradient loop
    pub conjugate_gradient: ConjugateGradientSummary,
    /// Variables eliminated in the tree
    pub tree_variables: usize,
    /// Factors in the constraint graph
    pub constraint_factors: usize,
    /// Cost at the returned solution, without the constant residual of the tree
    pub final_error: f64,
    /// Wall time of the iterative solve
    pub elapsed_time: time::Duration,
}

impl Display for SubgraphSolverSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subgraph Solver Result")?;
        writeln!(f, "  Status:      {}", self.conjugate_gradient.status)?;
        writeln!(f, "  Iterations:  {}", self.conjugate_gradient.iterations)?;
        writeln!(
            f,
            "  |r|:         {:.3e} -> {:.3e}",
            self.conjugate_gradient.initial_residual_norm,
            self.conjugate_gradient.final_residual_norm
        )?;
        writeln!(f, "  Tree size:   {} variables", self.tree_variables)?;
        writeln!(f, "  Constraints: {} factors", self.constraint_factors)?;
        writeln!(f, "  Final error: {:.6e}", self.final_error)?;
        write!(
            f,
            "  Time:        {:.2}ms",
            self.elapsed_time.as_secs_f64() * 1000.0
        )
    }
}

/// Linear least-squares solver preconditioned by a spanning-tree subgraph.
///
/// Construction does all direct work (splitting and elimination). The solver is then
/// immutable; [`SubgraphSolver::optimize`] can be called any number of times.
#[derive(Debug, Clone)]
pub struct SubgraphSolver {
    config: SubgraphSolverConfig,
    preconditioner: SubgraphPreconditioner,
}

impl SubgraphSolver {
    /// Split `graph`, eliminate its spanning tree along `ordering` and build the
    /// preconditioner.
    ///
    /// # Errors
    /// - invalid `config` ([`OptimizerError::InvalidParameters`](crate::optimizer::OptimizerError))
    /// - a factor of arity other than one or two
    ///   ([`CoreError::MalformedFactor`](crate::core::CoreError))
    /// - any elimination failure of the tree, unchanged
    pub fn new(
        graph: &GaussianFactorGraph,
        config: SubgraphSolverConfig,
        ordering: &Ordering,
    ) -> SubgraphResult<Self> {
        config.validate()?;
        let split = split_graph(graph)?;
        if config.verbosity >= Verbosity::Summary {
            info!(
                "Subgraph split: {} tree factors, {} constraint factors",
                split.tree.len(),
                split.constraints.len()
            );
        }
        Self::from_split(&split.tree, split.constraints, config, ordering)
    }

    /// Use a caller-provided partition: eliminate `tree` along `ordering` and treat
    /// `constraints` as the loop closures. No splitting is performed.
    ///
    /// # Errors
    /// Invalid `config`, any elimination failure of `tree`, or a constraint on a variable
    /// the tree does not contain.
    pub fn from_split(
        tree: &GaussianFactorGraph,
        constraints: impl Into<Arc<GaussianFactorGraph>>,
        config: SubgraphSolverConfig,
        ordering: &Ordering,
    ) -> SubgraphResult<Self> {
        config.validate()?;
        let bayes_net = eliminate_sequential(tree, ordering)?;
        Self::from_bayes_net(Arc::new(bayes_net), constraints, config)
    }

    /// Use an already eliminated tree. The Bayes net is shared, not copied, so several
    /// solvers can be built on the same factorization.
    ///
    /// # Errors
    /// Invalid `config`, or a constraint on a variable the Bayes net does not contain.
    pub fn from_bayes_net(
        tree: Arc<GaussianBayesNet>,
        constraints: impl Into<Arc<GaussianFactorGraph>>,
        config: SubgraphSolverConfig,
    ) -> SubgraphResult<Self> {
        config.validate()?;
        let preconditioner = SubgraphPreconditioner::new(constraints.into(), tree)?;
        if config.verbosity >= Verbosity::Summary {
            info!(
                "Subgraph preconditioner: {} tree variables, {} constraint factors",
                preconditioner.tree().len(),
                preconditioner.constraints().len()
            );
        }
        config.print_configuration();
        Ok(Self {
            config,
            preconditioner,
        })
    }

    pub fn config(&self) -> &SubgraphSolverConfig {
        &self.config
    }

    pub fn preconditioner(&self) -> &SubgraphPreconditioner {
        &self.preconditioner
    }

    /// Run conjugate gradient from `y = 0` and return the final `y`.
    fn solve(&self) -> (VectorValues, ConjugateGradientSummary) {
        conjugate_gradient(
            &self.preconditioner,
            self.preconditioner.zero(),
            &self.config,
        )
    }

    /// Solve the least-squares problem, starting from the tree solution.
    ///
    /// Hitting the iteration cap is not an error; the current estimate is returned.
    pub fn optimize(&self) -> VectorValues {
        self.preconditioner.x(&self.solve().0)
    }

    /// Same as [`SubgraphSolver::optimize`]. The iteration always starts from the tree
    /// solution; `_initial` is accepted for interface compatibility and ignored.
    pub fn optimize_from(&self, _initial: &VectorValues) -> VectorValues {
        self.optimize()
    }

    /// Solve and report how the iteration went.
    pub fn optimize_with_summary(&self) -> (VectorValues, SubgraphSolverSummary) {
        let start = time::Instant::now();
        let (y, conjugate_gradient) = self.solve();
        let solution = self.preconditioner.x(&y);
        let elapsed_time = start.elapsed();

        let final_error = self.preconditioner.error(&y);
        let summary = SubgraphSolverSummary {
            conjugate_gradient,
            tree_variables: self.preconditioner.tree().len(),
            constraint_factors: self.preconditioner.constraints().len(),
            final_error,
            elapsed_time,
        };
        if self.config.verbosity >= Verbosity::Summary {
            info!("{}", summary);
        }
        (solution, summary)
    }
}

impl IterativeSolver for SubgraphSolver {
    /// Not supported: the subgraph solver works on the system fixed at construction.
    /// Always returns an empty assignment without doing any work.
    fn optimize_graph(
        &self,
        _graph: &GaussianFactorGraph,
        _key_info: &KeyInfo,
        _lambda: &BTreeMap<Key, DVector<f64>>,
        _initial: &VectorValues,
    ) -> VectorValues {
        VectorValues::new()
    }
}
