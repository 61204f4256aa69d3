//! Integration tests for the subgraph solver
//!
//! These tests exercise the public API end to end: graph construction, splitting,
//! elimination and the preconditioned conjugate gradient solve. Results are checked
//! against exact references, either the eliminated tree itself or a dense normal
//! equations solve.
//!
//! # Test Coverage
//!
//! - **Trees**: a graph with no loops is solved exactly by elimination alone
//! - **Loops**: small and random loopy graphs match the dense least-squares optimum
//! - **Partition**: every factor lands in exactly one half, forests have the right size
//! - **Failures**: malformed factors and unconstrained variables are reported by kind
//! - **API contracts**: warm starts are ignored, the graph overload is inert, Bayes nets
//!   can be shared between solvers

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, dvector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use subgraph_solver::core::{DsfMap, GaussianFactorGraph, Key, KeyInfo, Ordering, VectorValues};
use subgraph_solver::linalg::eliminate_sequential;
use subgraph_solver::optimizer::split_graph;
use subgraph_solver::{
    BetweenFactor, ConvergenceStatus, ErrorKind, IterativeSolver, JacobianFactor, PriorFactor,
    SubgraphSolver, SubgraphSolverConfig,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn x(i: u64) -> Key {
    Key::symbol('x', i)
}

fn tight_config() -> SubgraphSolverConfig {
    SubgraphSolverConfig::new()
        .with_max_iterations(100)
        .with_relative_tolerance(1e-12)
        .with_absolute_tolerance(1e-24)
}

/// Least-squares optimum by dense normal equations, independent of the library's solvers.
fn dense_solution(graph: &GaussianFactorGraph) -> Result<VectorValues, Box<dyn std::error::Error>> {
    let key_info = KeyInfo::from_graph(graph)?;
    let mut a = DMatrix::<f64>::zeros(graph.rows(), key_info.total_dim());
    let mut b = DVector::<f64>::zeros(graph.rows());

    let mut row = 0;
    for factor in graph {
        for (key, block) in factor.terms() {
            let start = key_info.get(key).ok_or("unknown key")?.start;
            a.view_mut((row, start), block.shape()).copy_from(block);
        }
        b.rows_mut(row, factor.rows()).copy_from(factor.rhs());
        row += factor.rows();
    }

    let normal = a.transpose() * &a;
    let rhs = a.transpose() * b;
    let flat = normal
        .cholesky()
        .ok_or("normal equations not positive definite")?
        .solve(&rhs);
    Ok(VectorValues::from_flat_vector(&flat, &key_info)?)
}

fn chain(length: u64) -> Result<GaussianFactorGraph, Box<dyn std::error::Error>> {
    let mut graph = GaussianFactorGraph::new();
    graph.add(&PriorFactor::new(x(0), dvector![0.0, 0.0]).with_sigma(0.1))?;
    for i in 0..length {
        let z = dvector![1.0, 0.1 * i as f64];
        graph.add(&BetweenFactor::new(x(i), x(i + 1), z).with_sigma(0.5))?;
    }
    Ok(graph)
}

fn triangle() -> Result<GaussianFactorGraph, Box<dyn std::error::Error>> {
    let mut graph = GaussianFactorGraph::new();
    graph.add(&PriorFactor::new(x(0), dvector![0.0, 0.0]))?;
    graph.add(&BetweenFactor::new(x(0), x(1), dvector![1.0, 0.0]))?;
    graph.add(&BetweenFactor::new(x(1), x(2), dvector![0.0, 1.0]))?;
    graph.add(&BetweenFactor::new(x(2), x(0), dvector![-0.9, -1.2]).with_sigma(0.7))?;
    Ok(graph)
}

/// Connected random graph: a random spanning path plus `extra` random edges.
fn random_graph(
    variables: u64,
    extra: usize,
    seed: u64,
) -> Result<GaussianFactorGraph, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let measurement =
        |rng: &mut StdRng| dvector![rng.random_range(-2.0..2.0), rng.random_range(-2.0..2.0)];

    let mut graph = GaussianFactorGraph::new();
    graph.add(&PriorFactor::new(x(0), dvector![0.0, 0.0]))?;
    for i in 1..variables {
        let parent = rng.random_range(0..i);
        graph.add(&BetweenFactor::new(x(parent), x(i), measurement(&mut rng)))?;
    }
    for _ in 0..extra {
        let a = rng.random_range(0..variables);
        let b = (a + rng.random_range(1..variables)) % variables;
        let sigma = rng.random_range(0.2..2.0);
        graph.add(&BetweenFactor::new(x(a), x(b), measurement(&mut rng)).with_sigma(sigma))?;
    }
    Ok(graph)
}

#[test]
fn test_tree_graph_matches_elimination() -> TestResult {
    let graph = chain(6)?;
    let ordering = Ordering::natural(&graph);
    let solver = SubgraphSolver::new(&graph, SubgraphSolverConfig::default(), &ordering)?;

    assert!(solver.preconditioner().constraints().is_empty());
    let expected = eliminate_sequential(&graph, &ordering)?.optimize();
    let (solution, summary) = solver.optimize_with_summary();

    assert!(solution.equals(&expected, 1e-12));
    assert_eq!(summary.conjugate_gradient.status, ConvergenceStatus::Converged);
    assert_eq!(summary.conjugate_gradient.iterations, 0);
    Ok(())
}

#[test]
fn test_no_constraints_returns_tree_solution() -> TestResult {
    let graph = chain(3)?;
    let solver = SubgraphSolver::new(
        &graph,
        SubgraphSolverConfig::default(),
        &Ordering::natural(&graph),
    )?;
    let xbar = solver.preconditioner().xbar();
    assert_eq!(&solver.optimize(), xbar.as_ref());
    Ok(())
}

#[test]
fn test_triangle_matches_dense_solution() -> TestResult {
    let graph = triangle()?;
    let solver = SubgraphSolver::new(&graph, tight_config(), &Ordering::natural(&graph))?;
    assert_eq!(solver.preconditioner().constraints().len(), 1);

    let solution = solver.optimize();
    let expected = dense_solution(&graph)?;
    assert!(
        solution.max_abs_difference(&expected) < 1e-8,
        "deviation {:.3e}",
        solution.max_abs_difference(&expected)
    );
    Ok(())
}

#[test]
fn test_random_loopy_graphs_match_dense_solution() -> TestResult {
    for seed in 0..5 {
        let graph = random_graph(12, 10, seed)?;
        let solver = SubgraphSolver::new(&graph, tight_config(), &Ordering::natural(&graph))?;
        let solution = solver.optimize();
        let expected = dense_solution(&graph)?;
        let deviation = solution.max_abs_difference(&expected);
        assert!(deviation < 1e-6, "seed {seed}: deviation {deviation:.3e}");
    }
    Ok(())
}

#[test]
fn test_reverse_ordering_gives_same_solution() -> TestResult {
    let graph = random_graph(8, 5, 11)?;
    let natural = Ordering::natural(&graph);
    let reversed = Ordering::new(natural.iter().collect::<Vec<_>>().into_iter().rev())?;

    let a = SubgraphSolver::new(&graph, tight_config(), &natural)?.optimize();
    let b = SubgraphSolver::new(&graph, tight_config(), &reversed)?.optimize();
    assert!(a.max_abs_difference(&b) < 1e-8);
    Ok(())
}

#[test]
fn test_split_partitions_every_factor() -> TestResult {
    let graph = random_graph(15, 20, 3)?;
    let split = split_graph(&graph)?;
    assert_eq!(split.tree.len() + split.constraints.len(), graph.len());

    // each factor appears in exactly one half
    for factor in &graph {
        let in_tree = split.tree.iter().filter(|f| Arc::ptr_eq(f, factor)).count();
        let in_constraints = split.constraints.iter().filter(|f| Arc::ptr_eq(f, factor)).count();
        assert_eq!(in_tree + in_constraints, 1);
    }
    assert!(split.constraints.iter().all(|f| f.arity() == 2));
    Ok(())
}

#[test]
fn test_split_tree_is_spanning_forest() -> TestResult {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..10 {
        let variables = rng.random_range(2..20u64);
        let edges = rng.random_range(0..30);
        let mut graph = GaussianFactorGraph::new();
        let mut components: DsfMap<Key> = DsfMap::new();
        for i in 0..variables {
            components.find(&x(i));
        }
        graph.add(&PriorFactor::new(x(0), dvector![0.0]))?;
        for _ in 0..edges {
            let a = rng.random_range(0..variables);
            let b = rng.random_range(0..variables);
            if a == b {
                continue;
            }
            components.merge(&x(a), &x(b));
            graph.add(&BetweenFactor::new(x(a), x(b), dvector![1.0]))?;
        }

        let split = split_graph(&graph)?;
        let tree_edges = split.tree.iter().filter(|f| f.arity() == 2).count();
        let component_count = components.sets().len();
        assert_eq!(tree_edges, variables as usize - component_count);
    }
    Ok(())
}

#[test]
fn test_ternary_factor_is_malformed() -> TestResult {
    let mut graph = chain(2)?;
    let eye = DMatrix::<f64>::identity(2, 2);
    graph.push(JacobianFactor::new(
        vec![(x(0), eye.clone()), (x(1), eye.clone()), (x(2), eye)],
        dvector![0.0, 0.0],
    )?);

    let result = SubgraphSolver::new(
        &graph,
        SubgraphSolverConfig::default(),
        &Ordering::natural(&graph),
    );
    let Err(error) = result else {
        return Err("ternary factor was accepted".into());
    };
    assert_eq!(error.kind(), ErrorKind::MalformedFactor);
    Ok(())
}

#[test]
fn test_unanchored_graph_is_singular() -> TestResult {
    let mut graph = GaussianFactorGraph::new();
    graph.add(&BetweenFactor::new(x(0), x(1), dvector![1.0, 0.0]))?;
    graph.add(&BetweenFactor::new(x(1), x(2), dvector![1.0, 0.0]))?;

    let result = SubgraphSolver::new(
        &graph,
        SubgraphSolverConfig::default(),
        &Ordering::natural(&graph),
    );
    let Err(error) = result else {
        return Err("graph without prior was accepted".into());
    };
    assert_eq!(error.kind(), ErrorKind::SingularSystem);
    Ok(())
}

#[test]
fn test_conflicting_dimensions_are_invalid_input() -> TestResult {
    let mut graph = chain(2)?;
    graph.add(&PriorFactor::new(x(1), dvector![0.0]))?;

    let result = SubgraphSolver::new(
        &graph,
        SubgraphSolverConfig::default(),
        &Ordering::natural(&graph),
    );
    let Err(error) = result else {
        return Err("variable with two dimensions was accepted".into());
    };
    assert_eq!(error.kind(), ErrorKind::InvalidInput);
    Ok(())
}

#[test]
fn test_large_offsets_solve_without_singularity() -> TestResult {
    let mut graph = GaussianFactorGraph::new();
    graph.add(&PriorFactor::new(x(0), dvector![1e11, -1e11]))?;
    graph.add(&BetweenFactor::new(x(0), x(1), dvector![1.0, 0.0]))?;
    graph.add(&BetweenFactor::new(x(1), x(2), dvector![0.0, 1.0]))?;
    graph.add(&BetweenFactor::new(x(0), x(2), dvector![1.0, 1.0]))?;

    let solver = SubgraphSolver::new(&graph, tight_config(), &Ordering::natural(&graph))?;
    let solution = solver.optimize();
    let x2 = solution.at(x(2))?;
    assert!((x2[0] - (1e11 + 1.0)).abs() < 1e-3);
    assert!((x2[1] - (-1e11 + 1.0)).abs() < 1e-3);
    Ok(())
}

#[test]
fn test_warm_start_is_ignored() -> TestResult {
    let graph = triangle()?;
    let solver = SubgraphSolver::new(&graph, tight_config(), &Ordering::natural(&graph))?;

    let near: VectorValues = dense_solution(&graph)?;
    let far: VectorValues = [(x(0), dvector![50.0, -50.0]), (x(2), dvector![1e3, 1e3])]
        .into_iter()
        .collect();
    assert_eq!(solver.optimize_from(&near), solver.optimize_from(&far));
    assert_eq!(solver.optimize_from(&far), solver.optimize());
    Ok(())
}

#[test]
fn test_tree_baseline_is_x_of_zero() -> TestResult {
    let graph = random_graph(6, 4, 5)?;
    let solver = SubgraphSolver::new(&graph, tight_config(), &Ordering::natural(&graph))?;
    let precond = solver.preconditioner();
    assert!(precond.x(&precond.zero()).equals(precond.xbar(), 1e-14));
    Ok(())
}

#[test]
fn test_graph_overload_returns_empty() -> TestResult {
    let graph = triangle()?;
    let solver = SubgraphSolver::new(&graph, tight_config(), &Ordering::natural(&graph))?;
    let key_info = KeyInfo::from_graph(&graph)?;
    let lambda: BTreeMap<Key, DVector<f64>> = BTreeMap::new();

    let result = solver.optimize_graph(&graph, &key_info, &lambda, &VectorValues::new());
    assert!(result.is_empty());
    Ok(())
}

#[test]
fn test_shared_bayes_net_across_solvers() -> TestResult {
    let graph = triangle()?;
    let split = split_graph(&graph)?;
    let tree = Arc::new(eliminate_sequential(&split.tree, &Ordering::natural(&split.tree))?);
    let constraints = Arc::new(split.constraints);

    let loose = SubgraphSolver::from_bayes_net(
        tree.clone(),
        constraints.clone(),
        SubgraphSolverConfig::new().with_max_iterations(1),
    )?;
    let exact = SubgraphSolver::from_bayes_net(tree.clone(), constraints, tight_config())?;

    assert!(Arc::ptr_eq(loose.preconditioner().tree(), &tree));
    assert!(Arc::ptr_eq(exact.preconditioner().tree(), &tree));
    assert!(exact.optimize().max_abs_difference(&dense_solution(&graph)?) < 1e-8);
    assert_eq!(loose.optimize().len(), 3);
    Ok(())
}

#[test]
fn test_caller_provided_split() -> TestResult {
    let graph = triangle()?;
    let split = split_graph(&graph)?;
    let solver = SubgraphSolver::from_split(
        &split.tree,
        split.constraints.clone(),
        tight_config(),
        &Ordering::natural(&split.tree),
    )?;
    assert!(solver.optimize().max_abs_difference(&dense_solution(&graph)?) < 1e-8);
    Ok(())
}

#[test]
fn test_iteration_cap_is_not_an_error() -> TestResult {
    let graph = random_graph(20, 25, 8)?;
    let config = SubgraphSolverConfig::new()
        .with_max_iterations(1)
        .with_tolerance(1e-30);
    let solver = SubgraphSolver::new(&graph, config, &Ordering::natural(&graph))?;
    let (solution, summary) = solver.optimize_with_summary();

    assert_eq!(summary.conjugate_gradient.status, ConvergenceStatus::MaxIterationsReached);
    assert_eq!(summary.conjugate_gradient.iterations, 1);
    assert_eq!(solution.len(), 20);
    Ok(())
}
