use clap::Parser;
use nalgebra::{DVector, dvector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use web_time::Instant;

use subgraph_solver::core::{GaussianFactorGraph, Key, Ordering, VectorValues};
use subgraph_solver::error::SubgraphResult;
use subgraph_solver::{
    BetweenFactor, ConvergenceStatus, LinearSolverType, PriorFactor, SubgraphSolver,
    SubgraphSolverConfig, Verbosity, init_logger_with_level, level_for_verbosity, solve_direct,
};

#[derive(Parser)]
#[command(name = "subgraph_grid")]
#[command(about = "Solve a noisy 2D grid pose graph with the subgraph-preconditioned solver")]
struct Args {
    /// Number of grid rows
    #[arg(short, long, default_value = "10")]
    rows: u64,

    /// Number of grid columns
    #[arg(short, long, default_value = "10")]
    cols: u64,

    /// Seed for the measurement noise
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Half-width of the uniform noise added to every relative measurement
    #[arg(short, long, default_value = "0.05")]
    noise: f64,

    /// Maximum number of conjugate gradient iterations
    #[arg(short, long, default_value = "500")]
    max_iterations: usize,

    /// Relative and absolute stopping tolerance
    #[arg(short, long, default_value = "1e-6")]
    tolerance: f64,

    /// Direct solver used as reference: "cholesky" or "qr"
    #[arg(long, default_value = "cholesky")]
    reference: String,

    /// Log every conjugate gradient iteration
    #[arg(short, long)]
    verbose: bool,
}

fn grid_key(row: u64, col: u64, cols: u64) -> Key {
    Key::symbol('x', row * cols + col)
}

/// Build a `rows x cols` grid with a prior on the corner and noisy unit offsets between
/// horizontal and vertical neighbours. Returns the graph and the noise-free positions.
fn build_grid(args: &Args) -> SubgraphResult<(GaussianFactorGraph, VectorValues)> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut noisy = |offset: DVector<f64>| -> DVector<f64> {
        offset.map(|v| v + rng.random_range(-args.noise..=args.noise))
    };

    let mut graph = GaussianFactorGraph::new();
    let mut truth = VectorValues::new();
    graph.add(&PriorFactor::new(grid_key(0, 0, args.cols), dvector![0.0, 0.0]).with_sigma(0.01))?;

    for row in 0..args.rows {
        for col in 0..args.cols {
            let key = grid_key(row, col, args.cols);
            truth.insert(key, dvector![col as f64, row as f64]);
            if col + 1 < args.cols {
                let right = grid_key(row, col + 1, args.cols);
                graph.add(&BetweenFactor::new(key, right, noisy(dvector![1.0, 0.0])))?;
            }
            if row + 1 < args.rows {
                let down = grid_key(row + 1, col, args.cols);
                graph.add(&BetweenFactor::new(key, down, noisy(dvector![0.0, 1.0])))?;
            }
        }
    }
    Ok((graph, truth))
}

fn run(args: &Args, verbosity: Verbosity) -> Result<ConvergenceStatus, Box<dyn std::error::Error>> {
    let reference = match args.reference.to_lowercase().as_str() {
        "cholesky" => LinearSolverType::SparseCholesky,
        "qr" => LinearSolverType::SparseQR,
        other => return Err(format!("Unknown reference solver: {other}").into()),
    };

    let (graph, truth) = build_grid(args)?;
    info!(
        "Grid {}x{}: {} variables, {} factors, {} rows",
        args.rows,
        args.cols,
        truth.len(),
        graph.len(),
        graph.rows()
    );

    let config = SubgraphSolverConfig::new()
        .with_max_iterations(args.max_iterations)
        .with_restart_interval(args.max_iterations + 1)
        .with_tolerance(args.tolerance)
        .with_verbosity(verbosity);

    let ordering = Ordering::natural(&graph);
    let setup_start = Instant::now();
    let solver = SubgraphSolver::new(&graph, config, &ordering)?;
    info!(
        "Solver setup: {:.2}ms",
        setup_start.elapsed().as_secs_f64() * 1000.0
    );

    let (solution, summary) = solver.optimize_with_summary();
    info!("{}", summary);

    let direct_start = Instant::now();
    let direct = solve_direct(&graph, &ordering, reference)?;
    info!(
        "{} reference: {:.2}ms",
        reference,
        direct_start.elapsed().as_secs_f64() * 1000.0
    );

    info!(
        "Max deviation from {}: {:.3e}",
        reference,
        solution.max_abs_difference(&direct)
    );
    info!(
        "Max deviation from ground truth: {:.3e}",
        solution.max_abs_difference(&truth)
    );
    info!(
        "Cost: subgraph {:.6e}, direct {:.6e}",
        graph.error(&solution),
        graph.error(&direct)
    );

    Ok(summary.conjugate_gradient.status)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let verbosity = if args.verbose {
        Verbosity::Iteration
    } else {
        Verbosity::Summary
    };
    init_logger_with_level(level_for_verbosity(verbosity));

    info!("SUBGRAPH SOLVER GRID BENCHMARK\n");

    match run(&args, verbosity) {
        Ok(ConvergenceStatus::Converged) => {
            info!("Converged");
            Ok(())
        }
        Ok(status) => {
            warn!("Solver stopped early: {}", status);
            Err(format!("Solver did not converge: {status}").into())
        }
        Err(e) => {
            warn!("Grid solve failed");
            warn!("Error: {}", e);
            Err(e)
        }
    }
}
