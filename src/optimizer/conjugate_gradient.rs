//! Conjugate gradient on implicitly defined symmetric positive definite systems.
//!
//! The solver never sees a matrix. A [`LinearSystem`] describes the quadratic
//!
//! ```text
//! f(y) = ½ yᵀ H y - gᵀ y
//! ```
//!
//! through three operations: a zero vector, the residual `∇f(y) = H y - g`, and the product
//! `H p`. The vectors only need the handful of BLAS-1 operations in [`KrylovVector`], so the
//! same loop runs on dense `DVector`s and on key-indexed [`VectorValues`].
//!
//! # Stopping rule
//!
//! With `r_k = -∇f(y_k)` the iteration stops as soon as
//!
//! ```text
//! ||r_k||² <= max(absolute_tolerance, relative_tolerance² · ||r_0||²)
//! ```
//!
//! This is tested once before the first step and then after every step once at least
//! `min_iterations` steps were taken. Reaching `max_iterations` simply ends the loop; the
//! current estimate is returned either way.

use std::fmt::{self, Display, Formatter};

use nalgebra::DVector;
use tracing::{debug, info};

use crate::core::VectorValues;
use crate::optimizer::{ConvergenceStatus, OptimizerError, OptimizerResult, Verbosity};

/// Vector operations needed by the conjugate gradient recurrence.
pub trait KrylovVector: Clone {
    fn dot(&self, other: &Self) -> f64;

    /// `self += alpha * x`
    fn axpy(&mut self, alpha: f64, x: &Self);

    /// `self *= alpha`
    fn scale(&mut self, alpha: f64);

    fn squared_norm(&self) -> f64 {
        self.dot(self)
    }
}

impl KrylovVector for VectorValues {
    fn dot(&self, other: &Self) -> f64 {
        VectorValues::dot(self, other)
    }

    fn axpy(&mut self, alpha: f64, x: &Self) {
        VectorValues::axpy(self, alpha, x);
    }

    fn scale(&mut self, alpha: f64) {
        VectorValues::scale(self, alpha);
    }

    fn squared_norm(&self) -> f64 {
        VectorValues::squared_norm(self)
    }
}

impl KrylovVector for DVector<f64> {
    fn dot(&self, other: &Self) -> f64 {
        self.iter().zip(other.iter()).map(|(a, b)| a * b).sum()
    }

    fn axpy(&mut self, alpha: f64, x: &Self) {
        for (target, value) in self.iter_mut().zip(x.iter()) {
            *target += alpha * value;
        }
    }

    fn scale(&mut self, alpha: f64) {
        self.scale_mut(alpha);
    }

    fn squared_norm(&self) -> f64 {
        self.norm_squared()
    }
}

/// A symmetric positive definite system `H y = g` given only through its actions.
pub trait LinearSystem {
    type Vector: KrylovVector;

    /// Starting point of the iteration.
    fn zero(&self) -> Self::Vector;

    /// Gradient of the quadratic at `y`, `H y - g`.
    fn residual(&self, y: &Self::Vector) -> Self::Vector;

    /// `H p`
    fn apply(&self, p: &Self::Vector) -> Self::Vector;
}

/// Configuration parameters for the conjugate gradient solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ConjugateGradientConfig {
    /// Steps taken before the tolerance test may stop the iteration
    pub min_iterations: usize,
    /// Iteration cap
    pub max_iterations: usize,
    /// Recompute the residual from scratch every this many steps
    pub restart_interval: usize,
    /// Tolerance on `||r|| / ||r_0||`
    pub relative_tolerance: f64,
    /// Tolerance on `||r||²`
    pub absolute_tolerance: f64,
    pub verbosity: Verbosity,
}

impl Default for ConjugateGradientConfig {
    fn default() -> Self {
        Self {
            min_iterations: 1,
            max_iterations: 500,
            restart_interval: 501,
            relative_tolerance: 1e-3,
            absolute_tolerance: 1e-3,
            verbosity: Verbosity::Silent,
        }
    }
}

impl ConjugateGradientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_iterations(mut self, min_iterations: usize) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_restart_interval(mut self, restart_interval: usize) -> Self {
        self.restart_interval = restart_interval;
        self
    }

    pub fn with_relative_tolerance(mut self, relative_tolerance: f64) -> Self {
        self.relative_tolerance = relative_tolerance;
        self
    }

    pub fn with_absolute_tolerance(mut self, absolute_tolerance: f64) -> Self {
        self.absolute_tolerance = absolute_tolerance;
        self
    }

    /// Set both tolerances at once.
    pub fn with_tolerance(self, tolerance: f64) -> Self {
        self.with_relative_tolerance(tolerance)
            .with_absolute_tolerance(tolerance)
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check that the parameters describe a runnable iteration.
    ///
    /// # Errors
    /// Returns [`OptimizerError::InvalidParameters`] for a non-positive or non-finite
    /// tolerance, a zero iteration cap or restart interval, or `min_iterations` above
    /// `max_iterations`.
    pub fn validate(&self) -> OptimizerResult<()> {
        for (name, value) in [
            ("relative_tolerance", self.relative_tolerance),
            ("absolute_tolerance", self.absolute_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(OptimizerError::InvalidParameters(format!(
                    "{name} must be positive and finite, got {value}"
                ))
                .log());
            }
        }
        if self.max_iterations == 0 {
            return Err(OptimizerError::InvalidParameters(
                "max_iterations must be greater than zero".to_string(),
            )
            .log());
        }
        if self.restart_interval == 0 {
            return Err(OptimizerError::InvalidParameters(
                "restart_interval must be greater than zero".to_string(),
            )
            .log());
        }
        if self.min_iterations > self.max_iterations {
            return Err(OptimizerError::InvalidParameters(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            ))
            .log());
        }
        Ok(())
    }

    /// Print configuration parameters (debug level logging)
    pub fn print_configuration(&self) {
        debug!(
            "\nConfiguration:\n  Solver:             Conjugate Gradient\n  Min iterations:     {}\n  Max iterations:     {}\n  Restart interval:   {}\n  Relative tolerance: {:.2e}\n  Absolute tolerance: {:.2e}\n  Verbosity:          {}",
            self.min_iterations,
            self.max_iterations,
            self.restart_interval,
            self.relative_tolerance,
            self.absolute_tolerance,
            self.verbosity
        );
    }
}

/// Outcome of a conjugate gradient run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConjugateGradientSummary {
    /// Steps taken
    pub iterations: usize,
    /// `||r_0||`
    pub initial_residual_norm: f64,
    /// `||r||` at the returned estimate
    pub final_residual_norm: f64,
    pub status: ConvergenceStatus,
}

impl Display for ConjugateGradientSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {} iterations, |r|: {:.3e} -> {:.3e}",
            self.status, self.iterations, self.initial_residual_norm, self.final_residual_norm
        )
    }
}

/// Run conjugate gradient on `system` starting from `initial`.
///
/// The loop never returns an error. It stops for one of three reasons, recorded in
/// [`ConjugateGradientSummary::status`]:
///
/// - [`ConvergenceStatus::Converged`] once `||r||² <= max(absolute_tolerance,
///   relative_tolerance² ||r_0||²)` after at least `min_iterations` steps, or right away when
///   the starting residual already meets it
/// - [`ConvergenceStatus::MaxIterationsReached`] after `max_iterations` steps
/// - [`ConvergenceStatus::Stagnated`] when the curvature `pᵀ A p` of the next search
///   direction is zero, negative or not finite, so the step length `γ / pᵀ A p` is undefined
///
/// `Stagnated` only happens when the operator is not positive definite or the data holds
/// NaN or infinity. The subgraph preconditioned system is `I + (A₂R⁻¹)ᵀ(A₂R⁻¹)`, whose
/// curvature is at least `||p||²`, so with finite factors it always ends on one of the first
/// two reasons. In every case the estimate reached so far is returned as is.
pub fn conjugate_gradient<S: LinearSystem>(
    system: &S,
    initial: S::Vector,
    config: &ConjugateGradientConfig,
) -> (S::Vector, ConjugateGradientSummary) {
    let mut y = initial;
    let mut r = system.residual(&y);
    r.scale(-1.0);
    let mut p = r.clone();
    let mut gamma = r.squared_norm();

    let initial_residual_norm = gamma.sqrt();
    let threshold = config
        .absolute_tolerance
        .max(config.relative_tolerance * config.relative_tolerance * gamma);

    if config.verbosity >= Verbosity::Iteration {
        info!(
            "CG: |r0| = {:.6e}, threshold |r|^2 <= {:.3e}",
            initial_residual_norm, threshold
        );
    }

    let mut k = 0;
    let status = if gamma <= threshold {
        ConvergenceStatus::Converged
    } else {
        loop {
            if k >= config.max_iterations {
                break ConvergenceStatus::MaxIterationsReached;
            }

            let ap = system.apply(&p);
            let curvature = p.dot(&ap);
            if !(curvature.is_finite() && curvature > 0.0) {
                break ConvergenceStatus::Stagnated;
            }

            let alpha = gamma / curvature;
            y.axpy(alpha, &p);
            k += 1;

            if k % config.restart_interval == 0 {
                r = system.residual(&y);
                r.scale(-1.0);
            } else {
                r.axpy(-alpha, &ap);
            }

            let new_gamma = r.squared_norm();
            let beta = new_gamma / gamma;
            gamma = new_gamma;

            if config.verbosity >= Verbosity::Iteration {
                info!(
                    "CG iteration {:>4}: |r| = {:.6e}, alpha = {:.3e}",
                    k,
                    gamma.sqrt(),
                    alpha
                );
            }

            if k >= config.min_iterations && gamma <= threshold {
                break ConvergenceStatus::Converged;
            }

            p.scale(beta);
            p.axpy(1.0, &r);
        }
    };

    let summary = ConjugateGradientSummary {
        iterations: k,
        initial_residual_norm,
        final_residual_norm: gamma.sqrt(),
        status,
    };
    if config.verbosity >= Verbosity::Summary {
        info!("CG: {}", summary);
    }
    (y, summary)
}
