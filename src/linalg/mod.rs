//! Direct linear algebra for Gaussian factor graphs.
//!
//! Two families of direct solvers live here:
//!
//! - **Sequential elimination** ([`eliminate_sequential`]) turns a factor graph and an
//!   [`Ordering`] into a [`GaussianBayesNet`], the square-root information form `R x = d`.
//!   The subgraph preconditioner is built on top of it.
//! - **Sparse normal equations** ([`SparseCholeskySolver`], [`SparseQRSolver`]) assemble
//!   the global Jacobian with faer and solve `AᵀA x = Aᵀb`. [`solve_direct`] wraps this as
//!   a reference solution for whole graphs.

pub mod bayes_net;
pub mod cholesky;
pub mod elimination;
pub mod qr;

use std::fmt::{self, Display, Formatter};

use faer::{
    Mat,
    sparse::{SparseColMat, Triplet},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::core::{CoreError, GaussianFactorGraph, Key, KeyInfo, Ordering, VectorValues};

pub use bayes_net::{GaussianBayesNet, GaussianConditional};
pub use cholesky::SparseCholeskySolver;
pub use elimination::eliminate_sequential;
pub use qr::SparseQRSolver;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    SparseCholesky,
    SparseQR,
}

impl Display for LinearSolverType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::SparseCholesky => write!(f, "Sparse Cholesky"),
            LinearSolverType::SparseQR => write!(f, "Sparse QR"),
        }
    }
}

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (Cholesky, QR, etc.)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Elimination hit a zero pivot while eliminating `key`
    #[error("Singular system: variable {key} is not constrained along the ordering")]
    SingularSystem { key: Key },

    /// Singular or near-singular assembled matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// Matrix format conversion failed
    #[error("Matrix conversion failed: {0}")]
    MatrixConversion(String),

    /// Ordering does not cover the variables being eliminated
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),

    /// Factor data inconsistent with the system being assembled or eliminated
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| LinAlgError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// This method logs both the LinAlgError and the underlying error
    /// from external libraries (e.g., faer's FaerError, LltError, CreationError).
    ///
    /// # Arguments
    /// * `source_error` - The original error from the third-party library (must implement Debug)
    ///
    /// # Example
    /// ```ignore
    /// SymbolicLlt::try_new(matrix.symbolic(), Side::Lower)
    ///     .map_err(|e| {
    ///         LinAlgError::FactorizationFailed(
    ///             "Symbolic Cholesky decomposition failed".to_string()
    ///         )
    ///         .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

impl From<CoreError> for LinAlgError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidOrdering(msg) => LinAlgError::InvalidOrdering(msg),
            CoreError::DimensionMismatch(_) | CoreError::InvalidInput(_) => {
                LinAlgError::InvalidInput(err.to_string())
            }
            other => LinAlgError::MatrixConversion(other.to_string()),
        }
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Trait for sparse direct solvers of linear least-squares problems
pub trait SparseLinearSolver {
    /// Solve the normal equation `(AᵀA) x = Aᵀb`.
    ///
    /// The gradient of `½||Ax - b||²` at zero, `g = -Aᵀb`, is cached together with the
    /// Hessian `AᵀA`; the returned solution is `x = H⁻¹(-g)`.
    ///
    /// # Errors
    /// Returns `LinAlgError` if:
    /// - Matrix factorization fails
    /// - Matrix is singular or ill-conditioned
    fn solve_normal_equation(
        &mut self,
        jacobian: &SparseColMat<usize, f64>,
        rhs: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>>;

    /// Get the cached Hessian matrix (AᵀA) from the last solve
    fn get_hessian(&self) -> Option<&SparseColMat<usize, f64>>;

    /// Get the cached gradient vector (-Aᵀb) from the last solve
    fn get_gradient(&self) -> Option<&Mat<f64>>;
}

/// Form `H = AᵀA` and `g = -Aᵀb` for the least-squares problem `||Ax - b||`.
pub(crate) fn normal_equations(
    jacobian: &SparseColMat<usize, f64>,
    rhs: &Mat<f64>,
) -> LinAlgResult<(SparseColMat<usize, f64>, Mat<f64>)> {
    let at = jacobian.as_ref().transpose();
    let hessian = at
        .to_col_major()
        .map_err(|e| {
            LinAlgError::MatrixConversion("Jacobian transpose is not convertible".to_string())
                .log_with_source(e)
        })?
        * jacobian.as_ref();
    let atb = jacobian.as_ref().transpose() * rhs;
    Ok((hessian, -&atb))
}

/// Reject solutions a rank-deficient factorization let through.
pub(crate) fn ensure_finite(x: Mat<f64>) -> LinAlgResult<Mat<f64>> {
    if (0..x.nrows()).all(|i| x[(i, 0)].is_finite()) {
        Ok(x)
    } else {
        Err(LinAlgError::SingularMatrix.log())
    }
}

/// Stack every factor of `graph` into one sparse Jacobian and right-hand side.
///
/// Columns follow `key_info`; rows follow the factor order of the graph.
///
/// # Errors
/// - [`LinAlgError::InvalidOrdering`] if a factor touches a key absent from `key_info`
/// - [`LinAlgError::SparseMatrixCreation`] if faer rejects the triplets
pub fn assemble_sparse_system(
    graph: &GaussianFactorGraph,
    key_info: &KeyInfo,
) -> LinAlgResult<(SparseColMat<usize, f64>, Mat<f64>)> {
    let rows = graph.rows();
    let mut triplets = Vec::new();
    let mut rhs = Mat::zeros(rows, 1);

    let mut row_offset = 0;
    for factor in graph {
        for (key, block) in factor.terms() {
            let entry = key_info.get(key).ok_or_else(|| {
                LinAlgError::InvalidOrdering(format!("variable {key} has no column assignment"))
                    .log()
            })?;
            for c in 0..block.ncols() {
                for r in 0..block.nrows() {
                    let value = block[(r, c)];
                    if value != 0.0 {
                        triplets.push(Triplet::new(row_offset + r, entry.start + c, value));
                    }
                }
            }
        }
        for (r, b) in factor.rhs().iter().enumerate() {
            rhs[(row_offset + r, 0)] = *b;
        }
        row_offset += factor.rows();
    }

    let jacobian = SparseColMat::try_new_from_triplets(rows, key_info.total_dim(), &triplets)
        .map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to assemble graph Jacobian".to_string())
                .log_with_source(e)
        })?;
    Ok((jacobian, rhs))
}

/// Solve the whole graph directly through its normal equations.
///
/// Used as a reference for the iterative solvers and by the demo binary.
///
/// # Errors
/// - [`LinAlgError::InvalidOrdering`] if `ordering` misses a graph variable
/// - [`LinAlgError::SingularMatrix`] if the system is rank deficient
pub fn solve_direct(
    graph: &GaussianFactorGraph,
    ordering: &Ordering,
    solver_type: LinearSolverType,
) -> LinAlgResult<VectorValues> {
    let key_info = KeyInfo::new(graph, ordering)?;
    if key_info.total_dim() == 0 {
        return Ok(VectorValues::new());
    }

    let (jacobian, rhs) = assemble_sparse_system(graph, &key_info)?;
    debug!(
        "Direct solve ({}): {} x {} Jacobian, {} non-zeros",
        solver_type,
        jacobian.nrows(),
        jacobian.ncols(),
        jacobian.symbolic().compute_nnz()
    );

    let mut solver: Box<dyn SparseLinearSolver> = match solver_type {
        LinearSolverType::SparseCholesky => Box::new(SparseCholeskySolver::new()),
        LinearSolverType::SparseQR => Box::new(SparseQRSolver::new()),
    };
    let solution = solver.solve_normal_equation(&jacobian, &rhs)?;

    let flat = nalgebra::DVector::from_fn(solution.nrows(), |i, _| solution[(i, 0)]);
    Ok(VectorValues::from_flat_vector(&flat, &key_info)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, JacobianFactor, PriorFactor};
    use nalgebra::{DMatrix, dvector};

    const TOLERANCE: f64 = 1e-9;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn x(i: u64) -> Key {
        Key::symbol('x', i)
    }

    fn triangle() -> Result<GaussianFactorGraph, CoreError> {
        let mut graph = GaussianFactorGraph::new();
        graph.add(&PriorFactor::new(x(0), dvector![0.0, 0.0]))?;
        graph.add(&BetweenFactor::new(x(0), x(1), dvector![1.0, 0.0]))?;
        graph.add(&BetweenFactor::new(x(1), x(2), dvector![0.0, 1.0]))?;
        graph.add(&BetweenFactor::new(x(0), x(2), dvector![1.1, 0.9]).with_sigma(0.5))?;
        Ok(graph)
    }

    #[test]
    fn test_assemble_layout() -> TestResult {
        let graph = triangle()?;
        let key_info = KeyInfo::from_graph(&graph)?;
        let (jacobian, rhs) = assemble_sparse_system(&graph, &key_info)?;
        assert_eq!(jacobian.nrows(), 8);
        assert_eq!(jacobian.ncols(), 6);
        // prior (2) + three between factors with two identity blocks each (12)
        assert_eq!(jacobian.symbolic().compute_nnz(), 14);
        assert!((rhs[(6, 0)] - 2.2).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_cholesky_and_qr_agree() -> TestResult {
        let graph = triangle()?;
        let ordering = Ordering::natural(&graph);
        let chol = solve_direct(&graph, &ordering, LinearSolverType::SparseCholesky)?;
        let qr = solve_direct(&graph, &ordering, LinearSolverType::SparseQR)?;
        assert!(chol.equals(&qr, 1e-8));
        assert!(chol.at(x(0))?.norm() < 1e-8);
        Ok(())
    }

    #[test]
    fn test_direct_matches_elimination() -> TestResult {
        let graph = triangle()?;
        let ordering = Ordering::natural(&graph);
        let direct = solve_direct(&graph, &ordering, LinearSolverType::SparseCholesky)?;
        let eliminated = eliminate_sequential(&graph, &ordering)?.optimize();
        assert!(direct.equals(&eliminated, 1e-8));
        Ok(())
    }

    #[test]
    fn test_missing_ordering_key() -> TestResult {
        let graph = triangle()?;
        let ordering = Ordering::new([x(0), x(1)])?;
        let result = solve_direct(&graph, &ordering, LinearSolverType::SparseCholesky);
        assert!(matches!(result, Err(LinAlgError::InvalidOrdering(_))));
        Ok(())
    }

    #[test]
    fn test_rank_deficient_graph() -> TestResult {
        let mut graph = GaussianFactorGraph::new();
        graph.push(JacobianFactor::binary(
            x(0),
            DMatrix::identity(1, 1),
            x(1),
            -DMatrix::<f64>::identity(1, 1),
            dvector![1.0],
        )?);
        let ordering = Ordering::natural(&graph);
        let result = solve_direct(&graph, &ordering, LinearSolverType::SparseCholesky);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_non_finite_solution_is_singular() {
        let finite = Mat::from_fn(3, 1, |i, _| i as f64);
        assert!(ensure_finite(finite).is_ok());

        let with_nan = Mat::from_fn(3, 1, |i, _| if i == 1 { f64::NAN } else { 0.0 });
        assert!(matches!(ensure_finite(with_nan), Err(LinAlgError::SingularMatrix)));
        let with_inf = Mat::from_fn(2, 1, |i, _| if i == 0 { f64::INFINITY } else { 0.0 });
        assert!(matches!(ensure_finite(with_inf), Err(LinAlgError::SingularMatrix)));
    }
}
