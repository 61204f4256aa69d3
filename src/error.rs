//! Error types for the subgraph-solver library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! # Error Hierarchy
//!
//! - **`SubgraphError`** is the top-level error exposed to users via public APIs
//! - **Module errors** (`CoreError`, `LinAlgError`, `OptimizerError`) are wrapped inside it
//! - **Error sources** are preserved, allowing full error chain inspection
//!
//! Example error chain:
//! ```text
//! SubgraphError::LinearAlgebra(
//!     LinAlgError::SingularSystem { key: x3 }
//! )
//! ```
//!
//! Callers that only care about the broad category of a failure can match on
//! [`SubgraphError::kind`] instead of the nested enums.

use crate::{core::CoreError, linalg::LinAlgError, optimizer::OptimizerError};
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Main result type used throughout the subgraph-solver library
pub type SubgraphResult<T> = Result<T, SubgraphError>;

/// Main error type for the subgraph-solver library
///
/// # Error Chain Access
///
/// ```rust,ignore
/// if let Err(e) = SubgraphSolver::new(&graph, config, &ordering) {
///     warn!("Error: {}", e);
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum SubgraphError {
    /// Core module errors (graph construction, splitting, orderings)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Linear algebra errors (elimination, direct solves)
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Solver configuration errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
}

/// Broad classification of a [`SubgraphError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A factor does not touch exactly one or two variables
    MalformedFactor,
    /// Elimination found a variable that the factors do not determine
    SingularSystem,
    /// Ordering does not match the graph
    InvalidOrdering,
    /// Bad factor data or solver parameters
    InvalidInput,
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MalformedFactor => write!(f, "malformed factor"),
            ErrorKind::SingularSystem => write!(f, "singular system"),
            ErrorKind::InvalidOrdering => write!(f, "invalid ordering"),
            ErrorKind::InvalidInput => write!(f, "invalid input"),
            ErrorKind::Other => write!(f, "other"),
        }
    }
}

impl SubgraphError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubgraphError::Core(CoreError::MalformedFactor { .. }) => ErrorKind::MalformedFactor,
            SubgraphError::Core(CoreError::InvalidOrdering(_))
            | SubgraphError::LinearAlgebra(LinAlgError::InvalidOrdering(_)) => {
                ErrorKind::InvalidOrdering
            }
            SubgraphError::Core(
                CoreError::InvalidInput(_)
                | CoreError::DimensionMismatch(_)
                | CoreError::MissingVariable(_),
            )
            | SubgraphError::LinearAlgebra(LinAlgError::InvalidInput(_))
            | SubgraphError::Optimizer(OptimizerError::InvalidParameters(_)) => {
                ErrorKind::InvalidInput
            }
            SubgraphError::LinearAlgebra(
                LinAlgError::SingularSystem { .. } | LinAlgError::SingularMatrix,
            ) => ErrorKind::SingularSystem,
            SubgraphError::LinearAlgebra(_) => ErrorKind::Other,
        }
    }

    /// Get the full error chain as a string for logging and debugging.
    ///
    /// Traverses the source chain from the top-level error down to the root cause, one
    /// error per line.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// error!("Solve failed: {}", err.chain_compact());
    /// ```
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
