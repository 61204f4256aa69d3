//! Core data structures for linear factor graph problems
//!
//! This module contains the building blocks shared by every solver in the crate:
//! - Variable identifiers ([`Key`]) and their elimination [`Ordering`]
//! - Key-indexed vector assignments ([`VectorValues`])
//! - Ordered collections of linear factors ([`GaussianFactorGraph`])
//! - Per-key layout information ([`KeyInfo`]) for assembling global matrices
//! - A disjoint-set forest ([`DsfMap`]) over keys for spanning-tree construction

pub mod dsf;
pub mod factor_graph;
pub mod key;
pub mod key_info;
pub mod ordering;
pub mod vector_values;

pub use dsf::DsfMap;
pub use factor_graph::GaussianFactorGraph;
pub use key::Key;
pub use key_info::{KeyInfo, KeyInfoEntry};
pub use ordering::Ordering;
pub use vector_values::VectorValues;

use thiserror::Error;
use tracing::error;

/// Core module error types for factor graphs, orderings and assignments
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A factor does not touch exactly one or two variables
    #[error("Malformed factor at index {index}: arity {arity} is not supported (expected 1 or 2)")]
    MalformedFactor { index: usize, arity: usize },

    /// Dimension mismatch between blocks, right-hand sides or variables
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Ordering is inconsistent with the graph it is applied to
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),

    /// A variable referenced by a factor is absent from an assignment
    #[error("Variable {0} is missing")]
    MissingVariable(Key),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| CoreError::from(e).log())?;
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

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
