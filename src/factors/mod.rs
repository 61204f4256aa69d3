//! Linear factor implementations for graph-based least-squares problems.
//!
//! Factors represent measurements or relationships between variables in a factor graph. In
//! this crate every factor is linear: it contributes the whitened residual
//!
//! ```text
//! r_i(x) = Σ_j A_ij x_j - b_i
//! ```
//!
//! and the problem solved is `minimize Σ_i ½||r_i(x)||²`.
//!
//! # Factor Types
//!
//! - [`JacobianFactor`]: the general form, a list of coefficient blocks plus a right-hand side
//! - [`PriorFactor`]: unary constraint `x = z`
//! - [`BetweenFactor`]: binary relative constraint `x_to - x_from = z`
//!
//! Prior and between factors are convenience builders; they produce a [`JacobianFactor`]
//! through [`Factor::linearize`], which is what a [`GaussianFactorGraph`] stores.
//!
//! [`GaussianFactorGraph`]: crate::core::GaussianFactorGraph

use crate::core::{CoreResult, Key};

pub mod between_factor;
pub mod jacobian_factor;
pub mod prior_factor;

pub use between_factor::BetweenFactor;
pub use jacobian_factor::JacobianFactor;
pub use prior_factor::PriorFactor;

/// Trait for anything that can be expressed as a linear Gaussian factor.
pub trait Factor {
    /// Variables touched by the factor, in term order.
    fn keys(&self) -> Vec<Key>;

    /// Build the whitened Jacobian form of the factor.
    ///
    /// # Errors
    /// Returns a [`CoreError`](crate::core::CoreError) if the factor's data is inconsistent
    /// (mismatched dimensions or invalid noise).
    fn linearize(&self) -> CoreResult<JacobianFactor>;
}

impl Factor for JacobianFactor {
    fn keys(&self) -> Vec<Key> {
        JacobianFactor::keys(self).to_vec()
    }

    fn linearize(&self) -> CoreResult<JacobianFactor> {
        Ok(self.clone())
    }
}
