//! Change of variables induced by an eliminated spanning tree.
//!
//! Write the full system as a tree part `A1` and a constraint part `A2`. Eliminating the
//! tree gives `R x = d` with baseline solution `xbar = R⁻¹ d`. Substituting
//!
//! ```text
//! x(y) = xbar + R⁻¹ y
//! ```
//!
//! turns the total cost into
//!
//! ```text
//! ½||y||² + ½||A2 x(y) - b2||²
//! ```
//!
//! whose Hessian `I + R⁻ᵀ A2ᵀ A2 R⁻¹` is the identity plus a term of rank at most the number
//! of constraint rows. Conjugate gradient on `y` therefore converges in few iterations when
//! the tree captures most of the graph.

use std::sync::Arc;

use nalgebra::DVector;

use crate::core::{CoreError, CoreResult, GaussianFactorGraph, VectorValues};
use crate::linalg::GaussianBayesNet;
use crate::optimizer::LinearSystem;

/// Preconditioned system in y-space.
#[derive(Debug, Clone)]
pub struct SubgraphPreconditioner {
    constraints: Arc<GaussianFactorGraph>,
    tree: Arc<GaussianBayesNet>,
    xbar: Arc<VectorValues>,
}

impl SubgraphPreconditioner {
    /// Build the preconditioner, solving the tree for its baseline.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingVariable`] if a constraint touches a variable the tree
    /// does not eliminate.
    pub fn new(
        constraints: Arc<GaussianFactorGraph>,
        tree: Arc<GaussianBayesNet>,
    ) -> CoreResult<Self> {
        let xbar = Arc::new(tree.optimize());
        Self::with_baseline(constraints, tree, xbar)
    }

    /// Build the preconditioner around an already computed baseline `xbar = R⁻¹ d`.
    ///
    /// # Errors
    /// Same as [`SubgraphPreconditioner::new`].
    pub fn with_baseline(
        constraints: Arc<GaussianFactorGraph>,
        tree: Arc<GaussianBayesNet>,
        xbar: Arc<VectorValues>,
    ) -> CoreResult<Self> {
        if let Some(missing) = constraints.keys().into_iter().find(|key| !tree.contains(*key)) {
            return Err(CoreError::MissingVariable(missing).log());
        }
        Ok(Self {
            constraints,
            tree,
            xbar,
        })
    }

    pub fn constraints(&self) -> &Arc<GaussianFactorGraph> {
        &self.constraints
    }

    pub fn tree(&self) -> &Arc<GaussianBayesNet> {
        &self.tree
    }

    /// Tree-only solution `R⁻¹ d`.
    pub fn xbar(&self) -> &Arc<VectorValues> {
        &self.xbar
    }

    /// All-zero y-space vector over the tree's variables.
    pub fn zero(&self) -> VectorValues {
        self.tree.zero()
    }

    /// Map a y-space vector back to the original variables: `xbar + R⁻¹ y`.
    pub fn x(&self, y: &VectorValues) -> VectorValues {
        let mut x = self.tree.back_substitute(y);
        x.axpy(1.0, &self.xbar);
        x
    }

    /// Total cost of the original problem at `x(y)`.
    pub fn error(&self, y: &VectorValues) -> f64 {
        0.5 * y.squared_norm() + self.constraints.error(&self.x(y))
    }

    /// `R⁻ᵀ A2ᵀ e`
    fn pull_back(&self, errors: &[DVector<f64>]) -> VectorValues {
        let mut a2t_e = VectorValues::new();
        self.constraints.transpose_multiply_add(1.0, errors, &mut a2t_e);
        self.tree.back_substitute_transpose(&a2t_e)
    }

    /// Gradient of [`SubgraphPreconditioner::error`]: `y + R⁻ᵀ A2ᵀ (A2 x(y) - b2)`.
    pub fn gradient(&self, y: &VectorValues) -> VectorValues {
        let mut gradient = self.pull_back(&self.constraints.residuals(&self.x(y)));
        gradient.axpy(1.0, y);
        gradient
    }

    /// Hessian-vector product `p + R⁻ᵀ A2ᵀ A2 R⁻¹ p`.
    pub fn apply_normal(&self, p: &VectorValues) -> VectorValues {
        let r_inv_p = self.tree.back_substitute(p);
        let mut result = self.pull_back(&self.constraints.multiply(&r_inv_p));
        result.axpy(1.0, p);
        result
    }
}

impl LinearSystem for SubgraphPreconditioner {
    type Vector = VectorValues;

    fn zero(&self) -> VectorValues {
        SubgraphPreconditioner::zero(self)
    }

    fn residual(&self, y: &VectorValues) -> VectorValues {
        self.gradient(y)
    }

    fn apply(&self, p: &VectorValues) -> VectorValues {
        self.apply_normal(p)
    }
}
