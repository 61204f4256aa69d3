//! Prior factor for unary constraints on variables.

use super::{Factor, JacobianFactor};
use crate::core::{CoreResult, Key};
use nalgebra::{DMatrix, DVector};

/// Prior factor (unary constraint) on a single variable.
///
/// Represents a direct measurement or prior belief about a variable's value. In a pose graph
/// it anchors the gauge freedom; without at least one prior per connected component the
/// linear system is rank deficient and elimination fails.
///
/// # Mathematical Formulation
///
/// ```text
/// r = (x - x_prior) / σ
/// ```
///
/// The Jacobian is the identity matrix scaled by `1/σ` per row.
///
/// # Example
///
/// ```
/// use subgraph_solver::core::Key;
/// use subgraph_solver::factors::{Factor, PriorFactor};
/// use nalgebra::dvector;
///
/// let prior = PriorFactor::new(Key::symbol('x', 0), dvector![0.0, 0.0]).with_sigma(0.1);
/// let factor = prior.linearize().unwrap();
/// assert_eq!(factor.arity(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PriorFactor {
    /// Constrained variable
    pub key: Key,
    /// The prior value (measurement or known value)
    pub data: DVector<f64>,
    /// Per-row standard deviations; `None` means unit noise
    pub sigmas: Option<DVector<f64>>,
}

impl PriorFactor {
    pub fn new(key: Key, data: DVector<f64>) -> Self {
        Self {
            key,
            data,
            sigmas: None,
        }
    }

    /// Isotropic noise with standard deviation `sigma`.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigmas = Some(DVector::from_element(self.data.len(), sigma));
        self
    }

    /// Diagonal noise with per-row standard deviations.
    pub fn with_sigmas(mut self, sigmas: DVector<f64>) -> Self {
        self.sigmas = Some(sigmas);
        self
    }
}

impl Factor for PriorFactor {
    fn keys(&self) -> Vec<Key> {
        vec![self.key]
    }

    fn linearize(&self) -> CoreResult<JacobianFactor> {
        let n = self.data.len();
        let terms = vec![(self.key, DMatrix::identity(n, n))];
        match &self.sigmas {
            Some(sigmas) => JacobianFactor::with_sigmas(terms, self.data.clone(), sigmas),
            None => JacobianFactor::new(terms, self.data.clone()),
        }
    }
}
