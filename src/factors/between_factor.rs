//! Between factor for relative constraints between two variables.

use super::{Factor, JacobianFactor};
use crate::core::{CoreError, CoreResult, Key};
use nalgebra::{DMatrix, DVector};

/// Between factor (binary constraint) on the difference of two variables.
///
/// Represents odometry or a loop closure between `from` and `to` in a linear pose graph:
///
/// ```text
/// r = ((x_to - x_from) - z) / σ
/// ```
///
/// with Jacobians `-I/σ` for `from` and `I/σ` for `to`.
///
/// # Example
///
/// ```
/// use subgraph_solver::core::Key;
/// use subgraph_solver::factors::{BetweenFactor, Factor};
/// use nalgebra::dvector;
///
/// let odometry = BetweenFactor::new(Key::symbol('x', 0), Key::symbol('x', 1), dvector![1.0, 0.0]);
/// let factor = odometry.linearize().unwrap();
/// assert_eq!(factor.arity(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct BetweenFactor {
    pub from: Key,
    pub to: Key,
    /// Measured difference `x_to - x_from`
    pub measurement: DVector<f64>,
    /// Per-row standard deviations; `None` means unit noise
    pub sigmas: Option<DVector<f64>>,
}

impl BetweenFactor {
    pub fn new(from: Key, to: Key, measurement: DVector<f64>) -> Self {
        Self {
            from,
            to,
            measurement,
            sigmas: None,
        }
    }

    /// Isotropic noise with standard deviation `sigma`.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigmas = Some(DVector::from_element(self.measurement.len(), sigma));
        self
    }

    /// Diagonal noise with per-row standard deviations.
    pub fn with_sigmas(mut self, sigmas: DVector<f64>) -> Self {
        self.sigmas = Some(sigmas);
        self
    }
}

impl Factor for BetweenFactor {
    fn keys(&self) -> Vec<Key> {
        vec![self.from, self.to]
    }

    fn linearize(&self) -> CoreResult<JacobianFactor> {
        if self.from == self.to {
            return Err(CoreError::InvalidInput(format!(
                "between factor connects {} to itself",
                self.from
            ))
            .log());
        }
        let n = self.measurement.len();
        let terms = vec![
            (self.from, -DMatrix::<f64>::identity(n, n)),
            (self.to, DMatrix::identity(n, n)),
        ];
        match &self.sigmas {
            Some(sigmas) => JacobianFactor::with_sigmas(terms, self.measurement.clone(), sigmas),
            None => JacobianFactor::new(terms, self.measurement.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VectorValues;
    use nalgebra::dvector;

    #[test]
    fn test_between_residual() -> Result<(), Box<dyn std::error::Error>> {
        let (a, b) = (Key::symbol('x', 0), Key::symbol('x', 1));
        let factor = BetweenFactor::new(a, b, dvector![1.0, -1.0])
            .with_sigmas(dvector![1.0, 0.5])
            .linearize()?;

        let values: VectorValues = [(a, dvector![0.0, 0.0]), (b, dvector![1.2, -1.0])]
            .into_iter()
            .collect();
        let residual = factor.residual(&values);
        assert!((residual[0] - 0.2).abs() < 1e-10);
        assert!(residual[1].abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_self_loop_rejected() {
        let key = Key::symbol('x', 0);
        let result = BetweenFactor::new(key, key, dvector![0.0]).linearize();
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }
}
