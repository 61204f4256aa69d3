//! Linear Gaussian factors in Jacobian form.

use nalgebra::{DMatrix, DVector};

use crate::core::{CoreError, CoreResult, Key, VectorValues};

/// A linear measurement `Σ_j A_j x_j = b` with unit Gaussian noise.
///
/// Each term pairs a variable key with its coefficient block `A_j` (`rows × dim_j`). The
/// cost contributed to the least-squares problem is
///
/// ```text
/// ½ ||Σ_j A_j x_j - b||²
/// ```
///
/// Measurements with non-unit noise are whitened once at construction (see
/// [`JacobianFactor::with_sigmas`]), so every operation below works on the whitened system.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    keys: Vec<Key>,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
}

impl JacobianFactor {
    /// Create a factor from `(key, A_j)` terms and a right-hand side.
    ///
    /// # Errors
    /// - [`CoreError::DimensionMismatch`] if a block's row count differs from `rhs.len()`
    /// - [`CoreError::InvalidInput`] if a key appears in more than one term
    pub fn new(terms: Vec<(Key, DMatrix<f64>)>, rhs: DVector<f64>) -> CoreResult<Self> {
        let mut keys = Vec::with_capacity(terms.len());
        let mut blocks = Vec::with_capacity(terms.len());
        for (key, block) in terms {
            if block.nrows() != rhs.len() {
                return Err(CoreError::DimensionMismatch(format!(
                    "block for {} has {} rows, right-hand side has {}",
                    key,
                    block.nrows(),
                    rhs.len()
                ))
                .log());
            }
            if keys.contains(&key) {
                return Err(
                    CoreError::InvalidInput(format!("variable {key} appears twice")).log(),
                );
            }
            keys.push(key);
            blocks.push(block);
        }
        Ok(Self { keys, blocks, rhs })
    }

    /// Create a factor whose rows carry independent Gaussian noise with standard
    /// deviations `sigmas`. Rows are divided by their sigma.
    ///
    /// # Errors
    /// Same as [`JacobianFactor::new`], plus [`CoreError::InvalidInput`] for a sigma that is
    /// not strictly positive and finite.
    pub fn with_sigmas(
        terms: Vec<(Key, DMatrix<f64>)>,
        rhs: DVector<f64>,
        sigmas: &DVector<f64>,
    ) -> CoreResult<Self> {
        let mut factor = Self::new(terms, rhs)?;
        if sigmas.len() != factor.rows() {
            return Err(CoreError::DimensionMismatch(format!(
                "{} sigmas for a factor with {} rows",
                sigmas.len(),
                factor.rows()
            ))
            .log());
        }
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(CoreError::InvalidInput(format!("invalid sigma {bad}")).log());
        }

        for (row, sigma) in sigmas.iter().enumerate() {
            let inv = 1.0 / sigma;
            for block in factor.blocks.iter_mut() {
                block.row_mut(row).scale_mut(inv);
            }
            factor.rhs[row] *= inv;
        }
        Ok(factor)
    }

    /// Factor on a single variable: `A x = b`.
    pub fn unary(key: Key, a: DMatrix<f64>, b: DVector<f64>) -> CoreResult<Self> {
        Self::new(vec![(key, a)], b)
    }

    /// Factor on two variables: `A1 x1 + A2 x2 = b`.
    pub fn binary(
        key1: Key,
        a1: DMatrix<f64>,
        key2: Key,
        a2: DMatrix<f64>,
        b: DVector<f64>,
    ) -> CoreResult<Self> {
        Self::new(vec![(key1, a1), (key2, a2)], b)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Number of variables the factor touches.
    pub fn arity(&self) -> usize {
        self.keys.len()
    }

    /// Number of measurement rows.
    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// `(key, A_j)` pairs in term order.
    pub fn terms(&self) -> impl Iterator<Item = (Key, &DMatrix<f64>)> + '_ {
        self.keys.iter().copied().zip(self.blocks.iter())
    }

    pub fn block(&self, key: Key) -> Option<&DMatrix<f64>> {
        self.keys
            .iter()
            .position(|k| *k == key)
            .map(|i| &self.blocks[i])
    }

    /// Dimension of variable `key` as seen by this factor.
    pub fn dim(&self, key: Key) -> Option<usize> {
        self.block(key).map(|block| block.ncols())
    }

    /// `Σ_j A_j x_j`; variables missing from `x` contribute nothing.
    pub fn multiply(&self, x: &VectorValues) -> DVector<f64> {
        let mut result = DVector::zeros(self.rows());
        for (key, block) in self.terms() {
            if let Some(value) = x.get(key) {
                result.gemv(1.0, block, value, 1.0);
            }
        }
        result
    }

    /// Whitened residual `Σ_j A_j x_j - b`.
    pub fn residual(&self, x: &VectorValues) -> DVector<f64> {
        self.multiply(x) - &self.rhs
    }

    /// `½ ||Σ_j A_j x_j - b||²`
    pub fn error(&self, x: &VectorValues) -> f64 {
        0.5 * self.residual(x).norm_squared()
    }

    /// `out_j += alpha * A_jᵀ e` for every term, inserting zero vectors for missing keys.
    pub fn transpose_multiply_add(&self, alpha: f64, e: &DVector<f64>, out: &mut VectorValues) {
        for (key, block) in self.terms() {
            if !out.contains(key) {
                out.insert(key, DVector::zeros(block.ncols()));
            }
            if let Some(target) = out.get_mut(key) {
                target.gemv_tr(alpha, block, e, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    const TOLERANCE: f64 = 1e-12;

    fn x(i: u64) -> Key {
        Key::symbol('x', i)
    }

    #[test]
    fn test_row_mismatch_rejected() {
        let result = JacobianFactor::unary(x(0), DMatrix::identity(2, 2), dvector![1.0]);
        assert!(matches!(result, Err(CoreError::DimensionMismatch(_))));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let eye = DMatrix::identity(1, 1);
        let result = JacobianFactor::binary(x(0), eye.clone(), x(0), eye, dvector![0.0]);
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_residual_and_error() -> Result<(), Box<dyn std::error::Error>> {
        // x1 - x0 = 1
        let factor = JacobianFactor::binary(
            x(0),
            dmatrix![-1.0],
            x(1),
            dmatrix![1.0],
            dvector![1.0],
        )?;
        let values: VectorValues = [(x(0), dvector![0.5]), (x(1), dvector![2.0])]
            .into_iter()
            .collect();

        let residual = factor.residual(&values);
        assert!((residual[0] - 0.5).abs() < TOLERANCE);
        assert!((factor.error(&values) - 0.125).abs() < TOLERANCE);
        assert_eq!(factor.arity(), 2);
        assert_eq!(factor.dim(x(1)), Some(1));
        Ok(())
    }

    #[test]
    fn test_whitening() -> Result<(), Box<dyn std::error::Error>> {
        let factor = JacobianFactor::with_sigmas(
            vec![(x(0), DMatrix::identity(2, 2))],
            dvector![1.0, 4.0],
            &dvector![0.5, 2.0],
        )?;
        let block = factor.block(x(0)).ok_or("missing block")?;
        assert!((block[(0, 0)] - 2.0).abs() < TOLERANCE);
        assert!((block[(1, 1)] - 0.5).abs() < TOLERANCE);
        assert!((factor.rhs()[0] - 2.0).abs() < TOLERANCE);
        assert!((factor.rhs()[1] - 2.0).abs() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_invalid_sigma_rejected() {
        let result = JacobianFactor::with_sigmas(
            vec![(x(0), DMatrix::identity(1, 1))],
            dvector![1.0],
            &dvector![0.0],
        );
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_transpose_multiply_add() -> Result<(), Box<dyn std::error::Error>> {
        let factor = JacobianFactor::binary(
            x(0),
            dmatrix![1.0, 2.0],
            x(1),
            dmatrix![3.0],
            dvector![0.0],
        )?;
        let mut out = VectorValues::new();
        factor.transpose_multiply_add(2.0, &dvector![1.0], &mut out);
        assert_eq!(out.get(x(0)), Some(&dvector![2.0, 4.0]));
        assert_eq!(out.get(x(1)), Some(&dvector![6.0]));
        Ok(())
    }
}
