//! Square-root information form of an eliminated linear system.
//!
//! Eliminating a factor graph along an ordering produces one [`GaussianConditional`] per
//! variable:
//!
//! ```text
//! R_f x_f + Σ_p S_p x_p = d_f
//! ```
//!
//! where `R_f` is upper triangular and every parent `p` is eliminated after `f`. Stacked in
//! elimination order the conditionals form a block upper-triangular system `R x = d`, the
//! [`GaussianBayesNet`].
//!
//! Solves go through nalgebra's triangular substitutions. Diagonals are checked once when a
//! conditional is built, so the unchecked substitutions cannot divide by zero.

use nalgebra::{DMatrix, DVector};

use crate::core::{Key, VectorValues};
use crate::linalg::{LinAlgError, LinAlgResult};

/// `R x_f + Σ S_p x_p = d` for one frontal variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianConditional {
    frontal: Key,
    r: DMatrix<f64>,
    parents: Vec<(Key, DMatrix<f64>)>,
    d: DVector<f64>,
}

impl GaussianConditional {
    /// Build a conditional, checking shapes and the diagonal of `r`.
    ///
    /// Entries of `r` below the diagonal are dropped.
    ///
    /// # Errors
    /// - [`LinAlgError::FactorizationFailed`] on inconsistent block shapes
    /// - [`LinAlgError::SingularSystem`] if a diagonal entry of `r` is zero or not finite
    pub fn new(
        frontal: Key,
        r: DMatrix<f64>,
        parents: Vec<(Key, DMatrix<f64>)>,
        d: DVector<f64>,
    ) -> LinAlgResult<Self> {
        let dim = d.len();
        if r.nrows() != dim || r.ncols() != dim {
            return Err(LinAlgError::FactorizationFailed(format!(
                "conditional on {} has a {}x{} R block for a {}-dimensional rhs",
                frontal,
                r.nrows(),
                r.ncols(),
                dim
            ))
            .log());
        }
        if let Some((key, s)) = parents.iter().find(|(_, s)| s.nrows() != dim) {
            return Err(LinAlgError::FactorizationFailed(format!(
                "parent {} of {} has {} rows, expected {}",
                key,
                frontal,
                s.nrows(),
                dim
            ))
            .log());
        }
        if (0..dim).any(|i| !(r[(i, i)].is_finite() && r[(i, i)] != 0.0)) {
            return Err(LinAlgError::SingularSystem { key: frontal }.log());
        }
        Ok(Self {
            frontal,
            r: r.upper_triangle(),
            parents,
            d,
        })
    }

    pub fn frontal(&self) -> Key {
        self.frontal
    }

    pub fn dim(&self) -> usize {
        self.d.len()
    }

    pub fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }

    pub fn parents(&self) -> &[(Key, DMatrix<f64>)] {
        &self.parents
    }

    /// `rhs - Σ S_p x_p`, treating parents absent from `x` as zero.
    fn subtract_parents(&self, rhs: &DVector<f64>, x: &VectorValues) -> DVector<f64> {
        let mut result = rhs.clone();
        for (key, s) in &self.parents {
            if let Some(value) = x.get(*key) {
                result.gemv(-1.0, s, value, 1.0);
            }
        }
        result
    }

    /// Solve `R z = b` by back substitution.
    fn solve_upper(&self, b: &DVector<f64>) -> DVector<f64> {
        let mut z = b.clone();
        self.r.solve_upper_triangular_unchecked_mut(&mut z);
        z
    }

    /// Solve `Rᵀ z = b` by forward substitution.
    fn solve_upper_transpose(&self, b: &DVector<f64>) -> DVector<f64> {
        let mut z = b.clone();
        self.r.tr_solve_upper_triangular_unchecked_mut(&mut z);
        z
    }

    fn multiply_upper(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.r * v
    }

    fn multiply_upper_transpose(&self, v: &DVector<f64>) -> DVector<f64> {
        self.r.tr_mul(v)
    }

    /// Value of the frontal variable given its parents: `R⁻¹ (d - Σ S_p x_p)`.
    pub fn solve(&self, parents: &VectorValues) -> DVector<f64> {
        self.solve_upper(&self.subtract_parents(&self.d, parents))
    }
}

/// Conditionals in elimination order, representing `R x = d`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianBayesNet {
    conditionals: Vec<GaussianConditional>,
}

impl GaussianBayesNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a conditional. Its parents must be eliminated after it.
    pub fn push(&mut self, conditional: GaussianConditional) {
        self.conditionals.push(conditional);
    }

    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GaussianConditional> {
        self.conditionals.iter()
    }

    /// Frontal keys in elimination order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.conditionals.iter().map(|c| c.frontal)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.conditionals.iter().any(|c| c.frontal == key)
    }

    /// All-zero assignment over the frontal variables.
    pub fn zero(&self) -> VectorValues {
        VectorValues::zero(self.conditionals.iter().map(|c| (c.frontal, c.dim())))
    }

    /// Exact solution of `R x = d`.
    pub fn optimize(&self) -> VectorValues {
        let mut x = VectorValues::new();
        for conditional in self.conditionals.iter().rev() {
            let value = conditional.solve(&x);
            x.insert(conditional.frontal, value);
        }
        x
    }

    /// `R⁻¹ y`. Frontal keys absent from `y` are taken as zero.
    pub fn back_substitute(&self, y: &VectorValues) -> VectorValues {
        let mut x = VectorValues::new();
        for conditional in self.conditionals.iter().rev() {
            let rhs = y
                .get(conditional.frontal)
                .cloned()
                .unwrap_or_else(|| DVector::zeros(conditional.dim()));
            let value = conditional.solve_upper(&conditional.subtract_parents(&rhs, &x));
            x.insert(conditional.frontal, value);
        }
        x
    }

    /// `R⁻ᵀ g`. Frontal keys absent from `g` are taken as zero.
    pub fn back_substitute_transpose(&self, g: &VectorValues) -> VectorValues {
        let mut pending = g.clone();
        let mut z = VectorValues::new();
        for conditional in &self.conditionals {
            let rhs = pending
                .get(conditional.frontal)
                .cloned()
                .unwrap_or_else(|| DVector::zeros(conditional.dim()));
            let value = conditional.solve_upper_transpose(&rhs);
            for (key, s) in &conditional.parents {
                if let Some(target) = pending.get_mut(*key) {
                    target.gemv_tr(-1.0, s, &value, 1.0);
                } else {
                    pending.insert(*key, -(s.transpose() * &value));
                }
            }
            z.insert(conditional.frontal, value);
        }
        z
    }

    /// `R x`. Keys absent from `x` are taken as zero.
    pub fn multiply(&self, x: &VectorValues) -> VectorValues {
        let mut result = VectorValues::new();
        for conditional in &self.conditionals {
            let mut value = match x.get(conditional.frontal) {
                Some(frontal) => conditional.multiply_upper(frontal),
                None => DVector::zeros(conditional.dim()),
            };
            for (key, s) in &conditional.parents {
                if let Some(parent) = x.get(*key) {
                    value.gemv(1.0, s, parent, 1.0);
                }
            }
            result.insert(conditional.frontal, value);
        }
        result
    }

    /// `Rᵀ e`. Keys absent from `e` are taken as zero.
    pub fn transpose_multiply(&self, e: &VectorValues) -> VectorValues {
        let mut result = self.zero();
        for conditional in &self.conditionals {
            let Some(row) = e.get(conditional.frontal) else {
                continue;
            };
            if let Some(target) = result.get_mut(conditional.frontal) {
                *target += conditional.multiply_upper_transpose(row);
            }
            for (key, s) in &conditional.parents {
                if let Some(target) = result.get_mut(*key) {
                    target.gemv_tr(1.0, s, row, 1.0);
                } else {
                    result.insert(*key, s.transpose() * row);
                }
            }
        }
        result
    }

    /// `½ ||R x - d||²`
    pub fn error(&self, x: &VectorValues) -> f64 {
        let rx = self.multiply(x);
        self.conditionals
            .iter()
            .filter_map(|c| rx.get(c.frontal).map(|v| (v - &c.d).norm_squared()))
            .sum::<f64>()
            * 0.5
    }
}

impl<'a> IntoIterator for &'a GaussianBayesNet {
    type Item = &'a GaussianConditional;
    type IntoIter = std::slice::Iter<'a, GaussianConditional>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditionals.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    const TOLERANCE: f64 = 1e-12;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn x(i: u64) -> Key {
        Key::symbol('x', i)
    }

    /// x0 (2-d) depends on x1 (1-d), x1 is a root.
    fn small_net() -> LinAlgResult<GaussianBayesNet> {
        let mut net = GaussianBayesNet::new();
        net.push(GaussianConditional::new(
            x(0),
            dmatrix![2.0, 1.0; 0.0, 4.0],
            vec![(x(1), dmatrix![1.0; -2.0])],
            dvector![3.0, 2.0],
        )?);
        net.push(GaussianConditional::new(
            x(1),
            dmatrix![0.5],
            vec![],
            dvector![1.0],
        )?);
        Ok(net)
    }

    fn sample() -> VectorValues {
        [(x(0), dvector![0.7, -1.3]), (x(1), dvector![2.5])]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_zero_pivot_rejected() {
        let result = GaussianConditional::new(x(0), dmatrix![0.0], vec![], dvector![1.0]);
        assert!(matches!(result, Err(LinAlgError::SingularSystem { key }) if key == x(0)));
    }

    #[test]
    fn test_lower_triangle_is_dropped() -> TestResult {
        let conditional = GaussianConditional::new(
            x(0),
            dmatrix![2.0, 1.0; 7.0, 4.0],
            vec![],
            dvector![3.0, 2.0],
        )?;
        assert_eq!(conditional.r()[(1, 0)], 0.0);

        // [2 1; 0 4] z = [3, 2]
        let z = conditional.solve(&VectorValues::new());
        assert!((z[1] - 0.5).abs() < TOLERANCE);
        assert!((z[0] - 1.25).abs() < TOLERANCE);

        let v = dvector![1.0, -1.0];
        let rv = conditional.multiply_upper(&v);
        assert!((rv[0] - 1.0).abs() < TOLERANCE);
        assert!((rv[1] + 4.0).abs() < TOLERANCE);
        let rtv = conditional.multiply_upper_transpose(&v);
        assert!((rtv[0] - 2.0).abs() < TOLERANCE);
        assert!((rtv[1] + 3.0).abs() < TOLERANCE);
        let back = conditional.solve_upper_transpose(&rtv);
        assert!((back - v).norm() < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_optimize_has_zero_error() -> TestResult {
        let net = small_net()?;
        let solution = net.optimize();
        // x1 = 1 / 0.5 = 2, then x0 from [2 1; 0 4] x0 = [3, 2] - [1, -2] * 2
        assert!((solution.at(x(1))?[0] - 2.0).abs() < TOLERANCE);
        assert!((solution.at(x(0))?[1] - 1.5).abs() < TOLERANCE);
        assert!((solution.at(x(0))?[0] + 0.25).abs() < TOLERANCE);
        assert!(net.error(&solution) < TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_back_substitute_inverts_multiply() -> TestResult {
        let net = small_net()?;
        let v = sample();
        assert!(net.back_substitute(&net.multiply(&v)).equals(&v, 1e-10));
        assert!(net.multiply(&net.back_substitute(&v)).equals(&v, 1e-10));
        Ok(())
    }

    #[test]
    fn test_transpose_solve_inverts_transpose_multiply() -> TestResult {
        let net = small_net()?;
        let v = sample();
        let recovered = net.back_substitute_transpose(&net.transpose_multiply(&v));
        assert!(recovered.equals(&v, 1e-10));
        Ok(())
    }

    #[test]
    fn test_transpose_is_adjoint() -> TestResult {
        // <R a, b> == <a, Rᵀ b>
        let net = small_net()?;
        let a = sample();
        let b: VectorValues = [(x(0), dvector![-0.4, 0.9]), (x(1), dvector![1.1])]
            .into_iter()
            .collect();
        let lhs = net.multiply(&a).dot(&b);
        let rhs = a.dot(&net.transpose_multiply(&b));
        assert!((lhs - rhs).abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_zero_covers_frontals() -> TestResult {
        let net = small_net()?;
        let zero = net.zero();
        assert_eq!(zero.len(), 2);
        assert_eq!(zero.total_dim(), 3);
        assert!(zero.norm() < TOLERANCE);
        assert!(net.back_substitute(&zero).norm() < TOLERANCE);
        Ok(())
    }
}
