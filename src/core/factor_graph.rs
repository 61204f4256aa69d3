//! Ordered collections of linear factors.
//!
//! A [`GaussianFactorGraph`] is the whole linear least-squares problem
//!
//! ```text
//! minimize Σ_i ½||A_i x - b_i||²
//! ```
//!
//! stored as an insertion-ordered list of [`JacobianFactor`]s. The order is meaningful: the
//! graph splitter walks factors in this order and earlier factors win ties when several
//! edges could join the same two components.
//!
//! Factors are held behind [`Arc`] so a graph can be partitioned into sub-graphs that share
//! the numeric data of the original instead of copying it.

use std::collections::{BTreeMap, BTreeSet};
use std::slice;
use std::sync::Arc;

use nalgebra::DVector;

use crate::core::{CoreError, CoreResult, Key, VectorValues};
use crate::factors::{Factor, JacobianFactor};

/// Insertion-ordered sequence of linear factors.
#[derive(Debug, Clone, Default)]
pub struct GaussianFactorGraph {
    factors: Vec<Arc<JacobianFactor>>,
}

impl GaussianFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            factors: Vec::with_capacity(capacity),
        }
    }

    /// Append an owned factor.
    pub fn push(&mut self, factor: JacobianFactor) {
        self.factors.push(Arc::new(factor));
    }

    /// Append a factor shared with another graph.
    pub fn push_shared(&mut self, factor: Arc<JacobianFactor>) {
        self.factors.push(factor);
    }

    /// Linearize `factor` and append it.
    ///
    /// # Errors
    /// Propagates the error of [`Factor::linearize`].
    pub fn add<F: Factor + ?Sized>(&mut self, factor: &F) -> CoreResult<()> {
        self.push(factor.linearize()?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<JacobianFactor>> {
        self.factors.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Arc<JacobianFactor>> {
        self.factors.iter()
    }

    /// All variables touched by the graph, ascending.
    pub fn keys(&self) -> BTreeSet<Key> {
        self.factors
            .iter()
            .flat_map(|factor| factor.keys().iter().copied())
            .collect()
    }

    /// Dimension of every variable.
    ///
    /// # Errors
    /// Returns [`CoreError::DimensionMismatch`] if two factors disagree on a dimension.
    pub fn dims(&self) -> CoreResult<BTreeMap<Key, usize>> {
        let mut dims = BTreeMap::new();
        for factor in &self.factors {
            for (key, block) in factor.terms() {
                let dim = *dims.entry(key).or_insert(block.ncols());
                if dim != block.ncols() {
                    return Err(CoreError::DimensionMismatch(format!(
                        "variable {} has dimension {} and {} in different factors",
                        key,
                        dim,
                        block.ncols()
                    ))
                    .log());
                }
            }
        }
        Ok(dims)
    }

    /// Total number of measurement rows.
    pub fn rows(&self) -> usize {
        self.factors.iter().map(|factor| factor.rows()).sum()
    }

    /// Total cost `Σ_i ½||A_i x - b_i||²`.
    pub fn error(&self, x: &VectorValues) -> f64 {
        self.factors.iter().map(|factor| factor.error(x)).sum()
    }

    /// Per-factor whitened residuals `A_i x - b_i`.
    pub fn residuals(&self, x: &VectorValues) -> Vec<DVector<f64>> {
        self.factors.iter().map(|factor| factor.residual(x)).collect()
    }

    /// Per-factor products `A_i x`.
    pub fn multiply(&self, x: &VectorValues) -> Vec<DVector<f64>> {
        self.factors.iter().map(|factor| factor.multiply(x)).collect()
    }

    /// `out += alpha * Aᵀ e`, where `e` holds one vector per factor.
    pub fn transpose_multiply_add(
        &self,
        alpha: f64,
        errors: &[DVector<f64>],
        out: &mut VectorValues,
    ) {
        for (factor, e) in self.factors.iter().zip(errors) {
            factor.transpose_multiply_add(alpha, e, out);
        }
    }

    /// Gradient of the total cost, `Aᵀ (A x - b)`, over every variable of the graph.
    pub fn gradient(&self, x: &VectorValues) -> VectorValues {
        let mut gradient = VectorValues::new();
        for factor in &self.factors {
            factor.transpose_multiply_add(1.0, &factor.residual(x), &mut gradient);
        }
        gradient
    }
}

impl FromIterator<JacobianFactor> for GaussianFactorGraph {
    fn from_iter<I: IntoIterator<Item = JacobianFactor>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

impl FromIterator<Arc<JacobianFactor>> for GaussianFactorGraph {
    fn from_iter<I: IntoIterator<Item = Arc<JacobianFactor>>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

impl Extend<JacobianFactor> for GaussianFactorGraph {
    fn extend<I: IntoIterator<Item = JacobianFactor>>(&mut self, iter: I) {
        self.factors.extend(iter.into_iter().map(Arc::new));
    }
}

impl<'a> IntoIterator for &'a GaussianFactorGraph {
    type Item = &'a Arc<JacobianFactor>;
    type IntoIter = slice::Iter<'a, Arc<JacobianFactor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.factors.iter()
    }
}
