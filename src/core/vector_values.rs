//! Key-indexed collections of dense vectors.
//!
//! [`VectorValues`] is the assignment type used everywhere in the crate: solutions returned
//! by the solvers, right-hand sides fed to triangular solves and the y-space iterates of
//! conjugate gradient are all `VectorValues`.
//!
//! Binary operations are defined over the union of keys: a key present in only one operand
//! is treated as a zero vector in the other. This keeps the algebra total, which the
//! iterative solver relies on.

use std::collections::BTreeMap;
use std::collections::btree_map;

use nalgebra::DVector;

use crate::core::{CoreError, CoreResult, Key, KeyInfo};

/// Mapping from [`Key`] to a dense vector, iterated in ascending key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorValues {
    values: BTreeMap<Key, DVector<f64>>,
}

impl VectorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// All-zero assignment with the given per-key dimensions.
    pub fn zero<I>(dims: I) -> Self
    where
        I: IntoIterator<Item = (Key, usize)>,
    {
        dims.into_iter()
            .map(|(key, dim)| (key, DVector::zeros(dim)))
            .collect()
    }

    /// All-zero assignment with the same keys and dimensions as `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zero(self.dims())
    }

    /// Insert a vector, returning the previous one if the key was present.
    pub fn insert(&mut self, key: Key, value: DVector<f64>) -> Option<DVector<f64>> {
        self.values.insert(key, value)
    }

    pub fn get(&self, key: Key) -> Option<&DVector<f64>> {
        self.values.get(&key)
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut DVector<f64>> {
        self.values.get_mut(&key)
    }

    /// Lookup that fails with [`CoreError::MissingVariable`].
    pub fn at(&self, key: Key) -> CoreResult<&DVector<f64>> {
        self.values.get(&key).ok_or(CoreError::MissingVariable(key))
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.values.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Key, DVector<f64>> {
        self.values.iter()
    }

    /// Per-key dimensions.
    pub fn dims(&self) -> impl Iterator<Item = (Key, usize)> + '_ {
        self.values.iter().map(|(key, value)| (*key, value.len()))
    }

    /// Sum of all vector dimensions.
    pub fn total_dim(&self) -> usize {
        self.values.values().map(|v| v.len()).sum()
    }

    /// Whether both assignments cover the same keys with the same dimensions.
    pub fn has_same_structure(&self, other: &VectorValues) -> bool {
        self.len() == other.len() && self.dims().eq(other.dims())
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: f64, x: &VectorValues) {
        for (key, value) in x.iter() {
            match self.values.get_mut(key) {
                Some(own) => own.axpy(alpha, value, 1.0),
                None => {
                    self.values.insert(*key, value * alpha);
                }
            }
        }
    }

    /// `self *= alpha`
    pub fn scale(&mut self, alpha: f64) {
        for value in self.values.values_mut() {
            *value *= alpha;
        }
    }

    /// Returns `self + other`.
    pub fn add(&self, other: &VectorValues) -> VectorValues {
        let mut result = self.clone();
        result.axpy(1.0, other);
        result
    }

    /// Returns `self - other`.
    pub fn subtract(&self, other: &VectorValues) -> VectorValues {
        let mut result = self.clone();
        result.axpy(-1.0, other);
        result
    }

    /// Inner product over the keys both assignments share.
    pub fn dot(&self, other: &VectorValues) -> f64 {
        self.values
            .iter()
            .filter_map(|(key, value)| other.values.get(key).map(|o| value.dot(o)))
            .sum()
    }

    pub fn squared_norm(&self) -> f64 {
        self.values.values().map(|v| v.norm_squared()).sum()
    }

    pub fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    /// Largest absolute entry-wise difference; missing keys compare against zero.
    pub fn max_abs_difference(&self, other: &VectorValues) -> f64 {
        self.subtract(other)
            .values
            .values()
            .map(|v| v.amax())
            .fold(0.0, f64::max)
    }

    /// Structural equality with entries compared up to `tolerance`.
    pub fn equals(&self, other: &VectorValues, tolerance: f64) -> bool {
        self.has_same_structure(other) && self.max_abs_difference(other) <= tolerance
    }

    /// Stack the vectors into one column following the layout of `key_info`.
    ///
    /// Keys of `key_info` that are absent here are left as zeros.
    pub fn to_flat_vector(&self, key_info: &KeyInfo) -> CoreResult<DVector<f64>> {
        let mut flat = DVector::zeros(key_info.total_dim());
        for (key, entry) in key_info.iter() {
            if let Some(value) = self.values.get(&key) {
                if value.len() != entry.dim {
                    return Err(CoreError::DimensionMismatch(format!(
                        "variable {} has dimension {}, layout expects {}",
                        key,
                        value.len(),
                        entry.dim
                    ))
                    .log());
                }
                flat.rows_mut(entry.start, entry.dim).copy_from(value);
            }
        }
        Ok(flat)
    }

    /// Inverse of [`VectorValues::to_flat_vector`].
    pub fn from_flat_vector(flat: &DVector<f64>, key_info: &KeyInfo) -> CoreResult<Self> {
        if flat.len() != key_info.total_dim() {
            return Err(CoreError::DimensionMismatch(format!(
                "flat vector has {} entries, layout expects {}",
                flat.len(),
                key_info.total_dim()
            ))
            .log());
        }
        Ok(key_info
            .iter()
            .map(|(key, entry)| (key, flat.rows(entry.start, entry.dim).into_owned()))
            .collect())
    }
}

impl FromIterator<(Key, DVector<f64>)> for VectorValues {
    fn from_iter<I: IntoIterator<Item = (Key, DVector<f64>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl Extend<(Key, DVector<f64>)> for VectorValues {
    fn extend<I: IntoIterator<Item = (Key, DVector<f64>)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl IntoIterator for VectorValues {
    type Item = (Key, DVector<f64>);
    type IntoIter = btree_map::IntoIter<Key, DVector<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a VectorValues {
    type Item = (&'a Key, &'a DVector<f64>);
    type IntoIter = btree_map::Iter<'a, Key, DVector<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    const TOLERANCE: f64 = 1e-12;

    fn x(i: u64) -> Key {
        Key::symbol('x', i)
    }

    fn sample() -> VectorValues {
        [(x(0), dvector![1.0, 2.0]), (x(1), dvector![3.0])]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_zero_and_structure() {
        let values = sample();
        let zero = values.zeros_like();
        assert!(zero.has_same_structure(&values));
        assert_eq!(zero.total_dim(), 3);
        assert_eq!(zero.norm(), 0.0);
    }

    #[test]
    fn test_axpy_and_dot() {
        let mut a = sample();
        let b = sample();
        a.axpy(2.0, &b);
        assert_eq!(a.get(x(0)), Some(&dvector![3.0, 6.0]));
        assert_eq!(a.get(x(1)), Some(&dvector![9.0]));
        assert!((b.dot(&b) - 14.0).abs() < TOLERANCE);
        assert!((b.squared_norm() - 14.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_union_semantics() {
        let a = sample();
        let mut b = VectorValues::new();
        b.insert(x(2), dvector![5.0]);

        let sum = a.add(&b);
        assert_eq!(sum.len(), 3);
        assert_eq!(sum.get(x(2)), Some(&dvector![5.0]));
        // Disjoint keys contribute nothing to the inner product
        assert_eq!(a.dot(&b), 0.0);
    }

    #[test]
    fn test_equals_with_tolerance() {
        let a = sample();
        let mut b = sample();
        if let Some(v) = b.get_mut(x(1)) {
            v[0] += 1e-10;
        }
        assert!(a.equals(&b, 1e-9));
        assert!(!a.equals(&b, 1e-11));
        assert!((a.max_abs_difference(&b) - 1e-10).abs() < 1e-15);
    }

    #[test]
    fn test_missing_key_lookup() {
        let values = sample();
        assert!(matches!(
            values.at(x(5)),
            Err(CoreError::MissingVariable(key)) if key == x(5)
        ));
    }
}
