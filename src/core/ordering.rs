//! Elimination orderings.

use std::collections::HashMap;

use crate::core::{CoreError, CoreResult, GaussianFactorGraph, Key};

/// A total order over a set of keys, used to drive sequential elimination.
///
/// Keys are unique; the position of a key is its elimination step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    keys: Vec<Key>,
    positions: HashMap<Key, usize>,
}

impl Ordering {
    /// Build an ordering from keys in elimination order.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidOrdering`] if a key appears twice.
    pub fn new<I>(keys: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = Key>,
    {
        let mut ordering = Self::default();
        for key in keys {
            ordering.push(key)?;
        }
        Ok(ordering)
    }

    /// Ascending key order over every variable of `graph`.
    pub fn natural(graph: &GaussianFactorGraph) -> Self {
        let keys: Vec<Key> = graph.keys().into_iter().collect();
        let positions = keys.iter().enumerate().map(|(i, key)| (*key, i)).collect();
        Self { keys, positions }
    }

    /// Append a key at the end of the ordering.
    pub fn push(&mut self, key: Key) -> CoreResult<()> {
        if self.positions.contains_key(&key) {
            return Err(CoreError::InvalidOrdering(format!(
                "variable {key} appears more than once"
            ))
            .log());
        }
        self.positions.insert(key, self.keys.len());
        self.keys.push(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.positions.contains_key(&key)
    }

    /// Elimination step of `key`, if it is ordered.
    pub fn position(&self, key: Key) -> Option<usize> {
        self.positions.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        self.keys.iter().copied()
    }

    pub fn as_slice(&self) -> &[Key] {
        &self.keys
    }
}
