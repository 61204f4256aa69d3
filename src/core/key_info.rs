//! Per-variable layout information.
//!
//! [`KeyInfo`] records, for every variable of a graph, its position in an ordering, its
//! dimension and the first column it occupies once all variables are stacked along that
//! ordering. It is what turns key-indexed data into flat vectors and global matrices.

use std::collections::HashMap;

use crate::core::{CoreError, CoreResult, GaussianFactorGraph, Key, Ordering};

/// Layout of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfoEntry {
    /// Position of the variable in the ordering
    pub index: usize,
    /// Dimension of the variable
    pub dim: usize,
    /// First column of the variable in the stacked layout
    pub start: usize,
}

/// Layout of all variables of a graph along an ordering.
#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    ordering: Ordering,
    entries: HashMap<Key, KeyInfoEntry>,
    total_dim: usize,
}

impl KeyInfo {
    /// Lay out the variables of `graph` along `ordering`.
    ///
    /// Keys of the ordering that the graph does not touch are skipped.
    ///
    /// # Errors
    /// - [`CoreError::InvalidOrdering`] if a graph variable is not ordered
    /// - [`CoreError::DimensionMismatch`] if factors disagree on a variable's dimension
    pub fn new(graph: &GaussianFactorGraph, ordering: &Ordering) -> CoreResult<Self> {
        let dims = graph.dims()?;

        if let Some(missing) = dims.keys().find(|key| !ordering.contains(**key)) {
            return Err(CoreError::InvalidOrdering(format!(
                "variable {missing} is not covered by the ordering"
            ))
            .log());
        }

        let mut entries = HashMap::with_capacity(dims.len());
        let mut kept = Vec::with_capacity(dims.len());
        let mut start = 0;
        for key in ordering.iter() {
            if let Some(&dim) = dims.get(&key) {
                entries.insert(
                    key,
                    KeyInfoEntry {
                        index: kept.len(),
                        dim,
                        start,
                    },
                );
                kept.push(key);
                start += dim;
            }
        }

        Ok(Self {
            ordering: Ordering::new(kept)?,
            entries,
            total_dim: start,
        })
    }

    /// Layout along the natural (ascending key) ordering.
    pub fn from_graph(graph: &GaussianFactorGraph) -> CoreResult<Self> {
        Self::new(graph, &Ordering::natural(graph))
    }

    pub fn get(&self, key: Key) -> Option<&KeyInfoEntry> {
        self.entries.get(&key)
    }

    /// Ordering restricted to the variables of the graph.
    pub fn ordering(&self) -> &Ordering {
        &self.ordering
    }

    /// Sum of all variable dimensions.
    pub fn total_dim(&self) -> usize {
        self.total_dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ordering order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, &KeyInfoEntry)> + '_ {
        self.ordering
            .iter()
            .filter_map(|key| self.entries.get(&key).map(|entry| (key, entry)))
    }
}
