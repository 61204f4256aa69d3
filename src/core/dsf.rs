//! Disjoint-set forest keyed by arbitrary hashable identifiers.
//!
//! Used by the graph splitter to run an unweighted Kruskal pass over binary factors: two
//! variables are in the same set exactly when a path of already accepted tree edges joins
//! them. Entries are created lazily, so an unseen key is its own representative.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<K> {
    parent: K,
    rank: u8,
}

/// Union-find over keys with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct DsfMap<K> {
    entries: HashMap<K, Entry<K>>,
}

impl<K> Default for DsfMap<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> DsfMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the representative of the set containing `key`.
    ///
    /// Unseen keys are inserted as singleton sets. Every node visited on the way to the root
    /// is re-linked directly to the root.
    pub fn find(&mut self, key: &K) -> K {
        let mut root = match self.entries.get(key) {
            Some(entry) => entry.parent.clone(),
            None => {
                self.entries.insert(
                    key.clone(),
                    Entry {
                        parent: key.clone(),
                        rank: 0,
                    },
                );
                return key.clone();
            }
        };

        // Chase down the root
        loop {
            let parent = &self.entries[&root].parent;
            if *parent == root {
                break;
            }
            root = parent.clone();
        }

        // Go back and collapse the path
        let mut node = key.clone();
        while node != root {
            let next = match self.entries.get_mut(&node) {
                Some(entry) => std::mem::replace(&mut entry.parent, root.clone()),
                None => break,
            };
            node = next;
        }

        root
    }

    /// Unites the sets containing `a` and `b` and returns the representative of the union.
    pub fn merge(&mut self, a: &K, b: &K) -> K {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }

        let rank_a = self.entries[&root_a].rank;
        let rank_b = self.entries[&root_b].rank;
        let (winner, loser) = if rank_a < rank_b {
            (root_b, root_a)
        } else {
            (root_a, root_b)
        };

        if let Some(entry) = self.entries.get_mut(&loser) {
            entry.parent = winner.clone();
        }
        if rank_a == rank_b
            && let Some(entry) = self.entries.get_mut(&winner)
        {
            entry.rank = entry.rank.saturating_add(1);
        }
        winner
    }

    /// Whether `a` and `b` currently belong to the same set.
    pub fn same_set(&mut self, a: &K, b: &K) -> bool {
        self.find(a) == self.find(b)
    }
}

impl<K: Clone + Eq + Hash + Ord> DsfMap<K> {
    /// All sets, keyed by their representative, with members in ascending order.
    pub fn sets(&mut self) -> BTreeMap<K, BTreeSet<K>> {
        let keys: Vec<K> = self.entries.keys().cloned().collect();
        let mut sets: BTreeMap<K, BTreeSet<K>> = BTreeMap::new();
        for key in keys {
            let root = self.find(&key);
            sets.entry(root).or_default().insert(key);
        }
        sets
    }
}
