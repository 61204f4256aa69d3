//! Spanning-tree partition of a factor graph.
//!
//! A single pass over the factors in insertion order, Kruskal style: every unary factor is
//! kept in the tree, and a binary factor joins the tree only if it connects two variables
//! that are not yet connected by earlier tree factors. Everything else closes a loop and
//! becomes a constraint.
//!
//! Factors are shared between the input and the two halves, nothing is copied.

use tracing::debug;

use crate::core::{CoreError, CoreResult, DsfMap, GaussianFactorGraph, Key};

/// The two halves of a partitioned graph.
#[derive(Debug, Clone, Default)]
pub struct SplitGraph {
    /// Unary factors plus a spanning forest of the binary factors
    pub tree: GaussianFactorGraph,
    /// Loop-closing binary factors
    pub constraints: GaussianFactorGraph,
}

/// Partition `graph` into a spanning tree and loop-closing constraints.
///
/// # Errors
/// Returns [`CoreError::MalformedFactor`] for the first factor that touches no variable or
/// more than two.
pub fn split_graph(graph: &GaussianFactorGraph) -> CoreResult<SplitGraph> {
    let mut split = SplitGraph::default();
    let mut dsf: DsfMap<Key> = DsfMap::new();

    for (index, factor) in graph.iter().enumerate() {
        match *factor.keys() {
            [_] => split.tree.push_shared(factor.clone()),
            [a, b] => {
                if dsf.find(&a) != dsf.find(&b) {
                    dsf.merge(&a, &b);
                    split.tree.push_shared(factor.clone());
                } else {
                    split.constraints.push_shared(factor.clone());
                }
            }
            _ => {
                return Err(CoreError::MalformedFactor {
                    index,
                    arity: factor.arity(),
                }
                .log());
            }
        }
    }

    debug!(
        "Split {} factors into {} tree and {} constraint factors",
        graph.len(),
        split.tree.len(),
        split.constraints.len()
    );
    Ok(split)
}
