//! Sequential QR elimination of a factor graph into a Bayes net.
//!
//! Variables are eliminated one at a time in the order given. Eliminating `x_f` gathers
//! every remaining factor that touches it, stacks them into one dense block
//!
//! ```text
//! [ A_f | A_s1 ... A_sk | b ]
//! ```
//!
//! and triangularizes it with a Householder QR. The first `dim(x_f)` rows of the result are
//! the conditional on `x_f` given its separator `s1..sk`; the rows below the frontal block
//! form a new factor on the separator that goes back into the pool for later variables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::core::{GaussianFactorGraph, Key, Ordering};
use crate::factors::JacobianFactor;
use crate::linalg::{GaussianBayesNet, GaussianConditional, LinAlgError, LinAlgResult};

/// Size of a pivot, relative to the norm of its own stacked column, below which the column
/// counts as dependent on the ones before it.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Eliminate `graph` along `ordering`.
///
/// Keys of the ordering the graph does not touch are skipped. The resulting net lists one
/// conditional per graph variable, in elimination order.
///
/// # Errors
/// - [`LinAlgError::InvalidOrdering`] if a graph variable is missing from the ordering
/// - [`LinAlgError::SingularSystem`] if a variable is not fully determined by the factors
///   remaining when it is eliminated
pub fn eliminate_sequential(
    graph: &GaussianFactorGraph,
    ordering: &Ordering,
) -> LinAlgResult<GaussianBayesNet> {
    let dims = graph.dims()?;
    if let Some(missing) = dims.keys().find(|key| !ordering.contains(**key)) {
        return Err(LinAlgError::InvalidOrdering(format!(
            "variable {missing} is not covered by the ordering"
        ))
        .log());
    }

    let mut pool: Vec<Option<Arc<JacobianFactor>>> = graph.iter().cloned().map(Some).collect();
    let mut adjacency: HashMap<Key, Vec<usize>> = HashMap::with_capacity(dims.len());
    for (index, factor) in graph.iter().enumerate() {
        for key in factor.keys() {
            adjacency.entry(*key).or_default().push(index);
        }
    }

    let mut net = GaussianBayesNet::new();
    for frontal in ordering.iter() {
        let Some(&frontal_dim) = dims.get(&frontal) else {
            continue;
        };

        let involved: Vec<Arc<JacobianFactor>> = adjacency
            .remove(&frontal)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|index| pool.get_mut(index).and_then(Option::take))
            .collect();

        let mut separator: Vec<Key> = involved
            .iter()
            .flat_map(|factor| factor.keys().iter().copied())
            .filter(|key| *key != frontal)
            .collect();
        separator.sort_by_key(|key| ordering.position(*key));
        separator.dedup();

        let (conditional, remainder) =
            eliminate_one(frontal, frontal_dim, &separator, &dims, &involved)?;
        net.push(conditional);

        if let Some(factor) = remainder {
            let index = pool.len();
            for key in factor.keys() {
                adjacency.entry(*key).or_default().push(index);
            }
            pool.push(Some(Arc::new(factor)));
        }
    }

    debug!("Eliminated {} variables from {} factors", net.len(), graph.len());
    Ok(net)
}

/// Triangularize the factors touching `frontal`.
fn eliminate_one(
    frontal: Key,
    frontal_dim: usize,
    separator: &[Key],
    dims: &BTreeMap<Key, usize>,
    involved: &[Arc<JacobianFactor>],
) -> LinAlgResult<(GaussianConditional, Option<JacobianFactor>)> {
    let mut columns = Vec::with_capacity(separator.len() + 1);
    let mut offset = 0;
    for key in std::iter::once(frontal).chain(separator.iter().copied()) {
        let dim = dims.get(&key).copied().unwrap_or(0);
        columns.push((key, offset, dim));
        offset += dim;
    }
    let n = offset;
    let m: usize = involved.iter().map(|factor| factor.rows()).sum();
    if m < frontal_dim {
        return Err(LinAlgError::SingularSystem { key: frontal }.log());
    }

    let mut ab = DMatrix::<f64>::zeros(m, n + 1);
    let mut row = 0;
    for factor in involved {
        let rows = factor.rows();
        for (key, start, dim) in &columns {
            if let Some(block) = factor.block(*key) {
                ab.view_mut((row, *start), (rows, *dim)).copy_from(block);
            }
        }
        ab.view_mut((row, n), (rows, 1)).copy_from(factor.rhs());
        row += rows;
    }

    let column_norms: Vec<f64> = (0..frontal_dim).map(|i| ab.column(i).norm()).collect();
    let r = ab.qr().r();
    if (0..frontal_dim).any(|i| r[(i, i)].abs() <= PIVOT_TOLERANCE * column_norms[i]) {
        return Err(LinAlgError::SingularSystem { key: frontal }.log());
    }

    let r_ff = r.view((0, 0), (frontal_dim, frontal_dim)).into_owned();
    let parents = columns[1..]
        .iter()
        .map(|(key, start, dim)| (*key, r.view((0, *start), (frontal_dim, *dim)).into_owned()))
        .collect();
    let d = DVector::from_iterator(frontal_dim, (0..frontal_dim).map(|i| r[(i, n)]));
    let conditional = GaussianConditional::new(frontal, r_ff, parents, d)?;

    let remaining_rows = r.nrows().saturating_sub(frontal_dim);
    if separator.is_empty() || remaining_rows == 0 {
        return Ok((conditional, None));
    }
    let terms = columns[1..]
        .iter()
        .map(|(key, start, dim)| {
            (
                *key,
                r.view((frontal_dim, *start), (remaining_rows, *dim)).into_owned(),
            )
        })
        .collect();
    let rhs = DVector::from_iterator(
        remaining_rows,
        (frontal_dim..r.nrows()).map(|i| r[(i, n)]),
    );
    let remainder = JacobianFactor::new(terms, rhs)?;
    Ok((conditional, Some(remainder)))
}

impl GaussianFactorGraph {
    /// Eliminate the graph along `ordering`. See [`eliminate_sequential`].
    pub fn eliminate_sequential(&self, ordering: &Ordering) -> LinAlgResult<GaussianBayesNet> {
        eliminate_sequential(self, ordering)
    }
}
