//! Likelihood formula assembly and result unpacking
//!
//! The free-variable ordering is the contract between formula
//! construction, numeric compilation and result unpacking. It is always
//! recomputed by [variable_order] from the model and the tree, never
//! cached, so the three stages cannot desynchronize.

use crate::error::ReconstructionError;
use crate::models::{MotionModel, MotionModelTrait};
use crate::symbolic::{Expr, LnFn, Symbol};
use crate::tree::Tree;

use ndarray::{Array1, Array2, s};

/// Free symbol of one scalar component of one ancestral node's vector
///
/// Node index and flat component index make the name globally unique.
pub(crate) fn ancestral_symbol(node_id: usize, component: usize) -> Symbol {
    Symbol::new(format!("{node_id}_{component}"))
}

/// Canonical free-variable ordering: model parameters first, then every
/// ancestral node's flattened symbol block in node-index order
pub(crate) fn variable_order(model: &MotionModel, tree: &Tree, nvals: usize) -> Vec<Symbol> {
    let mut variables = model.parameters();
    variables.reserve(tree.nancestral() * nvals);
    for node_id in tree.ntips()..tree.nnodes() {
        variables.extend((0..nvals).map(|component| ancestral_symbol(node_id, component)));
    }
    variables
}

/// Per-node vector states: tip vectors as constants, ancestral vectors as
/// fresh symbol arrays of the same shape
fn node_states(tree: &Tree) -> Result<Vec<Array2<Expr>>, ReconstructionError> {
    let shape = tip_vector_shape(tree)?;
    let ncols = shape.1;
    (0..tree.nnodes())
        .map(|node_id| {
            if node_id < tree.ntips() {
                let vectors =
                    tree[node_id]
                        .vectors
                        .as_ref()
                        .ok_or(ReconstructionError::NotReady {
                            operation: "formularize_log_like",
                            requires: "build_tip_vectors",
                        })?;
                if vectors.dim() != shape {
                    return Err(ReconstructionError::VectorShapeMismatch {
                        expected: shape,
                        actual: vectors.dim(),
                    });
                }
                Ok(vectors.mapv(Expr::constant))
            } else {
                Ok(Array2::from_shape_fn(shape, |(row, col)| {
                    ancestral_symbol(node_id, row * ncols + col).into()
                }))
            }
        })
        .collect()
}

/// Shared vector shape, taken from the first tip
pub(crate) fn tip_vector_shape(tree: &Tree) -> Result<(usize, usize), ReconstructionError> {
    tree[0]
        .vectors
        .as_ref()
        .map(|vectors| vectors.dim())
        .ok_or(ReconstructionError::NotReady {
            operation: "formularize_log_like",
            requires: "build_tip_vectors",
        })
}

/// Sum the motion model's per-branch term over every non-root node, in
/// the tree's deterministic traversal order
pub(crate) fn build_log_like(
    model: &MotionModel,
    tree: &Tree,
    ln: &LnFn,
) -> Result<Expr, ReconstructionError> {
    let states = node_states(tree)?;
    let mut loglike = Expr::constant(0.0);
    for node_id in tree.traverse() {
        let Some(parent) = tree[node_id].parent else {
            continue;
        };
        let term = model.branch_ln_like(
            &Expr::constant(tree[node_id].dist),
            states[parent].view(),
            states[node_id].view(),
            ln,
        );
        loglike = loglike + term;
    }
    Ok(loglike)
}

/// Split an optimized free-variable vector back into model parameters and
/// per-node ancestral vectors, assigning the latter onto the tree
///
/// The exact inverse of the packing implied by [variable_order].
pub(crate) fn unpack_result(
    model: &MotionModel,
    tree: &mut Tree,
    shape: (usize, usize),
    x: &Array1<f64>,
) -> Vec<f64> {
    let nparams = model.parameters().len();
    let nvals = shape.0 * shape.1;
    debug_assert_eq!(x.len(), nparams + tree.nancestral() * nvals);

    let params = x.slice(s![..nparams]).to_vec();
    let mut offset = nparams;
    for node_id in tree.ntips()..tree.nnodes() {
        let chunk = x.slice(s![offset..offset + nvals]);
        tree[node_id].vectors = Some(Array2::from_shape_fn(shape, |(row, col)| {
            chunk[row * shape.1 + col]
        }));
        offset += nvals;
    }
    params
}
