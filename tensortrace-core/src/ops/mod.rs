//! The public operation catalogue.
//!
//! Each function records one or more graph operations and returns a tensor
//! whose rank, dtype and shape are already inferred. Nothing is executed.

use crate::{node::NodeId, Dim};

mod elementwise;
mod initializers;
mod reduce;
mod repeat;
mod shape;

pub use elementwise::{
    abs, add, cast, constant, div, equal, exp, greater, less, maximum, minimum, mul, neg, pow,
    sqrt, sub, where_,
};
pub use initializers::{
    arange, full, full_like, iota, iota_like, ones, ones_like, rand, randn, tril, triu, zeros,
    zeros_like,
};
pub use reduce::{all, any, argmax, argmin, max, mean, prod, sum, var};
pub use repeat::{repeat, Repeats};
pub use shape::{expand, flatten, reshape, shape_of, unsqueeze};

/// The nodes backing the symbolic extents of `shape`, in order.
pub(crate) fn extent_inputs(shape: &[Dim]) -> Vec<NodeId> {
    shape.iter().filter_map(Dim::scalar_node).collect()
}
