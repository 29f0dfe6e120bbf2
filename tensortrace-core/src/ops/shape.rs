use crate::{
    op::{Expand, Flatten, Reshape, ShapeOf, Unsqueeze},
    Dim, Result, Tensor,
};

use super::extent_inputs;

/// Same elements, new shape. One extent may be [`Dim::Dynamic`] and is then
/// inferred from the element count.
pub fn reshape(input: &Tensor, shape: &[Dim]) -> Result<Tensor> {
    let mut inputs = vec![input.id()];
    inputs.extend(extent_inputs(shape));
    Tensor::build(input.graph(), Reshape::new(shape.to_vec()), &inputs)
}

/// Insert an axis of extent 1 at `dim`, counted in the output's rank.
pub fn unsqueeze(input: &Tensor, dim: isize) -> Result<Tensor> {
    input.apply(Unsqueeze::new(dim), &[])
}

/// Broadcast extents of 1 to `shape`, right-aligned. [`Dim::Dynamic`] keeps
/// the input's extent.
pub fn expand(input: &Tensor, shape: &[Dim]) -> Result<Tensor> {
    let mut inputs = vec![input.id()];
    inputs.extend(extent_inputs(shape));
    Tensor::build(input.graph(), Expand::new(shape.to_vec()), &inputs)
}

/// Merge axes `start..=end` into one.
pub fn flatten(input: &Tensor, start: isize, end: isize) -> Result<Tensor> {
    input.apply(Flatten::new(start, end), &[])
}

/// The extents of `dim` (every axis when `None`) as a rank-1 index tensor.
pub fn shape_of(input: &Tensor, dim: Option<&[isize]>) -> Result<Tensor> {
    input.apply(ShapeOf::new(dim.map(<[isize]>::to_vec)), &[])
}
