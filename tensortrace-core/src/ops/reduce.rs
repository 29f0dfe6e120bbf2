use crate::{
    op::{ArgKind, ArgMinMax, Reduce, ReduceKind},
    shape::normalize_axes,
    DType, Dim, Error, Result, Tensor,
};

use super::{
    cast, constant, div, flatten, iota_like, maximum, mul, reshape, shape_of, sub, unsqueeze,
};

/// Reduce, then put the reduced axes back as extents of 1 when `keepdim`.
fn reduce_impl(
    input: &Tensor,
    kind: ReduceKind,
    dim: Option<&[isize]>,
    keepdim: bool,
) -> Result<Tensor> {
    let rank = input.rank()?;
    let out = input.apply(Reduce::new(kind, dim.map(<[isize]>::to_vec)), &[])?;
    if !keepdim {
        return Ok(out);
    }
    match dim {
        None => reshape(&out, &vec![Dim::Static(1); rank]),
        Some(dim) => {
            let mut axes = normalize_axes(dim, rank)?;
            axes.sort_unstable();
            axes.into_iter()
                .try_fold(out, |out, axis| unsqueeze(&out, axis as isize))
        }
    }
}

/// Sum over `dim`, or over every axis when `dim` is `None`.
pub fn sum(input: &Tensor, dim: Option<&[isize]>, keepdim: bool) -> Result<Tensor> {
    reduce_impl(input, ReduceKind::Sum, dim, keepdim)
}

pub fn prod(input: &Tensor, dim: Option<&[isize]>, keepdim: bool) -> Result<Tensor> {
    reduce_impl(input, ReduceKind::Mul, dim, keepdim)
}

pub fn max(input: &Tensor, dim: Option<&[isize]>, keepdim: bool) -> Result<Tensor> {
    reduce_impl(input, ReduceKind::Max, dim, keepdim)
}

/// Logical and of a bool tensor.
pub fn all(input: &Tensor, dim: Option<&[isize]>, keepdim: bool) -> Result<Tensor> {
    reduce_impl(input, ReduceKind::And, dim, keepdim)
}

/// Logical or of a bool tensor.
pub fn any(input: &Tensor, dim: Option<&[isize]>, keepdim: bool) -> Result<Tensor> {
    reduce_impl(input, ReduceKind::Or, dim, keepdim)
}

/// `sum / count`, where `count` is the number of reduced elements after
/// `adjust_count` has been applied to it.
fn mean_impl(
    input: &Tensor,
    dim: Option<&[isize]>,
    keepdim: bool,
    adjust_count: impl FnOnce(Tensor) -> Result<Tensor>,
) -> Result<Tensor> {
    let total = sum(input, dim, keepdim)?;
    let count = prod(&shape_of(input, dim)?, None, false)?;
    let count = cast(&adjust_count(count)?, total.dtype()?)?;
    div(&total, &count)
}

pub fn mean(input: &Tensor, dim: Option<&[isize]>, keepdim: bool) -> Result<Tensor> {
    mean_impl(input, dim, keepdim, Ok)
}

/// Variance with the divisor `max(0, N - correction)`.
///
/// With `N <= correction` the divisor is 0 and the result is inf or NaN.
/// `correction` must fit the index dtype.
pub fn var(
    input: &Tensor,
    dim: Option<&[isize]>,
    keepdim: bool,
    correction: i64,
) -> Result<Tensor> {
    if i32::try_from(correction).is_err() {
        return Err(Error::invalid_argument(format!(
            "correction {correction} does not fit the {} index type",
            DType::INDEX
        )));
    }
    let center = mean(input, dim, dim.is_some())?;
    let deviation = sub(input, &center)?;
    let squared = mul(&deviation, &deviation)?;
    let graph = input.graph().clone();
    mean_impl(&squared, dim, keepdim, |count| {
        let corrected = sub(&count, &constant(&graph, correction, DType::INDEX)?)?;
        maximum(&corrected, &constant(&graph, 0i64, DType::INDEX)?)
    })
}

fn arg_min_max_impl(
    input: &Tensor,
    kind: ArgKind,
    dim: Option<isize>,
    keepdim: bool,
) -> Result<Tensor> {
    let rank = input.rank()?;
    let (values, axis) = match dim {
        Some(dim) => (input.clone(), dim),
        None => (flatten(input, 0, -1)?, 0),
    };
    let indices = iota_like(&values, axis, Some(DType::INDEX))?;
    let out = values.apply(ArgMinMax::new(kind, axis), &[&indices])?;
    if !keepdim {
        return Ok(out);
    }
    match dim {
        None => reshape(&out, &vec![Dim::Static(1); rank]),
        Some(dim) => unsqueeze(&out, dim),
    }
}

/// Index of the first maximum along `dim`, or of the flattened input when
/// `dim` is `None`.
pub fn argmax(input: &Tensor, dim: Option<isize>, keepdim: bool) -> Result<Tensor> {
    arg_min_max_impl(input, ArgKind::ArgMax, dim, keepdim)
}

/// Index of the first minimum along `dim`, or of the flattened input when
/// `dim` is `None`.
pub fn argmin(input: &Tensor, dim: Option<isize>, keepdim: bool) -> Result<Tensor> {
    arg_min_max_impl(input, ArgKind::ArgMin, dim, keepdim)
}
