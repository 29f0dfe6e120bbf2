use crate::{
    graph::Graph,
    op::{Distribution, Fill, Iota, Random},
    DType, Dim, Error, Result, Scalar, Tensor,
};

use super::{add, constant, extent_inputs, greater, less, mul, where_};

/// A tensor of `shape` with every element set to `value`.
pub fn full(graph: &Graph, shape: &[Dim], value: impl Into<Scalar>, dtype: DType) -> Result<Tensor> {
    Tensor::build(
        graph,
        Fill::new(value.into(), dtype, shape.to_vec()),
        &extent_inputs(shape),
    )
}

/// Shaped like `input`, every element set to `value`. `dtype` defaults to
/// the input's.
pub fn full_like(input: &Tensor, value: impl Into<Scalar>, dtype: Option<DType>) -> Result<Tensor> {
    let dtype = match dtype {
        Some(dtype) => dtype,
        None => input.dtype()?,
    };
    input.apply(Fill::like(value.into(), dtype), &[])
}

pub fn zeros(graph: &Graph, shape: &[Dim], dtype: DType) -> Result<Tensor> {
    full(graph, shape, 0i64, dtype)
}

pub fn ones(graph: &Graph, shape: &[Dim], dtype: DType) -> Result<Tensor> {
    full(graph, shape, 1i64, dtype)
}

pub fn zeros_like(input: &Tensor, dtype: Option<DType>) -> Result<Tensor> {
    full_like(input, 0i64, dtype)
}

pub fn ones_like(input: &Tensor, dtype: Option<DType>) -> Result<Tensor> {
    full_like(input, 1i64, dtype)
}

/// Each element holds its index along `dim`.
pub fn iota(graph: &Graph, shape: &[Dim], dim: isize, dtype: DType) -> Result<Tensor> {
    Tensor::build(graph, Iota::new(dim, dtype, shape.to_vec()), &extent_inputs(shape))
}

/// Like [`iota`], shaped like `input`. `dtype` defaults to the input's.
pub fn iota_like(input: &Tensor, dim: isize, dtype: Option<DType>) -> Result<Tensor> {
    let dtype = match dtype {
        Some(dtype) => dtype,
        None => input.dtype()?,
    };
    input.apply(Iota::like(dim, dtype), &[])
}

/// `start, start + step, ...` up to but excluding `stop`.
///
/// A zero `step` or a range holding no element is rejected.
pub fn arange(
    graph: &Graph,
    start: f64,
    stop: f64,
    step: f64,
    dtype: DType,
) -> Result<Tensor> {
    if step == 0.0 {
        return Err(Error::invalid_argument("arange step cannot be 0"));
    }
    let size = ((stop - start) / step).ceil();
    if !(size > 0.0) {
        return Err(Error::invalid_argument(format!(
            "arange is empty: start={start}, stop={stop}, step={step}"
        )));
    }
    let shape = [Dim::Static(size as usize)];
    let positions = iota(graph, &shape, 0, dtype)?;
    let scaled = mul(&positions, &full(graph, &shape, step, dtype)?)?;
    add(&scaled, &full(graph, &shape, start, dtype)?)
}

/// Where the last two axes satisfy `row + diagonal (cmp) column`, keep the
/// element; elsewhere write zero.
fn triangle(input: &Tensor, diagonal: i64, upper: bool) -> Result<Tensor> {
    let rank = input.rank()?;
    if rank < 2 {
        return Err(Error::invalid_argument(format!(
            "triangular masks need at least two axes, got rank {rank}"
        )));
    }
    let rows = iota_like(input, -2, Some(DType::INDEX))?;
    let columns = iota_like(input, -1, Some(DType::INDEX))?;
    let shifted = add(&rows, &constant(input.graph(), diagonal, DType::INDEX)?)?;
    let outside = if upper {
        greater(&shifted, &columns)?
    } else {
        less(&shifted, &columns)?
    };
    let zero = constant(input.graph(), 0i64, input.dtype()?)?;
    where_(&outside, &zero, input)
}

/// Zero everything above the `diagonal`-th diagonal of each trailing matrix.
pub fn tril(input: &Tensor, diagonal: i64) -> Result<Tensor> {
    triangle(input, diagonal, false)
}

/// Zero everything below the `diagonal`-th diagonal of each trailing matrix.
pub fn triu(input: &Tensor, diagonal: i64) -> Result<Tensor> {
    triangle(input, diagonal, true)
}

/// Uniform samples from `[0, 1)`.
pub fn rand(graph: &Graph, shape: &[Dim], dtype: DType) -> Result<Tensor> {
    Tensor::build(
        graph,
        Random::new(Distribution::Uniform { low: 0.0, high: 1.0 }, dtype, shape.to_vec()),
        &extent_inputs(shape),
    )
}

/// Samples from the standard normal distribution.
pub fn randn(graph: &Graph, shape: &[Dim], dtype: DType) -> Result<Tensor> {
    Tensor::build(
        graph,
        Random::new(Distribution::Normal { mean: 0.0, std: 1.0 }, dtype, shape.to_vec()),
        &extent_inputs(shape),
    )
}
