use crate::{
    bail,
    buffer::BufferRef,
    lowering::{LoweredDim, LoweredOp, LoweredOpKind, Lowering, ValueId},
    node::{Node, NodeMeta},
    DType, Device, Dim, Error, Result, Scalar,
};

use super::{input_rank, place_all, shape::check_scalar_dims, shape::lower_dims, TraceOp};

/// Data that already exists. Its node is realized from the start.
#[derive(Debug, Clone)]
pub struct Storage {
    pub(crate) data: BufferRef,
}

impl Storage {
    pub fn new(data: BufferRef) -> Self {
        Self { data }
    }
}

impl TraceOp for Storage {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn infer_rank(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(self.data.shape().len());
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].dtype = Some(self.data.dtype());
        Ok(())
    }

    fn infer_shapes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(self.data.shape().iter().copied().map(Dim::Static).collect());
        Ok(())
    }

    fn infer_devices(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        place_all(outputs, self.data.device());
        Ok(())
    }

    fn lower(
        &self,
        _ctx: &mut Lowering,
        _inputs: &[ValueId],
        _outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        bail!("storage is bound as a program input and is never lowered")
    }
}

/// A rank-0 literal.
#[derive(Debug, Clone)]
pub struct Constant {
    pub(crate) value: Scalar,
    dtype: DType,
}

impl Constant {
    pub fn new(value: Scalar, dtype: DType) -> Self {
        Self { value, dtype }
    }
}

impl TraceOp for Constant {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn infer_rank(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(0);
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].dtype = Some(self.dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(vec![]);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        _inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(ctx.constant_into(self.value, outputs[0], "constant"))
    }
}

/// Where a generated tensor takes its shape from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Extent {
    /// The given dims; symbolic ones are the op's inputs, in order.
    Given(Vec<Dim>),
    /// The shape of the op's only input.
    Like,
}

impl Extent {
    fn rank(&self, inputs: &[&Node]) -> Result<usize> {
        match self {
            Self::Given(shape) => {
                if shape.contains(&Dim::Dynamic) {
                    return Err(Error::invalid_argument(
                        "a generated tensor needs every extent given",
                    ));
                }
                check_scalar_dims(shape, inputs, 0)?;
                Ok(shape.len())
            }
            Self::Like => input_rank(inputs, 0),
        }
    }

    fn shape(&self, inputs: &[&Node]) -> Result<Vec<Dim>> {
        match self {
            Self::Given(shape) => Ok(shape.clone()),
            Self::Like => Ok(inputs[0].shape()?.to_vec()),
        }
    }

    /// Lowered extents, reading operands from position `base` on.
    fn lower(&self, rank: usize, base: usize) -> Vec<LoweredDim> {
        match self {
            Self::Given(shape) => lower_dims(shape, base, None),
            Self::Like => (0..rank)
                .map(|axis| LoweredDim::InputAxis {
                    operand: base,
                    axis,
                })
                .collect(),
        }
    }

    fn device(&self, inputs: &[&Node]) -> Device {
        match self {
            Self::Like => inputs[0].device(),
            Self::Given(_) => Device::default(),
        }
    }
}

/// Every element set to one value.
#[derive(Debug, Clone)]
pub struct Fill {
    pub(crate) value: Scalar,
    dtype: DType,
    extent: Extent,
}

impl Fill {
    pub fn new(value: Scalar, dtype: DType, shape: Vec<Dim>) -> Self {
        Self {
            value,
            dtype,
            extent: Extent::Given(shape),
        }
    }

    /// Shaped like the only input.
    pub fn like(value: Scalar, dtype: DType) -> Self {
        Self {
            value,
            dtype,
            extent: Extent::Like,
        }
    }
}

impl TraceOp for Fill {
    fn name(&self) -> &'static str {
        "fill"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(self.extent.rank(inputs)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].dtype = Some(self.dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(self.extent.shape(inputs)?);
        Ok(())
    }

    fn infer_devices(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        place_all(outputs, self.extent.device(inputs));
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let out = ctx.value(outputs[0]);
        let (dtype, device, rank) = (out.dtype, out.device, out.rank);
        let (value, mut ops) = ctx.constant(self.value, dtype, device, "fill value");
        let mut operands = vec![value];
        operands.extend_from_slice(inputs);
        ops.push(ctx.emit(
            LoweredOpKind::Broadcast {
                shape: self.extent.lower(rank, 1),
            },
            operands,
            outputs.to_vec(),
        ));
        Ok(ops)
    }
}

/// Each element holds its own index along `dim`.
#[derive(Debug, Clone)]
pub struct Iota {
    pub(crate) dim: usize,
    requested: isize,
    dtype: DType,
    extent: Extent,
}

impl Iota {
    pub fn new(dim: isize, dtype: DType, shape: Vec<Dim>) -> Self {
        Self {
            dim: 0,
            requested: dim,
            dtype,
            extent: Extent::Given(shape),
        }
    }

    pub fn like(dim: isize, dtype: DType) -> Self {
        Self {
            dim: 0,
            requested: dim,
            dtype,
            extent: Extent::Like,
        }
    }
}

impl TraceOp for Iota {
    fn name(&self) -> &'static str {
        "iota"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = self.extent.rank(inputs)?;
        self.dim = crate::shape::normalize_axis(self.requested, rank)?;
        outputs[0].rank = Some(rank);
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        if self.dtype == DType::Bool {
            return Err(Error::invalid_argument("iota cannot produce bool"));
        }
        outputs[0].dtype = Some(self.dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(self.extent.shape(inputs)?);
        Ok(())
    }

    fn infer_devices(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        place_all(outputs, self.extent.device(inputs));
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let rank = ctx.value(outputs[0]).rank;
        Ok(vec![ctx.emit(
            LoweredOpKind::Iota {
                dim: self.dim,
                shape: self.extent.lower(rank, 0),
            },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// Distributions random tensors are drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, std: f64 },
}

/// A tensor of independent random samples.
#[derive(Debug, Clone)]
pub struct Random {
    pub(crate) distribution: Distribution,
    dtype: DType,
    extent: Extent,
}

impl Random {
    pub fn new(distribution: Distribution, dtype: DType, shape: Vec<Dim>) -> Self {
        Self {
            distribution,
            dtype,
            extent: Extent::Given(shape),
        }
    }
}

impl TraceOp for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        match self.distribution {
            Distribution::Uniform { low, high } if !(low < high) => {
                return Err(Error::invalid_argument(format!(
                    "empty uniform range [{low}, {high})"
                )))
            }
            Distribution::Normal { std, .. } if !(std >= 0.0) => {
                return Err(Error::invalid_argument(format!(
                    "negative standard deviation {std}"
                )))
            }
            _ => {}
        }
        outputs[0].rank = Some(self.extent.rank(inputs)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        if !self.dtype.is_float() {
            return Err(Error::invalid_argument(format!(
                "random tensors must be floating point, got {}",
                self.dtype
            )));
        }
        outputs[0].dtype = Some(self.dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(self.extent.shape(inputs)?);
        Ok(())
    }

    fn infer_devices(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        place_all(outputs, self.extent.device(inputs));
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let rank = ctx.value(outputs[0]).rank;
        Ok(vec![ctx.emit(
            LoweredOpKind::Rng {
                distribution: self.distribution,
                shape: self.extent.lower(rank, 0),
            },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}
