use crate::{
    lowering::{LoweredDim, LoweredOp, LoweredOpKind, Lowering, ValueId},
    node::{Node, NodeMeta},
    shape::{normalize_axes, normalize_axis, product},
    DType, Dim, Error, Result,
};

use super::{input_rank, TraceOp};

/// Check the rank-0 integer inputs backing the `Dim::Scalar` extents of
/// `target`. They follow the op's other inputs, starting at `first`.
pub(crate) fn check_scalar_dims(target: &[Dim], inputs: &[&Node], first: usize) -> Result<()> {
    let expected = target.iter().filter(|d| d.scalar_node().is_some()).count();
    let given = inputs.len().saturating_sub(first);
    if expected != given {
        return Err(Error::msg(format!(
            "{expected} symbolic extents but {given} extent inputs"
        )));
    }
    for node in &inputs[first..] {
        let (rank, dtype) = (node.rank()?, node.dtype()?);
        if rank != 0 || !dtype.is_integral() {
            return Err(Error::invalid_argument(format!(
                "extent `{}` must be a rank-0 integer, got rank {rank} {dtype}",
                node.name()
            )));
        }
    }
    Ok(())
}

/// Lower target extents. Symbolic extents refer to operands starting at
/// `scalar_base`; `Dynamic` keeps the extent of `keep.0` at the right-aligned
/// axis (offset `keep.1`), or is inferred when `keep` is `None`.
pub(crate) fn lower_dims(
    target: &[Dim],
    scalar_base: usize,
    keep: Option<(usize, usize)>,
) -> Vec<LoweredDim> {
    let mut next = scalar_base;
    target
        .iter()
        .enumerate()
        .map(|(i, d)| match d {
            Dim::Static(n) => LoweredDim::Static(*n),
            Dim::Scalar(_) => {
                next += 1;
                LoweredDim::Operand(next - 1)
            }
            Dim::Dynamic => match keep {
                Some((operand, offset)) => LoweredDim::InputAxis {
                    operand,
                    axis: i - offset,
                },
                None => LoweredDim::Infer,
            },
        })
        .collect()
}

/// Same elements, new shape. At most one extent may be `Dynamic`, which is
/// inferred from the element count.
#[derive(Debug, Clone)]
pub struct Reshape {
    pub(crate) shape: Vec<Dim>,
}

impl Reshape {
    pub fn new(shape: Vec<Dim>) -> Self {
        Self { shape }
    }
}

impl TraceOp for Reshape {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        input_rank(inputs, 0)?;
        if self.shape.iter().filter(|d| **d == Dim::Dynamic).count() > 1 {
            return Err(Error::invalid_argument(
                "reshape target can infer at most one extent",
            ));
        }
        check_scalar_dims(&self.shape, inputs, 1)?;
        outputs[0].rank = Some(self.shape.len());
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let mut shape = self.shape.clone();
        if let Dim::Static(total) = product(inputs[0].shape()?) {
            let known = shape
                .iter()
                .filter(|d| **d != Dim::Dynamic)
                .copied()
                .collect::<Vec<_>>();
            if let Dim::Static(known) = product(&known) {
                let inferred = shape.iter().position(|d| *d == Dim::Dynamic);
                match inferred {
                    Some(i) if known != 0 && total % known == 0 => {
                        shape[i] = Dim::Static(total / known)
                    }
                    None if known == total => {}
                    _ => {
                        return Err(Error::invalid_argument(format!(
                            "cannot reshape {total} elements into {}",
                            self.shape
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("x")
                        )))
                    }
                }
            }
        }
        outputs[0].shape = Some(shape);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::Reshape {
                shape: lower_dims(&self.shape, 1, None),
            },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// Merge axes `start..=end` into one. A rank-0 input becomes rank 1.
#[derive(Debug, Clone)]
pub struct Flatten {
    start_dim: isize,
    end_dim: isize,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Flatten {
    pub fn new(start_dim: isize, end_dim: isize) -> Self {
        Self {
            start_dim,
            end_dim,
            start: 0,
            end: 0,
        }
    }
}

impl TraceOp for Flatten {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = input_rank(inputs, 0)?;
        if rank == 0 {
            outputs[0].rank = Some(1);
            return Ok(());
        }
        self.start = normalize_axis(self.start_dim, rank)?;
        self.end = normalize_axis(self.end_dim, rank)?;
        if self.start > self.end {
            return Err(Error::invalid_argument(format!(
                "flatten start {} is after end {}",
                self.start_dim, self.end_dim
            )));
        }
        outputs[0].rank = Some(rank - (self.end - self.start));
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let shape = inputs[0].shape()?;
        outputs[0].shape = Some(if shape.is_empty() {
            vec![Dim::Static(1)]
        } else {
            let mut out = shape[..self.start].to_vec();
            out.push(product(&shape[self.start..=self.end]));
            out.extend_from_slice(&shape[self.end + 1..]);
            out
        });
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let rank = ctx.value(inputs[0]).rank;
        let shape = if rank == 0 {
            vec![LoweredDim::Static(1)]
        } else {
            let mut shape = (0..self.start)
                .map(|axis| LoweredDim::InputAxis { operand: 0, axis })
                .collect::<Vec<_>>();
            shape.push(LoweredDim::Merged {
                operand: 0,
                start: self.start,
                end: self.end,
            });
            shape.extend((self.end + 1..rank).map(|axis| LoweredDim::InputAxis { operand: 0, axis }));
            shape
        };
        Ok(vec![ctx.emit(
            LoweredOpKind::Reshape { shape },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// Insert an axis of extent 1.
#[derive(Debug, Clone)]
pub struct Unsqueeze {
    requested: isize,
    pub(crate) dim: usize,
}

impl Unsqueeze {
    pub fn new(dim: isize) -> Self {
        Self {
            requested: dim,
            dim: 0,
        }
    }
}

impl TraceOp for Unsqueeze {
    fn name(&self) -> &'static str {
        "unsqueeze"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = input_rank(inputs, 0)? + 1;
        self.dim = normalize_axis(self.requested, rank)?;
        outputs[0].rank = Some(rank);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let mut shape = inputs[0].shape()?.to_vec();
        shape.insert(self.dim, Dim::Static(1));
        outputs[0].shape = Some(shape);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let rank = ctx.value(inputs[0]).rank;
        let mut shape = (0..rank)
            .map(|axis| LoweredDim::InputAxis { operand: 0, axis })
            .collect::<Vec<_>>();
        shape.insert(self.dim, LoweredDim::Static(1));
        Ok(vec![ctx.emit(
            LoweredOpKind::Reshape { shape },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// Broadcast to a larger shape, right-aligned. Only extents of 1 grow;
/// a `Dynamic` target extent keeps the input's.
#[derive(Debug, Clone)]
pub struct Expand {
    pub(crate) shape: Vec<Dim>,
}

impl Expand {
    pub fn new(shape: Vec<Dim>) -> Self {
        Self { shape }
    }

    fn offset(&self, rank: usize) -> usize {
        self.shape.len() - rank
    }
}

impl TraceOp for Expand {
    fn name(&self) -> &'static str {
        "expand"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = input_rank(inputs, 0)?;
        if self.shape.len() < rank {
            return Err(Error::invalid_argument(format!(
                "cannot expand a rank {rank} tensor to rank {}",
                self.shape.len()
            )));
        }
        if self.shape[..self.offset(rank)].contains(&Dim::Dynamic) {
            return Err(Error::invalid_argument(
                "new leading extents of an expand must be given",
            ));
        }
        check_scalar_dims(&self.shape, inputs, 1)?;
        outputs[0].rank = Some(self.shape.len());
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let input = inputs[0].shape()?;
        let offset = self.offset(input.len());
        let mut shape = self.shape.clone();
        for (j, current) in input.iter().enumerate() {
            let target = &mut shape[offset + j];
            match (*current, *target) {
                (_, Dim::Dynamic) => *target = *current,
                (Dim::Static(1), _) => {}
                (Dim::Static(a), Dim::Static(b)) if a != b => {
                    return Err(Error::invalid_argument(format!(
                        "cannot expand extent {a} to {b} at axis {}",
                        offset + j
                    )))
                }
                _ => {}
            }
        }
        outputs[0].shape = Some(shape);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let offset = self.offset(ctx.value(inputs[0]).rank);
        Ok(vec![ctx.emit(
            LoweredOpKind::Broadcast {
                shape: lower_dims(&self.shape, 1, Some((0, offset))),
            },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// The extents of some axes of a tensor, as a rank-1 index tensor.
#[derive(Debug, Clone)]
pub struct ShapeOf {
    dim: Option<Vec<isize>>,
    pub(crate) axes: Vec<usize>,
}

impl ShapeOf {
    /// `None` selects every axis.
    pub fn new(dim: Option<Vec<isize>>) -> Self {
        Self {
            dim,
            axes: Vec::new(),
        }
    }
}

impl TraceOp for ShapeOf {
    fn name(&self) -> &'static str {
        "shape_of"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = input_rank(inputs, 0)?;
        self.axes = match &self.dim {
            None => (0..rank).collect(),
            Some(dim) => normalize_axes(dim, rank)?,
        };
        outputs[0].rank = Some(1);
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].dtype = Some(DType::INDEX);
        Ok(())
    }

    fn infer_shapes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(vec![Dim::Static(self.axes.len())]);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::ShapeOf {
                axes: self.axes.clone(),
            },
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

