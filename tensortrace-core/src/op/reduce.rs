use crate::{
    lowering::{LoweredOp, LoweredOpKind, Lowering, ValueId},
    node::{Node, NodeMeta},
    shape::{normalize_axes, normalize_axis},
    DType, Error, Result, Scalar,
};

use super::{input_rank, TraceOp};

/// Associative reduction operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceKind {
    Sum,
    Max,
    Mul,
    And,
    Or,
}

impl ReduceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Mul => "mul",
            Self::And => "and",
            Self::Or => "or",
        }
    }

    /// The neutral element the reduction is seeded with.
    pub const fn identity(&self) -> Scalar {
        match self {
            Self::Sum => Scalar::Int(0),
            Self::Max => Scalar::Lowest,
            Self::Mul => Scalar::Int(1),
            Self::And => Scalar::Bool(true),
            Self::Or => Scalar::Bool(false),
        }
    }

    fn accepts(&self, dtype: DType) -> bool {
        match self {
            Self::And | Self::Or => dtype == DType::Bool,
            Self::Sum | Self::Mul => dtype != DType::Bool,
            Self::Max => true,
        }
    }
}

/// Reduce a tensor over a set of axes.
#[derive(Debug, Clone)]
pub struct Reduce {
    pub(crate) kind: ReduceKind,
    /// As requested; `None` reduces every axis.
    pub(crate) dim: Option<Vec<isize>>,
    /// Normalized during inference.
    pub(crate) axes: Vec<usize>,
}

impl Reduce {
    pub fn new(kind: ReduceKind, dim: Option<Vec<isize>>) -> Self {
        Self {
            kind,
            dim,
            axes: Vec::new(),
        }
    }

    pub fn kind(&self) -> ReduceKind {
        self.kind
    }

    /// The reduced axes, normalized into `0..rank`.
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }
}

impl TraceOp for Reduce {
    fn name(&self) -> &'static str {
        "reduce"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = input_rank(inputs, 0)?;
        self.axes = match &self.dim {
            None => (0..rank).collect(),
            Some(dim) => normalize_axes(dim, rank)?,
        };
        outputs[0].rank = Some(rank - self.axes.len());
        Ok(())
    }

    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let dtype = inputs[0].dtype()?;
        if !self.kind.accepts(dtype) {
            return Err(Error::invalid_argument(format!(
                "cannot {}-reduce a {dtype} tensor",
                self.kind.as_str()
            )));
        }
        outputs[0].dtype = Some(dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let shape = inputs[0].shape()?;
        outputs[0].shape = Some(
            shape
                .iter()
                .enumerate()
                .filter(|(i, _)| !self.axes.contains(i))
                .map(|(_, d)| *d)
                .collect(),
        );
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let out = ctx.value(outputs[0]);
        let (dtype, device) = (out.dtype, out.device);
        let (identity, mut ops) = ctx.constant(
            self.kind.identity(),
            dtype,
            device,
            &format!("{} identity", self.kind.as_str()),
        );
        ops.push(ctx.emit(
            LoweredOpKind::Reduce {
                mode: self.kind,
                dims: self.axes.clone(),
            },
            vec![inputs[0], identity],
            vec![outputs[0]],
        ));
        Ok(ops)
    }
}

/// Which extreme an arg-reduction looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    ArgMax,
    ArgMin,
}

impl ArgKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ArgMax => "argmax",
            Self::ArgMin => "argmin",
        }
    }

    /// Whether `candidate` replaces the running best. Strict, so ties keep the
    /// earlier position.
    pub fn improves<T: PartialOrd>(&self, candidate: T, best: T) -> bool {
        match self {
            Self::ArgMax => candidate > best,
            Self::ArgMin => candidate < best,
        }
    }
}

/// Index of the first extreme value along one axis.
///
/// Inputs are the values and an index tensor of the same shape, usually an
/// iota along `dim`. The output always has the index dtype.
#[derive(Debug, Clone)]
pub struct ArgMinMax {
    pub(crate) kind: ArgKind,
    pub(crate) dim: isize,
    pub(crate) axis: usize,
}

impl ArgMinMax {
    pub fn new(kind: ArgKind, dim: isize) -> Self {
        Self { kind, dim, axis: 0 }
    }

    pub fn kind(&self) -> ArgKind {
        self.kind
    }

    pub fn axis(&self) -> usize {
        self.axis
    }
}

impl TraceOp for ArgMinMax {
    fn name(&self) -> &'static str {
        "arg_min_max"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let rank = input_rank(inputs, 0)?;
        let index_rank = input_rank(inputs, 1)?;
        if rank != index_rank {
            return Err(Error::invalid_argument(format!(
                "{} index tensor has rank {index_rank}, values have rank {rank}",
                self.kind.as_str()
            )));
        }
        self.axis = normalize_axis(self.dim, rank)?;
        outputs[0].rank = Some(rank - 1);
        Ok(())
    }

    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let values = inputs[0].dtype()?;
        if values == DType::Bool {
            return Err(Error::invalid_argument(format!(
                "{} of a bool tensor",
                self.kind.as_str()
            )));
        }
        let indices = inputs[1].dtype()?;
        if indices != DType::INDEX {
            return Err(Error::invalid_argument(format!(
                "{} index tensor must be {}, got {indices}",
                self.kind.as_str(),
                DType::INDEX
            )));
        }
        outputs[0].dtype = Some(DType::INDEX);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let mut shape = inputs[0].shape()?.to_vec();
        shape.remove(self.axis);
        outputs[0].shape = Some(shape);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        let values = ctx.value(inputs[0]);
        let (dtype, device) = (values.dtype, values.device);
        let (init_value, mut ops) = ctx.constant(Scalar::Int(0), dtype, device, "initial value");
        let (init_index, index_ops) =
            ctx.constant(Scalar::Int(0), DType::INDEX, device, "initial index");
        ops.extend(index_ops);
        ops.push(ctx.emit(
            LoweredOpKind::ArgReduce {
                mode: self.kind,
                dim: self.axis,
            },
            vec![inputs[0], inputs[1], init_value, init_index],
            vec![outputs[0]],
        ));
        Ok(ops)
    }
}
