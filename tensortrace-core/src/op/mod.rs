//! Graph operations.
//!
//! Every operation kind is its own struct implementing [`TraceOp`]; [`Op`] is
//! the closed set of kinds the graph can hold. An op never owns its nodes: the
//! graph arena does, and the op only sees them while inferring metadata.

use std::fmt::Display;

use crate::{
    lowering::{LoweredOp, Lowering, ValueId},
    node::{Node, NodeMeta},
    Device, Result,
};

mod elementwise;
mod init;
mod reduce;
mod shape;

pub use elementwise::{Binary, BinaryOpType, Cast, Compare, CompareOpType, Unary, UnaryOpType, Where};
pub use init::{Constant, Distribution, Fill, Iota, Random, Storage};
pub use reduce::{ArgKind, ArgMinMax, Reduce, ReduceKind};
pub use shape::{Expand, Flatten, Reshape, ShapeOf, Unsqueeze};

/// Per-kind behaviour of a graph operation.
///
/// The `infer_*` steps run in order (rank, dtypes, shapes, devices) while the
/// op is being built and only write to `outputs`.
pub trait TraceOp {
    fn name(&self) -> &'static str;

    fn num_outputs(&self) -> usize {
        1
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()>;

    /// Defaults to the dtype of the first input.
    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let dtype = inputs[0].dtype()?;
        for out in outputs.iter_mut() {
            out.dtype = Some(dtype);
        }
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()>;

    /// Defaults to the device of the first input.
    fn infer_devices(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let device = inputs.first().map(|n| n.device()).unwrap_or_default();
        for out in outputs.iter_mut() {
            out.device = device;
        }
        Ok(())
    }

    /// Translate this op into flat IR. `inputs` and `outputs` are the lowered
    /// values bound to this op's input and output nodes.
    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>>;
}

macro_rules! ops {
    ($($variant:ident),* $(,)?) => {
        /// A graph operation.
        #[derive(Debug, Clone)]
        pub enum Op {
            $($variant($variant),)*
        }

        impl Op {
            fn as_trace_op(&self) -> &dyn TraceOp {
                match self {
                    $(Self::$variant(op) => op,)*
                }
            }

            fn as_trace_op_mut(&mut self) -> &mut dyn TraceOp {
                match self {
                    $(Self::$variant(op) => op,)*
                }
            }
        }

        $(
            impl From<$variant> for Op {
                fn from(op: $variant) -> Self {
                    Self::$variant(op)
                }
            }
        )*
    };
}

ops!(
    Storage, Constant, Fill, Iota, Random, Cast, Binary, Compare, Where, Unary, Reduce, ArgMinMax,
    Reshape, Flatten, Unsqueeze, Expand, ShapeOf,
);

impl Op {
    pub fn name(&self) -> &'static str {
        self.as_trace_op().name()
    }

    pub fn num_outputs(&self) -> usize {
        self.as_trace_op().num_outputs()
    }

    /// Run every inference step. Nothing is written outside `outputs`.
    pub(crate) fn infer(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let op = self.as_trace_op_mut();
        op.infer_rank(inputs, outputs)?;
        op.infer_dtypes(inputs, outputs)?;
        op.infer_shapes(inputs, outputs)?;
        op.infer_devices(inputs, outputs)
    }

    pub(crate) fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        self.as_trace_op().lower(ctx, inputs, outputs)
    }

    /// Short label used in traces and DOT output.
    pub fn label(&self) -> String {
        match self {
            Self::Storage(op) => format!("Storage({:?})", op.data.shape()),
            Self::Constant(op) => format!("Constant({})", op.value),
            Self::Fill(op) => format!("Fill({})", op.value),
            Self::Iota(op) => format!("Iota(dim={})", op.dim),
            Self::Random(op) => format!("Random({:?})", op.distribution),
            Self::Cast(op) => format!("Cast({})", op.dtype),
            Self::Binary(op) => format!("Binary({:?})", op.operator),
            Self::Compare(op) => format!("Compare({:?})", op.operator),
            Self::Where(_) => "Where".to_string(),
            Self::Unary(op) => format!("Unary({:?})", op.operator),
            Self::Reduce(op) => format!("Reduce({}, dim={:?})", op.kind.as_str(), op.axes),
            Self::ArgMinMax(op) => format!("ArgMinMax({}, dim={})", op.kind.as_str(), op.axis),
            Self::Reshape(_) => "Reshape".to_string(),
            Self::Flatten(op) => format!("Flatten({}..={})", op.start, op.end),
            Self::Unsqueeze(op) => format!("Unsqueeze({})", op.dim),
            Self::Expand(_) => "Expand".to_string(),
            Self::ShapeOf(op) => format!("ShapeOf({:?})", op.axes),
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Require that an input's rank is known, returning it.
pub(crate) fn input_rank(inputs: &[&Node], i: usize) -> Result<usize> {
    inputs[i].rank()
}

/// Place every output on `device`.
pub(crate) fn place_all(outputs: &mut [NodeMeta], device: Device) {
    for out in outputs.iter_mut() {
        out.device = device;
    }
}
