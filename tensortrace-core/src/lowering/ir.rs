use std::fmt::{Display, Write};

use crate::{
    buffer::BufferRef,
    graph::OpId,
    op::{ArgKind, BinaryOpType, CompareOpType, Distribution, ReduceKind, UnaryOpType},
    DType, Device, Scalar,
};

/// SSA value of a lowered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct LoweredValue {
    pub id: ValueId,
    pub dtype: DType,
    pub rank: usize,
    /// Static extents where known.
    pub shape: Vec<Option<usize>>,
    pub device: Device,
    /// Why the lowering created this value.
    pub reason: String,
}

/// One extent of a lowered shape operand, resolved at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweredDim {
    Static(usize),
    /// The value of the rank-0 integer operand at this position.
    Operand(usize),
    /// The extent of `axis` of the operand at this position.
    InputAxis { operand: usize, axis: usize },
    /// The product of extents `start..=end` of the operand at this position.
    Merged {
        operand: usize,
        start: usize,
        end: usize,
    },
    /// Whatever makes the element count match. At most one per shape.
    Infer,
}

impl Display for LoweredDim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(n) => write!(f, "{n}"),
            Self::Operand(i) => write!(f, "${i}"),
            Self::InputAxis { operand, axis } => write!(f, "${operand}[{axis}]"),
            Self::Merged {
                operand,
                start,
                end,
            } => write!(f, "${operand}[{start}..={end}]"),
            Self::Infer => f.write_str("-1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoweredOpKind {
    /// Rank-0 literal at the output's dtype.
    Constant { value: Scalar },
    Convert,
    Broadcast { shape: Vec<LoweredDim> },
    Iota { dim: usize, shape: Vec<LoweredDim> },
    Rng {
        distribution: Distribution,
        shape: Vec<LoweredDim>,
    },
    Binary(BinaryOpType),
    Compare(CompareOpType),
    Select,
    Unary(UnaryOpType),
    /// Operands: `(input, identity)`.
    Reduce { mode: ReduceKind, dims: Vec<usize> },
    /// Operands: `(values, indices, initial value, initial index)`.
    ArgReduce { mode: ArgKind, dim: usize },
    Reshape { shape: Vec<LoweredDim> },
    ShapeOf { axes: Vec<usize> },
}

impl LoweredOpKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Convert => "convert",
            Self::Broadcast { .. } => "broadcast",
            Self::Iota { .. } => "iota",
            Self::Rng { .. } => "rng",
            Self::Binary(_) => "binary",
            Self::Compare(_) => "compare",
            Self::Select => "select",
            Self::Unary(_) => "unary",
            Self::Reduce { .. } => "reduce",
            Self::ArgReduce { .. } => "arg_reduce",
            Self::Reshape { .. } => "reshape",
            Self::ShapeOf { .. } => "shape_of",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoweredOp {
    pub kind: LoweredOpKind,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    /// The graph operation this was lowered from.
    pub origin: OpId,
}

/// A flat, SSA-form program handed to a compiler as one unit.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub(crate) values: Vec<LoweredValue>,
    pub(crate) ops: Vec<LoweredOp>,
    pub(crate) inputs: Vec<(ValueId, BufferRef)>,
    pub(crate) outputs: Vec<ValueId>,
}

impl Program {
    pub fn values(&self) -> &[LoweredValue] {
        &self.values
    }

    pub fn value(&self, id: ValueId) -> &LoweredValue {
        &self.values[id.0]
    }

    pub fn ops(&self) -> &[LoweredOp] {
        &self.ops
    }

    /// Declared inputs, each bound to already realized data.
    pub fn inputs(&self) -> &[(ValueId, BufferRef)] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Devices the outputs should be placed on.
    pub fn output_devices(&self) -> Vec<Device> {
        self.outputs.iter().map(|v| self.value(*v).device).collect()
    }
}

fn write_shape(out: &mut String, shape: &[LoweredDim]) -> std::fmt::Result {
    out.push('[');
    for (i, d) in shape.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{d}")?;
    }
    out.push(']');
    Ok(())
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ty = |v: ValueId| {
            let value = self.value(v);
            let dims = value
                .shape
                .iter()
                .map(|d| d.map_or("?".to_string(), |d| d.to_string()))
                .collect::<Vec<_>>()
                .join("x");
            format!("tensor<{dims}:{}>", value.dtype)
        };
        let inputs = self
            .inputs
            .iter()
            .map(|(v, _)| format!("{v}: {}", ty(*v)))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "func @main({inputs}) {{")?;
        for op in &self.ops {
            let mut attrs = String::new();
            match &op.kind {
                LoweredOpKind::Constant { value } => write!(attrs, " {{value = {value}}}")?,
                LoweredOpKind::Broadcast { shape } | LoweredOpKind::Reshape { shape } => {
                    attrs.push_str(" {shape = ");
                    write_shape(&mut attrs, shape)?;
                    attrs.push('}');
                }
                LoweredOpKind::Iota { dim, shape } => {
                    write!(attrs, " {{dim = {dim}, shape = ")?;
                    write_shape(&mut attrs, shape)?;
                    attrs.push('}');
                }
                LoweredOpKind::Rng {
                    distribution,
                    shape,
                } => {
                    write!(attrs, " {{distribution = {distribution:?}, shape = ")?;
                    write_shape(&mut attrs, shape)?;
                    attrs.push('}');
                }
                LoweredOpKind::Binary(b) => write!(attrs, " {{op = {b:?}}}")?,
                LoweredOpKind::Compare(c) => write!(attrs, " {{op = {c:?}}}")?,
                LoweredOpKind::Unary(u) => write!(attrs, " {{op = {u:?}}}")?,
                LoweredOpKind::Reduce { mode, dims } => {
                    write!(attrs, " {{mode = {}, dims = {dims:?}}}", mode.as_str())?
                }
                LoweredOpKind::ArgReduce { mode, dim } => {
                    write!(attrs, " {{mode = {}, dim = {dim}}}", mode.as_str())?
                }
                LoweredOpKind::ShapeOf { axes } => write!(attrs, " {{axes = {axes:?}}}")?,
                LoweredOpKind::Convert | LoweredOpKind::Select => {}
            }
            let outs = op
                .outputs
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let ins = op
                .inputs
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let out_tys = op
                .outputs
                .iter()
                .map(|v| ty(*v))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "  {outs} = {}({ins}){attrs} : {out_tys}", op.kind.name())?;
        }
        let outs = self
            .outputs
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "  return {outs}")?;
        write!(f, "}}")
    }
}
