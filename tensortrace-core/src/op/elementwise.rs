use crate::{
    lowering::{LoweredOp, LoweredOpKind, Lowering, ValueId},
    node::{Node, NodeMeta},
    shape::broadcast_shapes,
    DType, Error, Result,
};

use super::{input_rank, TraceOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpType {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    Min,
}

impl BinaryOpType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Pow => "pow",
            Self::Max => "maximum",
            Self::Min => "minimum",
        }
    }

    fn accepts(&self, dtype: DType) -> bool {
        dtype != DType::Bool || matches!(self, Self::Max | Self::Min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOpType {
    Less,
    Greater,
    Equal,
}

impl CompareOpType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Less => "less",
            Self::Greater => "greater",
            Self::Equal => "equal",
        }
    }

    pub fn apply<T: PartialOrd>(&self, a: T, b: T) -> bool {
        match self {
            Self::Less => a < b,
            Self::Greater => a > b,
            Self::Equal => a == b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpType {
    Neg,
    Sqrt,
    Exp,
    Abs,
}

impl UnaryOpType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Abs => "abs",
        }
    }

    pub fn apply(&self, v: f64) -> f64 {
        match self {
            Self::Neg => -v,
            Self::Sqrt => v.sqrt(),
            Self::Exp => v.exp(),
            Self::Abs => v.abs(),
        }
    }

    fn accepts(&self, dtype: DType) -> bool {
        match self {
            Self::Sqrt | Self::Exp => dtype.is_float(),
            Self::Neg | Self::Abs => dtype != DType::Bool,
        }
    }
}

/// Operands of an elementwise op must agree on dtype; shapes broadcast.
fn same_dtype(op: &str, inputs: &[&Node]) -> Result<DType> {
    let dtype = inputs[0].dtype()?;
    for other in &inputs[1..] {
        let other = other.dtype()?;
        if other != dtype {
            return Err(Error::invalid_argument(format!(
                "{op} operands have different dtypes: {dtype} and {other}"
            )));
        }
    }
    Ok(dtype)
}

fn broadcast_all(inputs: &[&Node]) -> Result<Vec<crate::Dim>> {
    let mut shape = inputs[0].shape()?.to_vec();
    for other in &inputs[1..] {
        shape = broadcast_shapes(&shape, other.shape()?)?;
    }
    Ok(shape)
}

fn max_rank(inputs: &[&Node]) -> Result<usize> {
    let mut rank = 0;
    for i in 0..inputs.len() {
        rank = rank.max(input_rank(inputs, i)?);
    }
    Ok(rank)
}

#[derive(Debug, Clone)]
pub struct Binary {
    pub(crate) operator: BinaryOpType,
}

impl Binary {
    pub fn new(operator: BinaryOpType) -> Self {
        Self { operator }
    }
}

impl TraceOp for Binary {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(max_rank(inputs)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let dtype = same_dtype(self.operator.as_str(), inputs)?;
        if !self.operator.accepts(dtype) {
            return Err(Error::invalid_argument(format!(
                "{} is not defined for {dtype}",
                self.operator.as_str()
            )));
        }
        outputs[0].dtype = Some(dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(broadcast_all(inputs)?);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::Binary(self.operator),
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

#[derive(Debug, Clone)]
pub struct Compare {
    pub(crate) operator: CompareOpType,
}

impl Compare {
    pub fn new(operator: CompareOpType) -> Self {
        Self { operator }
    }
}

impl TraceOp for Compare {
    fn name(&self) -> &'static str {
        "compare"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(max_rank(inputs)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        same_dtype(self.operator.as_str(), inputs)?;
        outputs[0].dtype = Some(DType::Bool);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(broadcast_all(inputs)?);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::Compare(self.operator),
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// `condition ? on_true : on_false`, elementwise.
#[derive(Debug, Clone, Default)]
pub struct Where;

impl TraceOp for Where {
    fn name(&self) -> &'static str {
        "where"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(max_rank(inputs)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let condition = inputs[0].dtype()?;
        if condition != DType::Bool {
            return Err(Error::invalid_argument(format!(
                "where condition must be bool, got {condition}"
            )));
        }
        outputs[0].dtype = Some(same_dtype("where", &inputs[1..])?);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(broadcast_all(inputs)?);
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::Select,
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

#[derive(Debug, Clone)]
pub struct Unary {
    pub(crate) operator: UnaryOpType,
}

impl Unary {
    pub fn new(operator: UnaryOpType) -> Self {
        Self { operator }
    }
}

impl TraceOp for Unary {
    fn name(&self) -> &'static str {
        "unary"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(input_rank(inputs, 0)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        let dtype = inputs[0].dtype()?;
        if !self.operator.accepts(dtype) {
            return Err(Error::invalid_argument(format!(
                "{} is not defined for {dtype}",
                self.operator.as_str()
            )));
        }
        outputs[0].dtype = Some(dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(inputs[0].shape()?.to_vec());
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::Unary(self.operator),
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}

/// Convert every element to another dtype.
#[derive(Debug, Clone)]
pub struct Cast {
    pub(crate) dtype: DType,
}

impl Cast {
    pub fn new(dtype: DType) -> Self {
        Self { dtype }
    }
}

impl TraceOp for Cast {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn infer_rank(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].rank = Some(input_rank(inputs, 0)?);
        Ok(())
    }

    fn infer_dtypes(&mut self, _inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].dtype = Some(self.dtype);
        Ok(())
    }

    fn infer_shapes(&mut self, inputs: &[&Node], outputs: &mut [NodeMeta]) -> Result<()> {
        outputs[0].shape = Some(inputs[0].shape()?.to_vec());
        Ok(())
    }

    fn lower(
        &self,
        ctx: &mut Lowering,
        inputs: &[ValueId],
        outputs: &[ValueId],
    ) -> Result<Vec<LoweredOp>> {
        Ok(vec![ctx.emit(
            LoweredOpKind::Convert,
            inputs.to_vec(),
            outputs.to_vec(),
        )])
    }
}
