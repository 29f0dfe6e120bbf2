//! Translation of a [`Trace`] into a flat [`Program`].

use std::collections::HashMap;

use crate::{graph::OpId, node::Node, trace::Trace, Context, DType, Device, Dim, Result, Scalar};

mod ir;

pub use ir::{LoweredDim, LoweredOp, LoweredOpKind, LoweredValue, Program, ValueId};

/// Mutable state of one lowering pass.
///
/// Ops use it to allocate the auxiliary values (constants, casts) they need.
pub struct Lowering {
    program: Program,
    current: OpId,
}

impl Lowering {
    fn new() -> Self {
        Self {
            program: Program::default(),
            current: OpId(0),
        }
    }

    /// Allocate a fresh value.
    pub fn new_value(
        &mut self,
        dtype: DType,
        shape: Vec<Option<usize>>,
        device: Device,
        reason: impl Into<String>,
    ) -> ValueId {
        let id = ValueId(self.program.values.len());
        self.program.values.push(LoweredValue {
            id,
            dtype,
            rank: shape.len(),
            shape,
            device,
            reason: reason.into(),
        });
        id
    }

    pub fn value(&self, id: ValueId) -> &LoweredValue {
        self.program.value(id)
    }

    /// A lowered op attributed to the graph op currently being lowered.
    pub fn emit(
        &self,
        kind: LoweredOpKind,
        inputs: Vec<ValueId>,
        outputs: Vec<ValueId>,
    ) -> LoweredOp {
        LoweredOp {
            kind,
            inputs,
            outputs,
            origin: self.current,
        }
    }

    /// Materialize a rank-0 literal at `dtype`.
    ///
    /// The literal is created at its natural dtype and converted when that
    /// differs from `dtype`.
    pub fn constant(
        &mut self,
        value: Scalar,
        dtype: DType,
        device: Device,
        reason: &str,
    ) -> (ValueId, Vec<LoweredOp>) {
        let out = self.new_value(dtype, vec![], device, reason);
        let ops = self.constant_into(value, out, reason);
        (out, ops)
    }

    /// Like [`Lowering::constant`], writing into an existing rank-0 value.
    pub fn constant_into(&mut self, value: Scalar, out: ValueId, reason: &str) -> Vec<LoweredOp> {
        let dtype = self.value(out).dtype;
        let device = self.value(out).device;
        match value.natural_dtype() {
            Some(natural) if natural != dtype => {
                let literal = self.new_value(
                    natural,
                    vec![],
                    device,
                    format!("{reason} (as {natural})"),
                );
                vec![
                    self.emit(LoweredOpKind::Constant { value }, vec![], vec![literal]),
                    self.emit(LoweredOpKind::Convert, vec![literal], vec![out]),
                ]
            }
            _ => vec![self.emit(LoweredOpKind::Constant { value }, vec![], vec![out])],
        }
    }

    fn bind_node(&mut self, node: &Node, reason: &str) -> Result<ValueId> {
        let shape = node
            .shape()?
            .iter()
            .map(Dim::as_static)
            .collect::<Vec<_>>();
        Ok(self.new_value(
            node.dtype()?,
            shape,
            node.device(),
            format!("{reason} `{}`", node.name()),
        ))
    }
}

/// Lower every op of `trace`, in trace order, into one program.
pub fn lower(trace: &Trace) -> Result<Program> {
    let inner = trace.graph().read();
    let mut ctx = Lowering::new();
    let mut bound = HashMap::new();

    for &id in trace.inputs() {
        let node = inner.node(id)?;
        let buffer = node
            .buffer()
            .cloned()
            .with_context(|| format!("trace input `{}` is not realized", node.name()))?;
        let value = ctx.bind_node(node, "realized input")?;
        ctx.program.inputs.push((value, buffer));
        bound.insert(id, value);
    }

    for &op_id in trace.ops() {
        let record = inner.op(op_id)?;
        ctx.current = op_id;
        let inputs = record
            .inputs
            .iter()
            .map(|id| {
                bound
                    .get(id)
                    .copied()
                    .with_context(|| format!("input {id:?} of op #{} was never lowered", op_id.0))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut outputs = Vec::with_capacity(record.outputs.len());
        for &id in &record.outputs {
            let value = ctx.bind_node(inner.node(id)?, "output of")?;
            bound.insert(id, value);
            outputs.push(value);
        }
        let lowered = record.op.lower(&mut ctx, &inputs, &outputs)?;
        ctx.program.ops.extend(lowered);
    }

    ctx.program.outputs = trace
        .outputs()
        .iter()
        .map(|id| {
            bound
                .get(id)
                .copied()
                .with_context(|| format!("requested output {id:?} was never lowered"))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        ops = ctx.program.ops.len(),
        values = ctx.program.values.len(),
        "lowered trace"
    );
    Ok(ctx.program)
}
