use std::{
    ops::{Add, Div, Mul, Neg, Sub},
    sync::Arc,
};

use crate::{
    backend::Backend,
    buffer::{self, Buffer, BufferRef, HostBuffer},
    graph::Graph,
    node::{Node, NodeId},
    op::{Binary, BinaryOpType, Op, Storage, Unary, UnaryOpType},
    Context, DType, Device, Dim, Element, Error, Evaluator, Result,
};

/// A handle to one node of a graph.
///
/// Creating tensors and applying operations only records them; nothing is
/// computed until [`Tensor::eval`]. Every handle keeps its graph alive.
#[derive(Clone, Debug)]
pub struct Tensor {
    id: NodeId,
    graph: Graph,
}

impl Tensor {
    pub(crate) fn from_parts(graph: &Graph, id: NodeId) -> Self {
        Self {
            id,
            graph: graph.clone(),
        }
    }

    /// Record `op` reading `inputs` and return its only output.
    pub(crate) fn build(graph: &Graph, op: impl Into<Op>, inputs: &[NodeId]) -> Result<Self> {
        let id = graph
            .build(op.into(), inputs)?
            .pop()
            .context("op produced no output")?;
        Ok(Self::from_parts(graph, id))
    }

    /// Record `op` reading `self` followed by `others`.
    pub(crate) fn apply(&self, op: impl Into<Op>, others: &[&Tensor]) -> Result<Self> {
        let mut inputs = Vec::with_capacity(others.len() + 1);
        inputs.push(self.id);
        for other in others {
            self.check_same_graph(other)?;
            inputs.push(other.id);
        }
        Self::build(&self.graph, op, &inputs)
    }

    pub(crate) fn check_same_graph(&self, other: &Tensor) -> Result<()> {
        if self.graph.same_graph(&other.graph) {
            Ok(())
        } else {
            Err(Error::invalid_argument(
                "tensors from different graphs cannot be combined",
            ))
        }
    }

    /// Wrap realized data.
    pub fn from_buffer(graph: &Graph, buffer: impl Buffer + 'static) -> Result<Self> {
        Self::from_buffer_ref(graph, Arc::new(buffer))
    }

    pub fn from_buffer_ref(graph: &Graph, buffer: BufferRef) -> Result<Self> {
        Self::build(graph, Storage::new(buffer), &[])
    }

    pub fn from_slice<T: Element>(graph: &Graph, data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_buffer(graph, HostBuffer::from_slice(data, shape)?)
    }

    pub fn scalar<T: Element>(graph: &Graph, value: T) -> Result<Self> {
        Self::from_buffer(graph, HostBuffer::scalar(value))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Snapshot of this tensor's node.
    pub fn node(&self) -> Result<Node> {
        self.graph.node(self.id)
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.node()?.name().to_string())
    }

    pub fn rank(&self) -> Result<usize> {
        self.graph.read().node(self.id)?.rank()
    }

    pub fn dtype(&self) -> Result<DType> {
        self.graph.read().node(self.id)?.dtype()
    }

    pub fn shape(&self) -> Result<Vec<Dim>> {
        Ok(self.graph.read().node(self.id)?.shape()?.to_vec())
    }

    pub fn device(&self) -> Result<Device> {
        Ok(self.graph.read().node(self.id)?.device())
    }

    pub fn is_realized(&self) -> bool {
        self.graph
            .read()
            .node(self.id)
            .is_ok_and(|node| node.is_realized())
    }

    /// Use this rank-0 integer tensor as an extent of another tensor's shape.
    pub fn as_dim(&self) -> Result<Dim> {
        let (rank, dtype) = (self.rank()?, self.dtype()?);
        if rank != 0 || !dtype.is_integral() {
            return Err(Error::invalid_argument(format!(
                "only rank-0 integer tensors can be extents, got rank {rank} {dtype}"
            )));
        }
        Ok(Dim::Scalar(self.id))
    }

    /// Realize this tensor, or return its cached buffer.
    pub fn eval<B: Backend>(&self, evaluator: &Evaluator<B>) -> Result<BufferRef> {
        evaluator.evaluate(&self.graph, self.id)
    }

    pub fn to_vec<T: Element, B: Backend>(&self, evaluator: &Evaluator<B>) -> Result<Vec<T>> {
        buffer::to_vec(self.eval(evaluator)?.as_ref())
    }
}

macro_rules! tensor_binop {
    ($trait:ident, $fn_name:ident, $operator:ident) => {
        impl $trait for &Tensor {
            type Output = Result<Tensor>;

            fn $fn_name(self, rhs: Self) -> Self::Output {
                self.apply(Binary::new(BinaryOpType::$operator), &[rhs])
            }
        }
    };
}

tensor_binop!(Add, add, Add);
tensor_binop!(Sub, sub, Sub);
tensor_binop!(Mul, mul, Mul);
tensor_binop!(Div, div, Div);

impl Neg for &Tensor {
    type Output = Result<Tensor>;

    fn neg(self) -> Self::Output {
        self.apply(Unary::new(UnaryOpType::Neg), &[])
    }
}
