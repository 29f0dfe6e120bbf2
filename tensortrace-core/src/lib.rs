//! Tensortrace is the deferred-execution graph layer of a tensor compiler.
//!
//! Operations on a [`Tensor`] are not executed. They are recorded in a
//! [`Graph`], and every new node has its rank, dtype and shape inferred on the
//! spot, so illegal programs are rejected before anything runs.
//!
//! Asking for a value walks back from the requested nodes to build a
//! [`Trace`], lowers it into a flat SSA [`Program`], hands that to a
//! [`Backend`] to compile, and executes it on a [`Stream`]. The resulting
//! buffer is cached on the node, so the second evaluation is free.
//!
//! ## A quick guide
//! - Create a [`Graph`]. It owns every node and operation.
//! - Create tensors with [`Tensor::from_slice`] or the initializers in [`ops`].
//! - Combine them with the functions in [`ops`] or the arithmetic operators.
//!   Both return `Result`, since inference can reject an operation.
//! - Realize a tensor with [`Tensor::eval`] or [`Tensor::to_vec`], given an
//!   [`Evaluator`]. The [`ReferenceBackend`] interprets programs on the host.
//!
//! ## What can you do with it?
//! ```
//! use tensortrace_core::{ops, DType, Dim, Evaluator, Graph, ReferenceBackend, Tensor};
//!
//! let graph = Graph::empty();
//! let x = Tensor::from_slice(&graph, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
//! let y = ops::full(&graph, &[Dim::Static(3)], 1.0, DType::Float32).unwrap();
//! let z = (&x + &y).unwrap();
//! let total = ops::sum(&z, Some(&[1]), false).unwrap();
//! assert_eq!(total.shape().unwrap(), vec![Dim::Static(2)]);
//!
//! let evaluator = Evaluator::new(ReferenceBackend::new().unwrap()).unwrap();
//! assert_eq!(total.to_vec::<f32, _>(&evaluator).unwrap(), vec![9.0, 18.0]);
//! ```

mod backend;
mod buffer;
mod config;
mod device;
mod dtype;
mod error;
mod eval;
mod graph;
mod lowering;
mod node;
pub mod op;
pub mod ops;
mod shape;
mod tensor;
mod trace;

pub use backend::{Backend, OutputSlot, PendingOutputs, ReferenceBackend, Stream};
pub use buffer::{Buffer, BufferRef, BufferView, HostBuffer};
pub use config::EvalConfig;
pub use device::Device;
pub use dtype::{DType, Element, Scalar};
pub use error::{Context, Error, Result};
pub use eval::Evaluator;
pub use graph::{Graph, GraphInner, OpId, OpRecord};
pub use lowering::{
    lower, LoweredDim, LoweredOp, LoweredOpKind, LoweredValue, Lowering, Program, ValueId,
};
pub use node::{Node, NodeId, NodeMeta, NodeState};
pub use op::{Op, TraceOp};
pub use shape::{as_static_shape, static_shape, Dim};
pub use tensor::Tensor;
pub use trace::Trace;
