use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{buffer::BufferRef, graph::OpId, DType, Device, Dim, Error, Result};

static NAME_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Next process-unique tensor name.
pub(crate) fn unique_name() -> String {
    format!("t{}", NAME_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Index of a node inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Symbolic metadata of a tensor value, filled in by its producer's
/// inference step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    pub rank: Option<usize>,
    pub dtype: Option<DType>,
    pub shape: Option<Vec<Dim>>,
    pub device: Device,
}

/// Realization state of a node. The only transition is
/// `Symbolic -> Realized`, taken at most once.
#[derive(Debug, Clone)]
pub enum NodeState {
    Symbolic,
    Realized(BufferRef),
}

/// One tensor value in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) meta: NodeMeta,
    pub(crate) producer: OpId,
    pub(crate) state: NodeState,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer(&self) -> OpId {
        self.producer
    }

    pub fn device(&self) -> Device {
        self.meta.device
    }

    pub fn rank(&self) -> Result<usize> {
        self.meta
            .rank
            .ok_or_else(|| Error::uninferred(&self.name, "rank"))
    }

    pub fn dtype(&self) -> Result<DType> {
        self.meta
            .dtype
            .ok_or_else(|| Error::uninferred(&self.name, "dtype"))
    }

    /// The inferred shape, which may hold symbolic extents.
    pub fn shape(&self) -> Result<&[Dim]> {
        self.meta
            .shape
            .as_deref()
            .ok_or_else(|| Error::uninferred(&self.name, "shape"))
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub fn buffer(&self) -> Option<&BufferRef> {
        match &self.state {
            NodeState::Realized(buffer) => Some(buffer),
            NodeState::Symbolic => None,
        }
    }

    pub fn is_realized(&self) -> bool {
        matches!(self.state, NodeState::Realized(_))
    }
}
