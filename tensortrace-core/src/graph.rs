use std::{
    env, fs,
    path::Path,
    process::Command,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use petgraph::Graph as PetGraph;
use petgraph::{
    dot::{Config, Dot},
    graph::NodeIndex,
};

use crate::{
    buffer::{Buffer, BufferRef},
    node::{unique_name, Node, NodeId, NodeMeta, NodeState},
    op::Op,
    Dim, Error, Result, Scalar,
};

static GRAPH_ID: AtomicUsize = AtomicUsize::new(0);

/// Index of an operation inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub(crate) usize);

impl OpId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// An operation together with the nodes it reads and produces.
#[derive(Debug, Clone)]
pub struct OpRecord {
    pub(crate) op: Op,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) outputs: Vec<NodeId>,
}

impl OpRecord {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }
}

/// Append-only arena of nodes and the ops producing them.
#[derive(Debug, Default)]
pub struct GraphInner {
    nodes: Vec<Node>,
    ops: Vec<OpRecord>,
}

impl GraphInner {
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::msg(format!("node {id:?} is not part of this graph")))
    }

    pub fn op(&self, id: OpId) -> Result<&OpRecord> {
        self.ops
            .get(id.0)
            .ok_or_else(|| Error::msg(format!("op {id:?} is not part of this graph")))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn ops(&self) -> &[OpRecord] {
        &self.ops
    }
}

/// Shared handle to a graph. Cloning is cheap; clones refer to the same arena,
/// which lives as long as any handle (including every [`crate::Tensor`]) does.
#[derive(Clone, Debug)]
pub struct Graph {
    data: Arc<RwLock<GraphInner>>,
    id: usize,
}

impl Graph {
    /// Create an empty Graph
    pub fn empty() -> Self {
        Self {
            data: Arc::new(RwLock::new(GraphInner::default())),
            id: GRAPH_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Read-only access to the arena
    pub fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.data.read().expect("graph lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.data.write().expect("graph lock poisoned")
    }

    pub fn same_graph(&self, other: &Graph) -> bool {
        self.id == other.id
    }

    pub fn num_nodes(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn num_ops(&self) -> usize {
        self.read().ops.len()
    }

    /// Snapshot of one node.
    pub fn node(&self, id: NodeId) -> Result<Node> {
        self.read().node(id).cloned()
    }

    /// Add `op` reading `inputs`, inferring its outputs' metadata.
    ///
    /// Inference runs before anything is appended, so a failing op leaves the
    /// graph untouched. Every new node has this op as its only producer.
    pub fn build(&self, mut op: Op, inputs: &[NodeId]) -> Result<Vec<NodeId>> {
        let mut inner = self.write();
        let mut outputs = vec![NodeMeta::default(); op.num_outputs()];
        {
            let input_nodes = inputs
                .iter()
                .map(|id| inner.node(*id))
                .collect::<Result<Vec<_>>>()?;
            op.infer(&input_nodes, &mut outputs)?;
        }
        for meta in &outputs {
            debug_assert_eq!(
                meta.rank,
                meta.shape.as_ref().map(Vec::len),
                "{} inferred a shape that disagrees with its rank",
                op.name()
            );
        }

        let op_id = OpId(inner.ops.len());
        let storage = match &op {
            Op::Storage(storage) => Some(storage.data.clone()),
            _ => None,
        };
        let mut ids = Vec::with_capacity(outputs.len());
        for meta in outputs {
            let id = NodeId(inner.nodes.len());
            inner.nodes.push(Node {
                name: unique_name(),
                meta,
                producer: op_id,
                state: match &storage {
                    Some(data) => NodeState::Realized(data.clone()),
                    None => NodeState::Symbolic,
                },
            });
            ids.push(id);
        }
        inner.ops.push(OpRecord {
            op,
            inputs: inputs.to_vec(),
            outputs: ids.clone(),
        });
        Ok(ids)
    }

    /// Attach realized data to nodes.
    ///
    /// Every buffer is checked before any node changes, so a mismatch leaves
    /// all of them symbolic. The transition happens at most once per node: if
    /// another evaluation got there first, the new buffer is discarded.
    pub(crate) fn realize(&self, results: Vec<(NodeId, BufferRef)>) -> Result<()> {
        let mut inner = self.write();
        let extent_of = |id: NodeId| {
            results
                .iter()
                .find(|(node, _)| *node == id)
                .map(|(_, buffer)| buffer)
                .or_else(|| inner.node(id).ok()?.buffer())
                .and_then(|buffer| scalar_extent(buffer.as_ref()))
        };
        for (id, buffer) in &results {
            check_buffer(inner.node(*id)?, buffer.as_ref(), &extent_of)?;
        }
        for (id, buffer) in results {
            let node = &mut inner.nodes[id.0];
            match node.state {
                NodeState::Realized(_) => {
                    tracing::warn!(node = %node.name, "node was realized concurrently, discarding result")
                }
                NodeState::Symbolic => node.state = NodeState::Realized(buffer),
            }
        }
        Ok(())
    }

    pub fn to_petgraph(&self) -> PetGraph<String, ()> {
        let inner = self.read();
        let mut g = PetGraph::<String, ()>::new();
        let idx_map: Vec<NodeIndex> = inner
            .ops
            .iter()
            .map(|record| g.add_node(record.op.label()))
            .collect();
        for (i, record) in inner.ops.iter().enumerate() {
            for input in &record.inputs {
                let src = inner.nodes[input.0].producer;
                g.add_edge(idx_map[src.0], idx_map[i], ());
            }
        }
        g
    }

    /// Produce a DOT format string of this graph.
    pub fn to_dot(&self) -> String {
        let g = self.to_petgraph();
        format!("{:?}", Dot::with_config(&g, &[Config::EdgeNoLabel]))
    }

    /// Visualize the graph by saving it to this file.
    ///
    /// Install graphvis:
    /// - brew install graphviz
    /// - apt install graphviz
    pub fn visualize<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let path = filename.as_ref();
        let dot_path = env::temp_dir().join(format!("graph{}.dot", self.id));

        fs::write(&dot_path, self.to_dot())?;
        let status = Command::new("dot")
            .args([
                "-Tpng",
                &dot_path.display().to_string(),
                "-o",
                &path.display().to_string(),
            ])
            .status()?;
        if !status.success() {
            return Err(Error::msg(format!("graphviz exited with {status}")));
        }
        Ok(())
    }
}

/// A realized buffer must agree with everything known about its node.
///
/// `extent_of` resolves a `Dim::Scalar` extent when the scalar's value is
/// already known. `Dim::Dynamic` extents have no recorded value and are
/// accepted as they come.
fn check_buffer(
    node: &Node,
    buffer: &dyn Buffer,
    extent_of: impl Fn(NodeId) -> Option<usize>,
) -> Result<()> {
    let dtype = node.dtype()?;
    let shape = node.shape()?;
    let consistent = dtype == buffer.dtype()
        && shape.len() == buffer.shape().len()
        && shape
            .iter()
            .zip(buffer.shape())
            .all(|(dim, actual)| match dim {
                Dim::Static(n) => n == actual,
                Dim::Scalar(id) => extent_of(*id).map_or(true, |n| n == *actual),
                Dim::Dynamic => true,
            });
    if consistent {
        Ok(())
    } else {
        Err(Error::shape_mismatch(
            &node.name,
            (dtype, shape),
            (buffer.dtype(), buffer.shape()),
        ))
    }
}

/// The value of a rank-0 integer buffer used as an extent.
fn scalar_extent(buffer: &dyn Buffer) -> Option<usize> {
    if !buffer.shape().is_empty() || !buffer.dtype().is_integral() {
        return None;
    }
    match buffer.export_view().ok()?.read(0) {
        Scalar::Int(n) => usize::try_from(n).ok(),
        _ => None,
    }
}
