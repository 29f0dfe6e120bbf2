use std::{
    collections::HashSet,
    fmt::{Display, Write},
};

use petgraph::{
    algo::toposort,
    dot::{Config, Dot},
    graphmap::DiGraphMap,
    Graph as PetGraph,
};

use crate::{
    graph::{Graph, OpId},
    node::NodeId,
    Error, Result,
};

/// The ops needed to compute a set of requested nodes, in an order where
/// every op comes after the producers of its inputs.
///
/// Realized nodes are leaves: the walk stops there and they become the
/// trace's inputs instead of re-running their producers.
#[derive(Debug, Clone)]
pub struct Trace {
    graph: Graph,
    ops: Vec<OpId>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

impl Trace {
    pub fn new(graph: &Graph, outputs: &[NodeId]) -> Result<Self> {
        let inner = graph.read();

        let mut seen_ops = HashSet::new();
        let mut seen_nodes = HashSet::new();
        let mut inputs = Vec::new();
        let mut stack: Vec<NodeId> = outputs.to_vec();
        while let Some(id) = stack.pop() {
            if !seen_nodes.insert(id) {
                continue;
            }
            let node = inner.node(id)?;
            if node.is_realized() {
                inputs.push(id);
                continue;
            }
            if seen_ops.insert(node.producer) {
                stack.extend(inner.op(node.producer)?.inputs.iter().copied());
            }
        }

        // Build a dependency graph of the collected ops
        let mut dep_graph = DiGraphMap::<usize, ()>::new();
        let mut collected: Vec<OpId> = seen_ops.into_iter().collect();
        collected.sort();
        for op in &collected {
            dep_graph.add_node(op.0);
        }
        for op in &collected {
            for input in &inner.op(*op)?.inputs {
                let node = inner.node(*input)?;
                if !node.is_realized() {
                    dep_graph.add_edge(node.producer.0, op.0, ());
                }
            }
        }

        let order = toposort(&dep_graph, None).map_err(|cycle| {
            Error::msg(format!(
                "cycle through op #{} in a graph that is acyclic by construction",
                cycle.node_id()
            ))
        })?;
        inputs.sort();
        tracing::debug!(
            ops = order.len(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "built trace"
        );

        drop(inner);
        Ok(Self {
            graph: graph.clone(),
            ops: order.into_iter().map(OpId).collect(),
            inputs,
            outputs: outputs.to_vec(),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn ops(&self) -> &[OpId] {
        &self.ops
    }

    /// Realized nodes the trace reads.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn to_petgraph(&self) -> Result<PetGraph<String, ()>> {
        let inner = self.graph.read();
        let mut g = PetGraph::<String, ()>::new();
        let mut index = std::collections::HashMap::new();
        for op in &self.ops {
            index.insert(*op, g.add_node(inner.op(*op)?.op.label()));
        }
        for op in &self.ops {
            for input in &inner.op(*op)?.inputs {
                let producer = inner.node(*input)?.producer;
                if let Some(src) = index.get(&producer) {
                    g.add_edge(*src, index[op], ());
                }
            }
        }
        Ok(g)
    }

    /// Produce a DOT format string of this trace.
    pub fn to_dot(&self) -> Result<String> {
        let g = self.to_petgraph()?;
        Ok(format!("{:?}", Dot::with_config(&g, &[Config::EdgeNoLabel])))
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.graph.read();
        let name = |id: &NodeId| {
            inner
                .node(*id)
                .map(|n| n.name().to_string())
                .unwrap_or_else(|_| format!("{id:?}"))
        };
        let mut line = String::new();
        for input in &self.inputs {
            writeln!(f, "{} : realized", name(input))?;
        }
        for op in &self.ops {
            let Ok(record) = inner.op(*op) else {
                continue;
            };
            line.clear();
            let outs = record.outputs.iter().map(name).collect::<Vec<_>>().join(", ");
            let ins = record.inputs.iter().map(name).collect::<Vec<_>>().join(", ");
            write!(line, "{outs} = {}({ins})", record.op.label())?;
            writeln!(f, "{line}")?;
        }
        let outs = self.outputs.iter().map(name).collect::<Vec<_>>().join(", ");
        write!(f, "outputs: {outs}")
    }
}
