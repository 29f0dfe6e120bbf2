use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
};

use crate::{
    backend::{Backend, ReferenceBackend, Stream},
    buffer::BufferRef,
    graph::Graph,
    lowering::{lower, Program},
    node::NodeId,
    trace::Trace,
    Context, Error, EvalConfig, Result,
};

/// Realizes nodes by tracing, lowering, compiling and executing them.
///
/// Realized buffers are cached on their nodes, so evaluating a node again
/// never reaches the backend.
#[derive(Debug)]
pub struct Evaluator<B: Backend = ReferenceBackend> {
    backend: B,
    stream: Stream,
    config: EvalConfig,
}

impl Evaluator<ReferenceBackend> {
    /// The reference backend, configured from the environment.
    pub fn reference() -> Result<Self> {
        let config = EvalConfig::from_env()?;
        let backend = ReferenceBackend::with_config(&config)?;
        Ok(Self::new(backend)?.with_config(config))
    }
}

impl<B: Backend> Evaluator<B> {
    /// Run on the default stream.
    pub fn new(backend: B) -> Result<Self> {
        Ok(Self {
            backend,
            stream: Stream::default_stream()?,
            config: EvalConfig::default(),
        })
    }

    pub fn with_stream(mut self, stream: Stream) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn evaluate(&self, graph: &Graph, node: NodeId) -> Result<BufferRef> {
        self.evaluate_many(graph, &[node])?
            .pop()
            .context("evaluation returned no buffer")
    }

    /// Realize every node in `nodes` with at most one compilation.
    ///
    /// On failure no node is realized and the call can be retried.
    pub fn evaluate_many(&self, graph: &Graph, nodes: &[NodeId]) -> Result<Vec<BufferRef>> {
        let mut missing = Vec::new();
        {
            let inner = graph.read();
            for id in nodes {
                if !inner.node(*id)?.is_realized() && !missing.contains(id) {
                    missing.push(*id);
                }
            }
        }

        if missing.is_empty() {
            tracing::trace!(nodes = nodes.len(), "evaluation cache hit");
        } else {
            self.realize(graph, &missing)?;
        }

        let inner = graph.read();
        nodes
            .iter()
            .map(|id| {
                let node = inner.node(*id)?;
                node.buffer()
                    .cloned()
                    .with_context(|| format!("`{}` is still symbolic after evaluation", node.name()))
            })
            .collect()
    }

    fn realize(&self, graph: &Graph, nodes: &[NodeId]) -> Result<()> {
        let name = graph.node(nodes[0])?.name().to_string();
        let span = tracing::info_span!("evaluate", node = %name, backend = self.backend.name());
        let _enter = span.enter();

        let trace = Trace::new(graph, nodes)?;
        let program = lower(&trace)?;
        if self.config.dump_ir {
            self.dump(&program)?;
        }

        let executable = self.backend.compile(&program)?;
        let buffers = self
            .backend
            .execute(&executable, &program.output_devices(), &self.stream)?
            .wait(&self.stream)?;
        tracing::debug!(outputs = buffers.len(), "executed program");
        if buffers.len() != nodes.len() {
            return Err(Error::ExecutionFailure(format!(
                "expected {} outputs, the backend returned {}",
                nodes.len(),
                buffers.len()
            )));
        }

        graph.realize(nodes.iter().copied().zip(buffers).collect())
    }

    fn dump(&self, program: &Program) -> Result<()> {
        let Some(dir) = &self.config.dump_dir else {
            tracing::warn!("IR dumps are enabled but no dump directory is known");
            return Ok(());
        };
        let text = program.to_string();
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let path = dir.join(format!("program_{:016x}.ir", hasher.finish()));
        fs::create_dir_all(dir)?;
        fs::write(&path, text)?;
        tracing::debug!(path = %path.display(), "dumped lowered program");
        Ok(())
    }
}
