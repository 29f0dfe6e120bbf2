use std::collections::{HashMap, HashSet};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tensortrace_core::{lower, ops, DType, Evaluator, Graph, NodeId, OpId, Tensor, Trace};

/// Ops reachable backwards from `outputs`, stopping at realized nodes.
fn reachable(graph: &Graph, outputs: &[NodeId]) -> HashSet<OpId> {
    let inner = graph.read();
    let mut seen = HashSet::new();
    let mut stack = outputs.to_vec();
    while let Some(id) = stack.pop() {
        let node = inner.node(id).unwrap();
        if node.is_realized() || !seen.insert(node.producer()) {
            continue;
        }
        stack.extend_from_slice(inner.op(node.producer()).unwrap().inputs());
    }
    seen
}

fn assert_topological(trace: &Trace, graph: &Graph) {
    let inner = graph.read();
    let position: HashMap<OpId, usize> = trace
        .ops()
        .iter()
        .enumerate()
        .map(|(i, op)| (*op, i))
        .collect();
    assert_eq!(position.len(), trace.ops().len(), "an op was traced twice");

    for (i, op) in trace.ops().iter().enumerate() {
        for input in inner.op(*op).unwrap().inputs() {
            let node = inner.node(*input).unwrap();
            if node.is_realized() {
                assert!(trace.inputs().contains(input));
                continue;
            }
            let producer = position
                .get(&node.producer())
                .expect("producer of a symbolic input is missing from the trace");
            assert!(*producer < i, "op {i} runs before its producer {producer}");
        }
    }
    for input in trace.inputs() {
        assert!(inner.node(*input).unwrap().is_realized());
    }
}

/// A random DAG of elementwise ops over a few leaves, mirrored on the host.
fn random_dag(seed: u64, steps: usize) -> (Graph, Vec<(Tensor, Vec<f32>)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let graph = Graph::empty();
    let mut nodes = Vec::new();
    for _ in 0..3 {
        let data: Vec<f32> = (0..4).map(|_| rng.random_range(-4..=4) as f32).collect();
        let leaf = Tensor::from_slice(&graph, &data, &[4]).unwrap();
        nodes.push((leaf, data));
    }
    for _ in 0..steps {
        let (a, da) = nodes[rng.random_range(0..nodes.len())].clone();
        let (b, db) = nodes[rng.random_range(0..nodes.len())].clone();
        let zip = |f: fn(f32, f32) -> f32| -> Vec<f32> {
            da.iter().zip(&db).map(|(x, y)| f(*x, *y)).collect()
        };
        let next = match rng.random_range(0..4) {
            0 => (ops::add(&a, &b).unwrap(), zip(|x, y| x + y)),
            1 => (ops::sub(&a, &b).unwrap(), zip(|x, y| x - y)),
            2 => (ops::maximum(&a, &b).unwrap(), zip(f32::max)),
            _ => (ops::neg(&a).unwrap(), da.iter().map(|x| -x).collect()),
        };
        nodes.push(next);
    }
    (graph, nodes)
}

#[test]
fn random_dags_are_traced_in_dependency_order() {
    for seed in 0..20 {
        let (graph, nodes) = random_dag(seed, 25);
        let mut rng = StdRng::seed_from_u64(seed + 1000);
        let outputs = (0..3)
            .map(|_| nodes[rng.random_range(3..nodes.len())].0.id())
            .collect::<Vec<_>>();

        let trace = Trace::new(&graph, &outputs).unwrap();
        assert_topological(&trace, &graph);

        let traced: HashSet<OpId> = trace.ops().iter().copied().collect();
        assert_eq!(traced, reachable(&graph, &outputs), "seed {seed}");
    }
}

#[test]
fn random_dags_evaluate_like_the_host() {
    let evaluator = Evaluator::reference().unwrap();
    for seed in 0..5 {
        let (_graph, nodes) = random_dag(seed, 15);
        let (out, expected) = nodes.last().unwrap();
        assert_eq!(&out.to_vec::<f32, _>(&evaluator).unwrap(), expected);
    }
}

#[test]
fn unrelated_ops_are_not_traced() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0], &[2]).unwrap();
    let y = ops::neg(&x).unwrap();
    let unrelated = ops::exp(&x).unwrap();
    let z = ops::add(&y, &y).unwrap();

    let trace = Trace::new(&graph, &[z.id()]).unwrap();
    let unrelated_op = graph.node(unrelated.id()).unwrap().producer();
    assert_eq!(trace.ops().len(), 2);
    assert!(!trace.ops().contains(&unrelated_op));
    assert_eq!(trace.inputs(), &[x.id()]);
    assert_eq!(trace.outputs(), &[z.id()]);
}

#[test]
fn realized_nodes_cut_the_trace() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0], &[2]).unwrap();
    let y = ops::exp(&ops::neg(&x).unwrap()).unwrap();
    let z = ops::mul(&y, &y).unwrap();

    let evaluator = Evaluator::reference().unwrap();
    y.eval(&evaluator).unwrap();

    let trace = Trace::new(&graph, &[z.id()]).unwrap();
    assert_eq!(trace.ops().len(), 1);
    assert_eq!(trace.inputs(), &[y.id()]);
}

#[test]
fn realized_request_traces_nothing() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32], &[1]).unwrap();
    let trace = Trace::new(&graph, &[x.id()]).unwrap();
    assert!(trace.ops().is_empty());
    assert_eq!(trace.inputs(), &[x.id()]);
}

#[test]
fn lowered_program_follows_the_trace() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
    let total = ops::sum(&x, Some(&[1]), false).unwrap();
    let program = lower(&Trace::new(&graph, &[total.id()]).unwrap()).unwrap();

    assert_eq!(program.inputs().len(), 1);
    assert_eq!(program.outputs().len(), 1);
    let kinds = program
        .ops()
        .iter()
        .map(|op| op.kind.name())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["constant", "convert", "reduce"]);

    let text = program.to_string();
    assert!(text.starts_with("func @main(%0: tensor<2x2:float32>)"), "{text}");
    assert!(
        text.contains("%1 = reduce(%0, %2) {mode = sum, dims = [1]} : tensor<2:float32>"),
        "{text}"
    );
}

#[test]
fn trace_renders_as_dot() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0], &[2]).unwrap();
    let y = ops::sqrt(&x).unwrap();
    let dot = Trace::new(&graph, &[y.id()]).unwrap().to_dot().unwrap();
    assert!(dot.contains("digraph"));
    assert!(dot.contains("Unary(Sqrt)"));
}

#[test]
fn wide_literals_lower_without_a_narrowing_convert() {
    let graph = Graph::empty();
    let wide = ops::constant(&graph, 5_000_000_000i64, DType::Int64).unwrap();
    let small = ops::constant(&graph, 7i64, DType::Int64).unwrap();

    let program = lower(&Trace::new(&graph, &[wide.id()]).unwrap()).unwrap();
    let kinds = program.ops().iter().map(|op| op.kind.name()).collect::<Vec<_>>();
    assert_eq!(kinds, vec!["constant"]);

    let program = lower(&Trace::new(&graph, &[small.id()]).unwrap()).unwrap();
    let kinds = program.ops().iter().map(|op| op.kind.name()).collect::<Vec<_>>();
    assert_eq!(kinds, vec!["constant", "convert"]);
}
