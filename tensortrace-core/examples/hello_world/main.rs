use tensortrace_core::{ops, DType, Dim, Evaluator, Graph, Tensor, Trace};
use tracing_subscriber::EnvFilter;

fn main() -> tensortrace_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let graph = Graph::empty();
    let evaluator = Evaluator::reference()?;

    let arange = ops::arange(&graph, 0.0, 10.0, 1.0, DType::Float32)?;
    dbg!(arange.to_vec::<f32, _>(&evaluator)?);

    let a = ops::full(&graph, &[Dim::Static(3), Dim::Static(4)], 1.0, DType::Float32)?;
    let b = ops::full(&graph, &[Dim::Static(3), Dim::Static(4)], 2.0, DType::Float32)?;
    let c = ops::full(&graph, &[Dim::Static(3), Dim::Static(4)], 3.0, DType::Float32)?;
    let res = (&(&a * &b)? + &c)?;

    let n = Tensor::scalar(&graph, 2i32)?;
    let repeated = ops::repeat(&res, &n, 0)?;
    let stats = ops::var(&repeated, Some(&[0]), false, 1)?;

    if let Err(err) = graph.visualize("graph.png") {
        tracing::warn!(%err, "could not render the graph");
    }
    println!("{}", Trace::new(&graph, &[stats.id()])?);

    assert_eq!(res.to_vec::<f32, _>(&evaluator)?, vec![5.0; 12]);
    assert_eq!(stats.to_vec::<f32, _>(&evaluator)?, vec![0.0; 4]);
    assert_eq!(ops::argmax(&repeated, None, false)?.to_vec::<i32, _>(&evaluator)?, vec![0]);
    Ok(())
}
