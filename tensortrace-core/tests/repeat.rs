use tensortrace_core::{ops, static_shape, Dim, Error, Evaluator, Graph, Tensor};

fn evaluator() -> Evaluator {
    Evaluator::reference().unwrap()
}

#[test]
fn repeats_each_element() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2], &[2]).unwrap();
    let out = ops::repeat(&x, 2, 0).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[4]));
    assert_eq!(out.to_vec::<i32, _>(&evaluator()).unwrap(), vec![1, 1, 2, 2]);
}

#[test]
fn repeats_along_inner_axis() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
    let out = ops::repeat(&x, 3, -1).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[2, 6]));
    assert_eq!(
        out.to_vec::<f32, _>(&evaluator()).unwrap(),
        vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 4.0]
    );
}

#[test]
fn repeats_along_outer_axis() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2, 3, 4], &[2, 2]).unwrap();
    let out = ops::repeat(&x, 2, 0).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[4, 2]));
    assert_eq!(
        out.to_vec::<i32, _>(&evaluator()).unwrap(),
        vec![1, 2, 1, 2, 3, 4, 3, 4]
    );
}

#[test]
fn zero_repeats_empty_the_axis() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2], &[2]).unwrap();
    let out = ops::repeat(&x, 0, 0).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[0]));
    assert!(out.to_vec::<i32, _>(&evaluator()).unwrap().is_empty());
}

#[test]
fn negative_repeats_build_nothing() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2], &[2]).unwrap();
    let before = (graph.num_nodes(), graph.num_ops());
    let err = ops::repeat(&x, -1, 0).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    assert!(err.is_construction_error());
    assert_eq!((graph.num_nodes(), graph.num_ops()), before);
}

#[test]
fn bad_axis_is_rejected() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2], &[2]).unwrap();
    let err = ops::repeat(&x, 2, 1).unwrap_err();
    assert!(matches!(err, Error::InvalidAxis { .. }), "{err}");
}

#[test]
fn symbolic_repeat_count() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[5i32, 6], &[2]).unwrap();
    let n = Tensor::scalar(&graph, 3i32).unwrap();
    let out = ops::repeat(&x, &n, 0).unwrap();
    assert_eq!(out.rank().unwrap(), 1);
    assert_eq!(out.shape().unwrap(), vec![Dim::Dynamic]);
    assert_eq!(
        out.to_vec::<i32, _>(&evaluator()).unwrap(),
        vec![5, 5, 5, 6, 6, 6]
    );
}

#[test]
fn negative_symbolic_count_fails_at_execution() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[5i32, 6], &[2]).unwrap();
    let n = Tensor::scalar(&graph, -2i32).unwrap();
    let out = ops::repeat(&x, &n, 0).unwrap();
    let err = out.eval(&evaluator()).unwrap_err();
    assert!(matches!(err, Error::ExecutionFailure(_)), "{err}");
    assert!(!out.is_realized());
}

#[test]
fn symbolic_count_must_be_an_integer_scalar() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[5i32, 6], &[2]).unwrap();
    let n = Tensor::scalar(&graph, 2.0f32).unwrap();
    assert!(matches!(
        ops::repeat(&x, &n, 0),
        Err(Error::InvalidArgument(_))
    ));
}
