use tensortrace_core::{
    ops, static_shape, Buffer, DType, Device, Dim, Error, Evaluator, Graph, Tensor,
};

fn evaluator() -> Evaluator {
    Evaluator::reference().unwrap()
}

macro_rules! test_arith_dtype {
    ($rt:ty, $dtype_mod:ident) => {
        mod $dtype_mod {
            use super::*;

            fn pair(graph: &Graph) -> (Tensor, Tensor) {
                let x = Tensor::from_slice(graph, &[6 as $rt, 8 as $rt, 9 as $rt], &[3]).unwrap();
                let y = Tensor::from_slice(graph, &[2 as $rt, 4 as $rt, 3 as $rt], &[3]).unwrap();
                (x, y)
            }

            #[test]
            fn add_sub_mul_div() {
                let graph = Graph::empty();
                let (x, y) = pair(&graph);
                let evaluator = evaluator();
                let add = (&x + &y).unwrap();
                let sub = (&x - &y).unwrap();
                let mul = (&x * &y).unwrap();
                let div = (&x / &y).unwrap();
                assert_eq!(add.to_vec::<$rt, _>(&evaluator).unwrap(), vec![8 as $rt, 12 as $rt, 12 as $rt]);
                assert_eq!(sub.to_vec::<$rt, _>(&evaluator).unwrap(), vec![4 as $rt, 4 as $rt, 6 as $rt]);
                assert_eq!(mul.to_vec::<$rt, _>(&evaluator).unwrap(), vec![12 as $rt, 32 as $rt, 27 as $rt]);
                assert_eq!(div.to_vec::<$rt, _>(&evaluator).unwrap(), vec![3 as $rt, 2 as $rt, 3 as $rt]);
            }

            #[test]
            fn maximum_minimum() {
                let graph = Graph::empty();
                let (x, y) = pair(&graph);
                let y = (&y * &ops::constant(&graph, 3, x.dtype().unwrap()).unwrap()).unwrap();
                let evaluator = evaluator();
                let hi = ops::maximum(&x, &y).unwrap();
                let lo = ops::minimum(&x, &y).unwrap();
                assert_eq!(hi.to_vec::<$rt, _>(&evaluator).unwrap(), vec![6 as $rt, 12 as $rt, 9 as $rt]);
                assert_eq!(lo.to_vec::<$rt, _>(&evaluator).unwrap(), vec![6 as $rt, 8 as $rt, 9 as $rt]);
            }

            #[test]
            fn neg_abs() {
                let graph = Graph::empty();
                let (x, _) = pair(&graph);
                let evaluator = evaluator();
                let neg = (-&x).unwrap();
                let abs = ops::abs(&neg).unwrap();
                assert_eq!(neg.to_vec::<$rt, _>(&evaluator).unwrap(), vec![-6 as $rt, -8 as $rt, -9 as $rt]);
                assert_eq!(abs.to_vec::<$rt, _>(&evaluator).unwrap(), vec![6 as $rt, 8 as $rt, 9 as $rt]);
            }
        }
    };
}

test_arith_dtype!(f32, arith_f32);
test_arith_dtype!(i32, arith_i32);
test_arith_dtype!(i64, arith_i64);

#[test]
fn broadcasting_binary_ops() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    let row = Tensor::from_slice(&graph, &[10.0f32, 20.0, 30.0], &[3]).unwrap();
    let column = Tensor::from_slice(&graph, &[1.0f32, 2.0], &[2, 1]).unwrap();
    let evaluator = evaluator();

    let out = (&x + &row).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[2, 3]));
    assert_eq!(
        out.to_vec::<f32, _>(&evaluator).unwrap(),
        vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
    );

    let out = (&x * &column).unwrap();
    assert_eq!(
        out.to_vec::<f32, _>(&evaluator).unwrap(),
        vec![1.0, 2.0, 3.0, 8.0, 10.0, 12.0]
    );

    let bad = Tensor::from_slice(&graph, &[1.0f32, 2.0], &[2]).unwrap();
    assert!(matches!(&x + &bad, Err(Error::InvalidArgument(_))));
}

#[test]
fn binary_ops_need_matching_dtypes() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32], &[1]).unwrap();
    let y = Tensor::from_slice(&graph, &[1i32], &[1]).unwrap();
    let before = graph.num_nodes();
    assert!(matches!(&x + &y, Err(Error::InvalidArgument(_))));
    assert_eq!(graph.num_nodes(), before);

    let y = ops::cast(&y, DType::Float32).unwrap();
    let out = (&x + &y).unwrap();
    assert_eq!(out.to_vec::<f32, _>(&evaluator()).unwrap(), vec![2.0]);
}

#[test]
fn tensors_from_different_graphs_do_not_mix() {
    let a = Tensor::from_slice(&Graph::empty(), &[1.0f32], &[1]).unwrap();
    let b = Tensor::from_slice(&Graph::empty(), &[1.0f32], &[1]).unwrap();
    assert!(matches!(&a + &b, Err(Error::InvalidArgument(_))));
}

#[test]
fn float_only_unary_ops() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[0.0f32, 4.0], &[2]).unwrap();
    let evaluator = evaluator();
    assert_eq!(
        ops::sqrt(&x).unwrap().to_vec::<f32, _>(&evaluator).unwrap(),
        vec![0.0, 2.0]
    );
    assert_eq!(
        ops::exp(&x).unwrap().to_vec::<f32, _>(&evaluator).unwrap()[0],
        1.0
    );

    let ints = Tensor::from_slice(&graph, &[4i32], &[1]).unwrap();
    assert!(ops::sqrt(&ints).is_err());
    assert!(ops::exp(&ints).is_err());
    let flags = Tensor::from_slice(&graph, &[true], &[1]).unwrap();
    assert!(ops::neg(&flags).is_err());
}

#[test]
fn pow_of_floats() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[2.0f32, 3.0], &[2]).unwrap();
    let two = ops::constant(&graph, 2.0, DType::Float32).unwrap();
    let out = ops::pow(&x, &two).unwrap();
    assert_eq!(out.to_vec::<f32, _>(&evaluator()).unwrap(), vec![4.0, 9.0]);
}

#[test]
fn comparisons_and_where() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 5, 3], &[3]).unwrap();
    let y = Tensor::from_slice(&graph, &[2i32, 5, 1], &[3]).unwrap();
    let evaluator = evaluator();

    let less = ops::less(&x, &y).unwrap();
    assert_eq!(less.dtype().unwrap(), DType::Bool);
    assert_eq!(
        less.to_vec::<bool, _>(&evaluator).unwrap(),
        vec![true, false, false]
    );
    assert_eq!(
        ops::greater(&x, &y).unwrap().to_vec::<bool, _>(&evaluator).unwrap(),
        vec![false, false, true]
    );
    let equal = ops::equal(&x, &y).unwrap();
    assert_eq!(
        equal.to_vec::<bool, _>(&evaluator).unwrap(),
        vec![false, true, false]
    );

    let picked = ops::where_(&less, &x, &y).unwrap();
    assert_eq!(picked.to_vec::<i32, _>(&evaluator).unwrap(), vec![1, 5, 1]);

    assert!(ops::where_(&x, &x, &y).is_err());
}

#[test]
fn casts_round_trip_through_dtypes() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.7f32, -2.2, 0.0], &[3]).unwrap();
    let evaluator = evaluator();

    let ints = ops::cast(&x, DType::Int32).unwrap();
    assert_eq!(ints.to_vec::<i32, _>(&evaluator).unwrap(), vec![1, -2, 0]);

    let flags = ops::cast(&x, DType::Bool).unwrap();
    assert_eq!(
        flags.to_vec::<bool, _>(&evaluator).unwrap(),
        vec![true, true, false]
    );

    let same = ops::cast(&x, DType::Float32).unwrap();
    assert_eq!(same.id(), x.id());
}

#[test]
fn reshape_with_inferred_extent() {
    let graph = Graph::empty();
    let data: Vec<i32> = (0..6).collect();
    let x = Tensor::from_slice(&graph, &data, &[2, 3]).unwrap();
    let out = ops::reshape(&x, &[Dim::Static(3), Dim::Dynamic]).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[3, 2]));
    assert_eq!(out.to_vec::<i32, _>(&evaluator()).unwrap(), data);

    assert!(matches!(
        ops::reshape(&x, &[Dim::Static(4), Dim::Dynamic]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        ops::reshape(&x, &[Dim::Dynamic, Dim::Dynamic]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn reshape_to_symbolic_extent() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[0i32, 1, 2, 3, 4, 5], &[6]).unwrap();
    let rows = Tensor::scalar(&graph, 2i32).unwrap();
    let out = ops::reshape(&x, &[rows.as_dim().unwrap(), Dim::Dynamic]).unwrap();
    assert_eq!(out.rank().unwrap(), 2);
    let buffer = out.eval(&evaluator()).unwrap();
    assert_eq!(buffer.shape(), &[2, 3]);
}

#[test]
fn flatten_ranges() {
    let graph = Graph::empty();
    let x = ops::zeros(&graph, &static_shape(&[2, 3, 4]), DType::Float32).unwrap();
    assert_eq!(
        ops::flatten(&x, 0, -1).unwrap().shape().unwrap(),
        static_shape(&[24])
    );
    assert_eq!(
        ops::flatten(&x, 1, 2).unwrap().shape().unwrap(),
        static_shape(&[2, 12])
    );
    assert_eq!(
        ops::flatten(&x, 0, 1).unwrap().shape().unwrap(),
        static_shape(&[6, 4])
    );

    let scalar = Tensor::scalar(&graph, 1.0f32).unwrap();
    let flat = ops::flatten(&scalar, 0, -1).unwrap();
    assert_eq!(flat.shape().unwrap(), static_shape(&[1]));
    assert_eq!(flat.to_vec::<f32, _>(&evaluator()).unwrap(), vec![1.0]);
}

#[test]
fn unsqueeze_and_expand() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2], &[2]).unwrap();
    let column = ops::unsqueeze(&x, -1).unwrap();
    assert_eq!(column.shape().unwrap(), static_shape(&[2, 1]));
    assert!(matches!(ops::unsqueeze(&x, 3), Err(Error::InvalidAxis { .. })));

    let out = ops::expand(&column, &[Dim::Dynamic, Dim::Static(3)]).unwrap();
    assert_eq!(out.shape().unwrap(), static_shape(&[2, 3]));
    assert_eq!(
        out.to_vec::<i32, _>(&evaluator()).unwrap(),
        vec![1, 1, 1, 2, 2, 2]
    );

    let out = ops::expand(&x, &[Dim::Static(2), Dim::Dynamic]).unwrap();
    assert_eq!(
        out.to_vec::<i32, _>(&evaluator()).unwrap(),
        vec![1, 2, 1, 2]
    );

    assert!(ops::expand(&x, &[Dim::Static(3)]).is_err());
    assert!(ops::expand(&column, &[Dim::Static(3)]).is_err());
}

#[test]
fn shape_of_selected_axes() {
    let graph = Graph::empty();
    let x = ops::zeros(&graph, &static_shape(&[2, 3, 4]), DType::Float32).unwrap();
    let evaluator = evaluator();

    let all = ops::shape_of(&x, None).unwrap();
    assert_eq!(all.dtype().unwrap(), DType::INDEX);
    assert_eq!(all.to_vec::<i32, _>(&evaluator).unwrap(), vec![2, 3, 4]);

    let some = ops::shape_of(&x, Some(&[-1, 0])).unwrap();
    assert_eq!(some.to_vec::<i32, _>(&evaluator).unwrap(), vec![4, 2]);

    assert!(matches!(
        ops::shape_of(&x, Some(&[0, 0])),
        Err(Error::InvalidAxis { .. })
    ));
}

#[test]
fn metadata_is_inferred_eagerly() {
    let graph = Graph::empty();
    let x = ops::zeros(&graph, &static_shape(&[2, 3]), DType::Float32).unwrap();
    let y = ops::sum(&ops::exp(&x).unwrap(), Some(&[0]), false).unwrap();
    assert_eq!(y.rank().unwrap(), 1);
    assert_eq!(y.dtype().unwrap(), DType::Float32);
    assert_eq!(y.shape().unwrap(), static_shape(&[3]));
    assert_eq!(y.device().unwrap(), Device::Accelerator);
    assert!(!y.is_realized());

    let node = y.node().unwrap();
    assert_eq!(node.name(), y.name().unwrap());
    assert!(node.buffer().is_none());
}

#[test]
fn extents_must_be_integer_scalars() {
    let graph = Graph::empty();
    let v = Tensor::from_slice(&graph, &[2i32, 3], &[2]).unwrap();
    assert!(matches!(v.as_dim(), Err(Error::InvalidArgument(_))));
    let f = Tensor::scalar(&graph, 2.0f32).unwrap();
    assert!(matches!(f.as_dim(), Err(Error::InvalidArgument(_))));
}

#[test]
fn int64_arithmetic_is_exact() {
    let graph = Graph::empty();
    let evaluator = evaluator();
    let big = (1i64 << 53) + 1;
    let x = Tensor::from_slice(&graph, &[big, i64::MAX, -7], &[3]).unwrap();
    let one = ops::ones_like(&x, None).unwrap();
    let two = ops::full_like(&x, 2i64, None).unwrap();

    let sum = ops::add(&x, &one).unwrap();
    assert_eq!(
        sum.to_vec::<i64, _>(&evaluator).unwrap(),
        vec![big + 1, i64::MIN, -6]
    );
    let quotient = ops::div(&x, &two).unwrap();
    assert_eq!(
        quotient.to_vec::<i64, _>(&evaluator).unwrap(),
        vec![big / 2, i64::MAX / 2, -3]
    );
    let same = ops::equal(&x, &ops::sub(&sum, &one).unwrap()).unwrap();
    assert_eq!(
        same.to_vec::<bool, _>(&evaluator).unwrap(),
        vec![true, true, true]
    );
}
