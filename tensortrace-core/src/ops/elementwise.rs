use crate::{
    graph::Graph,
    op::{Binary, BinaryOpType, Cast, Compare, CompareOpType, Constant, Unary, UnaryOpType, Where},
    DType, Result, Scalar, Tensor,
};

/// A rank-0 literal.
pub fn constant(graph: &Graph, value: impl Into<Scalar>, dtype: DType) -> Result<Tensor> {
    Tensor::build(graph, Constant::new(value.into(), dtype), &[])
}

macro_rules! binary_fn {
    ($name:ident, $operator:ident) => {
        pub fn $name(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
            lhs.apply(Binary::new(BinaryOpType::$operator), &[rhs])
        }
    };
}

binary_fn!(add, Add);
binary_fn!(sub, Sub);
binary_fn!(mul, Mul);
binary_fn!(div, Div);
binary_fn!(pow, Pow);
binary_fn!(maximum, Max);
binary_fn!(minimum, Min);

macro_rules! compare_fn {
    ($name:ident, $operator:ident) => {
        pub fn $name(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
            lhs.apply(Compare::new(CompareOpType::$operator), &[rhs])
        }
    };
}

compare_fn!(less, Less);
compare_fn!(greater, Greater);
compare_fn!(equal, Equal);

macro_rules! unary_fn {
    ($name:ident, $operator:ident) => {
        pub fn $name(input: &Tensor) -> Result<Tensor> {
            input.apply(Unary::new(UnaryOpType::$operator), &[])
        }
    };
}

unary_fn!(neg, Neg);
unary_fn!(sqrt, Sqrt);
unary_fn!(exp, Exp);
unary_fn!(abs, Abs);

/// Elementwise `condition ? on_true : on_false`.
pub fn where_(condition: &Tensor, on_true: &Tensor, on_false: &Tensor) -> Result<Tensor> {
    condition.apply(Where, &[on_true, on_false])
}

/// Convert to `dtype`. Returns `input` itself when it already has that dtype.
pub fn cast(input: &Tensor, dtype: DType) -> Result<Tensor> {
    if input.dtype()? == dtype {
        return Ok(input.clone());
    }
    input.apply(Cast::new(dtype), &[])
}
