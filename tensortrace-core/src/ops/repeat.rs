use crate::{shape::normalize_axis, Dim, Error, Result, Tensor};

use super::{expand, flatten, unsqueeze};

/// How often [`repeat`] repeats each element.
#[derive(Debug, Clone)]
pub enum Repeats {
    Count(i64),
    /// A rank-0 integer tensor, only known at evaluation.
    Scalar(Tensor),
}

impl From<i64> for Repeats {
    fn from(value: i64) -> Self {
        Self::Count(value)
    }
}

impl From<i32> for Repeats {
    fn from(value: i32) -> Self {
        Self::Count(value as i64)
    }
}

impl From<usize> for Repeats {
    fn from(value: usize) -> Self {
        Self::Count(value as i64)
    }
}

impl From<&Tensor> for Repeats {
    fn from(value: &Tensor) -> Self {
        Self::Scalar(value.clone())
    }
}

/// Repeat each element `repeats` times along `dim`.
///
/// `[1, 2]` repeated twice along axis 0 is `[1, 1, 2, 2]`. A negative count is
/// rejected before anything is added to the graph.
pub fn repeat(input: &Tensor, repeats: impl Into<Repeats>, dim: isize) -> Result<Tensor> {
    let extent = match repeats.into() {
        Repeats::Count(n) if n < 0 => {
            return Err(Error::invalid_argument(format!(
                "repeat count must be non-negative, got {n}"
            )))
        }
        Repeats::Count(n) => Dim::Static(n as usize),
        Repeats::Scalar(n) => {
            input.check_same_graph(&n)?;
            n.as_dim()?
        }
    };
    let rank = input.rank()?;
    let dim = normalize_axis(dim, rank)?;

    // [a, b] -> [a, 1, b] -> [a, n, b] -> [a * n, b] for dim = 0
    let mut target = vec![Dim::Dynamic; rank + 1];
    target[dim + 1] = extent;
    let out = unsqueeze(input, dim as isize + 1)?;
    let out = expand(&out, &target)?;
    flatten(&out, dim as isize, dim as isize + 1)
}
