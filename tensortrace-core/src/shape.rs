use std::fmt::Display;

use crate::{node::NodeId, Error, Result};

/// One extent of a tensor's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Known while building the graph.
    Static(usize),
    /// The value of a rank-0 integer tensor in the same graph.
    Scalar(NodeId),
    /// Only known once the graph is evaluated.
    ///
    /// In an `expand` target this means "keep the input's extent".
    Dynamic,
}

impl Dim {
    pub fn as_static(&self) -> Option<usize> {
        match self {
            Self::Static(n) => Some(*n),
            _ => None,
        }
    }

    pub(crate) fn scalar_node(&self) -> Option<NodeId> {
        match self {
            Self::Scalar(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<usize> for Dim {
    fn from(value: usize) -> Self {
        Self::Static(value)
    }
}

impl Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(n) => write!(f, "{n}"),
            Self::Scalar(id) => write!(f, "%{}", id.index()),
            Self::Dynamic => f.write_str("?"),
        }
    }
}

/// Build a fully static shape.
pub fn static_shape(dims: &[usize]) -> Vec<Dim> {
    dims.iter().copied().map(Dim::Static).collect()
}

/// All extents, if every one of them is static.
pub fn as_static_shape(shape: &[Dim]) -> Option<Vec<usize>> {
    shape.iter().map(Dim::as_static).collect()
}

/// Rewrite a possibly negative axis into `0..rank`.
pub(crate) fn normalize_axis(axis: isize, rank: usize) -> Result<usize> {
    let normalized = if axis < 0 { axis + rank as isize } else { axis };
    if normalized < 0 || normalized >= rank as isize {
        return Err(Error::InvalidAxis {
            axis,
            rank,
            reason: "out of range",
        });
    }
    Ok(normalized as usize)
}

/// Normalize every axis and reject repeats.
///
/// The input order is preserved.
pub(crate) fn normalize_axes(axes: &[isize], rank: usize) -> Result<Vec<usize>> {
    let mut out: Vec<usize> = Vec::with_capacity(axes.len());
    for &axis in axes {
        let normalized = normalize_axis(axis, rank)?;
        if out.contains(&normalized) {
            return Err(Error::InvalidAxis {
                axis,
                rank,
                reason: "duplicate axis",
            });
        }
        out.push(normalized);
    }
    Ok(out)
}

/// Right-aligned broadcast of two shapes.
pub(crate) fn broadcast_shapes(lhs: &[Dim], rhs: &[Dim]) -> Result<Vec<Dim>> {
    let rank = lhs.len().max(rhs.len());
    let mut out = Vec::with_capacity(rank);
    for i in 0..rank {
        let l = (i + lhs.len()).checked_sub(rank).map(|j| lhs[j]);
        let r = (i + rhs.len()).checked_sub(rank).map(|j| rhs[j]);
        let dim = match (l, r) {
            (Some(d), None) | (None, Some(d)) => d,
            (Some(Dim::Static(1)), Some(d)) | (Some(d), Some(Dim::Static(1))) => d,
            (Some(Dim::Static(a)), Some(Dim::Static(b))) if a != b => {
                return Err(Error::invalid_argument(format!(
                    "cannot broadcast extents {a} and {b} at axis {i}"
                )))
            }
            (Some(a), Some(b)) if a == b => a,
            (Some(_), Some(_)) => Dim::Dynamic,
            (None, None) => unreachable!("axis {i} is below the larger rank"),
        };
        out.push(dim);
    }
    Ok(out)
}

/// Product of extents, static only when every factor is.
pub(crate) fn product(dims: &[Dim]) -> Dim {
    dims.iter()
        .map(Dim::as_static)
        .try_fold(1usize, |acc, d| d.map(|d| acc * d))
        .map(Dim::Static)
        .unwrap_or(Dim::Dynamic)
}

/// Default (contiguous) strides for a tensor of the given shape.
pub(crate) fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut acc = 1;
    // Iterate dims in reverse to accumulate products
    for dim in shape.iter().rev() {
        strides.push(acc);
        acc *= *dim;
    }
    strides.reverse();
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_normalize_and_reject_repeats() {
        assert_eq!(normalize_axes(&[-1, 0], 3).unwrap(), vec![2, 0]);
        assert!(normalize_axes(&[1, -2], 3).is_err());
        assert!(normalize_axis(3, 3).is_err());
        assert!(normalize_axis(0, 0).is_err());
    }

    #[test]
    fn symbolic_extents_broadcast_against_one() {
        let n = Dim::Scalar(NodeId(4));
        let out = broadcast_shapes(&[Dim::Static(1), n], &[Dim::Static(3), Dim::Static(1)]).unwrap();
        assert_eq!(out, vec![Dim::Static(3), n]);
        let out = broadcast_shapes(&[n], &[Dim::Static(5)]).unwrap();
        assert_eq!(out, vec![Dim::Dynamic]);
        assert_eq!(product(&[Dim::Static(2), n]), Dim::Dynamic);
        assert_eq!(product(&[]), Dim::Static(1));
    }
}
