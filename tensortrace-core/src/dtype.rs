use std::fmt::{Debug, Display};

use half::{bf16, f16};

/// Element types a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    Int32,
    Int64,
    Float16,
    BFloat16,
    Float32,
}

impl DType {
    /// The index type produced by arg-reductions and shape queries.
    pub const INDEX: DType = DType::Int32;

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Float32 => "float32",
        }
    }

    pub const fn size_in_bytes(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 => 1,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 => 8,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32)
    }

    pub const fn is_integral(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int32 | Self::Int64)
    }

    /// Smallest representable value; the identity of a max-reduction.
    pub fn lowest(&self) -> f64 {
        match self {
            Self::Float16 | Self::BFloat16 | Self::Float32 => f64::NEG_INFINITY,
            _ => self.lowest_int() as f64,
        }
    }

    /// [`DType::lowest`] for booleans and integers.
    pub fn lowest_int(&self) -> i64 {
        match self {
            Self::Int8 => i8::MIN as i64,
            Self::Int32 => i32::MIN as i64,
            Self::Int64 => i64::MIN,
            Self::Bool | Self::Float16 | Self::BFloat16 | Self::Float32 => 0,
        }
    }

    /// Round `v` to the nearest value this dtype can hold.
    ///
    /// Integers truncate toward zero and wrap like an `as` cast, booleans are
    /// `v != 0`.
    pub fn quantize(&self, v: f64) -> f64 {
        match self {
            Self::Float16 => f16::from_f64(v).to_f64(),
            Self::BFloat16 => bf16::from_f64(v).to_f64(),
            Self::Float32 => (v as f32) as f64,
            Self::Bool => (v != 0.0) as u8 as f64,
            Self::Int8 | Self::Int32 | Self::Int64 => self.wrap(v as i64) as f64,
        }
    }

    /// Wrap `v` into the range of a boolean or integer dtype, like an `as`
    /// cast. Float dtypes keep `v`.
    pub fn wrap(&self, v: i64) -> i64 {
        match self {
            Self::Bool => (v != 0) as i64,
            Self::Int8 => v as i8 as i64,
            Self::Int32 => v as i32 as i64,
            Self::Int64 | Self::Float16 | Self::BFloat16 | Self::Float32 => v,
        }
    }

    pub(crate) fn write_le(&self, v: Scalar, out: &mut Vec<u8>) {
        match self {
            Self::Bool => out.push(v.as_int(*self) as u8),
            Self::Int8 => out.extend_from_slice(&(v.as_int(*self) as i8).to_le_bytes()),
            Self::Int32 => out.extend_from_slice(&(v.as_int(*self) as i32).to_le_bytes()),
            Self::Int64 => out.extend_from_slice(&v.as_int(*self).to_le_bytes()),
            Self::Float16 => out.extend_from_slice(&f16::from_f64(v.as_float(*self)).to_le_bytes()),
            Self::BFloat16 => {
                out.extend_from_slice(&bf16::from_f64(v.as_float(*self)).to_le_bytes())
            }
            Self::Float32 => out.extend_from_slice(&(v.as_float(*self) as f32).to_le_bytes()),
        }
    }

    /// Decode one little-endian element without widening integers to floats.
    pub(crate) fn read_le(&self, bytes: &[u8]) -> Scalar {
        match self {
            Self::Bool => Scalar::Bool(bool::read_le(bytes)),
            Self::Int8 => Scalar::Int(i8::read_le(bytes) as i64),
            Self::Int32 => Scalar::Int(i32::read_le(bytes) as i64),
            Self::Int64 => Scalar::Int(i64::read_le(bytes)),
            Self::Float16 => Scalar::Float(f16::read_le(bytes).to_f64()),
            Self::BFloat16 => Scalar::Float(bf16::read_le(bytes).to_f64()),
            Self::Float32 => Scalar::Float(f32::read_le(bytes) as f64),
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A literal value baked into the graph, e.g. a fill value or the identity
/// element of a reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// The lowest value of whatever dtype the literal is materialized at.
    Lowest,
}

impl Scalar {
    /// The dtype a literal has before any cast: `int32` for integers that
    /// fit it, `int64` for wider ones and `float32` for floats.
    /// [`Scalar::Lowest`] has none and is always materialized directly at its
    /// consumer's dtype.
    pub fn natural_dtype(&self) -> Option<DType> {
        match self {
            Self::Bool(_) => Some(DType::Bool),
            Self::Int(i) if i32::try_from(*i).is_ok() => Some(DType::Int32),
            Self::Int(_) => Some(DType::Int64),
            Self::Float(_) => Some(DType::Float32),
            Self::Lowest => None,
        }
    }

    /// The value of this literal once stored at a float `dtype`.
    pub fn as_float(&self, dtype: DType) -> f64 {
        match self {
            Self::Bool(b) => *b as u8 as f64,
            Self::Int(i) => dtype.quantize(*i as f64),
            Self::Float(v) => dtype.quantize(*v),
            Self::Lowest => dtype.lowest(),
        }
    }

    /// The value of this literal once stored at a boolean or integer `dtype`.
    ///
    /// Floats truncate toward zero, saturating at the `i64` range.
    pub fn as_int(&self, dtype: DType) -> i64 {
        match self {
            Self::Bool(b) => *b as i64,
            Self::Int(i) => dtype.wrap(*i),
            Self::Float(v) if dtype == DType::Bool => (*v != 0.0) as i64,
            Self::Float(v) => dtype.wrap(*v as i64),
            Self::Lowest => dtype.lowest_int(),
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Lowest => f.write_str("lowest"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Rust types that can be stored in a host buffer.
pub trait Element: Debug + Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! element {
    ($rt:ident, $dtype:ident) => {
        impl Element for $rt {
            const DTYPE: DType = DType::$dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$rt>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$rt>()]);
                $rt::from_le_bytes(raw)
            }
        }
    };
}

element!(i8, Int8);
element!(i32, Int32);
element!(i64, Int64);
element!(f16, Float16);
element!(bf16, BFloat16);
element!(f32, Float32);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}
