use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution as _, Normal};
use rayon::prelude::*;

use crate::{
    backend::{Backend, PendingOutputs, Stream},
    buffer::{BufferRef, HostBuffer},
    lowering::{LoweredDim, LoweredOp, LoweredOpKind, Program, ValueId},
    op::{ArgKind, BinaryOpType, Distribution, ReduceKind, UnaryOpType},
    shape::contiguous_strides,
    DType, Device, Error, EvalConfig, Result, Scalar,
};

/// Host interpreter of lowered programs.
///
/// Floats are computed in `f64` and integers in `i64`, and every result is
/// rounded or wrapped back to its dtype after each op. Outputs are host
/// buffers regardless of the requested placement.
#[derive(Debug)]
pub struct ReferenceBackend {
    pool: Arc<rayon::ThreadPool>,
    seed: u64,
    launches: AtomicU64,
}

/// A validated program.
#[derive(Debug)]
pub struct Compiled {
    program: Program,
}

impl Compiled {
    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl ReferenceBackend {
    pub fn new() -> Result<Self> {
        Self::with_config(&EvalConfig::default())
    }

    pub fn with_config(config: &EvalConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("tensortrace-ref-{i}"))
            .build()
            .map_err(Error::wrap)?;
        Ok(Self {
            pool: Arc::new(pool),
            seed: config.seed,
            launches: AtomicU64::new(0),
        })
    }
}

impl Backend for ReferenceBackend {
    type Executable = Arc<Compiled>;

    fn name(&self) -> &'static str {
        "reference"
    }

    fn compile(&self, program: &Program) -> Result<Self::Executable> {
        for op in program.ops() {
            check(program, op).map_err(|reason| Error::compilation(op.origin, op.kind.name(), reason))?;
        }
        tracing::debug!(ops = program.ops().len(), "compiled program");
        Ok(Arc::new(Compiled {
            program: program.clone(),
        }))
    }

    fn execute(
        &self,
        executable: &Self::Executable,
        devices: &[Device],
        stream: &Stream,
    ) -> Result<PendingOutputs> {
        let seed = self
            .seed
            .wrapping_add(self.launches.fetch_add(1, Ordering::Relaxed));
        let (pending, slot) = PendingOutputs::new();
        let executable = executable.clone();
        let pool = self.pool.clone();
        tracing::debug!(stream = stream.id(), ?devices, "enqueued execution");
        stream.enqueue(move || slot.fill(pool.install(|| run(&executable.program, seed))))?;
        Ok(pending)
    }
}

/// Reject what the interpreter cannot run.
fn check(program: &Program, op: &LoweredOp) -> std::result::Result<(), String> {
    use LoweredOpKind as K;

    let arity = match &op.kind {
        K::Constant { .. } => Some(0),
        K::Convert | K::Unary(_) | K::ShapeOf { .. } => Some(1),
        K::Binary(_) | K::Compare(_) | K::Reduce { .. } => Some(2),
        K::Select => Some(3),
        K::ArgReduce { .. } => Some(4),
        K::Broadcast { .. } | K::Iota { .. } | K::Rng { .. } | K::Reshape { .. } => None,
    };
    if let Some(arity) = arity {
        if op.inputs.len() != arity {
            return Err(format!("expected {arity} operands, got {}", op.inputs.len()));
        }
    }
    if op.outputs.len() != 1 {
        return Err(format!("expected one result, got {}", op.outputs.len()));
    }

    let dtype = |v: ValueId| program.value(v).dtype;
    let rank = |v: ValueId| program.value(v).rank;
    let out = dtype(op.outputs[0]);
    let same = |values: &[ValueId], expected: DType| {
        match values.iter().map(|v| dtype(*v)).find(|d| *d != expected) {
            Some(other) => Err(format!("operand of {other} where {expected} is required")),
            None => Ok(()),
        }
    };
    let dims_in_range = |shape: &[LoweredDim]| {
        let operands = op.inputs.len();
        for d in shape {
            let operand = match d {
                LoweredDim::Operand(k) => *k,
                LoweredDim::InputAxis { operand, .. } | LoweredDim::Merged { operand, .. } => {
                    *operand
                }
                LoweredDim::Static(_) | LoweredDim::Infer => continue,
            };
            if operand >= operands {
                return Err(format!("extent `{d}` refers to a missing operand"));
            }
        }
        Ok(())
    };

    match &op.kind {
        K::Constant { .. } | K::Convert => Ok(()),
        K::Binary(b) => {
            same(&op.inputs, out)?;
            if out == DType::Bool && !matches!(b, BinaryOpType::Max | BinaryOpType::Min) {
                return Err(format!("{} on bool", b.as_str()));
            }
            Ok(())
        }
        K::Compare(_) => {
            if out != DType::Bool {
                return Err(format!("comparison producing {out}"));
            }
            same(&op.inputs[1..], dtype(op.inputs[0]))
        }
        K::Select => {
            same(&op.inputs[..1], DType::Bool)?;
            same(&op.inputs[1..], out)
        }
        K::Unary(u) => {
            same(&op.inputs, out)?;
            match u {
                UnaryOpType::Sqrt | UnaryOpType::Exp if !out.is_float() => {
                    Err(format!("{} on {out}", u.as_str()))
                }
                UnaryOpType::Neg | UnaryOpType::Abs if out == DType::Bool => {
                    Err(format!("{} on bool", u.as_str()))
                }
                _ => Ok(()),
            }
        }
        K::Reduce { mode, dims } => {
            same(&op.inputs, out)?;
            let bool_only = matches!(mode, ReduceKind::And | ReduceKind::Or);
            if bool_only != (out == DType::Bool) && *mode != ReduceKind::Max {
                return Err(format!("{} reduction over {out}", mode.as_str()));
            }
            let input_rank = rank(op.inputs[0]);
            match dims.iter().find(|d| **d >= input_rank) {
                Some(d) => Err(format!("axis {d} of a rank {input_rank} operand")),
                None => Ok(()),
            }
        }
        K::ArgReduce { dim, .. } => {
            if out != DType::INDEX {
                return Err(format!("arg reduction producing {out}"));
            }
            same(&op.inputs[1..2], DType::INDEX)?;
            same(&op.inputs[3..], DType::INDEX)?;
            if *dim >= rank(op.inputs[0]) {
                return Err(format!("axis {dim} of a rank {} operand", rank(op.inputs[0])));
            }
            Ok(())
        }
        K::Broadcast { shape } | K::Reshape { shape } => dims_in_range(shape),
        K::Iota { dim, shape } => {
            if out == DType::Bool {
                return Err("iota producing bool".to_string());
            }
            if *dim >= shape.len() {
                return Err(format!("iota axis {dim} of a rank {} result", shape.len()));
            }
            dims_in_range(shape)
        }
        K::Rng { shape, .. } => {
            if !out.is_float() {
                return Err(format!("random values of {out}"));
            }
            dims_in_range(shape)
        }
        K::ShapeOf { .. } => {
            if !out.is_integral() {
                return Err(format!("shape of type {out}"));
            }
            Ok(())
        }
    }
}

fn fault(msg: impl Into<String>) -> Error {
    Error::ExecutionFailure(msg.into())
}

fn kind_mismatch(op: &LoweredOp) -> Error {
    fault(format!("{} operands mix float and integer data", op.kind.name()))
}

/// Element storage. Floats are held as `f64`, booleans and integers as
/// `i64`, so `int64` values survive untouched.
#[derive(Debug, Clone, PartialEq)]
enum Data {
    Float(Vec<f64>),
    Int(Vec<i64>),
}

impl Data {
    fn from_scalars(dtype: DType, values: impl Iterator<Item = Scalar>) -> Self {
        if dtype.is_float() {
            Self::Float(values.map(|v| v.as_float(dtype)).collect())
        } else {
            Self::Int(values.map(|v| v.as_int(dtype)).collect())
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
        }
    }

    fn get(&self, i: usize) -> Scalar {
        match self {
            Self::Float(v) => Scalar::Float(v[i]),
            Self::Int(v) => Scalar::Int(v[i]),
        }
    }

    /// Element `src[i]` for every `i`.
    fn gather(&self, src: impl IndexedParallelIterator<Item = usize>) -> Self {
        match self {
            Self::Float(v) => Self::Float(src.map(|i| v[i]).collect()),
            Self::Int(v) => Self::Int(src.map(|i| v[i]).collect()),
        }
    }
}

fn single<T: Copy>(values: &[T]) -> Result<T> {
    match values {
        [v] => Ok(*v),
        _ => Err(fault(format!("expected one element, got {}", values.len()))),
    }
}

/// Dense row-major values.
#[derive(Debug, Clone)]
struct Array {
    shape: Vec<usize>,
    data: Data,
}

impl Array {
    fn scalar(value: Scalar, dtype: DType) -> Self {
        Self {
            shape: vec![],
            data: Data::from_scalars(dtype, std::iter::once(value)),
        }
    }

    fn convert(&self, dtype: DType) -> Self {
        let data = match (&self.data, dtype.is_float()) {
            (Data::Float(v), true) => Data::Float(v.par_iter().map(|x| dtype.quantize(*x)).collect()),
            (Data::Int(v), true) => {
                Data::Float(v.par_iter().map(|x| dtype.quantize(*x as f64)).collect())
            }
            (Data::Float(v), false) => {
                Data::Int(v.par_iter().map(|x| Scalar::Float(*x).as_int(dtype)).collect())
            }
            (Data::Int(v), false) => Data::Int(v.par_iter().map(|x| dtype.wrap(*x)).collect()),
        };
        Self {
            shape: self.shape.clone(),
            data,
        }
    }

    /// Right-aligned broadcast to `shape`.
    fn broadcast_to(&self, shape: &[usize]) -> Result<Self> {
        if self.shape == shape {
            return Ok(self.clone());
        }
        let incompatible = || fault(format!("cannot broadcast {:?} to {shape:?}", self.shape));
        let offset = shape
            .len()
            .checked_sub(self.shape.len())
            .ok_or_else(incompatible)?;
        for (j, &extent) in self.shape.iter().enumerate() {
            if extent != 1 && extent != shape[offset + j] {
                return Err(incompatible());
            }
        }
        let src_strides = contiguous_strides(&self.shape);
        let dst_strides = contiguous_strides(shape);
        let total: usize = shape.iter().product();
        let data = self.data.gather((0..total).into_par_iter().map(|flat| {
            let mut src = 0;
            for (j, &extent) in self.shape.iter().enumerate() {
                if extent != 1 {
                    let axis = offset + j;
                    src += (flat / dst_strides[axis]) % shape[axis] * src_strides[j];
                }
            }
            src
        }));
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// A non-negative extent held by a rank-0 operand.
    fn extent(&self) -> Result<usize> {
        if self.data.len() != 1 {
            return Err(fault(format!("extent operand of shape {:?} is not a scalar", self.shape)));
        }
        let n = match self.data.get(0) {
            Scalar::Float(v) => v as i64,
            other => other.as_int(DType::Int64),
        };
        usize::try_from(n).map_err(|_| fault(format!("negative extent {n}")))
    }
}

fn broadcast_shape(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1; rank];
    for shape in shapes {
        let offset = rank - shape.len();
        for (j, &extent) in shape.iter().enumerate() {
            let target = &mut out[offset + j];
            if *target == 1 {
                *target = extent;
            } else if extent != 1 && extent != *target {
                return Err(fault(format!("operand shapes {shapes:?} do not broadcast")));
            }
        }
    }
    Ok(out)
}

/// Evaluate lowered extents against the op's operands.
fn resolve(shape: &[LoweredDim], operands: &[&Array], total: Option<usize>) -> Result<Vec<usize>> {
    let operand = |k: usize| {
        operands
            .get(k)
            .copied()
            .ok_or_else(|| fault(format!("missing shape operand {k}")))
    };
    let mut out = Vec::with_capacity(shape.len());
    let mut inferred = None;
    for (i, d) in shape.iter().enumerate() {
        out.push(match *d {
            LoweredDim::Static(n) => n,
            LoweredDim::Operand(k) => operand(k)?.extent()?,
            LoweredDim::InputAxis { operand: k, axis } => *operand(k)?
                .shape
                .get(axis)
                .ok_or_else(|| fault(format!("operand {k} has no axis {axis}")))?,
            LoweredDim::Merged {
                operand: k,
                start,
                end,
            } => operand(k)?
                .shape
                .get(start..=end)
                .ok_or_else(|| fault(format!("operand {k} has no axes {start}..={end}")))?
                .iter()
                .product(),
            LoweredDim::Infer => {
                inferred = Some(i);
                1
            }
        });
    }
    if let Some(i) = inferred {
        let total = total.ok_or_else(|| fault("nothing to infer an extent from"))?;
        let known: usize = out.iter().product();
        if known == 0 || total % known != 0 {
            return Err(fault(format!(
                "cannot infer an extent for {total} elements from {known}"
            )));
        }
        out[i] = total / known;
    }
    Ok(out)
}

fn binary_float(op: BinaryOpType, x: f64, y: f64) -> f64 {
    match op {
        BinaryOpType::Add => x + y,
        BinaryOpType::Sub => x - y,
        BinaryOpType::Mul => x * y,
        BinaryOpType::Div => x / y,
        BinaryOpType::Pow => x.powf(y),
        BinaryOpType::Max => x.max(y),
        BinaryOpType::Min => x.min(y),
    }
}

/// Two's-complement arithmetic; the caller wraps to the output width.
fn binary_int(op: BinaryOpType, x: i64, y: i64) -> Result<i64> {
    Ok(match op {
        BinaryOpType::Add => x.wrapping_add(y),
        BinaryOpType::Sub => x.wrapping_sub(y),
        BinaryOpType::Mul => x.wrapping_mul(y),
        BinaryOpType::Div if y == 0 => return Err(fault("integer division by zero")),
        BinaryOpType::Div => x.wrapping_div(y),
        BinaryOpType::Pow => int_pow(x, y)?,
        BinaryOpType::Max => x.max(y),
        BinaryOpType::Min => x.min(y),
    })
}

/// `base^exp` truncated toward zero, like integer division by `base^-exp`.
fn int_pow(base: i64, exp: i64) -> Result<i64> {
    if exp < 0 {
        return match base {
            0 => Err(fault("integer division by zero")),
            1 => Ok(1),
            -1 if exp % 2 == 0 => Ok(1),
            -1 => Ok(-1),
            _ => Ok(0),
        };
    }
    let (mut acc, mut base, mut exp) = (1i64, base, exp as u64);
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    Ok(acc)
}

fn unary_int(op: UnaryOpType, v: i64) -> Result<i64> {
    match op {
        UnaryOpType::Neg => Ok(v.wrapping_neg()),
        UnaryOpType::Abs => Ok(v.wrapping_abs()),
        UnaryOpType::Sqrt | UnaryOpType::Exp => {
            Err(fault(format!("{} of integer data", op.as_str())))
        }
    }
}

fn combine_float(mode: ReduceKind, acc: f64, v: f64) -> f64 {
    match mode {
        ReduceKind::Sum => acc + v,
        ReduceKind::Max => acc.max(v),
        ReduceKind::Mul => acc * v,
        ReduceKind::And => ((acc != 0.0) && (v != 0.0)) as u8 as f64,
        ReduceKind::Or => ((acc != 0.0) || (v != 0.0)) as u8 as f64,
    }
}

fn combine_int(mode: ReduceKind, acc: i64, v: i64) -> i64 {
    match mode {
        ReduceKind::Sum => acc.wrapping_add(v),
        ReduceKind::Max => acc.max(v),
        ReduceKind::Mul => acc.wrapping_mul(v),
        ReduceKind::And => ((acc != 0) && (v != 0)) as i64,
        ReduceKind::Or => ((acc != 0) || (v != 0)) as i64,
    }
}

/// Fold `input` over `dims`, returning the kept extents and the accumulators.
fn reduce<T: Copy>(
    shape: &[usize],
    input: &[T],
    init: T,
    dims: &[usize],
    combine: impl Fn(T, T) -> T,
) -> (Vec<usize>, Vec<T>) {
    let kept: Vec<usize> = shape
        .iter()
        .enumerate()
        .filter(|(axis, _)| !dims.contains(axis))
        .map(|(_, extent)| *extent)
        .collect();
    let src_strides = contiguous_strides(shape);
    let dst_strides = contiguous_strides(&kept);
    let mut acc = vec![init; kept.iter().product()];
    for (flat, v) in input.iter().enumerate() {
        let mut dst = 0;
        let mut k = 0;
        for (axis, extent) in shape.iter().enumerate() {
            if dims.contains(&axis) {
                continue;
            }
            dst += (flat / src_strides[axis]) % extent * dst_strides[k];
            k += 1;
        }
        acc[dst] = combine(acc[dst], *v);
    }
    (kept, acc)
}

/// The index of the first extreme along `dim` of each lane. An empty axis
/// yields `init_index`.
fn first_extremes<T: Copy + PartialOrd + Sync>(
    shape: &[usize],
    values: &[T],
    indices: &[i64],
    init_index: i64,
    mode: ArgKind,
    dim: usize,
) -> Vec<i64> {
    let extent = shape[dim];
    let outer: usize = shape[..dim].iter().product();
    let inner: usize = shape[dim + 1..].iter().product();
    (0..outer * inner)
        .into_par_iter()
        .map(|o| {
            let (hi, lo) = (o / inner, o % inner);
            let at = |k: usize| (hi * extent + k) * inner + lo;
            if extent == 0 {
                return init_index;
            }
            let (mut best, mut best_index) = (values[at(0)], indices[at(0)]);
            for k in 1..extent {
                let v = values[at(k)];
                if mode.improves(v, best) {
                    best = v;
                    best_index = indices[at(k)];
                }
            }
            best_index
        })
        .collect()
}

fn arg_reduce(
    values: &Array,
    indices: &Array,
    init_index: i64,
    mode: ArgKind,
    dim: usize,
) -> Result<Array> {
    if values.shape != indices.shape {
        return Err(fault(format!(
            "index shape {:?} differs from value shape {:?}",
            indices.shape, values.shape
        )));
    }
    let Data::Int(idx) = &indices.data else {
        return Err(fault("arg reduction indices are not integers"));
    };
    let data = match &values.data {
        Data::Float(v) => first_extremes(&values.shape, v, idx, init_index, mode, dim),
        Data::Int(v) => first_extremes(&values.shape, v, idx, init_index, mode, dim),
    };
    let mut shape = values.shape.clone();
    shape.remove(dim);
    Ok(Array {
        shape,
        data: Data::Int(data),
    })
}

fn select<T: Copy + Send + Sync>(condition: &[i64], on_true: &[T], on_false: &[T]) -> Vec<T> {
    condition
        .par_iter()
        .zip(on_true.par_iter().zip(on_false.par_iter()))
        .map(|(c, (t, f))| if *c != 0 { *t } else { *f })
        .collect()
}

fn eval(op: &LoweredOp, operands: &[&Array], dtype: DType, rng: &mut StdRng) -> Result<Array> {
    let elementwise = |inputs: &[&Array]| -> Result<Vec<Array>> {
        let shapes = inputs.iter().map(|a| a.shape.as_slice()).collect::<Vec<_>>();
        let shape = broadcast_shape(&shapes)?;
        inputs.iter().map(|a| a.broadcast_to(&shape)).collect()
    };

    Ok(match &op.kind {
        LoweredOpKind::Constant { value } => Array::scalar(*value, dtype),
        LoweredOpKind::Convert => operands[0].convert(dtype),
        LoweredOpKind::Broadcast { shape } => {
            operands[0].broadcast_to(&resolve(shape, operands, None)?)?
        }
        LoweredOpKind::Iota { dim, shape } => {
            let shape = resolve(shape, operands, None)?;
            let strides = contiguous_strides(&shape);
            let (stride, extent) = (strides[*dim], shape[*dim]);
            let total: usize = shape.iter().product();
            Array {
                data: Data::from_scalars(
                    dtype,
                    (0..total).map(|i| Scalar::Int(((i / stride) % extent) as i64)),
                ),
                shape,
            }
        }
        LoweredOpKind::Rng {
            distribution,
            shape,
        } => {
            let shape = resolve(shape, operands, None)?;
            let total: usize = shape.iter().product();
            let data = match *distribution {
                Distribution::Uniform { low, high } => (0..total)
                    .map(|_| dtype.quantize(rng.random_range(low..high)))
                    .collect(),
                Distribution::Normal { mean, std } => {
                    let normal = Normal::new(mean, std).map_err(|e| fault(e.to_string()))?;
                    (0..total)
                        .map(|_| dtype.quantize(normal.sample(rng)))
                        .collect()
                }
            };
            Array {
                shape,
                data: Data::Float(data),
            }
        }
        LoweredOpKind::Binary(b) => {
            let args = elementwise(operands)?;
            let data = match (&args[0].data, &args[1].data) {
                (Data::Float(x), Data::Float(y)) => Data::Float(
                    x.par_iter()
                        .zip(y.par_iter())
                        .map(|(x, y)| dtype.quantize(binary_float(*b, *x, *y)))
                        .collect(),
                ),
                (Data::Int(x), Data::Int(y)) => Data::Int(
                    x.par_iter()
                        .zip(y.par_iter())
                        .map(|(x, y)| binary_int(*b, *x, *y).map(|v| dtype.wrap(v)))
                        .collect::<Result<Vec<_>>>()?,
                ),
                _ => return Err(kind_mismatch(op)),
            };
            Array {
                shape: args[0].shape.clone(),
                data,
            }
        }
        LoweredOpKind::Compare(c) => {
            let args = elementwise(operands)?;
            let data = match (&args[0].data, &args[1].data) {
                (Data::Float(x), Data::Float(y)) => x
                    .par_iter()
                    .zip(y.par_iter())
                    .map(|(x, y)| c.apply(*x, *y) as i64)
                    .collect(),
                (Data::Int(x), Data::Int(y)) => x
                    .par_iter()
                    .zip(y.par_iter())
                    .map(|(x, y)| c.apply(*x, *y) as i64)
                    .collect(),
                _ => return Err(kind_mismatch(op)),
            };
            Array {
                shape: args[0].shape.clone(),
                data: Data::Int(data),
            }
        }
        LoweredOpKind::Select => {
            let args = elementwise(operands)?;
            let Data::Int(condition) = &args[0].data else {
                return Err(kind_mismatch(op));
            };
            let data = match (&args[1].data, &args[2].data) {
                (Data::Float(t), Data::Float(f)) => Data::Float(select(condition, t, f)),
                (Data::Int(t), Data::Int(f)) => Data::Int(select(condition, t, f)),
                _ => return Err(kind_mismatch(op)),
            };
            Array {
                shape: args[0].shape.clone(),
                data,
            }
        }
        LoweredOpKind::Unary(u) => {
            let data = match &operands[0].data {
                Data::Float(v) => {
                    Data::Float(v.par_iter().map(|x| dtype.quantize(u.apply(*x))).collect())
                }
                Data::Int(v) => Data::Int(
                    v.par_iter()
                        .map(|x| unary_int(*u, *x).map(|v| dtype.wrap(v)))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            Array {
                shape: operands[0].shape.clone(),
                data,
            }
        }
        LoweredOpKind::Reduce { mode, dims } => {
            let input = operands[0];
            let (shape, data) = match (&input.data, &operands[1].data) {
                (Data::Float(x), Data::Float(init)) => {
                    let (shape, acc) = reduce(&input.shape, x, single(init)?, dims, |a, v| {
                        combine_float(*mode, a, v)
                    });
                    (shape, Data::Float(acc.into_iter().map(|v| dtype.quantize(v)).collect()))
                }
                (Data::Int(x), Data::Int(init)) => {
                    let (shape, acc) = reduce(&input.shape, x, single(init)?, dims, |a, v| {
                        combine_int(*mode, a, v)
                    });
                    (shape, Data::Int(acc.into_iter().map(|v| dtype.wrap(v)).collect()))
                }
                _ => return Err(kind_mismatch(op)),
            };
            Array { shape, data }
        }
        LoweredOpKind::ArgReduce { mode, dim } => {
            let Data::Int(init_index) = &operands[3].data else {
                return Err(kind_mismatch(op));
            };
            arg_reduce(operands[0], operands[1], single(init_index)?, *mode, *dim)?
        }
        LoweredOpKind::Reshape { shape } => {
            let total = operands[0].data.len();
            let shape = resolve(shape, operands, Some(total))?;
            if shape.iter().product::<usize>() != total {
                return Err(fault(format!(
                    "cannot reshape {:?} into {shape:?}",
                    operands[0].shape
                )));
            }
            Array {
                shape,
                data: operands[0].data.clone(),
            }
        }
        LoweredOpKind::ShapeOf { axes } => Array {
            shape: vec![axes.len()],
            data: Data::from_scalars(
                dtype,
                axes.iter()
                    .map(|axis| Scalar::Int(operands[0].shape[*axis] as i64)),
            ),
        },
    })
}

fn run(program: &Program, seed: u64) -> Result<Vec<BufferRef>> {
    let mut values: Vec<Option<Array>> = vec![None; program.values().len()];
    for (id, buffer) in program.inputs() {
        let view = buffer.export_view()?;
        let data = Data::from_scalars(
            view.dtype,
            (0..buffer.element_count()).map(|i| view.read(i)),
        );
        values[id.index()] = Some(Array {
            shape: view.shape.to_vec(),
            data,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for op in program.ops() {
        let operands = op
            .inputs
            .iter()
            .map(|v| {
                values[v.index()]
                    .as_ref()
                    .ok_or_else(|| fault(format!("{v} is read before it is computed")))
            })
            .collect::<Result<Vec<_>>>()?;
        let out = op.outputs[0];
        let result = eval(op, &operands, program.value(out).dtype, &mut rng)?;
        values[out.index()] = Some(result);
    }

    program
        .outputs()
        .iter()
        .map(|v| {
            let array = values[v.index()]
                .as_ref()
                .ok_or_else(|| fault(format!("output {v} was never computed")))?;
            let buffer: BufferRef = Arc::new(HostBuffer::from_values(
                (0..array.data.len()).map(|i| array.data.get(i)),
                program.value(*v).dtype,
                array.shape.clone(),
            ));
            Ok(buffer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(shape: &[usize], data: &[f64]) -> Array {
        Array {
            shape: shape.to_vec(),
            data: Data::Float(data.to_vec()),
        }
    }

    fn ints(shape: &[usize], data: &[i64]) -> Array {
        Array {
            shape: shape.to_vec(),
            data: Data::Int(data.to_vec()),
        }
    }

    #[test]
    fn broadcast_repeats_unit_axes() {
        let a = floats(&[2, 1], &[1.0, 2.0]);
        let b = a.broadcast_to(&[2, 3]).unwrap();
        assert_eq!(b.data, Data::Float(vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]));
        assert!(a.broadcast_to(&[3, 3]).is_err());
    }

    #[test]
    fn reduce_over_inner_axis() {
        let (shape, acc) = reduce(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 0.0, &[1], |a, v| {
            combine_float(ReduceKind::Sum, a, v)
        });
        assert_eq!(shape, vec![2]);
        assert_eq!(acc, vec![6.0, 15.0]);
    }

    #[test]
    fn integer_reduction_keeps_every_bit() {
        let big = (1i64 << 53) + 1;
        let (_, acc) = reduce(&[2], &[big, 2], 0, &[0], |a, v| {
            combine_int(ReduceKind::Sum, a, v)
        });
        assert_eq!(acc, vec![big + 2]);
    }

    #[test]
    fn integer_arithmetic_wraps_and_truncates() {
        assert_eq!(binary_int(BinaryOpType::Div, -7, 2).unwrap(), -3);
        assert!(binary_int(BinaryOpType::Div, 1, 0).is_err());
        assert_eq!(binary_int(BinaryOpType::Add, i64::MAX, 1).unwrap(), i64::MIN);
        assert_eq!(DType::Int32.wrap(i32::MAX as i64 + 1), i32::MIN as i64);
        assert_eq!(int_pow(3, 4).unwrap(), 81);
        assert_eq!(int_pow(2, -1).unwrap(), 0);
        assert_eq!(int_pow(-1, -3).unwrap(), -1);
        assert!(int_pow(0, -1).is_err());
    }

    #[test]
    fn convert_between_float_and_integer_data() {
        let a = floats(&[3], &[-1.5, 2.7, 300.0]);
        assert_eq!(a.convert(DType::Int8).data, Data::Int(vec![-1, 2, 44]));
        let b = ints(&[2], &[i64::MAX, 0]);
        assert_eq!(b.convert(DType::Bool).data, Data::Int(vec![1, 0]));
    }

    #[test]
    fn arg_reduce_keeps_first_extreme() {
        let values = floats(&[2, 3], &[1.0, 1.0, 0.0, 0.0, 2.0, 2.0]);
        let indices = ints(&[2, 3], &[0, 1, 2, 0, 1, 2]);
        let r = arg_reduce(&values, &indices, 0, ArgKind::ArgMax, 1).unwrap();
        assert_eq!(r.data, Data::Int(vec![0, 1]));
        let r = arg_reduce(&values, &indices, 0, ArgKind::ArgMin, 1).unwrap();
        assert_eq!(r.data, Data::Int(vec![2, 0]));
    }

    #[test]
    fn infer_extent_from_element_count() {
        let a = floats(&[2, 3], &[0.0; 6]);
        let shape = resolve(
            &[LoweredDim::Infer, LoweredDim::Static(2)],
            &[&a],
            Some(6),
        )
        .unwrap();
        assert_eq!(shape, vec![3, 2]);
    }
}
