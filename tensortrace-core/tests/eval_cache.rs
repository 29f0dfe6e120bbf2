use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tensortrace_core::{
    ops, static_shape, Backend, BufferRef, DType, Device, Error, EvalConfig, Evaluator, Graph,
    HostBuffer, PendingOutputs, Program, ReferenceBackend, Result, Stream, Tensor,
};

/// Counts compilations and executions of a wrapped reference backend.
#[derive(Debug)]
struct Counting {
    inner: ReferenceBackend,
    compiles: Arc<AtomicUsize>,
    executes: Arc<AtomicUsize>,
}

impl Counting {
    fn new() -> Self {
        Self {
            inner: ReferenceBackend::new().unwrap(),
            compiles: Arc::default(),
            executes: Arc::default(),
        }
    }
}

impl Backend for Counting {
    type Executable = <ReferenceBackend as Backend>::Executable;

    fn name(&self) -> &'static str {
        "counting"
    }

    fn compile(&self, program: &Program) -> Result<Self::Executable> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(program)
    }

    fn execute(
        &self,
        executable: &Self::Executable,
        devices: &[Device],
        stream: &Stream,
    ) -> Result<PendingOutputs> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(executable, devices, stream)
    }
}

/// Hands back outputs of the wrong shape.
struct Lying;

impl Backend for Lying {
    type Executable = usize;

    fn name(&self) -> &'static str {
        "lying"
    }

    fn compile(&self, program: &Program) -> Result<usize> {
        Ok(program.outputs().len())
    }

    fn execute(&self, outputs: &usize, _: &[Device], _: &Stream) -> Result<PendingOutputs> {
        let buffers = (0..*outputs)
            .map(|_| -> Result<BufferRef> {
                Ok(Arc::new(HostBuffer::from_slice(&[0.0f32; 3], &[3])?))
            })
            .collect::<Result<Vec<_>>>();
        Ok(PendingOutputs::ready(buffers))
    }
}

/// Fails every compilation.
struct Refusing;

impl Backend for Refusing {
    type Executable = ();

    fn name(&self) -> &'static str {
        "refusing"
    }

    fn compile(&self, _: &Program) -> Result<()> {
        Err(Error::CompilationFailure {
            op: "everything".to_string(),
            reason: "refused".to_string(),
        })
    }

    fn execute(&self, _: &(), _: &[Device], _: &Stream) -> Result<PendingOutputs> {
        unreachable!("nothing compiles")
    }
}

fn counted() -> (Evaluator<Counting>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let backend = Counting::new();
    let (compiles, executes) = (backend.compiles.clone(), backend.executes.clone());
    (Evaluator::new(backend).unwrap(), compiles, executes)
}

#[test]
fn second_evaluation_is_cached() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0, 3.0], &[3]).unwrap();
    let y = ops::exp(&ops::neg(&x).unwrap()).unwrap();
    let (evaluator, compiles, executes) = counted();

    let first = y.eval(&evaluator).unwrap();
    let second = y.eval(&evaluator).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
    assert_eq!(executes.load(Ordering::SeqCst), 1);
    assert!(y.is_realized());
}

#[test]
fn realized_storage_needs_no_backend() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1i32, 2], &[2]).unwrap();
    let (evaluator, compiles, executes) = counted();
    assert_eq!(x.to_vec::<i32, _>(&evaluator).unwrap(), vec![1, 2]);
    assert_eq!(compiles.load(Ordering::SeqCst), 0);
    assert_eq!(executes.load(Ordering::SeqCst), 0);
}

#[test]
fn many_outputs_share_one_compilation() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 4.0, 9.0], &[3]).unwrap();
    let a = ops::sqrt(&x).unwrap();
    let b = ops::sum(&x, None, false).unwrap();
    let (evaluator, compiles, _) = counted();

    let buffers = evaluator
        .evaluate_many(&graph, &[a.id(), b.id(), a.id()])
        .unwrap();
    assert_eq!(buffers.len(), 3);
    assert!(Arc::ptr_eq(&buffers[0], &buffers[2]));
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
    assert_eq!(a.to_vec::<f32, _>(&evaluator).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(b.to_vec::<f32, _>(&evaluator).unwrap(), vec![14.0]);
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
}

#[test]
fn only_missing_nodes_are_evaluated() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[2.0f32], &[1]).unwrap();
    let a = ops::neg(&x).unwrap();
    let b = ops::mul(&a, &a).unwrap();
    let (evaluator, compiles, _) = counted();

    a.eval(&evaluator).unwrap();
    evaluator.evaluate_many(&graph, &[a.id(), b.id()]).unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 2);
    evaluator.evaluate_many(&graph, &[a.id(), b.id()]).unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 2);
    assert_eq!(b.to_vec::<f32, _>(&evaluator).unwrap(), vec![4.0]);
}

#[test]
fn mismatched_outputs_leave_nodes_symbolic() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32, 2.0], &[2]).unwrap();
    let y = ops::neg(&x).unwrap();
    let evaluator = Evaluator::new(Lying).unwrap();

    let err = y.eval(&evaluator).unwrap_err();
    assert!(matches!(err, Error::BufferShapeMismatch { .. }), "{err}");
    assert!(!y.is_realized());

    // The failure is not cached; a correct backend succeeds afterwards.
    let evaluator = Evaluator::reference().unwrap();
    assert_eq!(y.to_vec::<f32, _>(&evaluator).unwrap(), vec![-1.0, -2.0]);
}

#[test]
fn compilation_failures_propagate() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32], &[1]).unwrap();
    let y = ops::abs(&x).unwrap();
    let err = y.eval(&Evaluator::new(Refusing).unwrap()).unwrap_err();
    assert!(matches!(err, Error::CompilationFailure { .. }), "{err}");
    assert!(!y.is_realized());
}

#[test]
fn execution_failures_propagate() {
    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[4i32, 2], &[2]).unwrap();
    let zero = ops::zeros_like(&x, None).unwrap();
    let y = ops::div(&x, &zero).unwrap();
    let err = y.eval(&Evaluator::reference().unwrap()).unwrap_err();
    assert!(matches!(err, Error::ExecutionFailure(_)), "{err}");
    assert!(!y.is_realized());
}

#[test]
fn seeded_random_values_are_reproducible() {
    let config = EvalConfig::default().with_seed(7);
    let draw = || {
        let graph = Graph::empty();
        let r = ops::rand(&graph, &static_shape(&[16]), DType::Float32).unwrap();
        let backend = ReferenceBackend::with_config(&config).unwrap();
        r.to_vec::<f32, _>(&Evaluator::new(backend).unwrap()).unwrap()
    };
    let (a, b) = (draw(), draw());
    assert_eq!(a, b);
    assert!(a.iter().all(|v| (0.0..=1.0).contains(v)));

    let graph = Graph::empty();
    let r = ops::randn(&graph, &static_shape(&[1000]), DType::Float32).unwrap();
    let values = r
        .to_vec::<f32, _>(&Evaluator::reference().unwrap())
        .unwrap();
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    assert!(mean.abs() < 0.2, "mean {mean}");
}

#[test]
fn ir_dumps_land_in_the_configured_directory() {
    let dir = std::env::temp_dir().join(format!("tensortrace-dump-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let config = EvalConfig::default()
        .with_dump_ir(true)
        .with_dump_dir(dir.clone());
    let evaluator = Evaluator::new(ReferenceBackend::new().unwrap())
        .unwrap()
        .with_config(config);

    let graph = Graph::empty();
    let x = Tensor::from_slice(&graph, &[1.0f32], &[1]).unwrap();
    ops::neg(&x).unwrap().eval(&evaluator).unwrap();

    let dumps = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    assert_eq!(dumps.len(), 1);
    let text = std::fs::read_to_string(&dumps[0]).unwrap();
    assert!(text.starts_with("func @main"), "{text}");
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn symbolic_extents_are_checked_against_their_scalar() {
    let graph = Graph::empty();
    let two = Tensor::scalar(&graph, 2i32).unwrap();
    let wrong = ops::full(&graph, &[two.as_dim().unwrap()], 1.0f32, DType::Float32).unwrap();
    let err = wrong.eval(&Evaluator::new(Lying).unwrap()).unwrap_err();
    assert!(matches!(err, Error::BufferShapeMismatch { .. }), "{err}");
    assert!(!wrong.is_realized());

    let three = Tensor::scalar(&graph, 3i32).unwrap();
    let right = ops::full(&graph, &[three.as_dim().unwrap()], 1.0f32, DType::Float32).unwrap();
    right.eval(&Evaluator::new(Lying).unwrap()).unwrap();
    assert!(right.is_realized());
}
