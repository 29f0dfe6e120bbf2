//! The compiler/executor boundary.
//!
//! A [`Backend`] turns a lowered [`Program`] into an executable and runs it
//! asynchronously on a [`Stream`]. The graph layer never looks inside either.

use std::sync::{Arc, Mutex};

use crate::{buffer::BufferRef, lowering::Program, Device, Error, Result};

mod reference;
mod stream;

pub use reference::ReferenceBackend;
pub use stream::Stream;

pub trait Backend: Send + Sync {
    type Executable: Send + Sync;

    fn name(&self) -> &'static str;

    /// Compile one program. Unsupported ops or dtype combinations fail with
    /// [`Error::CompilationFailure`].
    fn compile(&self, program: &Program) -> Result<Self::Executable>;

    /// Enqueue an execution on `stream`. The outputs become available once
    /// the stream has been synchronized.
    fn execute(
        &self,
        executable: &Self::Executable,
        devices: &[Device],
        stream: &Stream,
    ) -> Result<PendingOutputs>;
}

type Slot = Arc<Mutex<Option<Result<Vec<BufferRef>>>>>;

/// Results of an enqueued execution.
#[derive(Debug)]
pub struct PendingOutputs {
    slot: Slot,
}

/// Write end of a [`PendingOutputs`], moved into the enqueued job.
#[derive(Debug)]
pub struct OutputSlot {
    slot: Slot,
}

impl OutputSlot {
    pub fn fill(self, result: Result<Vec<BufferRef>>) {
        *self.slot.lock().expect("output slot lock poisoned") = Some(result);
    }
}

impl PendingOutputs {
    pub fn new() -> (Self, OutputSlot) {
        let slot = Slot::default();
        (Self { slot: slot.clone() }, OutputSlot { slot })
    }

    /// Outputs that are already available.
    pub fn ready(result: Result<Vec<BufferRef>>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(result))),
        }
    }

    /// Synchronize `stream` and take the outputs.
    pub fn wait(self, stream: &Stream) -> Result<Vec<BufferRef>> {
        stream.synchronize()?;
        self.slot
            .lock()
            .expect("output slot lock poisoned")
            .take()
            .unwrap_or_else(|| {
                Err(Error::ExecutionFailure(
                    "execution finished without producing outputs".to_string(),
                ))
            })
    }
}
