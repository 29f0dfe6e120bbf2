use std::{
    fmt::Debug,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
};

use crate::{Error, Result};

static STREAM_ID: AtomicUsize = AtomicUsize::new(0);
static DEFAULT_STREAM: Mutex<Option<Stream>> = Mutex::new(None);

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Barrier(mpsc::Sender<()>),
}

/// An in-order execution queue.
///
/// Work enqueued on one stream runs in enqueue order on the stream's worker.
/// Separate streams run concurrently. Handles are cheap to clone and compare
/// equal when they refer to the same queue.
#[derive(Clone)]
pub struct Stream {
    id: usize,
    sender: Arc<Mutex<mpsc::Sender<Message>>>,
}

impl Stream {
    pub fn new() -> Result<Self> {
        let id = STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel::<Message>();
        thread::Builder::new()
            .name(format!("tensortrace-stream-{id}"))
            .spawn(move || {
                // Exits once every handle, and with it the sender, is dropped.
                for message in receiver {
                    match message {
                        Message::Run(job) => {
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                tracing::error!(stream = id, "job panicked");
                            }
                        }
                        Message::Barrier(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })?;
        Ok(Self {
            id,
            sender: Arc::new(Mutex::new(sender)),
        })
    }

    /// The process-wide stream used when the caller does not pick one.
    pub fn default_stream() -> Result<Self> {
        let mut slot = DEFAULT_STREAM.lock().expect("default stream lock poisoned");
        if let Some(stream) = slot.as_ref() {
            return Ok(stream.clone());
        }
        let stream = Self::new()?;
        *slot = Some(stream.clone());
        Ok(stream)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender
            .lock()
            .expect("stream lock poisoned")
            .send(message)
            .map_err(|_| Error::ExecutionFailure(format!("stream {} has shut down", self.id)))
    }

    /// Queue `job` behind everything already enqueued.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.send(Message::Run(Box::new(job)))
    }

    /// Block until all work enqueued so far has finished.
    pub fn synchronize(&self) -> Result<()> {
        let (done, wait) = mpsc::channel();
        self.send(Message::Barrier(done))?;
        wait.recv()
            .map_err(|_| Error::ExecutionFailure(format!("stream {} has shut down", self.id)))
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Stream {}

impl Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn jobs_run_in_enqueue_order() {
        let stream = Stream::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            let seen = seen.clone();
            stream.enqueue(move || seen.lock().unwrap().push(i)).unwrap();
        }
        stream.synchronize().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn a_panicking_job_does_not_stop_the_stream() {
        let stream = Stream::new().unwrap();
        stream.enqueue(|| panic!("boom")).unwrap();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        stream.enqueue(move || *flag.lock().unwrap() = true).unwrap();
        stream.synchronize().unwrap();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn default_stream_is_shared() {
        let a = Stream::default_stream().unwrap();
        let b = Stream::default_stream().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Stream::new().unwrap());
    }
}
