//! Ordered execution queues
//!
//! Each stream owns one worker thread that runs submitted jobs in order.

use crate::error::LaunchError;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct StreamWorker {
    id: u64,
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once the queue drains.
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.thread().id() != thread::current().id()
            && handle.join().is_err()
        {
            log::warn!("stream {} worker terminated abnormally", self.id);
        }
    }
}

/// Handle to an ordered work queue on a device.
///
/// Cloning the handle shares the queue. The worker stops after the last
/// handle is dropped and all queued work has run.
#[derive(Clone)]
pub struct Stream {
    worker: Arc<StreamWorker>,
}

impl Stream {
    pub(crate) fn spawn(id: u64) -> Result<Self, LaunchError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(format!("kernjit-stream-{}", id))
            .spawn(move || run_worker(id, receiver))
            .map_err(|e| {
                LaunchError::InvalidConfiguration(format!("cannot start stream {}: {}", id, e))
            })?;
        log::debug!("stream {} started", id);
        Ok(Self {
            worker: Arc::new(StreamWorker {
                id,
                sender: Some(sender),
                handle: Some(handle),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.worker.id
    }

    /// Queue `job` behind all previously submitted work.
    ///
    /// The returned receiver yields the job's result once it has run.
    pub fn submit<F, R>(&self, job: F) -> Result<Receiver<R>, LaunchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let sender = self
            .worker
            .sender
            .as_ref()
            .ok_or(LaunchError::StreamClosed(self.id()))?;
        sender
            .send(Box::new(move || {
                let _ = done_tx.send(job());
            }))
            .map_err(|_| LaunchError::StreamClosed(self.id()))?;
        Ok(done_rx)
    }

    /// Queue `job` and block until it has run
    pub fn run<F, R>(&self, job: F) -> Result<R, LaunchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(job)?
            .recv()
            .map_err(|_| LaunchError::StreamClosed(self.id()))
    }

    /// Wait until all work submitted so far has completed
    pub fn synchronize(&self) -> Result<(), LaunchError> {
        self.run(|| ())
    }
}

fn run_worker(id: u64, receiver: Receiver<Job>) {
    for job in receiver.iter() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("job on stream {} panicked", id);
        }
    }
    log::debug!("stream {} stopped", id);
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.id())
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.worker, &other.worker)
    }
}
