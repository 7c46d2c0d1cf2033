//! Delegated task execution
//!
//! Engines defer expensive handshake steps as [`DelegatedTask`]s. A
//! [`TaskRunner`] executes a whole batch, either on the calling thread or on a
//! worker pool, then reports through a [`TaskCompletion`]. Completion is the
//! only cross-thread write in a connection: it flips the outbound
//! [`IoStateCell`] from `Idle` to `Interest` so the I/O driver polls again.

use super::engine::DelegatedTask;
use crate::error::{Result, SslError};
use crate::io::IoStateCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// All delegated tasks handed out by one engine call
pub struct TaskBatch {
    tasks: Vec<DelegatedTask>,
}

impl TaskBatch {
    pub fn new(tasks: Vec<DelegatedTask>) -> Self {
        TaskBatch { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task in order, stopping at the first failure
    pub fn run(self) -> Result<()> {
        for task in self.tasks {
            task()?;
        }
        Ok(())
    }
}

/// Failure reported by a delegated task, waiting to be picked up by the driver
#[derive(Debug, Clone, Default)]
pub struct FailureSlot {
    inner: Arc<Mutex<Option<SslError>>>,
}

impl FailureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the first failure; later ones are logged and dropped
    pub fn record(&self, error: SslError) {
        let mut slot = self.inner.lock();
        if slot.is_none() {
            *slot = Some(error);
        } else {
            warn!(%error, "additional delegated task failure");
        }
    }

    pub fn take(&self) -> Option<SslError> {
        self.inner.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }
}

/// Completion handle for one in-flight [`TaskBatch`]
pub struct TaskCompletion {
    outbound: IoStateCell,
    in_flight: Arc<AtomicBool>,
    failure: FailureSlot,
}

impl TaskCompletion {
    pub(crate) fn new(outbound: IoStateCell, in_flight: Arc<AtomicBool>, failure: FailureSlot) -> Self {
        TaskCompletion {
            outbound,
            in_flight,
            failure,
        }
    }

    /// Publish the batch outcome and wake the outbound direction.
    ///
    /// The failure (if any) and the in-flight marker are published before the
    /// readiness flip, so a driver that sees `Interest` also sees the outcome.
    pub fn complete(self, outcome: Result<()>) {
        if let Err(error) = outcome {
            warn!(%error, "delegated task batch failed");
            self.failure.record(match error {
                SslError::DelegatedTask(_) => error,
                other => SslError::DelegatedTask(other.to_string()),
            });
        }
        self.in_flight.store(false, Ordering::Release);
        let flipped = self.outbound.signal_interest();
        debug!(flipped, "delegated task batch completed");
    }
}

/// Executes delegated task batches
pub trait TaskRunner: Send + Sync {
    /// Run `batch` and then call [`TaskCompletion::complete`] exactly once
    fn execute(&self, batch: TaskBatch, completion: TaskCompletion);
}

/// Runs batches on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineTaskRunner;

impl TaskRunner for InlineTaskRunner {
    fn execute(&self, batch: TaskBatch, completion: TaskCompletion) {
        completion.complete(batch.run());
    }
}

type Job = (TaskBatch, TaskCompletion);

/// Fixed-size pool of worker threads for delegated tasks
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one)
    pub fn new(size: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size.max(1));
        for id in 0..size.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("ssl-task-{}", id))
                .spawn(move || worker_loop(id, receiver))?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // The guard is dropped before the batch runs.
        let job = receiver.lock().recv();
        match job {
            Ok((batch, completion)) => {
                debug!(worker = id, tasks = batch.len(), "running delegated tasks");
                completion.complete(batch.run());
            }
            Err(_) => break,
        }
    }
}

impl TaskRunner for WorkerPool {
    fn execute(&self, batch: TaskBatch, completion: TaskCompletion) {
        let job = (batch, completion);
        let rejected = match &self.sender {
            Some(sender) => sender.send(job).err().map(|e| e.0),
            None => Some(job),
        };
        if let Some((_, completion)) = rejected {
            completion.complete(Err(SslError::DelegatedTask(
                "worker pool is shut down".to_string(),
            )));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
