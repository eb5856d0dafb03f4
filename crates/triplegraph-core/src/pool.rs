//! Bounded worker pool for independent import runs.
//!
//! Jobs go through a bounded queue. When the queue is full, submission
//! waits and retries instead of growing the backlog, so a fast producer
//! cannot run far ahead of the store.

use crate::error::ImportError;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Wait between attempts to enqueue into a full queue.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Fixed-size pool of commit workers.
pub struct CommitPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    retry_interval: Duration,
}

impl CommitPool {
    /// Twice as many workers as CPUs, with a queue of the same depth.
    pub fn new() -> Self {
        let workers = 2 * num_cpus::get();
        Self::with_size(workers, workers)
    }

    /// Pool with `workers` threads and room for `queue` waiting jobs.
    pub fn with_size(workers: usize, queue: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = channel::bounded::<Job>(queue.max(1));

        let handles = (0..workers)
            .map(|i| {
                let receiver: Receiver<Job> = receiver.clone();
                thread::Builder::new()
                    .name(format!("commit-{i}"))
                    .spawn(move || worker_loop(receiver))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "Failed to spawn commit worker");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(workers = handles.len(), queue, "Commit pool started");

        Self {
            sender: Some(sender),
            workers: handles,
            retry_interval: RETRY_INTERVAL,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `work`, waiting while the queue is full.
    pub fn submit<F, T>(&self, work: F) -> Result<JobHandle<T>, ImportError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(ImportError::PoolClosed)?;
        if self.workers.is_empty() {
            return Err(ImportError::PoolClosed);
        }

        let (result_tx, result_rx) = channel::bounded(1);
        let mut job: Job = Box::new(move || {
            // The handle may have been dropped; the result is then unused
            let _ = result_tx.send(work());
        });

        loop {
            match sender.try_send(job) {
                Ok(()) => return Ok(JobHandle { result: result_rx }),
                Err(TrySendError::Full(returned)) => {
                    trace!("Commit queue full, retrying");
                    job = returned;
                    thread::sleep(self.retry_interval);
                }
                Err(TrySendError::Disconnected(_)) => return Err(ImportError::PoolClosed),
            }
        }
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Commit worker exited abnormally");
            }
        }
    }
}

impl Default for CommitPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CommitPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("Commit job panicked");
        }
    }
}

/// Result of a queued job.
#[derive(Debug)]
pub struct JobHandle<T> {
    result: Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Block until the job has run.
    pub fn join(self) -> Result<T, ImportError> {
        self.result.recv().map_err(|_| ImportError::JobPanicked)
    }
}
