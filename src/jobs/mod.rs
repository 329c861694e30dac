//! In-process job queue for background file processing.
//!
//! Delivery is at-least-once from the caller's point of view: enqueueing
//! the same file id twice is harmless because the runner's claim
//! compare-and-set turns redelivery into a no-op, and the dispatcher drops
//! a duplicate while a run for that id is already in flight.

mod processor;
mod runner;

pub use processor::{DigestProcessor, FileProcessor, ProcessError, ProcessOutcome, ProgressSink};
pub use runner::{run_one, ProcessorContext};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("job queue is not accepting work")]
    QueueClosed,
}

/// Handle for scheduling and cancelling processing jobs.
pub struct ProcessingQueue {
    tx: mpsc::UnboundedSender<String>,
    cancelled: Arc<Mutex<HashSet<String>>>,
}

impl ProcessingQueue {
    /// Start the dispatcher and its worker pool.
    pub fn start(ctx: ProcessorContext, concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(Mutex::new(HashSet::new()));

        tokio::spawn(dispatch(ctx, rx, Arc::clone(&cancelled), concurrency));

        Self { tx, cancelled }
    }

    /// Schedule processing for a file. At-least-once friendly; duplicate
    /// enqueues of the same id are tolerated downstream.
    pub fn enqueue(&self, file_id: &str) -> Result<(), ScheduleError> {
        // A fresh enqueue supersedes any stale cancellation for this id
        self.cancelled
            .lock()
            .expect("cancellation set poisoned")
            .remove(file_id);
        self.tx
            .send(file_id.to_string())
            .map_err(|_| ScheduleError::QueueClosed)
    }

    /// Best-effort cancellation of a queued-but-not-started job. A job
    /// already running is unaffected.
    pub fn cancel(&self, file_id: &str) {
        self.cancelled
            .lock()
            .expect("cancellation set poisoned")
            .insert(file_id.to_string());
    }
}

async fn dispatch(
    ctx: ProcessorContext,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancelled: Arc<Mutex<HashSet<String>>>,
    concurrency: usize,
) {
    tracing::info!(concurrency, "Processing queue started");

    let ctx = Arc::new(ctx);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    while let Some(file_id) = rx.recv().await {
        if cancelled
            .lock()
            .expect("cancellation set poisoned")
            .remove(&file_id)
        {
            tracing::debug!(file_id = %file_id, "Dropped cancelled job");
            continue;
        }

        // At most one in-flight run per file id; the running instance will
        // drive the record to a terminal state, so the duplicate is moot.
        if !in_flight
            .lock()
            .expect("in-flight set poisoned")
            .insert(file_id.clone())
        {
            tracing::debug!(file_id = %file_id, "Dropped duplicate job, already in flight");
            continue;
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Cancellation may have landed while this job waited for a worker
        if cancelled
            .lock()
            .expect("cancellation set poisoned")
            .remove(&file_id)
        {
            tracing::debug!(file_id = %file_id, "Dropped cancelled job");
            in_flight
                .lock()
                .expect("in-flight set poisoned")
                .remove(&file_id);
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let in_flight = Arc::clone(&in_flight);
        tokio::spawn(async move {
            run_one(&ctx, &file_id).await;
            in_flight
                .lock()
                .expect("in-flight set poisoned")
                .remove(&file_id);
            drop(permit);
        });
    }

    tracing::info!("Processing queue stopped");
}
