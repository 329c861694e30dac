use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::processor::{FileProcessor, ProgressSink};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::storage::Database;

/// Everything a processing run needs, owned independently of the HTTP layer.
pub struct ProcessorContext {
    pub db: Database,
    pub object_store: Arc<dyn ObjectStore>,
    pub processor: Arc<dyn FileProcessor>,
    pub timeout: Duration,
}

/// Persists progress reports, dropping any that arrive after the file has
/// left `processing`.
struct DbProgressSink {
    db: Database,
    file_id: String,
}

#[async_trait]
impl ProgressSink for DbProgressSink {
    async fn report(&self, percent: u8) {
        if let Err(e) = self.db.record_progress(&self.file_id, percent) {
            tracing::warn!(file_id = %self.file_id, error = %e, "Failed to record progress");
        }
    }
}

/// Run processing for one file id to a terminal state.
///
/// Idempotent under at-least-once delivery: the `uploaded -> processing`
/// compare-and-set makes a redelivered job for an already-processed file a
/// no-op. Every failure inside the run, including a processor panic or
/// timeout, is converted into an `error` status; nothing is allowed to
/// leave the record stuck in `processing` or crash the worker.
pub async fn run_one(ctx: &ProcessorContext, file_id: &str) {
    match ctx.db.begin_processing(file_id) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(file_id = %file_id, "Skipping processing, file is not in uploaded state");
            return;
        }
        Err(e) => {
            tracing::error!(file_id = %file_id, error = %e, "Failed to claim file for processing");
            return;
        }
    }

    let record = match ctx.db.get_file(file_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::error!(file_id = %file_id, "File record vanished after claim");
            return;
        }
        Err(e) => {
            fail(ctx, file_id, &format!("failed to load file record: {e}"));
            return;
        }
    };

    let data = match ctx.object_store.get(&record.storage_key).await {
        Ok(data) => data,
        Err(ObjectStoreError::NotFound(_)) => {
            fail(ctx, file_id, "stored content is missing");
            return;
        }
        Err(e) => {
            fail(ctx, file_id, &format!("failed to read stored content: {e}"));
            return;
        }
    };

    let storage_key = record.storage_key.clone();
    let progress: Arc<dyn ProgressSink> = Arc::new(DbProgressSink {
        db: ctx.db.clone(),
        file_id: file_id.to_string(),
    });

    // Run the processor on its own task so a panic is caught as a JoinError
    // instead of taking the worker down.
    let processor = Arc::clone(&ctx.processor);
    let mut task = tokio::spawn(async move { processor.process(record, data, progress).await });

    let outcome = match tokio::time::timeout(ctx.timeout, &mut task).await {
        Err(_) => {
            task.abort();
            fail(
                ctx,
                file_id,
                &format!("processing timed out after {}s", ctx.timeout.as_secs()),
            );
            return;
        }
        Ok(Err(join_err)) => {
            let reason = if join_err.is_panic() {
                "processing step panicked"
            } else {
                "processing step was cancelled"
            };
            fail(ctx, file_id, reason);
            return;
        }
        Ok(Ok(Err(e))) => {
            fail(ctx, file_id, &e.to_string());
            return;
        }
        Ok(Ok(Ok(outcome))) => outcome,
    };

    let new_size = outcome.replacement.as_ref().map(|b| b.len() as u64);
    if let Some(bytes) = outcome.replacement {
        if let Err(e) = ctx.object_store.put(&storage_key, bytes).await {
            fail(ctx, file_id, &format!("failed to store processed content: {e}"));
            return;
        }
    }

    match ctx.db.complete_file(file_id, outcome.metadata, new_size) {
        Ok(true) => tracing::info!(file_id = %file_id, "Processing completed"),
        Ok(false) => {
            tracing::warn!(file_id = %file_id, "File left processing state before completion")
        }
        Err(e) => {
            tracing::error!(file_id = %file_id, error = %e, "Failed to mark file completed");
            fail(ctx, file_id, &format!("failed to record completion: {e}"));
        }
    }
}

/// Convert a processing failure into a persisted `error` status. A failure
/// here can only be logged; there is nowhere left to surface it.
fn fail(ctx: &ProcessorContext, file_id: &str, message: &str) {
    tracing::warn!(file_id = %file_id, error = %message, "Processing failed");
    if let Err(e) = ctx.db.fail_file(file_id, message) {
        tracing::error!(file_id = %file_id, error = %e, "Failed to record processing error");
    }
}
