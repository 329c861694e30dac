//! The upload/status/download lifecycle, independent of HTTP extraction.
//!
//! Handlers stay thin: they parse the request and delegate here, and the
//! integration tests drive these functions directly.

mod error;

pub use error::PipelineError;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::object_store::ObjectStoreError;
use crate::storage::models::FileRecord;
use crate::AppState;

/// Accept an inbound byte stream for `owner_id`, persist it, and schedule
/// processing.
///
/// The stream is written chunk by chunk with a running byte count, so the
/// size limit trips as soon as it is crossed instead of after buffering the
/// whole body. Every failure path after the first chunk discards the
/// partial object before surfacing the error.
pub async fn upload<S>(
    state: &AppState,
    owner_id: &str,
    filename: &str,
    declared_content_type: Option<&str>,
    mut content: S,
) -> Result<FileRecord, PipelineError>
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin,
{
    if filename.trim().is_empty() {
        return Err(PipelineError::Validation(
            "filename must not be empty".to_string(),
        ));
    }

    let limit = state.config.max_upload_size;
    let storage_key = uuid::Uuid::new_v4().to_string();
    let mut writer = state.object_store.writer(&storage_key).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = content.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                abort_writer(writer, &storage_key).await;
                return Err(PipelineError::Storage(format!(
                    "failed to read upload stream: {e}"
                )));
            }
        };
        if chunk.is_empty() {
            continue;
        }

        written += chunk.len() as u64;
        if written > limit {
            abort_writer(writer, &storage_key).await;
            return Err(PipelineError::PayloadTooLarge { limit });
        }

        if let Err(e) = writer.write_chunk(chunk).await {
            abort_writer(writer, &storage_key).await;
            return Err(PipelineError::Storage(format!(
                "failed to write upload: {e}"
            )));
        }
    }

    if written == 0 {
        abort_writer(writer, &storage_key).await;
        return Err(PipelineError::Validation(
            "uploaded file must not be empty".to_string(),
        ));
    }

    if let Err(e) = writer.finish().await {
        // finish() cleans up its own partial object on failure
        return Err(PipelineError::Storage(format!(
            "failed to persist upload: {e}"
        )));
    }

    // Advisory only: the declared type wins unless it is the generic
    // fallback, then the filename extension, then octet-stream.
    let content_type = declared_content_type
        .filter(|ct| *ct != "application/octet-stream")
        .map(|ct| ct.to_string())
        .or_else(|| {
            mime_guess::from_path(filename)
                .first()
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let record = FileRecord::new_uploaded(owner_id, filename, &content_type, written, storage_key);

    if let Err(e) = state.db.insert_file(&record) {
        delete_blob(state, &record.storage_key).await;
        return Err(e.into());
    }

    // Exactly one job per successful upload. If scheduling fails the whole
    // upload is rolled back rather than leaving a record silently stuck in
    // `uploaded`; the client sees a retryable error.
    if let Err(e) = state.jobs.enqueue(&record.id) {
        tracing::error!(file_id = %record.id, error = %e, "Failed to schedule processing, rolling back upload");
        if let Err(e) = state.db.delete_file(&record.id) {
            tracing::error!(file_id = %record.id, error = %e, "Rollback failed to delete file record");
        }
        delete_blob(state, &record.storage_key).await;
        return Err(PipelineError::Scheduling);
    }

    tracing::debug!(file_id = %record.id, owner_id = %owner_id, size = written, "Uploaded file");
    Ok(record)
}

/// Current lifecycle view of a file, visible only to its owner.
/// A missing record and a foreign record get the same answer.
pub fn get_status(
    state: &AppState,
    file_id: &str,
    requester_id: &str,
) -> Result<FileRecord, PipelineError> {
    let file = state.db.get_file(file_id)?;
    match file {
        Some(file) if file.owner_id == requester_id => Ok(file),
        _ => Err(PipelineError::NotFoundOrForbidden),
    }
}

/// Resolve a file for download: the owner-checked record plus a byte
/// stream over its blob.
pub async fn download(
    state: &AppState,
    file_id: &str,
    requester_id: &str,
) -> Result<(FileRecord, BoxStream<'static, std::io::Result<Bytes>>), PipelineError> {
    let file = get_status(state, file_id, requester_id)?;

    match state.object_store.reader(&file.storage_key).await {
        Ok(stream) => Ok((file, stream)),
        Err(ObjectStoreError::NotFound(_)) => {
            tracing::error!(
                file_id = %file_id,
                "Data-integrity fault: file record exists but blob is missing"
            );
            Err(PipelineError::BlobMissing(file_id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// All of the requester's files, newest first.
pub fn list_files(state: &AppState, requester_id: &str) -> Result<Vec<FileRecord>, PipelineError> {
    let mut files = state.db.list_files_by_owner(requester_id)?;
    files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    Ok(files)
}

async fn abort_writer(writer: Box<dyn crate::object_store::ObjectWriter>, storage_key: &str) {
    if let Err(e) = writer.abort().await {
        tracing::warn!(storage_key = %storage_key, error = %e, "Failed to discard partial upload");
    }
}

async fn delete_blob(state: &AppState, storage_key: &str) {
    if let Err(e) = state.object_store.delete(storage_key).await {
        tracing::warn!(storage_key = %storage_key, error = %e, "Failed to delete blob during rollback");
    }
}
