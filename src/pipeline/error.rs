use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// User-correctable input problem (empty upload, missing filename).
    #[error("{0}")]
    Validation(String),
    /// Upload exceeded the configured size limit.
    #[error("file exceeds maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    /// Read/write failure against the blob store or metadata database.
    #[error("storage failure: {0}")]
    Storage(String),
    /// Record absent or owned by someone else. Deliberately uniform so
    /// callers cannot probe for other owners' files.
    #[error("file not found")]
    NotFoundOrForbidden,
    /// The record exists but its blob is gone: a data-integrity fault,
    /// kept distinct from `NotFoundOrForbidden` even though both surface
    /// as 404 over HTTP.
    #[error("stored content missing for file {0}")]
    BlobMissing(String),
    /// Processing could not be scheduled; the upload was rolled back and
    /// the client should retry.
    #[error("processing could not be scheduled")]
    Scheduling,
}

impl From<DatabaseError> for PipelineError {
    fn from(e: DatabaseError) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

impl From<ObjectStoreError> for PipelineError {
    fn from(e: ObjectStoreError) -> Self {
        PipelineError::Storage(e.to_string())
    }
}
