mod admin;
mod files;

pub use admin::{admin_purge, health};
pub use files::{download_file, get_status, list_files, upload_file};

use crate::api::response::ApiError;
use crate::pipeline::PipelineError;

/// Map a PipelineError to an ApiError.
///
/// `NotFoundOrForbidden` and `BlobMissing` both surface as 404; the
/// distinction exists for logging only, never for the caller.
fn pipeline_error(e: PipelineError) -> ApiError {
    match e {
        PipelineError::Validation(msg) => ApiError::bad_request(msg),
        PipelineError::PayloadTooLarge { limit } => ApiError::payload_too_large(format!(
            "File exceeds maximum upload size of {limit} bytes"
        )),
        PipelineError::NotFoundOrForbidden => ApiError::not_found("File not found"),
        PipelineError::BlobMissing(_) => ApiError::not_found("File content not found"),
        PipelineError::Scheduling => {
            ApiError::unavailable("Processing could not be scheduled, retry shortly")
        }
        PipelineError::Storage(msg) => ApiError::internal(msg),
    }
}
