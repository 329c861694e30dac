use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::pipeline_error;
use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::auth::Owner;
use crate::pipeline;
use crate::storage::models::{FileRecord, FileStatus};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub status: FileStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some("file") {
            // Ignore unknown fields
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::bad_request("file field must have a filename"))?;
        let content_type = field.content_type().map(|s| s.to_string());

        // Stream the part into the pipeline chunk by chunk; the pipeline
        // enforces the size limit incrementally as it writes.
        let content = Box::pin(futures::stream::try_unfold(field, |mut field| async move {
            match field.chunk().await {
                Ok(Some(chunk)) => Ok(Some((chunk, field))),
                Ok(None) => Ok(None),
                Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
            }
        }));

        let record = pipeline::upload(
            &state,
            &owner.id,
            &filename,
            content_type.as_deref(),
            content,
        )
        .await
        .map_err(pipeline_error)?;

        return Ok(JSend::success(file_to_response(&record)));
    }

    Err(ApiError::bad_request("file field is required"))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = pipeline::get_status(&state, &id, &owner.id).map_err(pipeline_error)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (file, stream) = pipeline::download(&state, &id, &owner.id)
        .await
        .map_err(pipeline_error)?;

    let mut response = (StatusCode::OK, Body::from_stream(stream)).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/octet-stream"),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(file.byte_size),
    );

    let filename = sanitize_filename(&file.original_filename);
    if let Ok(value) = format!("attachment; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let files = pipeline::list_files(&state, &owner.id).map_err(pipeline_error)?;

    let total = files.len() as u64;
    let items: Vec<FileResponse> = files
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        file_id: file.id.clone(),
        filename: file.original_filename.clone(),
        size: file.byte_size,
        content_type: file.content_type.clone(),
        status: file.status,
        progress: file.progress,
        error_message: file.error_message.clone(),
        metadata: file.metadata.clone(),
        uploaded_at: file.uploaded_at.to_rfc3339(),
        processed_at: file.processed_at.map(|t| t.to_rfc3339()),
    }
}

/// The original filename is untrusted: keep only the final path component
/// and strip characters that would break the Content-Disposition header.
fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect::<String>();

    if name.is_empty() {
        "download".to_string()
    } else {
        name
    }
}
