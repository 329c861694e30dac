use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an uploaded file.
///
/// Transitions: `Uploaded -> Processing -> Completed | Error`. `Completed`
/// and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Error)
    }
}

/// A file record stored in redb.
///
/// Invariants maintained by the storage layer:
/// - `error_message` is present iff `status == Error`
/// - `progress == 100` iff `status == Completed`
/// - `processed_at` is set exactly once, when a terminal status is reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    /// Original filename as supplied by the client. Untrusted.
    pub original_filename: String,
    /// Opaque object-store key. Never exposed through the API.
    pub storage_key: String,
    /// Bytes actually written to the object store (not client-declared).
    pub byte_size: u64,
    pub content_type: String,
    pub status: FileStatus,
    /// 0-100, monotonically non-decreasing while processing.
    pub progress: u8,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Derived values attached by the processing step (e.g. checksums).
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Build a freshly-uploaded record with a generated id and storage key.
    pub fn new_uploaded(
        owner_id: &str,
        original_filename: &str,
        content_type: &str,
        byte_size: u64,
        storage_key: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            original_filename: original_filename.to_string(),
            storage_key,
            byte_size,
            content_type: content_type.to_string(),
            status: FileStatus::Uploaded,
            progress: 0,
            error_message: None,
            metadata: None,
            uploaded_at: Utc::now(),
            processed_at: None,
        }
    }
}
