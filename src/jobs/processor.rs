use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use ring::digest;
use thiserror::Error;

use crate::storage::models::FileRecord;

/// Failure inside a processing step. Captured by the job runner and
/// persisted as the record's error_message; never propagated further.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessError(pub String);

/// What a processing step produced.
#[derive(Default)]
pub struct ProcessOutcome {
    /// New bytes to store in place of the uploaded ones.
    pub replacement: Option<Bytes>,
    /// Derived values to merge into the record's metadata.
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Receives progress reports from a running processor. Reports are
/// best-effort; the runner persists them when the file is still in
/// `processing`.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8);
}

/// The pluggable transformation step applied to every upload: virus scan,
/// thumbnailing, format conversion, checksumming, or whatever the
/// deployment configures.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn process(
        &self,
        record: FileRecord,
        data: Bytes,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ProcessOutcome, ProcessError>;
}

/// Default processor: computes a SHA-256 checksum of the stored bytes and
/// records it as `metadata["sha256"]` (base64).
pub struct DigestProcessor;

const DIGEST_CHUNK: usize = 64 * 1024;

#[async_trait]
impl FileProcessor for DigestProcessor {
    async fn process(
        &self,
        _record: FileRecord,
        data: Bytes,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let mut ctx = digest::Context::new(&digest::SHA256);
        let total = data.len();

        for (i, chunk) in data.chunks(DIGEST_CHUNK).enumerate() {
            ctx.update(chunk);
            let done = (i + 1) * DIGEST_CHUNK;
            let percent = ((done.min(total) * 100) / total) as u8;
            progress.report(percent).await;
        }

        let checksum = STANDARD.encode(ctx.finish().as_ref());
        let mut metadata = HashMap::new();
        metadata.insert("sha256".to_string(), serde_json::Value::String(checksum));

        Ok(ProcessOutcome {
            replacement: None,
            metadata: Some(metadata),
        })
    }
}
