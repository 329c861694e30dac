mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Incremental writer for a single object. Callers must finish with either
/// `finish` (commit) or `abort` (discard); a dropped writer leaves no
/// readable object behind.
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), ObjectStoreError>;
    /// Flush and make the object durable and readable under its key.
    async fn finish(self: Box<Self>) -> Result<(), ObjectStoreError>;
    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<(), ObjectStoreError>;
}

/// Abstraction over blob storage backends.
/// Keys are opaque UUIDs -- the raw blobs are meaningless without the
/// metadata database.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an incremental writer for a new object.
    async fn writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>, ObjectStoreError>;
    /// Replace an object's bytes in one call.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Stream an object's bytes without buffering it fully in memory.
    async fn reader(
        &self,
        key: &str,
    ) -> Result<BoxStream<'static, std::io::Result<Bytes>>, ObjectStoreError>;
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
}
