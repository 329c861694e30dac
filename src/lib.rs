//! file-pipeline - an authenticated file upload, processing, and download service
//!
//! This crate provides the upload/process/status/download lifecycle with:
//! - Swappable blob storage behind an object-store trait
//! - redb embedded database for file metadata (ACID, MVCC, crash-safe)
//! - An in-process background job queue with idempotent, timeout-bounded
//!   processing and a pluggable transformation step
//! - REST API with multipart upload support and bearer-token ownership

pub mod api;
pub mod auth;
pub mod config;
pub mod jobs;
pub mod object_store;
pub mod pipeline;
pub mod storage;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use jobs::ProcessingQueue;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub jobs: ProcessingQueue,
}
