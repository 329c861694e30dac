use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_pipeline::{
    api,
    auth::HmacAuthenticator,
    config::Config,
    jobs::{DigestProcessor, ProcessingQueue, ProcessorContext},
    object_store::{LocalStore, ObjectStore},
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "file-pipeline starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.server.data_dir)?;
    info!("Database opened at: {}", config.server.data_dir);

    // Initialize blob storage
    let object_store: Arc<dyn ObjectStore> =
        Arc::new(LocalStore::new(&config.storage.local_storage_path)?);
    info!(
        "Using local storage backend at: {}",
        config.storage.local_storage_path
    );

    // Start the background processing queue
    let jobs = ProcessingQueue::start(
        ProcessorContext {
            db: db.clone(),
            object_store: Arc::clone(&object_store),
            processor: Arc::new(DigestProcessor),
            timeout: Duration::from_secs(config.processing.timeout_secs),
        },
        config.processing.worker_concurrency,
    );

    // Recover work interrupted by a previous shutdown: anything stuck in
    // `processing` is reset and everything still `uploaded` is requeued.
    let pending = db.reset_interrupted()?;
    if !pending.is_empty() {
        info!(count = pending.len(), "Requeueing unprocessed files");
        for file_id in pending {
            if let Err(e) = jobs.enqueue(&file_id) {
                tracing::error!(file_id = %file_id, error = %e, "Failed to requeue file");
            }
        }
    }

    let authenticator = Arc::new(HmacAuthenticator::new(&config.auth_secret));

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        object_store,
        authenticator,
        jobs,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
