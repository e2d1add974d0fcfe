//! cur-server: HTTP API server and background task scheduler.
//!
//! This crate ties together all other cur-* crates into a running server
//! application. It provides:
//!
//! - Axum-based HTTP API with SSE progress streaming
//! - Single-flight FIFO job scheduler with pause/resume/cancel/reorder
//! - Scan providers and metadata catalog clients used by the task runners
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod providers;
pub mod router;
pub mod routes;
pub mod scheduler;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use cur_core::config::Config;
use cur_core::events::EventBus;
use tokio_util::sync::CancellationToken;

use crate::context::{AppContext, ConfigStore};
use crate::providers::local::LocalScanProvider;
use crate::providers::musicbrainz::MusicBrainzClient;
use crate::providers::tmdb::TmdbClient;
use crate::providers::{CatalogProvider, MusicCatalogProvider, ScanProvider};
use crate::scheduler::job::JobKind;
use crate::scheduler::runners::{
    CollectionCompletenessRunner, LibraryScanRunner, MusicCompletenessRunner, MusicScanRunner,
    SeriesCompletenessRunner, SourceScanRunner, TaskRunner,
};
use crate::scheduler::JobScheduler;

/// Start the curatorr server.
///
/// This is the main entry point. It initializes the database, constructs the
/// [`AppContext`] with the scheduler and its task runners, and runs the HTTP
/// server until a shutdown signal is received.
pub async fn start(config: Config, config_path: Option<PathBuf>) -> cur_core::Result<()> {
    // Validate configuration.
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Initialize database.
    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| cur_core::Error::Io { source: e })?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = cur_db::pool::init_pool(&db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    // Build config store and event bus.
    let config_store = Arc::new(ConfigStore::new(&config, config_path.clone()));
    let event_bus = Arc::new(EventBus::new(config.scheduler.event_buffer));

    // Build providers.
    let scan: Arc<dyn ScanProvider> =
        Arc::new(LocalScanProvider::new(db.clone(), config.scan.extensions.clone()));
    let catalog: Arc<dyn CatalogProvider> = Arc::new(TmdbClient::new(
        config.metadata.tmdb_api_key.clone(),
        config.metadata.language.clone(),
        config.metadata.tmdb_requests_per_second,
    ));
    let music: Arc<dyn MusicCatalogProvider> = Arc::new(MusicBrainzClient::new(
        config.metadata.musicbrainz_user_agent.clone(),
        config.metadata.musicbrainz_requests_per_second,
    ));

    // Wire up one runner per job kind.
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    let library_scan = Arc::new(LibraryScanRunner::new(
        db.clone(),
        scan.clone(),
        config_store.clone(),
    ));
    runners.insert(JobKind::LibraryScan, library_scan);
    runners.insert(
        JobKind::SourceScan,
        Arc::new(SourceScanRunner::new(db.clone(), scan.clone())),
    );
    runners.insert(
        JobKind::MusicScan,
        Arc::new(MusicScanRunner::new(db.clone(), scan.clone())),
    );
    runners.insert(
        JobKind::SeriesCompleteness,
        Arc::new(SeriesCompletenessRunner::new(db.clone(), catalog.clone())),
    );
    runners.insert(
        JobKind::CollectionCompleteness,
        Arc::new(CollectionCompletenessRunner::new(db.clone(), catalog)),
    );
    runners.insert(
        JobKind::MusicCompleteness,
        Arc::new(MusicCompletenessRunner::new(db.clone(), music)),
    );

    let scheduler = JobScheduler::new(&config.scheduler, event_bus.clone(), runners);

    let ctx = AppContext {
        db,
        config: Arc::new(config.clone()),
        config_store,
        event_bus,
        scheduler: scheduler.clone(),
    };

    // Build and start the HTTP server.
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| cur_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let app = router::build_router(ctx);

    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| cur_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let cancel = CancellationToken::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| cur_core::Error::Internal(format!("Server error: {e}")))?;

    // Stop dispatching and cancel whatever is running.
    scheduler.dispose();

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C, SIGTERM, or the cancellation token).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
