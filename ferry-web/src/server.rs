//! Routers and runners for the tracker and peer chunk services.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use ferry_core::config::{DEFAULT_MAX_REQUEST_BODY, TrackerConfig};
use ferry_core::storage::ChunkStore;
use ferry_core::tracker::Registry;
use ferry_core::tracker::protocol::routes;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    download_chunk, get_files, get_peers, query_file_parts, register_peer, remove_peer,
    retract_file_parts, update_file_parts,
};

/// Builds the tracker HTTP API over a shared registry.
pub fn tracker_router(registry: Arc<Registry>) -> Router {
    tracker_router_with_limit(registry, DEFAULT_MAX_REQUEST_BODY)
}

/// Builds the tracker HTTP API accepting bodies of up to `max_request_body` bytes.
///
/// Advertisements carry a peer's whole inventory, so the limit must cover
/// the largest inventory expected; larger requests get 413.
pub fn tracker_router_with_limit(registry: Arc<Registry>, max_request_body: usize) -> Router {
    Router::new()
        .route(routes::REGISTER_PEER, post(register_peer))
        .route(routes::REMOVE_PEER, delete(remove_peer))
        .route(routes::UPDATE_PEER_FILE_PARTS, post(update_file_parts))
        .route(routes::RETRACT_PEER_FILE_PARTS, post(retract_file_parts))
        .route(routes::QUERY_FILE_PARTS, post(query_file_parts))
        .route(routes::GET_PEERS, get(get_peers))
        .route(routes::GET_FILES, get(get_files))
        .layer(DefaultBodyLimit::max(max_request_body))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Builds the peer endpoint serving chunks out of `store`.
pub fn chunk_router(store: ChunkStore) -> Router {
    Router::new()
        .route(routes::DOWNLOAD, get(download_chunk))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Spawns a task running a liveness sweep every `interval`.
///
/// Reads already sweep on their own; this bounds how long a silent peer
/// lingers when nobody is querying.
pub fn spawn_sweeper(registry: Arc<Registry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = registry.liveness_sweep();
            if !evicted.is_empty() {
                tracing::debug!("Sweep evicted {} peers", evicted.len());
            }
        }
    })
}

/// Serves the tracker API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// - `std::io::Error` - If the server fails while accepting connections
pub async fn serve_tracker<F>(
    listener: TcpListener,
    registry: Arc<Registry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    serve_tracker_router(listener, tracker_router(registry), shutdown).await
}

async fn serve_tracker_router<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Tracker listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Serves chunk downloads on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// - `std::io::Error` - If the server fails while accepting connections
pub async fn serve_chunks<F>(
    listener: TcpListener,
    store: ChunkStore,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(
        "Serving chunks from {} on {}",
        store.chunk_dir().display(),
        listener.local_addr()?
    );
    axum::serve(listener, chunk_router(store))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Binds the configured address and runs a tracker with its sweeper.
///
/// # Errors
///
/// - `std::io::Error` - If the listen address cannot be bound
pub async fn run_tracker<F>(config: &TrackerConfig, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::new(Registry::from_config(config));
    let listener = TcpListener::bind(config.listen_addr).await?;
    let sweeper = spawn_sweeper(Arc::clone(&registry), config.sweep_interval);

    let router = tracker_router_with_limit(registry, config.max_request_body);
    let result = serve_tracker_router(listener, router, shutdown).await;
    sweeper.abort();
    tracing::info!("Tracker stopped");
    result
}
