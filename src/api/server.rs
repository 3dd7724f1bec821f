use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{health, list_workers, metrics, root, stream_content},
    state::AppState,
};
use crate::config::{Config, ServerConfig};
use crate::platform::HttpConnector;
use crate::pool::Pool;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP router over an already started pool
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let stream_route = get(stream_content).layer(GlobalConcurrencyLimitLayer::new(
        server.max_concurrent_streams,
    ));

    let mut app = Router::new()
        .route("/", get(root))
        .route("/stream/{content_id}", stream_route)
        .route("/health", get(health))
        .route("/operators/health", get(health))
        .route("/operators/workers", get(list_workers))
        .route("/operators/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if server.cors_allow_any_origin {
        app = app.layer(CorsLayer::permissive());
    }

    app
}

/// Connect the worker pool and serve until a shutdown signal arrives
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(endpoint = %config.platform.endpoint, "Connecting to content platform");
    let connector = HttpConnector::new(&config.platform)?;
    let pool = Arc::new(Pool::start_all(&connector, &config.credentials).await);

    let server_config = config.server.clone();
    let state = AppState::new(config, pool.clone())?;
    let app = router(state, &server_config);

    let listener = TcpListener::bind(address).await?;
    info!(%address, workers = pool.len(), "tunebox listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
