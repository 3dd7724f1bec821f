use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::{
    error::ApiError,
    models::{HealthResponse, HealthStatus, RootResponse, WorkersResponse},
    state::AppState,
    utils,
};
use crate::platform::ContentId;

/// Stream one audio track (GET /stream/{content_id})
///
/// Locates the message on a healthy worker and relays its media as it
/// downloads. The body is forward-only: a client that disconnects drops
/// the relay, which ends the download on the worker side.
///
/// - 400 for a malformed id
/// - 404 when the message does not exist or carries no audio
/// - 503 + `Retry-After` when no worker could serve the request
pub async fn stream_content(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Result<Response, ApiError> {
    let content: ContentId = content_id.parse()?;

    let stream = state
        .fetcher
        .fetch_and_stream(&content)
        .await
        .map_err(|e| ApiError::from_stream(e, state.config.pool.retry_after_hint))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, utils::content_type(&stream.mime_type));
    headers.insert(
        header::CONTENT_DISPOSITION,
        utils::content_disposition(&stream.filename),
    );
    if let Some(size) = stream.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }

    Ok((StatusCode::OK, headers, Body::from_stream(stream.body)).into_response())
}

/// Health check endpoint (GET /health)
///
/// Returns 503 when no worker is currently able to serve requests.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let workers_total = state.pool.len();
    let workers_available = state.pool.available_count();

    let (status_code, status) = if workers_available > 0 {
        (StatusCode::OK, HealthStatus::Healthy)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unavailable)
    };

    let response = HealthResponse {
        status,
        workers_total,
        workers_available,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// Per-worker status (GET /operators/workers)
pub async fn list_workers(State(state): State<AppState>) -> Json<WorkersResponse> {
    Json(WorkersResponse {
        workers: state.pool.snapshot(),
    })
}

/// Fetch and stream counters (GET /operators/metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "tunebox audio streaming gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
