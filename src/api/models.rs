//! Response bodies for the HTTP surface.
//!
//! - `GET /stream/{content_id}` returns raw audio bytes, or [`ErrorResponse`]
//! - `GET /health` returns [`HealthResponse`]
//! - `GET /operators/workers` returns [`WorkersResponse`]
//! - `GET /operators/metrics` returns a counters snapshot

use serde::{Deserialize, Serialize};

use crate::pool::WorkerSnapshot;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unavailable,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub workers_total: usize,
    pub workers_available: usize,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerSnapshot>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}
