//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{concurrency, health_check, metrics, run_job, run_job_sync, AppState};

/// Build the API router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Job endpoints
        .route("/run", post(run_job))
        .route("/runsync", post(run_job_sync))
        // Host runtime probes
        .route("/concurrency", get(concurrency))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
}
