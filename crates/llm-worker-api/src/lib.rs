//! LLM Worker API Layer
//!
//! The HTTP surface through which the host runtime hands jobs to the worker.
//!
//! # Endpoints
//!
//! - `POST /run`: stream a job's batches as newline-delimited JSON
//! - `POST /runsync`: run a job and return its batches as one JSON array
//! - `GET /concurrency`: current concurrency ceiling
//! - `GET /health`, `GET /metrics`: probes
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_worker_api::build_api_server;
//! use llm_worker_service::RequestRouter;
//!
//! # async fn example(router: RequestRouter) -> std::io::Result<()> {
//! let app = build_api_server(router);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod responses;
pub mod routes;

// Re-export main types for convenience
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{AppState, NDJSON_CONTENT_TYPE};
pub use metrics::{init_metrics, render_metrics};
pub use middleware::UuidRequestIdGenerator;
pub use responses::{ComponentHealth, ConcurrencyResponse, HealthResponse, HealthStatus};
pub use routes::build_router;

use axum::Router;
use llm_worker_service::RequestRouter;

/// Build a complete API server with middleware
pub fn build_api_server(router: RequestRouter) -> Router {
    let state = AppState::new(router);

    build_router(state)
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(middleware::cors_layer())
        .layer(middleware::trace_layer())
        .layer(tower_http::request_id::SetRequestIdLayer::x_request_id(
            middleware::UuidRequestIdGenerator,
        ))
        .layer(tower_http::request_id::PropagateRequestIdLayer::x_request_id())
}
