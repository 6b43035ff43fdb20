//! API request handlers

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::StreamExt;
use llm_worker_core::Job;
use llm_worker_service::{JobStream, RequestRouter, Route, ServiceError};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    error::{ApiError, ApiResult},
    metrics::{render_metrics, InFlightGuard, BATCHES_TOTAL, JOB_ERRORS_TOTAL},
    responses::{ComponentHealth, ConcurrencyResponse, HealthResponse},
};

/// Content type of streamed job output
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
}

impl AppState {
    /// Create new application state
    pub fn new(router: RequestRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    /// Validate and dispatch a job, with metrics attached to its stream
    fn dispatch(&self, payload: Result<Json<Job>, JsonRejection>) -> ApiResult<JobStream> {
        let Json(job) = payload?;
        if job.input.llm_input().is_none() && !job.input.is_openai_route() {
            return Err(ServiceError::InvalidInput(
                "Job input must contain 'prompt', 'messages' or 'openai_route'".to_string(),
            )
            .into());
        }

        let route = Route::for_input(&job.input);
        let guard = InFlightGuard::new(route.as_str());
        let batches = self.router.dispatch(job).map(move |batch| {
            let _alive = &guard;
            BATCHES_TOTAL.with_label_values(&[route.as_str()]).inc();
            if batch.get("error").is_some() {
                JOB_ERRORS_TOTAL.with_label_values(&[route.as_str()]).inc();
            }
            batch
        });
        Ok(batches.boxed())
    }
}

/// Run a job, streaming its batches as newline-delimited JSON
#[instrument(skip(state, payload))]
pub async fn run_job(
    State(state): State<AppState>,
    payload: Result<Json<Job>, JsonRejection>,
) -> ApiResult<Response> {
    let batches = state.dispatch(payload)?;
    let lines = batches.map(|batch| Ok::<_, Infallible>(format!("{}\n", batch)));

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Run a job and return all of its batches at once
#[instrument(skip(state, payload))]
pub async fn run_job_sync(
    State(state): State<AppState>,
    payload: Result<Json<Job>, JsonRejection>,
) -> ApiResult<Json<Vec<Value>>> {
    let batches: Vec<Value> = state.dispatch(payload)?.collect().await;
    debug!("Job produced {} batches", batches.len());
    Ok(Json(batches))
}

/// Current concurrency ceiling
pub async fn concurrency(State(state): State<AppState>) -> Json<ConcurrencyResponse> {
    Json(ConcurrencyResponse {
        max_concurrency: state.router.concurrency(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> HealthResponse {
    let ceiling = if state.router.concurrency() == 0 {
        ComponentHealth::degraded("Concurrency ceiling is zero")
    } else {
        ComponentHealth::healthy()
    };

    HealthResponse::healthy()
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_check("router", ComponentHealth::healthy())
        .with_check("concurrency", ceiling)
        .compute_status()
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> ApiResult<String> {
    render_metrics().map_err(ApiError::internal_server_error)
}
