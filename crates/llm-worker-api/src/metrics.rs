//! Prometheus metrics collection
//!
//! Job and HTTP metrics registered in the default Prometheus registry and
//! rendered by the `/metrics` endpoint.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};

/// Jobs dispatched, by back end
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("jobs_total", "Total number of jobs dispatched", &["route"])
        .expect("Failed to create jobs counter")
});

/// Jobs whose batch stream is still open
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("jobs_in_flight", "Number of jobs currently streaming")
        .expect("Failed to create in-flight jobs gauge")
});

/// Batches relayed to callers, by back end
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("batches_total", "Total number of batches relayed", &["route"])
        .expect("Failed to create batches counter")
});

/// Jobs that ended with an error batch, by back end
pub static JOB_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "job_errors_total",
        "Total number of jobs that ended with an error",
        &["route"]
    )
    .expect("Failed to create job errors counter")
});

/// HTTP request counter
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to create HTTP requests counter")
});

/// HTTP request duration histogram
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]
    )
    .expect("Failed to create HTTP request duration histogram")
});

/// Worker information gauge (version)
pub static WORKER_INFO: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("llm_worker_info", "Worker information", &["version"])
        .expect("Failed to create worker info gauge")
});

/// Initialize metrics
pub fn init_metrics() {
    Lazy::force(&JOBS_TOTAL);
    Lazy::force(&JOBS_IN_FLIGHT);
    Lazy::force(&BATCHES_TOTAL);
    Lazy::force(&JOB_ERRORS_TOTAL);
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);

    WORKER_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1);

    tracing::info!("Metrics initialized successfully");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to string: {}", e))
}

/// Record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

/// Keeps the in-flight gauge raised while a job stream is alive
pub struct InFlightGuard(());

impl InFlightGuard {
    pub fn new(route: &str) -> Self {
        JOBS_TOTAL.with_label_values(&[route]).inc();
        JOBS_IN_FLIGHT.inc();
        Self(())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        JOBS_IN_FLIGHT.dec();
    }
}
