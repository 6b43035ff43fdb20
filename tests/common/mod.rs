//! Common test utilities and helpers
//!
//! Stub hub and engine servers built on wiremock, and a worker served on a
//! random local port.

use llm_worker_api::build_api_server;
use llm_worker_service::{
    BatchDefaults, ConcurrencyCeiling, HttpInferenceEngine, InferenceEngine, OpenAiBackend,
    RawBackend, RequestRouter, TokenizerWrapper,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub mod fixtures;

pub const TEST_TOKEN: &str = "hf_integration_token";

/// Stub hub: accepts [`TEST_TOKEN`]
pub async fn start_hub() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/whoami-v2"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ci", "type": "user"})))
        .mount(&server)
        .await;
    server
}

/// Serve a repository at `revision` with the given files
///
/// Files are served the way the hub's resolve endpoint does it, with the
/// commit and etag headers the hub client relies on. Files in `forbidden`
/// must never be fetched.
pub async fn mount_repo(
    server: &MockServer,
    repository: &str,
    revision: &str,
    sha: &str,
    files: &[&str],
    forbidden: &[&str],
) {
    let siblings: Vec<Value> = files.iter().map(|f| json!({"rfilename": f})).collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/models/{}/revision/{}", repository, revision)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": repository,
            "sha": sha,
            "siblings": siblings,
        })))
        .mount(server)
        .await;

    for file in files {
        let body = fixtures::file_body(file);
        let mock = Mock::given(method("GET"))
            .and(path(format!("/{}/resolve/{}/{}", repository, revision, file)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", format!("\"{}-{}\"", sha, file).as_str())
                    .insert_header("x-repo-commit", sha)
                    .insert_header("content-range", format!("bytes 0-0/{}", body.len()).as_str())
                    .set_body_string(body),
            );
        let mock = if forbidden.contains(file) {
            mock.expect(0)
        } else {
            mock
        };
        mock.mount(server).await;
    }
}

/// Stub engine answering every completion with the given text deltas
pub async fn start_engine(deltas: &[&str], usage: (u64, u64)) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(fixtures::completion_sse(deltas, usage), "text/event-stream"),
        )
        .mount(&server)
        .await;
    server
}

/// Worker served over HTTP on a random port
pub struct TestApp {
    pub address: String,
    pub ceiling: ConcurrencyCeiling,
}

impl TestApp {
    /// Serve a worker backed by `engine_url` and `tokenizer`
    pub async fn new(engine_url: &str, tokenizer: TokenizerWrapper) -> Self {
        let engine: Arc<dyn InferenceEngine> = Arc::new(
            HttpInferenceEngine::new(engine_url, "org/model").expect("Failed to create engine"),
        );
        let ceiling = ConcurrencyCeiling::new(8);
        let raw = RawBackend::new(
            engine.clone(),
            Arc::new(tokenizer),
            BatchDefaults::default(),
            ceiling.clone(),
        );
        let openai = OpenAiBackend::new(engine, Some("served-model".to_string()), ceiling.clone());
        let app = build_api_server(RequestRouter::new(Arc::new(raw), Arc::new(openai)));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let address = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to start test server");
        });

        Self {
            address: format!("http://{}", address),
            ceiling,
        }
    }

    /// Get base URL
    pub fn url(&self) -> &str {
        &self.address
    }

    /// Create HTTP client
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to build client")
    }

    /// Submit a job to `/runsync` and return its batches
    pub async fn run_sync(&self, input: Value) -> Vec<Value> {
        let response = self
            .client()
            .post(format!("{}/runsync", self.url()))
            .json(&json!({"id": "job", "input": input}))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success(), "status {}", response.status());
        response.json().await.expect("Failed to parse JSON")
    }
}
