//! Inference engine interface
//!
//! The engine itself runs out of process. [`HttpInferenceEngine`] talks to an
//! OpenAI-compatible server (for example a vLLM sidecar) and decodes its
//! server-sent event streams.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ServiceError, ServiceResult};

/// Default engine sidecar address
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:8000";

/// A plain completion request built by the raw back end
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub sampling_params: Map<String, Value>,
}

/// One event of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Newly generated text
    Text(String),
    /// Token accounting reported by the engine
    Usage { input: u64, output: u64 },
}

/// Reply to a forwarded OpenAI-compatible request
pub enum EngineReply {
    /// Complete JSON response
    Json(Value),
    /// Streamed chunks, in order
    Stream(BoxStream<'static, ServiceResult<Value>>),
}

/// Stream of completion events
pub type EventStream = BoxStream<'static, ServiceResult<GenerationEvent>>;

/// Generation interface of the external inference engine
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Name the engine serves the model under
    fn model_name(&self) -> &str;

    /// Stream a completion for a formatted prompt
    async fn generate(&self, request: GenerationRequest) -> ServiceResult<EventStream>;

    /// Forward an OpenAI-compatible request body to `route`
    async fn forward(&self, route: &str, body: Value) -> ServiceResult<EngineReply>;
}

/// [`InferenceEngine`] over the OpenAI-compatible HTTP API
#[derive(Debug, Clone)]
pub struct HttpInferenceEngine {
    http: reqwest::Client,
    base_url: Url,
    model_name: String,
}

impl HttpInferenceEngine {
    /// Create an engine client for `base_url` serving `model_name`
    ///
    /// A path in `base_url` is kept as a prefix of every route.
    pub fn new(base_url: &str, model_name: impl Into<String>) -> ServiceResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::Engine(format!("Invalid engine URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Engine(format!("Invalid engine URL {}", base_url)));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("llm-worker/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url,
            model_name: model_name.into(),
        })
    }

    fn url(&self, route: &str) -> ServiceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Engine(format!("Invalid engine URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(route.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    async fn post(&self, route: &str, body: &Value) -> ServiceResult<reqwest::Response> {
        let response = self.http.post(self.url(route)?).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ServiceError::Engine(format!("HTTP {}: {}", status.as_u16(), message)))
    }
}

#[async_trait]
impl InferenceEngine for HttpInferenceEngine {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    #[instrument(skip(self, request), fields(prompt_len = request.prompt.len()))]
    async fn generate(&self, request: GenerationRequest) -> ServiceResult<EventStream> {
        let mut body = request.sampling_params;
        body.insert("model".to_string(), json!(self.model_name));
        body.insert("prompt".to_string(), json!(request.prompt));
        body.insert("stream".to_string(), json!(true));
        body.insert("stream_options".to_string(), json!({"include_usage": true}));

        let response = self.post("v1/completions", &Value::Object(body)).await?;
        let events = sse_json(response.bytes_stream())
            .flat_map(|chunk| stream::iter(completion_events(chunk)))
            .boxed();
        Ok(events)
    }

    #[instrument(skip(self, body))]
    async fn forward(&self, route: &str, body: Value) -> ServiceResult<EngineReply> {
        let streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let response = self.post(route, &body).await?;
        if streaming {
            Ok(EngineReply::Stream(sse_json(response.bytes_stream())))
        } else {
            Ok(EngineReply::Json(response.json().await?))
        }
    }
}

/// Turn one completion chunk into generation events
fn completion_events(chunk: ServiceResult<Value>) -> Vec<ServiceResult<GenerationEvent>> {
    let chunk = match chunk {
        Ok(chunk) => chunk,
        Err(e) => return vec![Err(e)],
    };
    let mut events = Vec::new();

    if let Some(choices) = chunk.get("choices").and_then(Value::as_array) {
        events.extend(
            choices
                .iter()
                .filter_map(|choice| choice.get("text").and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .map(|text| Ok(GenerationEvent::Text(text.to_string()))),
        );
    }
    if let Some(usage) = chunk.get("usage").filter(|u| u.is_object()) {
        let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
        events.push(Ok(GenerationEvent::Usage {
            input: count("prompt_tokens"),
            output: count("completion_tokens"),
        }));
    }
    events
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<ServiceResult<Value>>,
    done: bool,
}

impl<S> SseState<S> {
    /// Move every complete `data:` line from the buffer to `pending`
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                self.buffer.clear();
                return;
            }
            if !data.is_empty() {
                self.pending
                    .push_back(serde_json::from_str(data).map_err(|e| {
                        ServiceError::Engine(format!("Malformed stream chunk: {}", e))
                    }));
            }
        }
    }
}

/// Decode a server-sent event body whose `data:` payloads are JSON
pub fn sse_json<S, B, E>(bytes: S) -> BoxStream<'static, ServiceResult<Value>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(ServiceError::Engine(e.to_string())), state));
                }
                None => {
                    debug!("Engine stream ended without [DONE]");
                    state.buffer.push(b'\n');
                    state.drain_lines();
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
