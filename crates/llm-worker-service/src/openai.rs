//! OpenAI-compatible back end
//!
//! Jobs carrying an `openai_route` are forwarded to the engine's
//! OpenAI-compatible API. The model listing is answered locally.

use futures::stream::{self, StreamExt};
use llm_worker_core::JobInput;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::backend::{deferred, BatchStream, ConcurrencyCeiling, GenerationBackend};
use crate::engine::{EngineReply, InferenceEngine};
use crate::error::{ServiceError, ServiceResult};

pub const MODELS_ROUTE: &str = "/v1/models";
pub const CHAT_COMPLETIONS_ROUTE: &str = "/v1/chat/completions";
pub const COMPLETIONS_ROUTE: &str = "/v1/completions";

/// Back end for OpenAI-compatible routes
#[derive(Clone)]
pub struct OpenAiBackend {
    engine: Arc<dyn InferenceEngine>,
    served_model_name: String,
    ceiling: ConcurrencyCeiling,
}

impl OpenAiBackend {
    /// Create the back end
    ///
    /// `served_model_name` overrides the engine's model name in listings and
    /// in requests that do not name a model.
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        served_model_name: Option<String>,
        ceiling: ConcurrencyCeiling,
    ) -> Self {
        let served_model_name = served_model_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| engine.model_name().to_string());
        Self {
            engine,
            served_model_name,
            ceiling,
        }
    }

    /// Name the model is listed under
    pub fn served_model_name(&self) -> &str {
        &self.served_model_name
    }

    fn model_list(&self) -> Value {
        json!({
            "object": "list",
            "data": [{
                "id": self.served_model_name,
                "object": "model",
                "owned_by": "vllm",
                "root": self.engine.model_name(),
            }]
        })
    }

    #[instrument(skip(self, input))]
    async fn start(self, route: String, input: JobInput) -> ServiceResult<BatchStream> {
        match route.as_str() {
            MODELS_ROUTE => Ok(single(self.model_list())),
            CHAT_COMPLETIONS_ROUTE | COMPLETIONS_ROUTE => {
                let mut body = match input.openai_input {
                    Some(Value::Object(body)) => body,
                    _ => {
                        return Err(ServiceError::InvalidInput(
                            "'openai_input' must be an object".to_string(),
                        ))
                    }
                };
                body.entry("model")
                    .or_insert_with(|| json!(self.served_model_name));

                match self.engine.forward(&route, Value::Object(body)).await? {
                    EngineReply::Json(response) => Ok(single(response)),
                    EngineReply::Stream(chunks) => Ok(chunks),
                }
            }
            other => {
                warn!("Rejecting unknown OpenAI route {}", other);
                Ok(single(json!({ "error": format!("Invalid route: {}", other) })))
            }
        }
    }
}

impl GenerationBackend for OpenAiBackend {
    fn generate(&self, input: JobInput) -> BatchStream {
        let route = input.openai_route.clone().unwrap_or_default();
        deferred(self.clone().start(route, input))
    }

    fn max_concurrency(&self) -> usize {
        self.ceiling.get()
    }
}

fn single(batch: Value) -> BatchStream {
    stream::once(async move { Ok(batch) }).boxed()
}
