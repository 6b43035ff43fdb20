//! Inbound job payload

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A job handed to the worker by the host runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier assigned by the host runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Job input
    pub input: JobInput,
}

/// Batch sizing overrides carried by a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSizing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size_growth_factor: Option<f64>,
}

/// Input section of a job
///
/// `prompt` and `messages` are kept as raw JSON: their shape is validated by
/// the chat template formatter, which owns that contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobInput {
    /// Free-form prompt (normally a string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Value>,

    /// Conversation as role/content pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Value>,

    /// OpenAI-compatible route; its presence selects the OpenAI back end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_route: Option<String>,

    /// Request body for the OpenAI-compatible route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_input: Option<Value>,

    /// Sampling parameters passed through to the engine
    #[serde(default)]
    pub sampling_params: Map<String, Value>,

    /// Stream partial batches instead of a single final batch
    #[serde(default)]
    pub stream: bool,

    /// Apply the chat template to a plain prompt
    #[serde(default)]
    pub apply_chat_template: bool,

    #[serde(flatten)]
    pub batch: BatchSizing,
}

impl JobInput {
    /// Routing flag: true when the job targets the OpenAI-compatible back end
    pub fn is_openai_route(&self) -> bool {
        self.openai_route
            .as_deref()
            .map(|route| !route.trim().is_empty())
            .unwrap_or(false)
    }

    /// The generation input, messages taking precedence over prompt
    pub fn llm_input(&self) -> Option<&Value> {
        self.messages.as_ref().or(self.prompt.as_ref())
    }
}

/// One conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// Create a message
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// A `user` turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Validated prompt input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    /// A single free-form string
    Text(String),
    /// An ordered list of role/content pairs
    Messages(Vec<ChatMessage>),
}

impl PromptInput {
    /// Validate a raw JSON input
    ///
    /// Accepts a string or an array of objects with string `role` and
    /// `content`. Anything else is rejected with a description.
    pub fn parse(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value::<ChatMessage>(item.clone()).map_err(|e| {
                        format!("Message {} must have string 'role' and 'content': {}", index, e)
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Messages),
            _ => Err("Input must be a string or a list of messages".to_string()),
        }
    }
}
