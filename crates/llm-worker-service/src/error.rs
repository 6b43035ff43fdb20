//! Service-layer error types
//!
//! Serving errors are request-scoped: they end one job with an error batch
//! and never take the process down.

use serde_json::{json, Value};
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Service-layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A message list was supplied but no chat template is available
    #[error("Chat template does not exist for this model, you must provide a single string input instead of a list of messages")]
    NoChatTemplate,

    /// Job input has the wrong shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Chat template failed to compile or render
    #[error("Template error: {0}")]
    Template(String),

    /// Inference engine call failed
    #[error("Engine error: {0}")]
    Engine(String),

    /// Tokenizer configuration could not be loaded
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Internal service error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Final batch reported to the caller when a job fails
    pub fn to_batch(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

impl From<minijinja::Error> for ServiceError {
    fn from(err: minijinja::Error) -> Self {
        ServiceError::Template(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Engine(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("Serialization error: {}", err))
    }
}
