//! Hub transport error types and conversions
//!
//! This module provides error types for talking to the model hub over HTTP
//! and maps them onto the acquisition error taxonomy.

use hf_hub::api::tokio::ApiError;
use llm_worker_core::{ArtifactKind, WorkerError};
use thiserror::Error;

/// Result type alias for hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Hub transport errors
#[derive(Debug, Error)]
pub enum HubError {
    /// Repository, revision or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credential missing, invalid, or without access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, timeout or body transfer failure
    #[error("Request failed: {0}")]
    Request(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Hub endpoint could not be parsed or joined
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Local filesystem error while writing the cache
    #[error("IO error: {0}")]
    Io(String),
}

impl HubError {
    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::NotFound(_))
    }

    /// Check if the hub rejected the credential
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, HubError::Unauthorized(_))
    }

    /// Wrap as a transfer failure for one artifact
    pub fn into_transfer(self, kind: ArtifactKind, repository: &str) -> WorkerError {
        WorkerError::Transfer {
            kind: kind.to_string(),
            repository: repository.to_string(),
            message: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HubError::InvalidResponse(err.to_string())
        } else {
            HubError::Request(err.to_string())
        }
    }
}

impl HubError {
    /// Classify a response status the way the hub uses it
    fn from_status(status: Option<u16>, message: String) -> Self {
        match status {
            Some(404) => HubError::NotFound(message),
            Some(401) | Some(403) => HubError::Unauthorized(message),
            Some(status) => HubError::Status { status, message },
            None => HubError::Request(message),
        }
    }
}

impl From<ApiError> for HubError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::RequestError(e) => {
                HubError::from_status(e.status().map(|s| s.as_u16()), e.to_string())
            }
            ApiError::IoError(e) => HubError::Io(e.to_string()),
            other => HubError::Request(other.to_string()),
        }
    }
}

impl From<url::ParseError> for HubError {
    fn from(err: url::ParseError) -> Self {
        HubError::InvalidEndpoint(err.to_string())
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::InvalidResponse(err.to_string())
    }
}
