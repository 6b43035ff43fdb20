//! Error types for the artifact acquisition pipeline

use thiserror::Error;

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Main error type for acquisition operations
///
/// Every variant is fatal to an acquisition run; none of them is recovered
/// locally.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// No hub credential found in the configuration
    #[error("No Hugging Face token found in environment variables")]
    MissingCredential,

    /// The hub refused the credential, or the identity check could not complete
    #[error("Token validation failed: {0}")]
    CredentialRejected(String),

    /// Artifact kind other than model or tokenizer
    #[error("Invalid artifact kind: {0}")]
    InvalidKind(String),

    /// Every pattern group was tried and none produced matching files
    #[error("No patterns matching {attempted:?} found for download of {repository}")]
    NoMatch {
        repository: String,
        attempted: Vec<String>,
    },

    /// Network or transport failure talking to the hub
    #[error("Error downloading {kind} from {repository}: {message}")]
    Transfer {
        kind: String,
        repository: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(err.to_string())
    }
}
