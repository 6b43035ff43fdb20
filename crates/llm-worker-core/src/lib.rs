//! Core domain models and types for the LLM worker
//!
//! This crate contains the data structures shared by the artifact
//! acquisition pipeline and the serving path: artifact requests and kinds,
//! file-selector groups, the run metadata contract, hub credentials and
//! the inbound job payload.

pub mod credential;
pub mod error;
pub mod job;
pub mod metadata;
pub mod pattern;
pub mod types;

// Re-exports for convenience
pub use credential::Credential;
pub use error::{Result, WorkerError};
pub use job::{BatchSizing, ChatMessage, Job, JobInput, PromptInput};
pub use metadata::{MetadataValue, RunMetadata, DEFAULT_METADATA_PATH};
pub use pattern::{FilePattern, GroupOutcome, PatternGroup};
pub use types::{ArtifactKind, ArtifactRequest, DownloadResult, DEFAULT_REVISION};
