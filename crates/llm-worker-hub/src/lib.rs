//! Model hub access for the LLM worker
//!
//! This crate talks to a Hugging Face compatible hub. It provides:
//!
//! - **HubClient**: the consumed hub interface (identity, repository info,
//!   selective snapshot) and its implementation over `reqwest` and `hf_hub`
//! - **CredentialValidator**: the gate that confirms a token is present and accepted
//! - **ArtifactDownloader**: pattern-group driven download of model and tokenizer files
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_worker_core::{ArtifactKind, ArtifactRequest, Credential};
//! use llm_worker_hub::{ArtifactDownloader, CredentialValidator, HttpHubClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(HttpHubClient::new("https://huggingface.co")?);
//! let credential = Some(Credential::new("hf_xxx"));
//!
//! let validator = CredentialValidator::new(client.clone(), credential.clone());
//! if validator.validate().await {
//!     let downloader = ArtifactDownloader::new(client, credential);
//!     let request = ArtifactRequest::new("org/model", None, ArtifactKind::Model, "/cache");
//!     let result = downloader.download(&request).await?;
//!     println!("model at {}", result.path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod downloader;
pub mod error;
pub mod validator;

pub use client::{
    repo_folder_name, AccountInfo, HttpHubClient, HubClient, RepoInfo, Sibling, SnapshotRequest,
    DEFAULT_ENDPOINT,
};
pub use downloader::ArtifactDownloader;
pub use error::{HubError, HubResult};
pub use validator::CredentialValidator;
