//! Credential validation
//!
//! Confirms that a hub token is configured and accepted by the hub. This is
//! the gate in front of every download and every engine construction.

use llm_worker_core::{Credential, Result, WorkerError};
use std::sync::Arc;
use tracing::{error, info};

use crate::client::{AccountInfo, HubClient, RepoInfo};

/// Checks the configured credential against the hub
pub struct CredentialValidator {
    client: Arc<dyn HubClient>,
    credential: Option<Credential>,
}

impl CredentialValidator {
    /// Create a validator for an optional credential
    pub fn new(client: Arc<dyn HubClient>, credential: Option<Credential>) -> Self {
        Self { client, credential }
    }

    /// Report whether the credential is present and accepted
    ///
    /// Never fails: every problem is logged and reported as `false`.
    pub async fn validate(&self) -> bool {
        match self.check().await {
            Ok(account) => {
                info!("Token is valid for user: {}", account.name);
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Typed variant of [`CredentialValidator::validate`]
    pub async fn check(&self) -> Result<AccountInfo> {
        let credential = self.present()?;
        self.client
            .whoami(credential)
            .await
            .map_err(|e| WorkerError::CredentialRejected(e.to_string()))
    }

    /// Confirm the credential can read a specific repository
    pub async fn check_access(&self, repository: &str, revision: &str) -> Result<RepoInfo> {
        let credential = self.present()?;
        self.client
            .repo_info(repository, revision, credential)
            .await
            .map_err(|e| {
                WorkerError::CredentialRejected(format!("Could not access {}: {}", repository, e))
            })
    }

    fn present(&self) -> Result<&Credential> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(WorkerError::MissingCredential)?;
        info!("HF Token present (first 5 chars): {}...", credential.prefix());
        Ok(credential)
    }
}
