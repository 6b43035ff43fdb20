//! Pattern-based artifact download
//!
//! The downloader tries the pattern groups of an artifact kind in order and
//! stops at the first group whose selective fetch leaves a satisfying set of
//! files on disk. For models the order is the weight-format preference:
//! safetensors, then legacy `.bin`, then `.pt`.

use llm_worker_core::{
    ArtifactKind, ArtifactRequest, Credential, DownloadResult, GroupOutcome, PatternGroup,
    Result, WorkerError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::client::{HubClient, SnapshotRequest};

/// Downloads model and tokenizer artifacts into a local cache
pub struct ArtifactDownloader {
    client: Arc<dyn HubClient>,
    credential: Option<Credential>,
}

impl ArtifactDownloader {
    /// Create a downloader
    pub fn new(client: Arc<dyn HubClient>, credential: Option<Credential>) -> Self {
        Self { client, credential }
    }

    /// Download by kind name (`model` or `tokenizer`) and return the local path
    pub async fn fetch(
        &self,
        repository: &str,
        revision: Option<&str>,
        kind: &str,
        cache_dir: &Path,
    ) -> Result<PathBuf> {
        // Credential check comes before kind validation, matching the run order.
        self.credential()?;
        let kind: ArtifactKind = kind.parse()?;
        let request = ArtifactRequest::new(
            repository,
            revision.map(str::to_string),
            kind,
            cache_dir,
        );
        Ok(self.download(&request).await?.path)
    }

    /// Download one artifact
    ///
    /// # Errors
    ///
    /// - [`WorkerError::MissingCredential`] when no token is configured
    /// - [`WorkerError::NoMatch`] when every group is exhausted
    /// - [`WorkerError::Transfer`] on any transport failure other than not-found
    #[instrument(skip(self, request), fields(repository = %request.repository, kind = %request.kind))]
    pub async fn download(&self, request: &ArtifactRequest) -> Result<DownloadResult> {
        let credential = self.credential()?;
        info!(
            "Downloading {} from {} with revision {}",
            request.kind,
            request.repository,
            request.revision_or_default()
        );

        let groups = request.kind.pattern_groups();
        for group in &groups {
            match self.try_group(request, group, credential).await? {
                GroupOutcome::Matched(path) => {
                    info!("Successfully downloaded {} files matching {}", request.kind, group);
                    return Ok(DownloadResult {
                        path,
                        matched_group: group.clone(),
                    });
                }
                GroupOutcome::NoMatch => {
                    debug!("No files matching {} in {}", group, request.repository);
                }
            }
        }

        Err(WorkerError::NoMatch {
            repository: request.repository.clone(),
            attempted: groups.iter().map(ToString::to_string).collect(),
        })
    }

    async fn try_group(
        &self,
        request: &ArtifactRequest,
        group: &PatternGroup,
        credential: &Credential,
    ) -> Result<GroupOutcome> {
        let snapshot = SnapshotRequest {
            repository: request.repository.clone(),
            revision: request.revision_or_default().to_string(),
            allow: group.clone(),
            cache_dir: request.cache_dir.clone(),
        };

        match self.client.snapshot(&snapshot, credential).await {
            Ok(path) => group.evaluate(&path),
            Err(e) if e.is_not_found() => {
                warn!("Fetch for {} returned not found: {}", group, e);
                Ok(GroupOutcome::NoMatch)
            }
            Err(e) => Err(e.into_transfer(request.kind, &request.repository)),
        }
    }

    fn credential(&self) -> Result<&Credential> {
        self.credential
            .as_ref()
            .ok_or(WorkerError::MissingCredential)
    }
}
