//! Model hub client
//!
//! [`HubClient`] is the seam between the acquisition pipeline and the remote
//! hub. [`HttpHubClient`] resolves identities with `GET /api/whoami-v2` and
//! leaves repository listing and file transfer to `hf_hub`, so snapshots land
//! in the hub's own cache layout and an existing `HF_HOME` cache is reused:
//! `{cache}/models--{org}--{name}/snapshots/{sha}/{file}`.

use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiError, ApiRepo};
use hf_hub::{Repo, RepoType};
use llm_worker_core::{Credential, PatternGroup};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{HubError, HubResult};

/// Public hub endpoint
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Identity of a token holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account name
    pub name: String,
    /// Account type (`user`, `org`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
}

/// A file listed in a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sibling {
    /// Repository-relative file name
    pub rfilename: String,
}

/// Repository information at one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Repository id
    #[serde(default, rename = "id")]
    pub repo_id: Option<String>,
    /// Commit sha the revision resolves to
    pub sha: String,
    /// Files in the repository
    #[serde(default)]
    pub siblings: Vec<Sibling>,
}

/// A selective snapshot fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Repository id
    pub repository: String,
    /// Revision (branch, tag or commit)
    pub revision: String,
    /// Only files allowed by this group are fetched
    pub allow: PatternGroup,
    /// Cache root
    pub cache_dir: PathBuf,
}

/// Operations the acquisition pipeline needs from the hub
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Resolve the account behind a credential
    async fn whoami(&self, credential: &Credential) -> HubResult<AccountInfo>;

    /// Fetch repository information at a revision
    async fn repo_info(
        &self,
        repository: &str,
        revision: &str,
        credential: &Credential,
    ) -> HubResult<RepoInfo>;

    /// Fetch the allowed files of a snapshot and return its local directory
    async fn snapshot(
        &self,
        request: &SnapshotRequest,
        credential: &Credential,
    ) -> HubResult<PathBuf>;
}

/// Hub client over HTTP
#[derive(Debug, Clone)]
pub struct HttpHubClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpHubClient {
    /// Create a client for the given hub endpoint
    pub fn new(endpoint: &str) -> HubResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("llm-worker/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(endpoint, http)
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(endpoint: &str, http: reqwest::Client) -> HubResult<Self> {
        let endpoint = Url::parse(endpoint)?;
        if endpoint.cannot_be_a_base() {
            return Err(HubError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self { http, endpoint })
    }

    /// Hub endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url_for<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> HubResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| HubError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `hf_hub` API bound to this endpoint and credential
    fn api(&self, credential: &Credential, cache_dir: Option<&Path>) -> HubResult<Api> {
        let mut builder = ApiBuilder::new()
            .with_endpoint(self.endpoint.as_str().trim_end_matches('/').to_string())
            .with_token(Some(credential.expose().to_string()))
            .with_progress(false);
        if let Some(cache_dir) = cache_dir {
            builder = builder.with_cache_dir(cache_dir.to_path_buf());
        }
        Ok(builder.build()?)
    }
}

fn model_repo(api: &Api, repository: &str, revision: &str) -> ApiRepo {
    api.repo(Repo::with_revision(
        repository.to_string(),
        RepoType::Model,
        revision.to_string(),
    ))
}

async fn fetch_info(repo: &ApiRepo) -> HubResult<hf_hub::api::RepoInfo> {
    let response = repo.info_request().send().await.map_err(ApiError::from)?;
    let response = response.error_for_status().map_err(ApiError::from)?;
    Ok(response.json().await.map_err(ApiError::from)?)
}

#[async_trait]
impl HubClient for HttpHubClient {
    #[instrument(skip(self, credential))]
    async fn whoami(&self, credential: &Credential) -> HubResult<AccountInfo> {
        let url = self.url_for(["api", "whoami-v2"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.expose())
            .send()
            .await?;
        let response = check_status(response, "whoami").await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, credential))]
    async fn repo_info(
        &self,
        repository: &str,
        revision: &str,
        credential: &Credential,
    ) -> HubResult<RepoInfo> {
        let api = self.api(credential, None)?;
        let info = fetch_info(&model_repo(&api, repository, revision)).await?;
        Ok(RepoInfo {
            repo_id: Some(repository.to_string()),
            sha: info.sha,
            siblings: info
                .siblings
                .into_iter()
                .map(|s| Sibling {
                    rfilename: s.rfilename,
                })
                .collect(),
        })
    }

    #[instrument(skip(self, request, credential), fields(repository = %request.repository, revision = %request.revision))]
    async fn snapshot(
        &self,
        request: &SnapshotRequest,
        credential: &Credential,
    ) -> HubResult<PathBuf> {
        let api = self.api(credential, Some(&request.cache_dir))?;
        let repo = model_repo(&api, &request.repository, &request.revision);
        let info = fetch_info(&repo).await?;

        let mut files = Vec::new();
        for sibling in &info.siblings {
            let name = sibling.rfilename.as_str();
            if !is_repository_relative(name) {
                warn!(file = name, "Skipping file name that leaves the snapshot directory");
            } else if request.allow.allows(name) {
                files.push(name);
            }
        }
        debug!("{} of {} files selected by {}", files.len(), info.siblings.len(), request.allow);

        let mut snapshot_dir = request
            .cache_dir
            .join(repo_folder_name(&request.repository))
            .join("snapshots")
            .join(&info.sha);
        for file in files {
            let path = repo.get(file).await?;
            info!(file, "fetched");
            if let Some(dir) = path.ancestors().nth(Path::new(file).components().count()) {
                snapshot_dir = dir.to_path_buf();
            }
        }

        Ok(snapshot_dir)
    }
}

/// Cache folder name for a model repository
pub fn repo_folder_name(repository: &str) -> String {
    Repo::model(repository.to_string()).folder_name()
}

/// True when `name` stays inside the directory it is joined to
fn is_repository_relative(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

async fn check_status(response: Response, what: &str) -> HubResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        what.to_string()
    } else {
        format!("{}: {}", what, body.trim())
    };

    Err(match status {
        StatusCode::NOT_FOUND => HubError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HubError::Unauthorized(message),
        _ => HubError::Status {
            status: status.as_u16(),
            message,
        },
    })
}
