//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::WorkerError;
use crate::pattern::PatternGroup;

/// Revision fetched when none is pinned
pub const DEFAULT_REVISION: &str = "main";

/// Kind of artifact retrieved from the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Model weights together with their config and tokenizer files
    Model,
    /// Tokenizer and config files only
    Tokenizer,
}

impl ArtifactKind {
    /// Ordered pattern groups to try for this kind
    pub fn pattern_groups(&self) -> Vec<PatternGroup> {
        match self {
            Self::Model => PatternGroup::model_groups(),
            Self::Tokenizer => vec![PatternGroup::tokenizer_group()],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Tokenizer => write!(f, "tokenizer"),
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "model" => Ok(Self::Model),
            "tokenizer" => Ok(Self::Tokenizer),
            _ => Err(WorkerError::InvalidKind(s.to_string())),
        }
    }
}

/// A request to materialize one artifact in the local cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    /// Hub repository identifier, e.g. `org/name`
    pub repository: String,
    /// Pinned revision; `None` means [`DEFAULT_REVISION`]
    pub revision: Option<String>,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Cache directory the files are written under
    pub cache_dir: PathBuf,
}

impl ArtifactRequest {
    /// Create a new request
    pub fn new(
        repository: impl Into<String>,
        revision: Option<String>,
        kind: ArtifactKind,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository: repository.into(),
            revision: revision.filter(|r| !r.is_empty()),
            kind,
            cache_dir: cache_dir.into(),
        }
    }

    /// Revision to fetch, falling back to the default branch
    pub fn revision_or_default(&self) -> &str {
        self.revision.as_deref().unwrap_or(DEFAULT_REVISION)
    }
}

/// Local result of a successful artifact download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Directory holding the retrieved files
    pub path: PathBuf,
    /// Pattern group that satisfied the request
    pub matched_group: PatternGroup,
}
