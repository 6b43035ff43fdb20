//! Run metadata written by the acquisition pipeline
//!
//! The metadata file is the only contract between the acquisition run and
//! the serving process. It is written once, after every download succeeded,
//! and only ever contains non-empty values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{Result, WorkerError};

/// Default location of the metadata file
pub const DEFAULT_METADATA_PATH: &str = "/local_model_args.json";

pub const MODEL_NAME_KEY: &str = "MODEL_NAME";
pub const MODEL_REVISION_KEY: &str = "MODEL_REVISION";
pub const QUANTIZATION_KEY: &str = "QUANTIZATION";
pub const TOKENIZER_NAME_KEY: &str = "TOKENIZER_NAME";
pub const TOKENIZER_REVISION_KEY: &str = "TOKENIZER_REVISION";

/// A metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(serde_json::Number),
}

impl MetadataValue {
    fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    /// Text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// Flat metadata record for one acquisition run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunMetadata {
    entries: BTreeMap<String, MetadataValue>,
}

impl RunMetadata {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key; absent or empty values are dropped
    pub fn set<V: Into<MetadataValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        let key = key.into();
        match value.map(Into::into).filter(|v| !v.is_empty()) {
            Some(value) => {
                self.entries.insert(key, value);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    /// Builder-style [`RunMetadata::set`]
    pub fn with<V: Into<MetadataValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.set(key, value);
        self
    }

    /// Merge another record into this one
    pub fn merge(&mut self, other: RunMetadata) {
        self.entries.extend(other.entries);
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    /// Look up a text value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetadataValue::as_str)
    }

    /// Local model path
    pub fn model_path(&self) -> Option<&str> {
        self.get_str(MODEL_NAME_KEY)
    }

    /// Local tokenizer path
    pub fn tokenizer_path(&self) -> Option<&str> {
        self.get_str(TOKENIZER_NAME_KEY)
    }

    /// Pinned tokenizer revision, if any
    pub fn tokenizer_revision(&self) -> Option<&str> {
        self.get_str(TOKENIZER_REVISION_KEY)
    }

    /// Quantization setting, if any
    pub fn quantization(&self) -> Option<&str> {
        self.get_str(QUANTIZATION_KEY)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the record as JSON, atomically
    ///
    /// The JSON is written to a sibling temp file and renamed into place, so
    /// readers either see the complete file or no file at all.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| {
                WorkerError::Configuration(format!("Invalid metadata path: {}", path.display()))
            })?
            .to_string_lossy();
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            WorkerError::from(e)
        })
    }

    /// Load a record written by [`RunMetadata::write_to`]
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path).map_err(|e| {
            WorkerError::Io(format!("Cannot read metadata file {}: {}", path.display(), e))
        })?;
        let metadata: RunMetadata = serde_json::from_slice(&contents).map_err(|e| {
            WorkerError::Serialization(format!(
                "Malformed metadata file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(metadata)
    }
}
