//! Artifact acquisition pipeline
//!
//! Sequences one acquisition run: credential gate, test-mode setup, model
//! download, tokenizer download and, last of all, the metadata file. Every
//! step is awaited in turn and any failure aborts the run before the
//! metadata file exists.

use llm_worker_core::metadata::{
    MODEL_NAME_KEY, MODEL_REVISION_KEY, QUANTIZATION_KEY, TOKENIZER_NAME_KEY,
    TOKENIZER_REVISION_KEY,
};
use llm_worker_core::{
    ArtifactKind, ArtifactRequest, Credential, Result, RunMetadata, WorkerError,
    DEFAULT_METADATA_PATH,
};
use llm_worker_hub::{ArtifactDownloader, CredentialValidator, HubClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// Cache directory used in test mode
pub const TEST_CACHE_DIR: &str = "tmp/hf_cache";

/// Model fetched in test mode
pub const TEST_MODEL_NAME: &str = "openchat/openchat-3.5-0106";

/// Inputs of one acquisition run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSettings {
    pub model_name: Option<String>,
    pub model_revision: Option<String>,
    pub tokenizer_name: Option<String>,
    pub tokenizer_revision: Option<String>,
    pub quantization: Option<String>,
    /// Hub cache directory (`HF_HOME`)
    pub cache_dir: PathBuf,
    /// Where the metadata file is written
    pub metadata_path: PathBuf,
    /// `TESTING_DOWNLOAD=1`
    pub testing: bool,
}

impl AcquisitionSettings {
    /// Create settings for a cache directory
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_name: None,
            model_revision: None,
            tokenizer_name: None,
            tokenizer_revision: None,
            quantization: None,
            cache_dir: cache_dir.into(),
            metadata_path: PathBuf::from(DEFAULT_METADATA_PATH),
            testing: false,
        }
    }

    /// Set the model repository and revision
    pub fn with_model(mut self, name: impl Into<String>, revision: Option<String>) -> Self {
        self.model_name = Some(name.into());
        self.model_revision = revision;
        self
    }

    /// Set a tokenizer repository and revision distinct from the model's
    pub fn with_tokenizer(mut self, name: Option<String>, revision: Option<String>) -> Self {
        self.tokenizer_name = name;
        self.tokenizer_revision = revision;
        self
    }

    /// Set the quantization recorded in the metadata
    pub fn with_quantization(mut self, quantization: Option<String>) -> Self {
        self.quantization = quantization;
        self
    }

    /// Set the metadata file path
    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = path.into();
        self
    }

    /// Enable test mode
    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    /// Apply the test-mode overrides when test mode is on
    ///
    /// Test mode pins the cache directory and the model, overriding any
    /// configured model name. Outside test mode this is the identity.
    pub fn apply_test_mode(mut self) -> Self {
        if self.testing {
            self.cache_dir = PathBuf::from(TEST_CACHE_DIR);
            self.model_name = Some(TEST_MODEL_NAME.to_string());
        }
        self
    }

    /// Resolve the model and tokenizer download targets
    ///
    /// The tokenizer name and revision default to the model's.
    pub fn targets(&self) -> Result<(ArtifactRequest, ArtifactRequest)> {
        let model_name = non_empty(&self.model_name).ok_or_else(|| {
            WorkerError::Configuration("MODEL_NAME is not set".to_string())
        })?;
        let model_revision = non_empty(&self.model_revision);
        let tokenizer_name = non_empty(&self.tokenizer_name).unwrap_or(model_name);
        let tokenizer_revision = non_empty(&self.tokenizer_revision).or(model_revision);

        let model = ArtifactRequest::new(
            model_name,
            model_revision.map(str::to_string),
            ArtifactKind::Model,
            &self.cache_dir,
        );
        let tokenizer = ArtifactRequest::new(
            tokenizer_name,
            tokenizer_revision.map(str::to_string),
            ArtifactKind::Tokenizer,
            &self.cache_dir,
        );
        Ok((model, tokenizer))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// One acquisition run over a hub client
pub struct AcquisitionPipeline {
    validator: CredentialValidator,
    downloader: ArtifactDownloader,
    settings: AcquisitionSettings,
}

impl AcquisitionPipeline {
    /// Create a pipeline
    pub fn new(
        client: Arc<dyn HubClient>,
        credential: Option<Credential>,
        settings: AcquisitionSettings,
    ) -> Self {
        Self {
            validator: CredentialValidator::new(client.clone(), credential.clone()),
            downloader: ArtifactDownloader::new(client, credential),
            settings,
        }
    }

    /// Run the pipeline and return the metadata it wrote
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunMetadata> {
        let account = self.validator.check().await?;
        info!("Token is valid for user: {}", account.name);

        let settings = self.settings.clone().apply_test_mode();
        if settings.testing {
            info!(
                "Test mode: caching under {} and fetching {}",
                settings.cache_dir.display(),
                TEST_MODEL_NAME
            );
            std::fs::create_dir_all(&settings.cache_dir)?;
        }

        let (model_request, tokenizer_request) = settings.targets()?;

        let model = self.downloader.download(&model_request).await?;
        let mut metadata = RunMetadata::new()
            .with(MODEL_NAME_KEY, Some(model.path.display().to_string()))
            .with(MODEL_REVISION_KEY, settings.model_revision.clone())
            .with(QUANTIZATION_KEY, settings.quantization.clone());

        let tokenizer = self.downloader.download(&tokenizer_request).await?;
        metadata.merge(
            RunMetadata::new()
                .with(TOKENIZER_NAME_KEY, Some(tokenizer.path.display().to_string()))
                .with(TOKENIZER_REVISION_KEY, tokenizer_request.revision.clone()),
        );

        metadata.write_to(&settings.metadata_path)?;
        info!(
            "Wrote {} metadata entries to {}",
            metadata.len(),
            settings.metadata_path.display()
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_worker_hub::{
        repo_folder_name, AccountInfo, HubError, HubResult, RepoInfo, SnapshotRequest,
    };
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    /// Hub stand-in serving fixed file lists per repository
    #[derive(Default)]
    struct StaticHub {
        repos: HashMap<String, Vec<&'static str>>,
        reject: bool,
        snapshots: Mutex<Vec<String>>,
    }

    impl StaticHub {
        fn with_repo(mut self, repository: &str, files: Vec<&'static str>) -> Self {
            self.repos.insert(repository.to_string(), files);
            self
        }

        fn snapshot_calls(&self) -> Vec<String> {
            self.snapshots.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HubClient for StaticHub {
        async fn whoami(&self, _credential: &Credential) -> HubResult<AccountInfo> {
            if self.reject {
                return Err(HubError::Unauthorized("Invalid credentials".to_string()));
            }
            Ok(AccountInfo {
                name: "tester".to_string(),
                account_type: None,
            })
        }

        async fn repo_info(
            &self,
            repository: &str,
            _revision: &str,
            _credential: &Credential,
        ) -> HubResult<RepoInfo> {
            Err(HubError::NotFound(repository.to_string()))
        }

        async fn snapshot(
            &self,
            request: &SnapshotRequest,
            _credential: &Credential,
        ) -> HubResult<PathBuf> {
            self.snapshots
                .lock()
                .unwrap()
                .push(format!("{}@{}", request.repository, request.revision));
            let files = self
                .repos
                .get(&request.repository)
                .ok_or_else(|| HubError::NotFound(request.repository.clone()))?;

            let dir = request
                .cache_dir
                .join(repo_folder_name(&request.repository))
                .join("snapshots")
                .join(&request.revision);
            std::fs::create_dir_all(&dir)?;
            for file in files.iter().filter(|f| request.allow.allows(f)) {
                std::fs::write(dir.join(file), b"data")?;
            }
            Ok(dir)
        }
    }

    fn settings(root: &Path) -> AcquisitionSettings {
        AcquisitionSettings::new(root.join("cache"))
            .with_model("org/model", None)
            .with_metadata_path(root.join("local_model_args.json"))
    }

    fn credential() -> Option<Credential> {
        Some(Credential::new("hf_test"))
    }

    #[tokio::test]
    async fn test_run_writes_metadata() {
        let root = tempfile::tempdir().unwrap();
        let hub = StaticHub::default().with_repo(
            "org/model",
            vec!["model.safetensors", "config.json", "tokenizer.json", "README.md"],
        );
        let settings = settings(root.path()).with_quantization(Some("awq".to_string()));

        let metadata = AcquisitionPipeline::new(Arc::new(hub), credential(), settings)
            .run()
            .await
            .unwrap();

        assert!(metadata.model_path().unwrap().ends_with("snapshots/main"));
        assert_eq!(metadata.quantization(), Some("awq"));
        assert!(metadata.get(MODEL_REVISION_KEY).is_none());
        assert!(metadata.get(TOKENIZER_REVISION_KEY).is_none());

        let written = RunMetadata::load(&root.path().join("local_model_args.json")).unwrap();
        assert_eq!(written, metadata);
    }

    #[tokio::test]
    async fn test_tokenizer_defaults_to_model_revision() {
        let root = tempfile::tempdir().unwrap();
        let hub = Arc::new(
            StaticHub::default().with_repo("org/model", vec!["model.bin", "tokenizer.json"]),
        );
        let settings = settings(root.path()).with_model("org/model", Some("v1".to_string()));

        let metadata = AcquisitionPipeline::new(hub.clone(), credential(), settings)
            .run()
            .await
            .unwrap();

        assert_eq!(metadata.get_str(MODEL_REVISION_KEY), Some("v1"));
        assert_eq!(metadata.tokenizer_revision(), Some("v1"));
        assert_eq!(
            hub.snapshot_calls(),
            vec!["org/model@v1", "org/model@v1", "org/model@v1"]
        );
    }

    #[tokio::test]
    async fn test_missing_credential_aborts_before_download() {
        let root = tempfile::tempdir().unwrap();
        let hub = Arc::new(StaticHub::default().with_repo("org/model", vec!["model.bin"]));

        let err = AcquisitionPipeline::new(hub.clone(), None, settings(root.path()))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::MissingCredential));
        assert!(hub.snapshot_calls().is_empty());
        assert!(!root.path().join("local_model_args.json").exists());
    }

    #[tokio::test]
    async fn test_rejected_credential() {
        let root = tempfile::tempdir().unwrap();
        let hub = StaticHub {
            reject: true,
            ..Default::default()
        };

        let err = AcquisitionPipeline::new(Arc::new(hub), credential(), settings(root.path()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::CredentialRejected(_)));
    }

    #[tokio::test]
    async fn test_no_match_leaves_no_metadata() {
        let root = tempfile::tempdir().unwrap();
        let hub = StaticHub::default().with_repo("org/model", vec!["README.md"]);

        let err = AcquisitionPipeline::new(Arc::new(hub), credential(), settings(root.path()))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::NoMatch { .. }));
        assert!(!root.path().join("local_model_args.json").exists());
    }

    #[tokio::test]
    async fn test_tokenizer_failure_leaves_no_metadata() {
        let root = tempfile::tempdir().unwrap();
        let hub = StaticHub::default()
            .with_repo("org/model", vec!["model.safetensors", "tokenizer.json"])
            .with_repo("org/tokenizer", vec!["README.md"]);
        let settings =
            settings(root.path()).with_tokenizer(Some("org/tokenizer".to_string()), None);

        let err = AcquisitionPipeline::new(Arc::new(hub), credential(), settings)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::NoMatch { ref repository, .. } if repository == "org/tokenizer"));
        assert!(!root.path().join("local_model_args.json").exists());
    }

    #[tokio::test]
    async fn test_missing_model_name() {
        let root = tempfile::tempdir().unwrap();
        let settings = AcquisitionSettings::new(root.path())
            .with_metadata_path(root.path().join("local_model_args.json"));

        let err = AcquisitionPipeline::new(Arc::new(StaticHub::default()), credential(), settings)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Configuration(_)));
    }

    #[test]
    fn test_test_mode_overrides() {
        let settings = AcquisitionSettings::new("/data/hf")
            .with_model("org/configured", None)
            .with_testing(true)
            .apply_test_mode();

        assert_eq!(settings.cache_dir, PathBuf::from(TEST_CACHE_DIR));
        assert_eq!(settings.model_name.as_deref(), Some(TEST_MODEL_NAME));
    }

    #[test]
    fn test_test_mode_off_is_identity() {
        let settings = AcquisitionSettings::new("/data/hf").with_model("org/configured", None);
        assert_eq!(settings.clone().apply_test_mode(), settings);
    }

    #[test]
    fn test_targets_with_distinct_tokenizer() {
        let settings = AcquisitionSettings::new("/data/hf")
            .with_model("org/model", Some("v1".to_string()))
            .with_tokenizer(Some("org/tok".to_string()), Some("".to_string()));

        let (model, tokenizer) = settings.targets().unwrap();
        assert_eq!(model.kind, ArtifactKind::Model);
        assert_eq!(tokenizer.repository, "org/tok");
        assert_eq!(tokenizer.revision.as_deref(), Some("v1"));
    }
}
