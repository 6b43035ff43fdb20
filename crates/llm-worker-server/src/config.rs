//! Worker configuration
//!
//! Configuration is loaded once at process start from:
//! - `config/default.toml` (optional)
//! - Environment variables, under their plain names (`MODEL_NAME`,
//!   `HF_HOME`, `SERVER_PORT`, ...)
//!
//! Both sources use the same flat key names (lower-case in the file). The
//! flat settings are then grouped into the sections of [`WorkerConfig`].

use config::{Config, ConfigError, Environment, File};
use llm_worker_core::{Credential, DEFAULT_METADATA_PATH};
use llm_worker_hub::DEFAULT_ENDPOINT;
use llm_worker_service::{
    AcquisitionSettings, BatchDefaults, DEFAULT_ENGINE_URL, DEFAULT_MAX_CONCURRENCY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Flat view of every recognized key
#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    hf_token: Option<String>,
    #[serde(default)]
    hugging_face_hub_token: Option<String>,
    #[serde(default)]
    hf_home: Option<String>,
    #[serde(default)]
    hf_endpoint: Option<String>,

    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    model_revision: Option<String>,
    #[serde(default)]
    tokenizer_name: Option<String>,
    #[serde(default)]
    tokenizer_revision: Option<String>,
    #[serde(default)]
    quantization: Option<String>,
    #[serde(default)]
    custom_chat_template: Option<String>,
    #[serde(default)]
    trust_remote_code: Option<bool>,
    #[serde(default)]
    testing_download: Option<bool>,
    #[serde(default)]
    metadata_path: Option<String>,

    #[serde(default)]
    engine_url: Option<String>,
    #[serde(default)]
    max_concurrency: Option<usize>,
    #[serde(default)]
    default_batch_size: Option<usize>,
    #[serde(default)]
    default_min_batch_size: Option<usize>,
    #[serde(default)]
    default_batch_size_growth_factor: Option<f64>,
    #[serde(default)]
    openai_served_model_name_override: Option<String>,

    #[serde(default)]
    server_host: Option<String>,
    #[serde(default)]
    server_port: Option<u16>,

    #[serde(default)]
    rust_log: Option<String>,
    #[serde(default)]
    log_format: Option<String>,
}

/// Worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Hub access
    pub hub: HubConfig,

    /// Model and tokenizer identity
    pub model: ModelConfig,

    /// Request handling
    pub serving: ServingConfig,

    /// HTTP listener
    pub server: HttpServerConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Hub configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// `HF_TOKEN`
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// `HUGGING_FACE_HUB_TOKEN`, used when `HF_TOKEN` is empty
    #[serde(skip_serializing)]
    pub legacy_token: Option<String>,

    /// Hub base URL
    pub endpoint: String,

    /// Cache directory (`HF_HOME`)
    pub cache_dir: PathBuf,
}

impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("credential", &self.credential())
            .field("endpoint", &self.endpoint)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl HubConfig {
    /// First non-empty token
    pub fn credential(&self) -> Option<Credential> {
        Credential::resolve(self.token.as_deref(), self.legacy_token.as_deref())
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".cache")
        .join("huggingface")
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            token: None,
            legacy_token: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub revision: Option<String>,
    pub tokenizer_name: Option<String>,
    pub tokenizer_revision: Option<String>,
    pub quantization: Option<String>,

    /// Jinja template that replaces the tokenizer's own
    pub custom_chat_template: Option<String>,

    /// Forwarded to the engine sidecar
    pub trust_remote_code: bool,

    /// `TESTING_DOWNLOAD=1`
    pub testing_download: bool,

    /// Metadata file shared by the acquisition and serving processes
    pub metadata_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: None,
            revision: None,
            tokenizer_name: None,
            tokenizer_revision: None,
            quantization: None,
            custom_chat_template: None,
            trust_remote_code: false,
            testing_download: false,
            metadata_path: PathBuf::from(DEFAULT_METADATA_PATH),
        }
    }
}

/// Serving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    /// Inference engine base URL
    pub engine_url: String,

    /// Initial concurrency ceiling
    pub max_concurrency: usize,

    pub max_batch_size: usize,
    pub min_batch_size: usize,
    pub batch_size_growth_factor: f64,

    /// Model name reported by the OpenAI-compatible routes
    pub served_model_name: Option<String>,
}

impl ServingConfig {
    /// Batch sizing defaults for the raw back end
    pub fn batch_defaults(&self) -> BatchDefaults {
        BatchDefaults {
            max_batch_size: self.max_batch_size,
            min_batch_size: self.min_batch_size,
            growth_factor: self.batch_size_growth_factor,
        }
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        let batch = BatchDefaults::default();
        Self {
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_batch_size: batch.max_batch_size,
            min_batch_size: batch.min_batch_size,
            batch_size_growth_factor: batch.growth_factor,
            served_model_name: None,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Use JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl From<Settings> for WorkerConfig {
    fn from(s: Settings) -> Self {
        let hub = HubConfig::default();
        let model = ModelConfig::default();
        let serving = ServingConfig::default();
        let server = HttpServerConfig::default();
        let logging = LoggingConfig::default();

        Self {
            hub: HubConfig {
                token: s.hf_token,
                legacy_token: s.hugging_face_hub_token,
                endpoint: s.hf_endpoint.unwrap_or(hub.endpoint),
                cache_dir: s.hf_home.map(PathBuf::from).unwrap_or(hub.cache_dir),
            },
            model: ModelConfig {
                name: s.model_name,
                revision: s.model_revision,
                tokenizer_name: s.tokenizer_name,
                tokenizer_revision: s.tokenizer_revision,
                quantization: s.quantization,
                custom_chat_template: s.custom_chat_template,
                trust_remote_code: s.trust_remote_code.unwrap_or(model.trust_remote_code),
                testing_download: s.testing_download.unwrap_or(model.testing_download),
                metadata_path: s.metadata_path.map(PathBuf::from).unwrap_or(model.metadata_path),
            },
            serving: ServingConfig {
                engine_url: s.engine_url.unwrap_or(serving.engine_url),
                max_concurrency: s.max_concurrency.unwrap_or(serving.max_concurrency),
                max_batch_size: s.default_batch_size.unwrap_or(serving.max_batch_size),
                min_batch_size: s.default_min_batch_size.unwrap_or(serving.min_batch_size),
                batch_size_growth_factor: s
                    .default_batch_size_growth_factor
                    .unwrap_or(serving.batch_size_growth_factor),
                served_model_name: s.openai_served_model_name_override,
            },
            server: HttpServerConfig {
                host: s.server_host.unwrap_or(server.host),
                port: s.server_port.unwrap_or(server.port),
            },
            logging: LoggingConfig {
                level: s.rust_log.unwrap_or(logging.level),
                json_format: s
                    .log_format
                    .map(|format| format.eq_ignore_ascii_case("json"))
                    .unwrap_or(logging.json_format),
            },
        }
    }
}

impl WorkerConfig {
    /// Load configuration from `config_dir/default.toml` and the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed into its field's type
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from(config_dir, None)
    }

    /// Load configuration with an explicit environment map
    ///
    /// `None` reads the process environment.
    pub fn load_from(
        config_dir: impl AsRef<Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(config_dir.as_ref().join("default.toml")).required(false))
            .add_source(Environment::default().source(env))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings.into())
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Settings for one acquisition run
    pub fn acquisition(&self) -> AcquisitionSettings {
        let mut settings = AcquisitionSettings::new(&self.hub.cache_dir)
            .with_tokenizer(
                self.model.tokenizer_name.clone(),
                self.model.tokenizer_revision.clone(),
            )
            .with_quantization(self.model.quantization.clone())
            .with_metadata_path(&self.model.metadata_path)
            .with_testing(self.model.testing_download);
        settings.model_name = self.model.name.clone();
        settings.model_revision = self.model.revision.clone();
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.serving.max_concurrency, 300);
        assert_eq!(config.serving.max_batch_size, 50);
        assert_eq!(config.serving.min_batch_size, 1);
        assert_eq!(config.serving.batch_size_growth_factor, 3.0);
        assert_eq!(config.model.metadata_path, PathBuf::from("/local_model_args.json"));
        assert_eq!(config.hub.endpoint, "https://huggingface.co");
        assert!(config.hub.credential().is_none());
    }

    #[test]
    fn test_load_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::load_from(
            dir.path(),
            env(&[
                ("MODEL_NAME", "org/model"),
                ("MODEL_REVISION", "v2"),
                ("HF_HOME", "/data/hf"),
                ("HUGGING_FACE_HUB_TOKEN", "hf_legacy"),
                ("SERVER_PORT", "9000"),
                ("MAX_CONCURRENCY", "12"),
                ("DEFAULT_BATCH_SIZE_GROWTH_FACTOR", "2.5"),
                ("TESTING_DOWNLOAD", "1"),
                ("LOG_FORMAT", "JSON"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model.name.as_deref(), Some("org/model"));
        assert_eq!(config.model.revision.as_deref(), Some("v2"));
        assert_eq!(config.hub.cache_dir, PathBuf::from("/data/hf"));
        assert_eq!(config.hub.credential().unwrap().expose(), "hf_legacy");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.serving.max_concurrency, 12);
        assert_eq!(config.serving.batch_size_growth_factor, 2.5);
        assert!(config.model.testing_download);
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(file, "model_name = \"file/model\"").unwrap();
        writeln!(file, "engine_url = \"http://engine:9000\"").unwrap();

        let config =
            WorkerConfig::load_from(dir.path(), env(&[("MODEL_NAME", "env/model")])).unwrap();
        assert_eq!(config.model.name.as_deref(), Some("env/model"));
        assert_eq!(config.serving.engine_url, "http://engine:9000");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = WorkerConfig::load_from(dir.path(), env(&[("SERVER_PORT", "not-a-port")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_variable_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let result = WorkerConfig::load_from(
            dir.path(),
            env(&[
                ("HF_TOKEN", "hf_valid_token"),
                ("MODEL_NAME", "org/model"),
                ("MAX_CONCURRENCY", "lots"),
            ]),
        );
        assert!(result.is_err());

        let config = WorkerConfig::load_from(
            dir.path(),
            env(&[("HF_TOKEN", "hf_valid_token"), ("MODEL_NAME", "org/model")]),
        )
        .unwrap();
        assert_eq!(config.hub.credential().unwrap().expose(), "hf_valid_token");
    }

    #[test]
    fn test_acquisition_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::load_from(
            dir.path(),
            env(&[
                ("MODEL_NAME", "org/model"),
                ("QUANTIZATION", "awq"),
                ("HF_HOME", "/data/hf"),
                ("METADATA_PATH", "/tmp/args.json"),
            ]),
        )
        .unwrap();

        let settings = config.acquisition();
        assert_eq!(settings.model_name.as_deref(), Some("org/model"));
        assert_eq!(settings.quantization.as_deref(), Some("awq"));
        assert_eq!(settings.cache_dir, PathBuf::from("/data/hf"));
        assert_eq!(settings.metadata_path, PathBuf::from("/tmp/args.json"));
        assert!(!settings.testing);
    }

    #[test]
    fn test_debug_hides_token() {
        let hub = HubConfig {
            token: Some("hf_supersecret".to_string()),
            ..HubConfig::default()
        };
        let debug = format!("{:?}", hub);
        assert!(!debug.contains("supersecret"));
    }
}
