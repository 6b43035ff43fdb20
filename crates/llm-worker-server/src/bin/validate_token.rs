//! Hub token check
//!
//! Exits 0 when the configured token is accepted by the hub (and, with
//! `--repository`, can read that repository), 1 otherwise.

use clap::Parser;
use llm_worker_core::DEFAULT_REVISION;
use llm_worker_hub::{CredentialValidator, HttpHubClient, HubClient};
use llm_worker_server::{telemetry, WorkerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Also check read access to this repository
    #[arg(long)]
    repository: Option<String>,

    /// Revision used for the access check
    #[arg(long, default_value = DEFAULT_REVISION)]
    revision: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = match WorkerConfig::load(&args.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    telemetry::init_with_config((&config.logging).into());

    let client: Arc<dyn HubClient> = match HttpHubClient::new(&config.hub.endpoint) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Invalid hub endpoint: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let validator = CredentialValidator::new(client, config.hub.credential());

    if !validator.validate().await {
        return ExitCode::FAILURE;
    }

    if let Some(repository) = args.repository {
        match validator.check_access(&repository, &args.revision).await {
            Ok(repo) => info!(
                "Access to {} confirmed at {}",
                repo.repo_id.as_deref().unwrap_or(&repository),
                repo.sha
            ),
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
