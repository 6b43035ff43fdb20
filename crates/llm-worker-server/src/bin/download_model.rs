//! Model download
//!
//! One acquisition run: checks the hub token, fetches the model and its
//! tokenizer into the hub cache and writes the metadata file the serving
//! process starts from. Exits 1 on any failure, before the metadata file is
//! written.

use anyhow::{Context, Result};
use clap::Parser;
use llm_worker_hub::{HttpHubClient, HubClient};
use llm_worker_server::{telemetry, WorkerConfig};
use llm_worker_service::AcquisitionPipeline;
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

    /// Where to write the metadata file
    #[arg(long)]
    metadata_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = match WorkerConfig::load(&args.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(metadata_path) = args.metadata_path {
        config.model.metadata_path = metadata_path;
    }

    telemetry::init_with_config((&config.logging).into());

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Model download failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &WorkerConfig) -> Result<()> {
    let client: Arc<dyn HubClient> =
        Arc::new(HttpHubClient::new(&config.hub.endpoint).context("Invalid hub endpoint")?);
    let pipeline =
        AcquisitionPipeline::new(client, config.hub.credential(), config.acquisition());

    let metadata = pipeline.run().await?;
    if let Some(model_path) = metadata.model_path() {
        info!("Model ready at {}", model_path);
    }
    if let Some(tokenizer_path) = metadata.tokenizer_path() {
        info!("Tokenizer ready at {}", tokenizer_path);
    }
    Ok(())
}
