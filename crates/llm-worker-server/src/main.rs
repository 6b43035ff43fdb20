//! LLM Worker
//!
//! Serving entry point. Checks the hub token, reads the metadata file written
//! by `download-model`, wires the tokenizer, engine adapter and back ends
//! together and serves jobs over HTTP with graceful shutdown.

use anyhow::{bail, Context, Result};
use clap::Parser;
use llm_worker_api::{build_api_server, init_metrics};
use llm_worker_core::RunMetadata;
use llm_worker_hub::{CredentialValidator, HttpHubClient};
use llm_worker_server::{telemetry, WorkerConfig};
use llm_worker_service::{
    ConcurrencyCeiling, HttpInferenceEngine, InferenceEngine, OpenAiBackend, RawBackend,
    RequestRouter, TokenizerWrapper,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Metadata file written by the acquisition run
    #[arg(long)]
    metadata_path: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config =
        WorkerConfig::load(&args.config_dir).context("Failed to load configuration")?;

    // Override with command-line arguments
    if let Some(metadata_path) = args.metadata_path {
        config.model.metadata_path = metadata_path;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    telemetry::init_with_config((&config.logging).into());

    info!("Starting LLM Worker");
    info!("Server: {}", config.bind_address());
    info!("Engine: {}", config.serving.engine_url);

    let client = HttpHubClient::new(&config.hub.endpoint).context("Invalid hub endpoint")?;
    let validator = CredentialValidator::new(Arc::new(client), config.hub.credential());
    let router = build_request_router(&config, &validator).await?;
    init_metrics();
    let app = build_api_server(router);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid HTTP bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind HTTP server")?;

    info!("HTTP Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Composition root of the serving path
///
/// Nothing is constructed until the hub has accepted the token.
async fn build_request_router(
    config: &WorkerConfig,
    validator: &CredentialValidator,
) -> Result<RequestRouter> {
    if !validator.validate().await {
        bail!("Hugging Face token is missing or was rejected by the hub");
    }

    let metadata_path = &config.model.metadata_path;
    let metadata = RunMetadata::load(metadata_path).with_context(|| {
        format!(
            "Cannot start without metadata from the download step at {}",
            metadata_path.display()
        )
    })?;

    let model_path = metadata
        .model_path()
        .context("Metadata file does not name a model")?
        .to_string();
    let tokenizer_path = metadata.tokenizer_path().unwrap_or(&model_path);

    info!("Model: {}", model_path);
    if let Some(quantization) = metadata.quantization() {
        info!("Quantization: {}", quantization);
    }
    if config.model.trust_remote_code {
        info!("Engine runs with trust_remote_code enabled");
    }

    let tokenizer = TokenizerWrapper::load(
        Path::new(tokenizer_path),
        metadata.tokenizer_revision(),
        config.model.custom_chat_template.clone(),
    )
    .context("Failed to load tokenizer")?;
    if !tokenizer.has_chat_template() {
        info!("Tokenizer has no chat template; message lists will be rejected");
    }

    let engine: Arc<dyn InferenceEngine> = Arc::new(
        HttpInferenceEngine::new(&config.serving.engine_url, model_path.clone())
            .context("Invalid engine URL")?,
    );
    let ceiling = ConcurrencyCeiling::new(config.serving.max_concurrency);

    let raw = RawBackend::new(
        engine.clone(),
        Arc::new(tokenizer),
        config.serving.batch_defaults(),
        ceiling.clone(),
    );
    let openai = OpenAiBackend::new(engine, config.serving.served_model_name.clone(), ceiling);

    info!(
        "Serving {} with max concurrency {}",
        openai.served_model_name(),
        config.serving.max_concurrency
    );
    Ok(RequestRouter::new(Arc::new(raw), Arc::new(openai)))
}

/// Graceful shutdown signal handler
///
/// Waits for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
