//! LLM Worker Server
//!
//! Configuration and telemetry shared by the worker binaries:
//!
//! - `llm-worker`: serves jobs over HTTP
//! - `download-model`: fetches model and tokenizer, writes the metadata file
//! - `validate-token`: checks the hub credential

pub mod config;
pub mod telemetry;

pub use config::WorkerConfig;
