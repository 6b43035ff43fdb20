//! Service layer for the LLM worker
//!
//! This crate sits between the HTTP surface and the hub/engine collaborators.
//!
//! # Architecture
//!
//! - **AcquisitionPipeline**: credential gate, model and tokenizer download, metadata file
//! - **TokenizerWrapper**: chat template formatting of job input
//! - **InferenceEngine**: the external engine, reached over its OpenAI-compatible HTTP API
//! - **RawBackend** / **OpenAiBackend**: the two request-handling front ends
//! - **RequestRouter**: per-job back end selection and batch relay
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_worker_service::{
//!     BatchDefaults, ConcurrencyCeiling, HttpInferenceEngine, OpenAiBackend, RawBackend,
//!     RequestRouter, TokenizerWrapper,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(HttpInferenceEngine::new("http://127.0.0.1:8000", "org/model")?);
//! let tokenizer = Arc::new(TokenizerWrapper::load(Path::new("/cache/tokenizer"), None, None)?);
//! let ceiling = ConcurrencyCeiling::default();
//!
//! let raw = RawBackend::new(engine.clone(), tokenizer, BatchDefaults::default(), ceiling.clone());
//! let openai = OpenAiBackend::new(engine, None, ceiling);
//! let router = RequestRouter::new(Arc::new(raw), Arc::new(openai));
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod backend;
pub mod engine;
pub mod error;
pub mod openai;
pub mod raw;
pub mod router;
pub mod tokenizer;

// Re-export main types for convenience
pub use acquisition::{AcquisitionPipeline, AcquisitionSettings, TEST_CACHE_DIR, TEST_MODEL_NAME};
pub use backend::{BatchStream, ConcurrencyCeiling, GenerationBackend, DEFAULT_MAX_CONCURRENCY};
pub use engine::{
    EngineReply, EventStream, GenerationEvent, GenerationRequest, HttpInferenceEngine,
    InferenceEngine, DEFAULT_ENGINE_URL,
};
pub use error::{ServiceError, ServiceResult};
pub use openai::OpenAiBackend;
pub use raw::{BatchDefaults, BatchSizer, RawBackend};
pub use router::{JobStream, RequestRouter, Route};
pub use tokenizer::{TokenizerConfig, TokenizerWrapper};
