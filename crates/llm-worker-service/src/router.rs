//! Request router
//!
//! Picks the back end for a job and relays its batches to the caller through
//! a bounded channel. Each job gets its own producer task; dropping the
//! returned stream stops that producer and nothing else.

use futures::stream::{self, BoxStream, StreamExt};
use llm_worker_core::{Job, JobInput};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::backend::GenerationBackend;

/// Default capacity of the per-job relay channel
pub const DEFAULT_RELAY_BUFFER: usize = 16;

/// Relayed batches of one job
///
/// Back-end errors are already converted into a final `{"error": ...}` batch.
pub type JobStream = BoxStream<'static, Value>;

/// Back end selected for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Raw,
    OpenAi,
}

impl Route {
    /// Select the back end from the job's routing flag
    pub fn for_input(input: &JobInput) -> Self {
        if input.is_openai_route() {
            Self::OpenAi
        } else {
            Self::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatches jobs to the raw or OpenAI-compatible back end
#[derive(Clone)]
pub struct RequestRouter {
    raw: Arc<dyn GenerationBackend>,
    openai: Arc<dyn GenerationBackend>,
    buffer: usize,
}

impl RequestRouter {
    /// Create a router over the two back ends
    pub fn new(raw: Arc<dyn GenerationBackend>, openai: Arc<dyn GenerationBackend>) -> Self {
        Self {
            raw,
            openai,
            buffer: DEFAULT_RELAY_BUFFER,
        }
    }

    /// Set the relay channel capacity
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    fn backend(&self, route: Route) -> Arc<dyn GenerationBackend> {
        match route {
            Route::Raw => self.raw.clone(),
            Route::OpenAi => self.openai.clone(),
        }
    }

    /// Dispatch a job and return its batches in generation order
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, job: Job) -> JobStream {
        let route = Route::for_input(&job.input);
        let job_id = job.id.unwrap_or_default();
        info!(job_id = %job_id, route = %route, "Dispatching job");

        let mut batches = self.backend(route).generate(job.input);
        let (tx, rx) = mpsc::channel::<Value>(self.buffer);
        let span = tracing::info_span!("relay", job_id = %job_id, route = %route);

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = tx.closed() => {
                            debug!("Caller went away, stopping generation");
                            break;
                        }
                        next = batches.next() => match next {
                            Some(Ok(batch)) => {
                                if tx.send(batch).await.is_err() {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                warn!("Job failed: {}", e);
                                let _ = tx.send(e.to_batch()).await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            .instrument(span),
        );

        stream::unfold(rx, |mut rx| async move {
            let batch = rx.recv().await?;
            Some((batch, rx))
        })
        .boxed()
    }

    /// Concurrency ceiling, read from the raw back end on every call
    pub fn concurrency(&self) -> usize {
        self.raw.max_concurrency()
    }
}
