//! Generation back end interface

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use llm_worker_core::JobInput;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ServiceResult;

/// Default concurrency ceiling reported to the host runtime
pub const DEFAULT_MAX_CONCURRENCY: usize = 300;

/// Ordered stream of result batches for one job
pub type BatchStream = BoxStream<'static, ServiceResult<Value>>;

/// A request-handling front end that turns job input into batches
pub trait GenerationBackend: Send + Sync {
    /// Start generating for one job
    ///
    /// The stream is lazy and independent of `self`; errors surface as
    /// stream items.
    fn generate(&self, input: JobInput) -> BatchStream;

    /// Current concurrency ceiling
    fn max_concurrency(&self) -> usize;
}

/// Shared, runtime-adjustable concurrency ceiling
#[derive(Debug, Clone)]
pub struct ConcurrencyCeiling(Arc<AtomicUsize>);

impl ConcurrencyCeiling {
    pub fn new(limit: usize) -> Self {
        Self(Arc::new(AtomicUsize::new(limit)))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, limit: usize) {
        self.0.store(limit, Ordering::Relaxed);
    }
}

impl Default for ConcurrencyCeiling {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

/// Flatten a fallible stream constructor into a single batch stream
pub(crate) fn deferred<F>(start: F) -> BatchStream
where
    F: Future<Output = ServiceResult<BatchStream>> + Send + 'static,
{
    stream::once(start)
        .flat_map(|started| match started {
            Ok(batches) => batches,
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        })
        .boxed()
}
