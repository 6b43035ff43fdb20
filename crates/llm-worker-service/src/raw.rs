//! Raw completion back end
//!
//! Formats the job input into a prompt, streams a completion from the engine
//! and groups text deltas into batches. Streaming jobs get batches whose size
//! starts small and grows geometrically, so the first tokens reach the caller
//! quickly while later batches amortize the per-batch overhead.

use futures::stream::{self, StreamExt};
use llm_worker_core::{BatchSizing, JobInput};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::backend::{deferred, BatchStream, ConcurrencyCeiling, GenerationBackend};
use crate::engine::{EventStream, GenerationEvent, GenerationRequest, InferenceEngine};
use crate::error::{ServiceError, ServiceResult};
use crate::tokenizer::TokenizerWrapper;

/// Batch sizing applied when a job does not override it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchDefaults {
    pub max_batch_size: usize,
    pub min_batch_size: usize,
    pub growth_factor: f64,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            min_batch_size: 1,
            growth_factor: 3.0,
        }
    }
}

/// Tracks the size of the next batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSizer {
    current: usize,
    max: usize,
    growth_factor: f64,
}

impl BatchSizer {
    /// Resolve job overrides against the defaults
    pub fn new(defaults: &BatchDefaults, overrides: &BatchSizing) -> Self {
        let max = overrides
            .max_batch_size
            .unwrap_or(defaults.max_batch_size)
            .max(1);
        let min = overrides
            .min_batch_size
            .unwrap_or(defaults.min_batch_size)
            .clamp(1, max);
        let growth_factor = overrides
            .batch_size_growth_factor
            .unwrap_or(defaults.growth_factor)
            .max(1.0);
        Self {
            current: min,
            max,
            growth_factor,
        }
    }

    /// Size of the batch being filled
    pub fn current(&self) -> usize {
        self.current
    }

    /// Advance to the next batch size, capped at the maximum
    pub fn grow(&mut self) {
        let next = (self.current as f64 * self.growth_factor).ceil() as usize;
        self.current = next.clamp(self.current, self.max);
    }
}

/// Back end that talks to the engine's plain completion interface
#[derive(Clone)]
pub struct RawBackend {
    engine: Arc<dyn InferenceEngine>,
    tokenizer: Arc<TokenizerWrapper>,
    defaults: BatchDefaults,
    ceiling: ConcurrencyCeiling,
}

impl RawBackend {
    /// Create a raw back end
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        tokenizer: Arc<TokenizerWrapper>,
        defaults: BatchDefaults,
        ceiling: ConcurrencyCeiling,
    ) -> Self {
        Self {
            engine,
            tokenizer,
            defaults,
            ceiling,
        }
    }

    /// Handle on the concurrency ceiling, for runtime adjustment
    pub fn ceiling(&self) -> &ConcurrencyCeiling {
        &self.ceiling
    }

    /// Build the engine prompt for a job
    ///
    /// Messages always go through the chat template; a plain prompt only
    /// when the job asks for it.
    pub fn build_prompt(&self, input: &JobInput) -> ServiceResult<String> {
        let llm_input = input.llm_input().ok_or_else(|| {
            ServiceError::InvalidInput("Job input must contain 'prompt' or 'messages'".to_string())
        })?;

        if input.apply_chat_template || llm_input.is_array() {
            return self.tokenizer.apply_chat_template(llm_input);
        }
        llm_input
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::InvalidInput("'prompt' must be a string".to_string()))
    }

    #[instrument(skip(self, input), fields(stream = input.stream))]
    async fn start(self, input: JobInput) -> ServiceResult<BatchStream> {
        let prompt = self.build_prompt(&input)?;
        debug!("Formatted prompt of {} bytes", prompt.len());

        let events = self
            .engine
            .generate(GenerationRequest {
                prompt,
                sampling_params: input.sampling_params.clone(),
            })
            .await?;

        let sizer = BatchSizer::new(&self.defaults, &input.batch);
        Ok(batch_events(events, sizer, input.stream))
    }
}

impl GenerationBackend for RawBackend {
    fn generate(&self, input: JobInput) -> BatchStream {
        deferred(self.clone().start(input))
    }

    fn max_concurrency(&self) -> usize {
        self.ceiling.get()
    }
}

struct Batcher {
    events: EventStream,
    sizer: BatchSizer,
    streaming: bool,
    tokens: Vec<String>,
    input_tokens: u64,
    output_tokens: u64,
    reported_output: Option<u64>,
    finished: bool,
}

impl Batcher {
    fn batch(&mut self) -> Value {
        let tokens = std::mem::take(&mut self.tokens);
        let tokens = if self.streaming {
            tokens
        } else {
            vec![tokens.concat()]
        };
        json!({
            "choices": [{"tokens": tokens}],
            "usage": {
                "input": self.input_tokens,
                "output": self.reported_output.unwrap_or(self.output_tokens),
            }
        })
    }
}

/// Group completion events into result batches
pub fn batch_events(events: EventStream, sizer: BatchSizer, streaming: bool) -> BatchStream {
    let batcher = Batcher {
        events,
        sizer,
        streaming,
        tokens: Vec::new(),
        input_tokens: 0,
        output_tokens: 0,
        reported_output: None,
        finished: false,
    };

    stream::unfold(batcher, |mut batcher| async move {
        if batcher.finished {
            return None;
        }
        loop {
            match batcher.events.next().await {
                Some(Ok(GenerationEvent::Text(text))) => {
                    batcher.tokens.push(text);
                    batcher.output_tokens += 1;
                    if batcher.streaming && batcher.tokens.len() >= batcher.sizer.current() {
                        let batch = batcher.batch();
                        batcher.sizer.grow();
                        return Some((Ok(batch), batcher));
                    }
                }
                Some(Ok(GenerationEvent::Usage { input, output })) => {
                    batcher.input_tokens = input;
                    batcher.reported_output = Some(output);
                }
                Some(Err(e)) => {
                    batcher.finished = true;
                    return Some((Err(e), batcher));
                }
                None => {
                    batcher.finished = true;
                    if batcher.streaming && batcher.tokens.is_empty() {
                        return None;
                    }
                    let batch = batcher.batch();
                    return Some((Ok(batch), batcher));
                }
            }
        }
    })
    .boxed()
}
