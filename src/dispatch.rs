//! Fan-out of one user utterance to every backend
//!
//! All backends are called concurrently on a bounded pool. Results come back
//! in backend order no matter which call finishes first, and a single failure
//! fails the whole round: the worker is never shown a partial candidate set.

use crate::llm::{BackendMemory, BackendRegistry, LlmError};
use crate::state_machine::Candidate;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Instant;
use thiserror::Error;

/// Generation calls are I/O-bound, so the cap is generous
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Backend {backend_id} failed: {source}")]
    Backend {
        backend_id: String,
        #[source]
        source: LlmError,
    },
    #[error("Expected {expected} backend memories, got {actual}")]
    MemoryMismatch { expected: usize, actual: usize },
}

impl DispatchError {
    /// Whether resubmitting the same input may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Backend { source, .. } => source.is_retryable(),
            DispatchError::MemoryMismatch { .. } => false,
        }
    }
}

pub struct Dispatcher {
    registry: BackendRegistry,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(registry: BackendRegistry, max_concurrency: usize) -> Self {
        Self {
            registry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.registry.backend_ids()
    }

    /// Broadcast `user_input` to every backend, each continuing from its own
    /// entry in `memories` (aligned with backend order).
    pub async fn dispatch(
        &self,
        user_input: &str,
        memories: &[BackendMemory],
    ) -> Result<Vec<Candidate>, DispatchError> {
        let backends = self.registry.backends();
        if memories.len() != backends.len() {
            return Err(DispatchError::MemoryMismatch {
                expected: backends.len(),
                actual: memories.len(),
            });
        }

        let start = Instant::now();

        // Calls own their backend, memory and input
        let calls: Vec<_> = backends
            .iter()
            .cloned()
            .zip(memories.iter().cloned())
            .map(|(backend, memory)| {
                let input = user_input.to_string();
                async move {
                    match backend.generate(&memory, &input).await {
                        Ok(text) => Ok(Candidate::new(backend.backend_id(), text)),
                        Err(source) => Err(DispatchError::Backend {
                            backend_id: backend.backend_id().to_string(),
                            source,
                        }),
                    }
                }
            })
            .collect();

        // `buffered` keeps input order; dropping the stream on the first
        // error abandons the sibling calls still in flight.
        let candidates: Vec<Candidate> = stream::iter(calls)
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        tracing::info!(
            backends = candidates.len(),
            duration_ms = %start.elapsed().as_millis(),
            "Fan-out completed"
        );

        Ok(candidates)
    }
}
