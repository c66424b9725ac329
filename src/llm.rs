//! Model backend abstraction
//!
//! Every participating model sits behind [`ModelBackend`]. Backends are
//! stateless per call: the conversational memory to continue from is passed
//! in, and the session decides which memory survives the turn.

mod error;
mod huggingface;
mod memory;
mod prompt;
mod registry;

pub use error::{LlmError, LlmErrorKind};
pub use huggingface::{HuggingFaceBackend, InferenceParams};
pub use memory::BackendMemory;
pub use prompt::{PromptError, PromptTemplate};
pub use registry::{BackendConfig, BackendRegistry, DEFAULT_MODEL_IDS};

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for text-generation backends
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a response to `input`, continuing the conversation in `memory`
    async fn generate(&self, memory: &BackendMemory, input: &str) -> Result<String, LlmError>;

    /// Stable identifier used as the candidate key
    fn backend_id(&self) -> &str;
}

/// Logging wrapper for model backends
pub struct LoggingBackend {
    inner: Arc<dyn ModelBackend>,
    backend_id: String,
}

impl LoggingBackend {
    pub fn new(inner: Arc<dyn ModelBackend>) -> Self {
        let backend_id = inner.backend_id().to_string();
        Self { inner, backend_id }
    }
}

#[async_trait]
impl ModelBackend for LoggingBackend {
    async fn generate(&self, memory: &BackendMemory, input: &str) -> Result<String, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(memory, input).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    backend = %self.backend_id,
                    duration_ms = %duration.as_millis(),
                    history_turns = memory.len(),
                    response_chars = response.chars().count(),
                    "Generation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    backend = %self.backend_id,
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    retryable = e.is_retryable(),
                    "Generation failed"
                );
            }
        }

        result
    }

    fn backend_id(&self) -> &str {
        &self.backend_id
    }
}
