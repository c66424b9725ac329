//! Why a backend produced no candidate
//!
//! The worker only ever sees one question answered: is resubmitting the same
//! utterance worth it? Each kind below answers it once.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Server-provided hint for when to try again
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// The hosted API is still loading the model's weights and usually says
    /// how long that will take
    pub fn model_loading(message: impl Into<String>, estimated: Option<Duration>) -> Self {
        Self {
            retry_after: estimated,
            ..Self::new(LlmErrorKind::ModelLoading, message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_decode() {
            LlmErrorKind::MalformedResponse
        } else if e.is_builder() {
            LlmErrorKind::Rejected
        } else {
            LlmErrorKind::Transport
        };
        let what = if e.is_timeout() {
            "Request timed out"
        } else if e.is_connect() {
            "Connection failed"
        } else {
            "Request failed"
        };
        Self::new(kind, format!("{what}: {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection refused, timed out, or cut off mid-body
    Transport,
    /// 429 from the inference API
    RateLimited,
    /// 503 while a cold model warms up
    ModelLoading,
    /// Any other 5xx
    Upstream,
    /// Missing or invalid token (401, 403)
    Unauthorized,
    /// The request or backend setup was refused outright
    Rejected,
    /// A success status whose body holds no generation
    MalformedResponse,
}

impl LlmErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Transport | Self::RateLimited | Self::ModelLoading | Self::Upstream
        )
    }
}
