//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the session runtime with mock implementations.

use crate::dispatch::{DispatchError, Dispatcher};
use crate::llm::BackendMemory;
use crate::state_machine::{Candidate, SessionRecord};
use crate::store::JsonlSink;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces one candidate per backend for a user input
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Generate candidates in backend order; any failure fails the round
    async fn generate(
        &self,
        user_input: &str,
        memories: &[BackendMemory],
    ) -> Result<Vec<Candidate>, DispatchError>;

    /// Backend ids, in candidate order
    fn backend_ids(&self) -> Vec<String>;
}

/// Append-only destination for finalized sessions
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append one record; earlier records are never touched
    async fn append(&self, record: &SessionRecord) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CandidateGenerator + ?Sized> CandidateGenerator for Arc<T> {
    async fn generate(
        &self,
        user_input: &str,
        memories: &[BackendMemory],
    ) -> Result<Vec<Candidate>, DispatchError> {
        (**self).generate(user_input, memories).await
    }

    fn backend_ids(&self) -> Vec<String> {
        (**self).backend_ids()
    }
}

#[async_trait]
impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    async fn append(&self, record: &SessionRecord) -> Result<(), String> {
        (**self).append(record).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl CandidateGenerator for Dispatcher {
    async fn generate(
        &self,
        user_input: &str,
        memories: &[BackendMemory],
    ) -> Result<Vec<Candidate>, DispatchError> {
        self.dispatch(user_input, memories).await
    }

    fn backend_ids(&self) -> Vec<String> {
        Dispatcher::backend_ids(self)
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn append(&self, record: &SessionRecord) -> Result<(), String> {
        JsonlSink::append(self, record).await.map_err(|e| e.to_string())
    }
}
