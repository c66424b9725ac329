//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::RecordSink;
use crate::llm::{BackendMemory, LlmError, ModelBackend};
use crate::state_machine::SessionRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Backend
// ============================================================================

/// Mock backend that returns queued replies, falling back to an echo of the
/// input once the queue is empty
pub struct MockBackend {
    id: String,
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Option<Duration>,
    probe: Option<ConcurrencyProbe>,
    /// Record of every (memory, input) pair received
    pub calls: Mutex<Vec<(BackendMemory, String)>>,
}

impl MockBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            responses: Mutex::new(VecDeque::new()),
            delay: None,
            probe: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn queue_responses<I, T>(&self, texts: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for text in texts {
            self.queue_response(text);
        }
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<(BackendMemory, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn generate(&self, memory: &BackendMemory, input: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((memory.clone(), input.to_string()));

        let _guard = self.probe.as_ref().map(ConcurrencyProbe::enter);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(format!("{} says {input}", self.id)))
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Concurrency Probe
// ============================================================================

/// Tracks how many calls are in flight at once
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    fn enter(&self) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            current: self.current.clone(),
        }
    }

    /// Highest number of simultaneous calls observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ProbeGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Mock Sink
// ============================================================================

/// In-memory sink that can be told to fail its next append
#[derive(Default)]
pub struct MockSink {
    records: Mutex<Vec<SessionRecord>>,
    fail_next: Mutex<Option<String>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(message.into());
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for MockSink {
    async fn append(&self, record: &SessionRecord) -> Result<(), String> {
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(message);
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
