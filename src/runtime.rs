//! Runtime for driving collection sessions
//!
//! Each live session is owned by a [`SessionRuntime`] behind its own lock, so
//! requests for different sessions never wait on each other and a second
//! request for a busy session is turned away instead of queued. Sessions a
//! worker walks away from are swept once they sit idle too long.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{SelectionOutcome, SessionRuntime};
pub use traits::*;

use crate::dispatch::{DispatchError, Dispatcher};
use crate::state_machine::{Session, TransitionError};
use crate::store::JsonlSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Type alias for the production manager with concrete implementations
pub type ProductionManager = SessionManager<Dispatcher, JsonlSink>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Generation failed: {0}")]
    Generation(#[from] DispatchError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Failed to persist session record: {0}")]
    Persistence(String),
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session is handling another request")]
    SessionBusy,
}

/// How often the background sweep looks for expired sessions
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How long sessions stay in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExpiry {
    /// Live sessions untouched for this long are dropped
    pub idle_timeout: Duration,
    /// Finalized snapshots are served read-only for this long
    pub finalized_retention: Duration,
}

impl Default for SessionExpiry {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60 * 60),
            finalized_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

type SessionHandle<G, S> = Arc<Mutex<SessionRuntime<G, S>>>;
type SessionGuard<G, S> = OwnedMutexGuard<SessionRuntime<G, S>>;

struct FinalizedSession {
    session: Session,
    finalized_at: Instant,
}

/// Manager for all live sessions
pub struct SessionManager<G, S>
where
    G: CandidateGenerator + 'static,
    S: RecordSink + 'static,
{
    generator: Arc<G>,
    sink: Arc<S>,
    turn_budget: u32,
    expiry: SessionExpiry,
    sessions: RwLock<HashMap<String, SessionHandle<G, S>>>,
    /// Sessions already written out, kept as read-only snapshots
    finalized: RwLock<HashMap<String, FinalizedSession>>,
}

impl<G, S> SessionManager<G, S>
where
    G: CandidateGenerator + 'static,
    S: RecordSink + 'static,
{
    pub fn new(generator: Arc<G>, sink: Arc<S>, turn_budget: u32) -> Self {
        Self {
            generator,
            sink,
            turn_budget: turn_budget.max(1),
            expiry: SessionExpiry::default(),
            sessions: RwLock::new(HashMap::new()),
            finalized: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: SessionExpiry) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn turn_budget(&self) -> u32 {
        self.turn_budget
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.generator.backend_ids()
    }

    /// Start a new session with fresh memories for every backend
    pub async fn create_session(&self) -> Session {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(&session_id, self.turn_budget, &self.generator.backend_ids());
        let runtime = SessionRuntime::new(session.clone(), self.generator.clone(), self.sink.clone());

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(runtime)));

        tracing::info!(
            session_id = %session_id,
            turn_budget = self.turn_budget,
            backends = session.backends.len(),
            "Session created"
        );
        session
    }

    /// Current state of a session; waits for any in-flight request.
    /// Finalized sessions are served from their snapshot until it expires.
    pub async fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        let handle = self.sessions.read().await.get(session_id).cloned();
        if let Some(handle) = handle {
            let mut runtime = handle.clone().lock_owned().await;
            if self.is_live(session_id, &handle).await {
                runtime.touch();
                return Ok(runtime.session().clone());
            }
        }

        self.finalized
            .read()
            .await
            .get(session_id)
            .map(|f| f.session.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub async fn submit_input(&self, session_id: &str, text: &str) -> Result<Session, SessionError> {
        let mut runtime = self.lock_live(session_id).await?;
        runtime.submit_input(text).await?;
        Ok(runtime.session().clone())
    }

    /// Record a selection, binding `assignment_id` along with it when one is
    /// given. A session that finalizes here is dropped from memory and kept
    /// as a read-only snapshot.
    pub async fn select_response(
        &self,
        session_id: &str,
        text: &str,
        assignment_id: Option<&str>,
    ) -> Result<(SelectionOutcome, Session), SessionError> {
        let mut runtime = self.lock_live(session_id).await?;
        let outcome = runtime.select_response(text, assignment_id).await?;
        let session = runtime.session().clone();

        if outcome.finalized {
            self.finalized.write().await.insert(
                session_id.to_string(),
                FinalizedSession {
                    session: session.clone(),
                    finalized_at: Instant::now(),
                },
            );
            self.sessions.write().await.remove(session_id);
            tracing::info!(session_id = %session_id, "Session finalized");
        }

        Ok((outcome, session))
    }

    pub async fn set_assignment_id(
        &self,
        session_id: &str,
        assignment_id: &str,
    ) -> Result<Session, SessionError> {
        let mut runtime = self.lock_live(session_id).await?;
        runtime.set_assignment_id(assignment_id).await?;
        Ok(runtime.session().clone())
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop live sessions idle past the timeout and finalized snapshots past
    /// their retention. Sessions in the middle of a request are skipped.
    /// Returns how many live sessions were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let SessionExpiry {
            idle_timeout,
            finalized_retention,
        } = self.expiry;

        let mut expired = Vec::new();
        self.sessions.write().await.retain(|id, handle| {
            let Ok(runtime) = handle.try_lock() else {
                return true;
            };
            if runtime.idle_for() < idle_timeout {
                return true;
            }
            expired.push((id.clone(), runtime.session().turn_count));
            false
        });

        let snapshots_dropped = {
            let mut finalized = self.finalized.write().await;
            let before = finalized.len();
            finalized.retain(|_, f| f.finalized_at.elapsed() < finalized_retention);
            before - finalized.len()
        };

        for (session_id, turns) in &expired {
            tracing::info!(session_id = %session_id, turns, "Idle session expired");
        }
        if snapshots_dropped > 0 {
            tracing::debug!(count = snapshots_dropped, "Finalized snapshots expired");
        }
        expired.len()
    }

    /// Sweep on every `every` until `cancel` fires
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_expired().await;
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        })
    }

    /// Exclusive access to a live session, or `SessionBusy` if another
    /// request holds it
    async fn lock_live(&self, session_id: &str) -> Result<SessionGuard<G, S>, SessionError> {
        let handle = self.sessions.read().await.get(session_id).cloned();
        let Some(handle) = handle else {
            return Err(self.missing(session_id).await);
        };

        let runtime = handle
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::SessionBusy)?;

        // Finalized or swept between lookup and lock
        if !self.is_live(session_id, &handle).await {
            return Err(self.missing(session_id).await);
        }
        Ok(runtime)
    }

    async fn is_live(&self, session_id: &str, handle: &SessionHandle<G, S>) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    async fn missing(&self, session_id: &str) -> SessionError {
        if self.finalized.read().await.contains_key(session_id) {
            TransitionError::SessionAlreadyFinalized.into()
        } else {
            SessionError::NotFound(session_id.to_string())
        }
    }
}
