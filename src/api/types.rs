//! API request and response types

use crate::state_machine::{Candidate, Session, SessionPhase, TranscriptEntry, TurnRecord};
use serde::{Deserialize, Serialize};

/// Request to submit the worker's next utterance
#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub text: String,
}

/// Request to choose one of the pending candidates
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub response: String,
}

/// Optional query on the select route; the crowd platform passes the
/// assignment id on the submit URL
#[derive(Debug, Default, Deserialize)]
pub struct SelectQuery {
    pub assignment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignmentRequest {
    pub assignment_id: String,
}

/// Candidates awaiting the worker's choice
#[derive(Debug, Serialize)]
pub struct PendingTurnView {
    pub turn_index: u32,
    pub user_input: String,
    pub candidates: Vec<Candidate>,
}

/// What the worker UI needs to render a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub assignment_id: Option<String>,
    pub preview: bool,
    pub turn_count: u32,
    pub turn_budget: u32,
    pub turns_remaining: u32,
    pub phase: SessionPhase,
    pub finalized: bool,
    pub pending: Option<PendingTurnView>,
    pub transcript: Vec<TranscriptEntry>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            assignment_id: session.assignment_id.clone(),
            preview: session.is_preview(),
            turn_count: session.turn_count,
            turn_budget: session.turn_budget,
            turns_remaining: session.turn_budget.saturating_sub(session.turn_count),
            phase: session.phase.clone(),
            finalized: session.is_finalized(),
            pending: session.pending_turn().map(|turn| PendingTurnView {
                turn_index: turn.turn_index,
                user_input: turn.user_input.clone(),
                candidates: turn.candidates.clone(),
            }),
            transcript: session.transcript.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionView,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            session: session.into(),
        }
    }
}

/// Response for a selection
#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub turn: TurnRecord,
    pub finalized: bool,
    pub persisted: bool,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct BackendsResponse {
    pub backends: Vec<String>,
    pub turn_budget: u32,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Set for generation failures: whether resubmitting may succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            retryable: None,
        }
    }
}
