//! Pure state transition function
//!
//! Given a session and an event, produce the next session and the effects
//! the runtime must carry out. No I/O happens here; a rejected event leaves
//! the caller's session untouched.

use super::state::{
    Candidate, Selection, Session, SessionPhase, TranscriptEntry, TurnRecord,
    ASSIGNMENT_ID_NOT_AVAILABLE,
};
use super::{Effect, Event};
use crate::llm::BackendMemory;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: Session) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A response must be selected before submitting new input")]
    SelectionPending,
    #[error("Candidates are still being generated")]
    GenerationInProgress,
    #[error("No turn is awaiting a selection")]
    NoPendingTurn,
    #[error("Selected response does not match any candidate")]
    InvalidSelection,
    #[error("Session is finalized and read-only")]
    SessionAlreadyFinalized,
    #[error("Session is already bound to assignment {existing}")]
    AssignmentConflict { existing: String },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(session: &Session, event: Event) -> Result<TransitionResult, TransitionError> {
    match (&session.phase, event) {
        // Nothing moves a finalized session
        (SessionPhase::Finalized, _) => Err(TransitionError::SessionAlreadyFinalized),

        // ============================================================
        // Input
        // ============================================================
        (SessionPhase::AwaitingInput, Event::UserInput { text }) => {
            if session.turn_count >= session.turn_budget {
                return Err(TransitionError::InvalidTransition(format!(
                    "turn budget of {} already reached",
                    session.turn_budget
                )));
            }

            // Memories are only read here; they change on selection
            let mut next = session.clone();
            next.phase = SessionPhase::Generating {
                user_input: text.clone(),
            };
            Ok(TransitionResult::new(next).with_effect(Effect::dispatch(text, session.memories())))
        }

        (SessionPhase::AwaitingSelection, Event::UserInput { .. }) => {
            Err(TransitionError::SelectionPending)
        }

        (SessionPhase::Generating { .. }, Event::UserInput { .. }) => {
            Err(TransitionError::GenerationInProgress)
        }

        // ============================================================
        // Generation
        // ============================================================
        (SessionPhase::Generating { user_input }, Event::CandidatesGenerated { candidates }) => {
            check_candidates_match_backends(session, &candidates)?;

            let mut next = session.clone();
            next.turn_count += 1;
            next.turns
                .push(TurnRecord::pending(next.turn_count, user_input.clone(), candidates));
            next.phase = SessionPhase::AwaitingSelection;
            Ok(TransitionResult::new(next))
        }

        (_, Event::CandidatesGenerated { .. }) => Err(TransitionError::InvalidTransition(
            "candidates arrived with no generation in flight".to_string(),
        )),

        // ============================================================
        // Selection
        // ============================================================
        (SessionPhase::AwaitingSelection, Event::ResponseSelected { text, selected_at }) => {
            select_response(session, &text, selected_at)
        }

        (_, Event::ResponseSelected { .. }) => Err(TransitionError::NoPendingTurn),

        // ============================================================
        // Worker identity
        // ============================================================
        (_, Event::AssignmentBound { assignment_id }) => bind_assignment(session, assignment_id),
    }
}

fn check_candidates_match_backends(
    session: &Session,
    candidates: &[Candidate],
) -> Result<(), TransitionError> {
    let matches = candidates.len() == session.backends.len()
        && candidates
            .iter()
            .zip(&session.backends)
            .all(|(c, b)| c.backend_id == b.backend_id);

    if matches {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition(
            "candidate set does not match the session's backends".to_string(),
        ))
    }
}

fn select_response(
    session: &Session,
    text: &str,
    selected_at: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    let pending = session.pending_turn().ok_or(TransitionError::NoPendingTurn)?;
    let index = pending
        .find_candidate(text)
        .ok_or(TransitionError::InvalidSelection)?;
    let backend_id = pending.candidates[index].backend_id.clone();
    let user_input = pending.user_input.clone();

    let mut next = session.clone();
    if let Some(turn) = next.turns.last_mut() {
        turn.selection = Some(Selection {
            selected_response: text.to_string(),
            selected_backend_id: backend_id,
        });
    }
    next.transcript.push(TranscriptEntry {
        user_input: user_input.clone(),
        response: text.to_string(),
    });

    // Every backend adopts the winner's history so the next round's
    // candidates all continue the same dialogue
    let adopted = session.backends[index].memory.with_exchange(user_input, text);
    for slot in &mut next.backends {
        slot.memory = adopted.clone();
    }

    if next.turn_count < next.turn_budget {
        next.phase = SessionPhase::AwaitingInput;
        return Ok(TransitionResult::new(next));
    }

    let record = next.to_record(selected_at);
    for slot in &mut next.backends {
        slot.memory = BackendMemory::new();
    }
    next.phase = SessionPhase::Finalized;
    Ok(TransitionResult::new(next).with_effect(Effect::persist(record)))
}

fn bind_assignment(
    session: &Session,
    assignment_id: String,
) -> Result<TransitionResult, TransitionError> {
    // Preview workers carry no usable id; stay in preview mode
    if assignment_id.is_empty() || assignment_id == ASSIGNMENT_ID_NOT_AVAILABLE {
        return Ok(TransitionResult::new(session.clone()));
    }

    match &session.assignment_id {
        Some(existing) if *existing == assignment_id => Ok(TransitionResult::new(session.clone())),
        Some(existing) => Err(TransitionError::AssignmentConflict {
            existing: existing.clone(),
        }),
        None => {
            let mut next = session.clone();
            next.assignment_id = Some(assignment_id);
            Ok(TransitionResult::new(next))
        }
    }
}
