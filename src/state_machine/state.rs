//! Session state types

use crate::llm::BackendMemory;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Crowd platforms send this in place of a real assignment id while the
/// worker is only previewing the task
pub const ASSIGNMENT_ID_NOT_AVAILABLE: &str = "ASSIGNMENT_ID_NOT_AVAILABLE";

// ============================================================================
// Turn Records
// ============================================================================

/// One backend's response for a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub backend_id: String,
    pub text: String,
}

impl Candidate {
    pub fn new(backend_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            text: text.into(),
        }
    }
}

/// The human's choice for a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub selected_response: String,
    pub selected_backend_id: String,
}

/// One fan-out round: pending until `selection` is set, resolved after
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRecord {
    pub turn_index: u32,
    pub user_input: String,
    /// Ordered by backend; serialized as an object keyed by backend id
    #[serde(serialize_with = "candidates_as_map")]
    pub candidates: Vec<Candidate>,
    #[serde(flatten)]
    pub selection: Option<Selection>,
}

impl TurnRecord {
    pub fn pending(turn_index: u32, user_input: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            turn_index,
            user_input: user_input.into(),
            candidates,
            selection: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.selection.is_none()
    }

    /// Index of the backend whose candidate equals `text`.
    ///
    /// Independent backends can produce identical text; the lowest backend
    /// index wins so the attribution is deterministic.
    pub fn find_candidate(&self, text: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c.text == text)
    }

    pub fn selected_backend_id(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.selected_backend_id.as_str())
    }
}

fn candidates_as_map<S: Serializer>(candidates: &[Candidate], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(candidates.len()))?;
    for candidate in candidates {
        map.serialize_entry(&candidate.backend_id, &candidate.text)?;
    }
    map.end()
}

/// One resolved `(user input, chosen response)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub user_input: String,
    pub response: String,
}

// ============================================================================
// Session
// ============================================================================

/// Where the session is in the turn protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Ready for the next user input
    #[default]
    AwaitingInput,

    /// Input accepted, candidates being generated. Only ever observed inside
    /// a runtime call; never committed.
    Generating { user_input: String },

    /// Candidates shown, waiting for the human's choice
    AwaitingSelection,

    /// Budget reached and record persisted - read-only
    Finalized,
}

/// A backend taking part in the session, with the history it continues from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSlot {
    pub backend_id: String,
    pub memory: BackendMemory,
}

/// One data-collection interaction.
///
/// Only [`transition`](super::transition) produces new sessions from old
/// ones; everything else reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub assignment_id: Option<String>,
    pub turn_budget: u32,
    pub turn_count: u32,
    pub transcript: Vec<TranscriptEntry>,
    pub turns: Vec<TurnRecord>,
    pub backends: Vec<BackendSlot>,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session with zeroed counters and empty memories
    pub fn new(session_id: impl Into<String>, turn_budget: u32, backend_ids: &[String]) -> Self {
        debug_assert!(turn_budget > 0, "turn budget must be positive");
        Self {
            session_id: session_id.into(),
            assignment_id: None,
            turn_budget,
            turn_count: 0,
            transcript: Vec::new(),
            turns: Vec::new(),
            backends: backend_ids
                .iter()
                .map(|id| BackendSlot {
                    backend_id: id.clone(),
                    memory: BackendMemory::new(),
                })
                .collect(),
            phase: SessionPhase::AwaitingInput,
            created_at: Utc::now(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == SessionPhase::Finalized
    }

    /// No assignment bound yet: the worker is previewing
    pub fn is_preview(&self) -> bool {
        self.assignment_id.is_none()
    }

    pub fn pending_turn(&self) -> Option<&TurnRecord> {
        self.turns.last().filter(|t| t.is_pending())
    }

    pub fn memories(&self) -> Vec<BackendMemory> {
        self.backends.iter().map(|b| b.memory.clone()).collect()
    }

    /// Snapshot for the persistence sink
    pub fn to_record(&self, finalized_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id.clone(),
            assignment_id: self.assignment_id.clone().unwrap_or_default(),
            turn_budget: self.turn_budget,
            created_at: self.created_at,
            finalized_at,
            turns: self.turns.clone(),
        }
    }
}

/// Finalized session as written to the dataset log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// Empty when the worker never bound an assignment (preview mode)
    pub assignment_id: String,
    pub turn_budget: u32,
    pub created_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    pub turns: Vec<TurnRecord>,
}
