//! Events that drive a session

use super::state::Candidate;
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Worker events
    UserInput {
        text: String,
    },
    ResponseSelected {
        text: String,
        /// Stamped by the caller so transitions stay pure
        selected_at: DateTime<Utc>,
    },
    AssignmentBound {
        assignment_id: String,
    },

    // Generation events
    CandidatesGenerated {
        candidates: Vec<Candidate>,
    },
}
