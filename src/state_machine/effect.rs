//! Effects produced by state transitions

use super::state::SessionRecord;
use crate::llm::BackendMemory;

/// Effects to be executed after a state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Fan the input out to every backend, each with its own memory
    DispatchGeneration {
        user_input: String,
        memories: Vec<BackendMemory>,
    },

    /// Append the finalized session to the dataset log
    PersistRecord { record: SessionRecord },
}

impl Effect {
    pub fn dispatch(user_input: impl Into<String>, memories: Vec<BackendMemory>) -> Self {
        Effect::DispatchGeneration {
            user_input: user_input.into(),
            memories,
        }
    }

    pub fn persist(record: SessionRecord) -> Self {
        Effect::PersistRecord { record }
    }
}
