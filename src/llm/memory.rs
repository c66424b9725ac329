//! Per-backend conversational memory

use serde::{Deserialize, Serialize};

const HUMAN_PREFIX: &str = "Human";
const AI_PREFIX: &str = "Assistant";

/// One completed exchange on the conversation path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub human: String,
    pub assistant: String,
}

/// Conversation history a backend continues from.
///
/// Values are immutable once built; extending a memory produces a new one so
/// a candidate branch never leaks into the shared history until it is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendMemory {
    exchanges: Vec<Exchange>,
}

impl BackendMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this history extended by one exchange
    #[must_use]
    pub fn with_exchange(&self, human: impl Into<String>, assistant: impl Into<String>) -> Self {
        let mut exchanges = self.exchanges.clone();
        exchanges.push(Exchange {
            human: human.into(),
            assistant: assistant.into(),
        });
        Self { exchanges }
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Render as a `Human:` / `Assistant:` transcript for prompt interpolation
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|e| format!("{HUMAN_PREFIX}: {}\n{AI_PREFIX}: {}", e.human, e.assistant))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
