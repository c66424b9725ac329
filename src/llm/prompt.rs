//! Conversation prompt template
//!
//! Backends see the shared history followed by the new human turn, framed by
//! a template with `{history}` and `{input}` placeholders.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::BackendMemory;

const HISTORY_VAR: &str = "{history}";
const INPUT_VAR: &str = "{input}";

/// Default assistant-style chat prompt
const DEFAULT_TEMPLATE: &str = r"Assistant is a large language model trained to be helpful, honest and harmless.

Assistant is designed to be able to assist with a wide range of tasks, from answering simple questions to providing in-depth explanations and discussions on a wide range of topics. As a language model, Assistant is able to generate human-like text based on the input it receives, allowing it to engage in natural-sounding conversations and provide responses that are coherent and relevant to the topic at hand.

{history}
Human: {input}
Assistant:";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read prompt file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse prompt file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

/// On-disk prompt format; extra keys such as `input_variables` are ignored
#[derive(Debug, Deserialize)]
struct PromptFile {
    template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        for var in [HISTORY_VAR, INPUT_VAR] {
            if !template.contains(var) {
                return Err(PromptError::MissingPlaceholder(var));
            }
        }
        Ok(Self { template })
    }

    /// Load a JSON prompt file of the form `{"template": "..."}`
    pub fn from_file(path: &Path) -> Result<Self, PromptError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| PromptError::Read {
            path: display.clone(),
            source,
        })?;
        let file: PromptFile = serde_json::from_str(&raw).map_err(|source| PromptError::Parse {
            path: display,
            source,
        })?;
        Self::new(file.template)
    }

    /// Interpolate history and input in a single pass, so placeholder-like
    /// text inside either value is left alone.
    pub fn render(&self, memory: &BackendMemory, input: &str) -> String {
        let history = memory.render();
        let mut out = String::with_capacity(self.template.len() + history.len() + input.len());
        let mut rest = self.template.as_str();

        while let Some(pos) = rest.find('{') {
            let (head, tail) = rest.split_at(pos);
            out.push_str(head);
            if let Some(after) = tail.strip_prefix(HISTORY_VAR) {
                out.push_str(&history);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(INPUT_VAR) {
                out.push_str(input);
                rest = after;
            } else {
                out.push('{');
                rest = tail.strip_prefix('{').unwrap_or_default();
            }
        }
        out.push_str(rest);
        out
    }
}
