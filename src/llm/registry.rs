//! Registry of participating model backends

use super::huggingface::DEFAULT_INFERENCE_URL;
use super::{
    HuggingFaceBackend, InferenceParams, LlmError, LlmErrorKind, LoggingBackend, ModelBackend,
    PromptTemplate,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Models that take part in every comparison when none are configured
pub const DEFAULT_MODEL_IDS: &[&str] = &[
    "google/flan-t5-xl",
    "bigscience/T0_3B",
    "EleutherAI/gpt-j-6B",
];

/// Configuration for the backend set
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub model_ids: Vec<String>,
    pub inference_url: String,
    pub api_token: Option<String>,
    pub params: InferenceParams,
    pub timeout: Duration,
    pub prompt: PromptTemplate,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model_ids: DEFAULT_MODEL_IDS.iter().map(ToString::to_string).collect(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            api_token: None,
            params: InferenceParams::default(),
            timeout: Duration::from_secs(120),
            prompt: PromptTemplate::default(),
        }
    }
}

/// Ordered set of backends. Order is the display order and the tie-break
/// order for duplicate candidates.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn ModelBackend>>,
}

impl BackendRegistry {
    pub fn new(config: &BackendConfig) -> Result<Self, LlmError> {
        let mut backends: Vec<Arc<dyn ModelBackend>> = Vec::with_capacity(config.model_ids.len());

        for model_id in &config.model_ids {
            let backend = HuggingFaceBackend::new(
                model_id.clone(),
                &config.inference_url,
                config.api_token.clone(),
                config.prompt.clone(),
                config.params,
                config.timeout,
            )?;
            backends.push(Arc::new(LoggingBackend::new(Arc::new(backend))));
        }

        Self::from_backends(backends)
    }

    /// Build from already constructed backends, rejecting empty or
    /// duplicate-id sets
    pub fn from_backends(backends: Vec<Arc<dyn ModelBackend>>) -> Result<Self, LlmError> {
        if backends.is_empty() {
            return Err(LlmError::new(
                LlmErrorKind::Rejected,
                "At least one backend must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for backend in &backends {
            if !seen.insert(backend.backend_id().to_string()) {
                return Err(LlmError::new(LlmErrorKind::Rejected, format!(
                    "Duplicate backend id: {}",
                    backend.backend_id()
                )));
            }
        }

        Ok(Self { backends })
    }

    pub fn backends(&self) -> &[Arc<dyn ModelBackend>] {
        &self.backends
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.backend_id().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_all_default_models() {
        let registry = BackendRegistry::new(&BackendConfig::default()).unwrap();
        assert_eq!(registry.backend_ids(), DEFAULT_MODEL_IDS.to_vec());
    }

    #[test]
    fn test_order_follows_config() {
        let config = BackendConfig {
            model_ids: vec!["b/model".to_string(), "a/model".to_string()],
            ..Default::default()
        };
        let registry = BackendRegistry::new(&config).unwrap();
        assert_eq!(registry.backend_ids(), vec!["b/model", "a/model"]);
    }

    #[test]
    fn test_empty_config_rejected() {
        let config = BackendConfig {
            model_ids: vec![],
            ..Default::default()
        };
        assert!(BackendRegistry::new(&config).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = BackendConfig {
            model_ids: vec!["a/model".to_string(), "a/model".to_string()],
            ..Default::default()
        };
        let err = BackendRegistry::new(&config).err().unwrap();
        assert!(err.message.contains("Duplicate backend id"));
    }
}
