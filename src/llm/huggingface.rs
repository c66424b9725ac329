//! Hugging Face Inference API backend

use super::{BackendMemory, LlmError, LlmErrorKind, ModelBackend, PromptTemplate};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceParams {
    pub temperature: f32,
    pub max_new_tokens: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_new_tokens: 256,
        }
    }
}

/// Backend for one model repository on the hosted inference API
pub struct HuggingFaceBackend {
    client: Client,
    api_token: Option<String>,
    model_id: String,
    endpoint: String,
    prompt: PromptTemplate,
    params: InferenceParams,
}

impl HuggingFaceBackend {
    pub fn new(
        model_id: impl Into<String>,
        base_url: &str,
        api_token: Option<String>,
        prompt: PromptTemplate,
        params: InferenceParams,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let model_id = model_id.into();
        let endpoint = format!("{}/{}", base_url.trim_end_matches('/'), model_id);

        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_token,
            model_id,
            endpoint,
            prompt,
            params,
        })
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let parsed = serde_json::from_str::<InferenceErrorBody>(body).ok();
        let estimated = parsed
            .as_ref()
            .and_then(|p| p.estimated_time)
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)));
        let message = parsed.map_or_else(|| body.to_string(), |p| p.error);

        let kind = match status.as_u16() {
            401 | 403 => LlmErrorKind::Unauthorized,
            429 => LlmErrorKind::RateLimited,
            503 => return LlmError::model_loading(format!("Model unavailable: {message}"), estimated),
            500..=599 => LlmErrorKind::Upstream,
            _ => LlmErrorKind::Rejected,
        };
        LlmError::new(kind, format!("HTTP {status}: {message}"))
    }
}

/// Text-generation models echo the prompt; text2text models do not.
fn strip_prompt_echo(generated: &str, prompt: &str) -> String {
    generated
        .strip_prefix(prompt)
        .unwrap_or(generated)
        .trim()
        .to_string()
}

#[async_trait]
impl ModelBackend for HuggingFaceBackend {
    async fn generate(&self, memory: &BackendMemory, input: &str) -> Result<String, LlmError> {
        let prompt = self.prompt.render(memory, input);
        let request = InferenceRequest {
            inputs: &prompt,
            parameters: self.params,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let malformed = |detail: String| {
            LlmError::new(LlmErrorKind::MalformedResponse, format!("{detail} - body: {body}"))
        };
        let outputs: Vec<GeneratedText> =
            serde_json::from_str(&body).map_err(|e| malformed(format!("Unparseable generation: {e}")))?;
        let first = outputs
            .into_iter()
            .next()
            .ok_or_else(|| malformed("No generations returned".to_string()))?;

        Ok(strip_prompt_echo(&first.generated_text, &prompt))
    }

    fn backend_id(&self) -> &str {
        &self.model_id
    }
}

// Inference API wire types

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParams,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct InferenceErrorBody {
    error: String,
    #[serde(default)]
    estimated_time: Option<f64>,
}
