//! Server configuration from the environment

use crate::dispatch::DEFAULT_MAX_CONCURRENCY;
use crate::llm::{BackendConfig, PromptError, PromptTemplate};
use crate::runtime::SessionExpiry;
use crate::sync::SyncConfig;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DATA_FILE: &str = "data.jsonl";
const DEFAULT_TURN_BUDGET: u32 = 3;
const DEFAULT_PUSH_FREQUENCY_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var} ({value:?}): {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("Failed to load prompt template: {0}")]
    Prompt(#[from] PromptError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub data_file: String,
    pub turn_budget: u32,
    pub max_concurrency: usize,
    pub session_expiry: SessionExpiry,
    pub backends: BackendConfig,
    /// Present only when a dataset repository is configured
    pub sync: Option<SyncConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset and blank are the same
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let turn_budget = parse_var(&get, "RLHF_TURN_BUDGET", DEFAULT_TURN_BUDGET)?;
        if turn_budget == 0 {
            return Err(invalid("RLHF_TURN_BUDGET", "0", "must be positive"));
        }

        let mut backends = BackendConfig::default();
        if let Some(ids) = get("RLHF_MODEL_IDS") {
            backends.model_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect();
            if backends.model_ids.is_empty() {
                return Err(invalid("RLHF_MODEL_IDS", &ids, "no model ids given"));
            }
        }
        if let Some(url) = get("RLHF_INFERENCE_URL") {
            backends.inference_url = url;
        }
        backends.api_token = get("HF_TOKEN");
        backends.params.temperature =
            parse_var(&get, "RLHF_TEMPERATURE", backends.params.temperature)?;
        backends.params.max_new_tokens =
            parse_var(&get, "RLHF_MAX_NEW_TOKENS", backends.params.max_new_tokens)?;
        backends.timeout = Duration::from_secs(parse_var(
            &get,
            "RLHF_GENERATION_TIMEOUT_SECS",
            backends.timeout.as_secs(),
        )?);
        if let Some(path) = get("RLHF_PROMPT_TEMPLATE") {
            backends.prompt = PromptTemplate::from_file(Path::new(&path))?;
        }

        let mut session_expiry = SessionExpiry::default();
        session_expiry.idle_timeout = Duration::from_secs(parse_var(
            &get,
            "RLHF_SESSION_IDLE_TIMEOUT_SECS",
            session_expiry.idle_timeout.as_secs(),
        )?);
        session_expiry.finalized_retention = Duration::from_secs(parse_var(
            &get,
            "RLHF_FINALIZED_RETENTION_SECS",
            session_expiry.finalized_retention.as_secs(),
        )?);
        if session_expiry.idle_timeout.is_zero() {
            return Err(invalid("RLHF_SESSION_IDLE_TIMEOUT_SECS", "0", "must be positive"));
        }

        let data_dir = PathBuf::from(get("RLHF_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));

        let sync = match get("DATASET_REPO_URL") {
            Some(repo_url) => Some(SyncConfig {
                repo_url,
                data_dir: data_dir.clone(),
                interval: Duration::from_secs(parse_var(
                    &get,
                    "PUSH_FREQUENCY",
                    DEFAULT_PUSH_FREQUENCY_SECS,
                )?),
                force_push: get("FORCE_PUSH").is_some_and(|v| v.eq_ignore_ascii_case("yes")),
            }),
            None => None,
        };

        Ok(Self {
            port: parse_var(&get, "RLHF_PORT", DEFAULT_PORT)?,
            data_dir,
            data_file: get("RLHF_DATA_FILE").unwrap_or_else(|| DEFAULT_DATA_FILE.into()),
            turn_budget,
            max_concurrency: parse_var(&get, "RLHF_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
            session_expiry,
            backends,
            sync,
        })
    }

    /// Full path of the dataset log
    pub fn data_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file)
    }
}

fn parse_var<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &value, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::DEFAULT_MODEL_IDS;
    use std::collections::HashMap;
    use std::io::Write;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.turn_budget, 3);
        assert_eq!(config.max_concurrency, 100);
        assert_eq!(config.data_path(), PathBuf::from("data/data.jsonl"));
        assert_eq!(config.backends.model_ids, DEFAULT_MODEL_IDS);
        assert_eq!(config.backends.timeout, Duration::from_secs(120));
        assert!(config.backends.api_token.is_none());
        assert!(config.sync.is_none());
        assert_eq!(config.session_expiry, SessionExpiry::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RLHF_PORT", "9001"),
            ("RLHF_TURN_BUDGET", "5"),
            ("RLHF_MODEL_IDS", "a/one, b/two ,"),
            ("RLHF_TEMPERATURE", "0.7"),
            ("HF_TOKEN", "hf_secret"),
            ("DATASET_REPO_URL", "https://example.com/data.git"),
            ("PUSH_FREQUENCY", "5"),
            ("FORCE_PUSH", "YES"),
            ("RLHF_SESSION_IDLE_TIMEOUT_SECS", "600"),
            ("RLHF_FINALIZED_RETENTION_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.port, 9001);
        assert_eq!(config.turn_budget, 5);
        assert_eq!(config.backends.model_ids, vec!["a/one", "b/two"]);
        assert!((config.backends.params.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.backends.api_token.as_deref(), Some("hf_secret"));

        let sync = config.sync.unwrap();
        assert_eq!(sync.interval, Duration::from_secs(5));
        assert!(sync.force_push);
        assert_eq!(sync.data_dir, PathBuf::from("data"));

        assert_eq!(config.session_expiry.idle_timeout, Duration::from_secs(600));
        assert!(config.session_expiry.finalized_retention.is_zero());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for vars in [
            [("RLHF_TURN_BUDGET", "0")],
            [("RLHF_TURN_BUDGET", "three")],
            [("RLHF_PORT", "99999")],
            [("RLHF_MODEL_IDS", " , ")],
            [("RLHF_TEMPERATURE", "hot")],
            [("RLHF_SESSION_IDLE_TIMEOUT_SECS", "0")],
        ] {
            let err = config(&vars).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { var, .. } if var == vars[0].0),
                "{vars:?} gave {err}"
            );
        }
    }

    #[test]
    fn test_prompt_template_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"template": "{{history}} | {{input}} =>"}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let loaded = config(&[("RLHF_PROMPT_TEMPLATE", &path)]).unwrap();
        assert_eq!(
            loaded.backends.prompt,
            PromptTemplate::new("{history} | {input} =>").unwrap()
        );

        let err = config(&[("RLHF_PROMPT_TEMPLATE", "/nonexistent/prompt.json")]).unwrap_err();
        assert!(matches!(err, ConfigError::Prompt(_)));
    }
}
