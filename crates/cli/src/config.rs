//! Runtime configuration.
//!
//! Loaded from `.devflow/config.toml` (or the path given with `--config`),
//! then overridden by environment variables. Every field has a default, so an
//! absent file is not an error; only the API key must come from somewhere.

use std::path::{Path, PathBuf};
use std::time::Duration;

use llm::OpenAiConfig;
use pipeline::{RetryCeiling, StepLimit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Location of the configuration file when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".devflow/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub observability: ObservabilitySection,
}

/// `[llm]`: generator endpoint and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    /// Normally supplied through `OPENAI_API_KEY` rather than the file.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Cap on any single retry delay, including `Retry-After`.
    pub max_retry_delay_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            base_url: defaults.base_url,
            model: defaults.model,
            temperature: defaults.temperature,
            api_key: None,
            timeout_secs: defaults.timeout.as_secs(),
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_retry_delay_secs: defaults.max_retry_delay.as_secs(),
        }
    }
}

/// `[pipeline]`: engine limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub retry_ceiling: u32,
    pub max_steps: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            retry_ceiling: RetryCeiling::DEFAULT.as_u32(),
            max_steps: StepLimit::DEFAULT.as_u32(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[observability]`: log output and optional OTLP export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilitySection {
    pub log_format: LogFormat,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "info".into(),
            otlp_endpoint: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Loads the configuration file.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Applies environment overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("DEVFLOW_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("DEVFLOW_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(endpoint) = lookup("DEVFLOW_OTLP_ENDPOINT") {
            self.observability.otlp_endpoint = Some(endpoint);
        }
        match lookup("DEVFLOW_LOG_FORMAT").as_deref() {
            Some("json") => self.observability.log_format = LogFormat::Json,
            Some("pretty") => self.observability.log_format = LogFormat::Pretty,
            _ => {}
        }
    }

    pub fn retry_ceiling(&self) -> Result<RetryCeiling, ConfigError> {
        RetryCeiling::new(self.pipeline.retry_ceiling).ok_or_else(|| ConfigError::Invalid {
            message: "pipeline.retry_ceiling must be at least 1".into(),
        })
    }

    pub fn step_limit(&self) -> Result<StepLimit, ConfigError> {
        StepLimit::new(self.pipeline.max_steps).ok_or_else(|| ConfigError::Invalid {
            message: "pipeline.max_steps must be at least 1".into(),
        })
    }

    /// Builds the generator settings.
    pub fn openai_config(&self) -> Result<OpenAiConfig, ConfigError> {
        let api_key = self
            .llm
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid {
                message: "no API key: set OPENAI_API_KEY or llm.api_key".into(),
            })?;

        Ok(OpenAiConfig {
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            api_key,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_attempts: self.llm.max_attempts,
            initial_backoff: Duration::from_millis(self.llm.initial_backoff_ms),
            max_retry_delay: Duration::from_secs(self.llm.max_retry_delay_secs),
        })
    }
}
