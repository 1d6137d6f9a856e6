//! OpenAI chat-completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, GeneratedOutput, GenerationContext, GenerationError, Instructions,
    OutputShape, RetryPolicy,
};
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection and model settings for [`OpenAiGenerator`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL of the API, without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    /// Sampling temperature; omitted from the request when `None`.
    pub temperature: Option<f32>,
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per generation call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single retry delay, including one requested by the
    /// service through `Retry-After`.
    pub max_retry_delay: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-5-mini".into(),
            temperature: Some(0.1),
            api_key: String::new(),
            timeout: Duration::from_secs(120),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    approved: bool,
    feedback: String,
}

#[derive(Debug, Deserialize)]
struct PackagePayload {
    requirements_txt: String,
    run_sh: String,
}

/// `response_format` requesting strict JSON for structured shapes.
fn response_format(shape: OutputShape) -> Option<Value> {
    let (name, properties, required) = match shape {
        OutputShape::Text => return None,
        OutputShape::Review => (
            "review",
            json!({
                "approved": { "type": "boolean", "description": "Whether the code satisfies the requirement" },
                "feedback": { "type": "string", "description": "Required changes when not approved" }
            }),
            json!(["approved", "feedback"]),
        ),
        OutputShape::Package => (
            "package",
            json!({
                "requirements_txt": { "type": "string", "description": "Contents of requirements.txt; empty when there are no dependencies" },
                "run_sh": { "type": "string", "description": "Shell script that installs dependencies and runs the program" }
            }),
            json!(["requirements_txt", "run_sh"]),
        ),
    };

    Some(json!({
        "type": "json_schema",
        "json_schema": {
            "name": name,
            "strict": true,
            "schema": {
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false
            }
        }
    }))
}

/// Removes a surrounding Markdown code fence, if the model added one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_output(shape: OutputShape, content: String) -> Result<GeneratedOutput, GenerationError> {
    let malformed = |e: serde_json::Error| GenerationError::Malformed {
        reason: format!("{shape} output is not valid JSON: {e}"),
    };

    match shape {
        OutputShape::Text => Ok(GeneratedOutput::Text { content }),
        OutputShape::Review => {
            let payload: ReviewPayload =
                serde_json::from_str(strip_code_fence(&content)).map_err(malformed)?;
            Ok(GeneratedOutput::Review {
                approved: payload.approved,
                feedback: payload.feedback,
            })
        }
        OutputShape::Package => {
            let payload: PackagePayload =
                serde_json::from_str(strip_code_fence(&content)).map_err(malformed)?;
            Ok(GeneratedOutput::Package {
                requirements_txt: payload.requirements_txt,
                run_sh: payload.run_sh,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// [`ContentGenerator`] that calls an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Unavailable`] if no API key is configured or
    /// the HTTP client cannot be constructed.
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Unavailable {
                reason: "no API key configured".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn send_once(&self, instructions: &Instructions) -> Result<GeneratedOutput, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: &instructions.text,
            }],
            temperature: self.config.temperature,
            response_format: response_format(instructions.shape),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport {
                message: e.to_string(),
                transient: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                code: status.as_u16(),
                body,
                retry_after_secs,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed {
                reason: format!("unreadable response body: {e}"),
            })?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| GenerationError::Malformed {
                reason: "response contained no choices".into(),
            })?;

        if let Some(refusal) = message.refusal {
            return Err(GenerationError::Malformed {
                reason: format!("model refused: {refusal}"),
            });
        }
        let content = message.content.ok_or_else(|| GenerationError::Malformed {
            reason: "response contained no message content".into(),
        })?;

        parse_output(instructions.shape, content)
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        instructions: &Instructions,
        _context: &GenerationContext,
    ) -> Result<GeneratedOutput, GenerationError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;

        loop {
            debug!(
                stage = %instructions.stage,
                model = %self.config.model,
                attempt,
                "Sending generation request"
            );

            let err = match self.send_once(instructions).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            let delay = match err.retry_policy() {
                RetryPolicy::Retryable { after } if attempt < max_attempts => {
                    after.unwrap_or(backoff).min(self.config.max_retry_delay)
                }
                _ => return Err(err),
            };

            warn!(
                stage = %instructions.stage,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Generation request failed; retrying"
            );
            tokio::time::sleep(delay).await;
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}
