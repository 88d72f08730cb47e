//! Completion provider abstraction.
//!
//! The [`Completer`] trait takes the assembled role-tagged context and
//! returns generated text. The concrete backend speaks the OpenAI-compatible
//! `POST /v1/chat/completions` wire format, which also covers providers such
//! as Perplexity via the `completion.url` setting.
//!
//! Provider failures (HTTP errors, network errors, timeouts) surface as
//! [`Error::Completion`] and are distinct from an empty response, which the
//! orchestrator reports as [`Error::EmptyCompletion`]. This layer does not
//! retry; the call has a bounded timeout so a slow provider fails the task
//! instead of hanging the worker.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use crate::models::ChatMessage;

/// Output of a completion call: the generated text (when any) plus
/// provider-reported token usage.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

#[async_trait]
pub trait Completer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;
}

/// Create the configured [`Completer`].
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn Completer>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiCompleter::new(config)?)),
        "disabled" => Err(Error::Validation(
            "completion provider is disabled".to_string(),
        )),
        other => Err(Error::Validation(format!(
            "unknown completion provider: {}",
            other
        ))),
    }
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiCompleter {
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OpenAiCompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(Error::Validation(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Completion("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::Completion(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let response = client
            .post(format!("{}/v1/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Completion(format!("completion timed out after {}s", self.timeout_secs))
                } else {
                    Error::Completion(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Completion(format!(
                "completion API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Completion(e.to_string()))?;

        Ok(parse_completion(&json))
    }
}

fn parse_completion(json: &serde_json::Value) -> Completion {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    let usage = json.get("usage");
    Completion {
        content,
        prompt_tokens: usage
            .and_then(|u| u.get("prompt_tokens"))
            .and_then(|v| v.as_i64()),
        completion_tokens: usage
            .and_then(|u| u.get("completion_tokens"))
            .and_then(|v| v.as_i64()),
    }
}
