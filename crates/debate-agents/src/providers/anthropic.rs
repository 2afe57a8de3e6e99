//! Anthropic Messages API backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use coordination::{Conversation, CostClass, RetryPolicy, Role};
use serde_json::{json, Value};
use tracing::debug;

use super::errors::{parse_retry_after, ProviderError};
use super::{CompletionOptions, Provider, RouterResponse};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    default_model: String,
    secondary_model: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            default_model: "claude-sonnet-4-5".to_string(),
            secondary_model: Some("claude-haiku-4-5".to_string()),
            retry: RetryPolicy::default(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    pub fn with_secondary_model(mut self, model: Option<&str>) -> Self {
        self.secondary_model = model.map(str::to_string);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// System prompt goes in its own field; only user/assistant turns are messages.
    fn request_body(conversation: &Conversation, options: &CompletionOptions) -> Value {
        let messages: Vec<Value> = conversation
            .turns()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();
        let mut body = json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature.min(1.0),
            "messages": messages,
        });
        if let Some(system) = conversation.system_prompt() {
            body["system"] = Value::String(system.to_string());
        }
        body
    }
}

/// Concatenate text blocks and read token usage.
pub fn parse_messages_response(body: &Value) -> Result<(String, u64, u64), ProviderError> {
    let blocks = body["content"]
        .as_array()
        .ok_or_else(|| ProviderError::Provider("response missing content array".to_string()))?;
    let content: String = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    let input_tokens = body["usage"]["input_tokens"].as_u64().unwrap_or(0);
    let output_tokens = body["usage"]["output_tokens"].as_u64().unwrap_or(0);
    Ok((content, input_tokens, output_tokens))
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn cost_class(&self) -> CostClass {
        CostClass::Paid
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn secondary_model(&self) -> Option<&str> {
        self.secondary_model.as_deref()
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn send(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<RouterResponse, ProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&Self::request_body(conversation, options))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok()),
            );
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body, retry_after));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Provider(format!("invalid response body: {e}")))?;
        let (content, input_tokens, output_tokens) = parse_messages_response(&body)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            model = %options.model,
            input_tokens,
            output_tokens,
            duration_ms,
            "Anthropic completion finished"
        );

        Ok(RouterResponse {
            content,
            backend_id: "anthropic".to_string(),
            model_id: options.model.clone(),
            input_tokens,
            output_tokens,
            cost: 0.0,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_moves_system_prompt() {
        let convo = Conversation::from_prompt("question").with_system("persona");
        let body = AnthropicProvider::request_body(
            &convo,
            &CompletionOptions::new("claude-sonnet-4-5", 1.4, 1024),
        );
        assert_eq!(body["system"], "persona");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        // Anthropic caps temperature at 1.0
        assert_eq!(body["temperature"], 1.0);
    }

    #[test]
    fn test_parse_messages_response() {
        let body = json!({
            "content": [
                { "type": "text", "text": "Hello " },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "world" }
            ],
            "usage": { "input_tokens": 20, "output_tokens": 5 }
        });
        let (content, input, output) = parse_messages_response(&body).unwrap();
        assert_eq!(content, "Hello world");
        assert_eq!((input, output), (20, 5));
    }

    #[test]
    fn test_parse_messages_response_missing_content() {
        assert!(parse_messages_response(&json!({ "error": "x" })).is_err());
    }

    #[test]
    fn test_defaults() {
        let provider = AnthropicProvider::new("key");
        assert_eq!(provider.id(), "anthropic");
        assert_eq!(provider.default_model(), "claude-sonnet-4-5");
        assert_eq!(provider.secondary_model(), Some("claude-haiku-4-5"));
    }
}
