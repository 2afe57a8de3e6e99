//! OpenAI-compatible chat completions backend.
//!
//! Serves both the free local engine (llama.cpp / Ollama / vLLM exposing
//! `/v1/chat/completions`) and the paid OpenAI API. The local flavour can
//! sit behind a [`CooldownGate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use coordination::{Conversation, CostClass, RetryPolicy, RoutingConfigHandle};
use serde_json::{json, Value};
use tracing::debug;

use super::cooldown::CooldownGate;
use super::errors::{parse_retry_after, ProviderError};
use super::{CompletionOptions, Provider, RouterResponse};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    secondary_model: Option<String>,
    cost: CostClass,
    retry: RetryPolicy,
    cooldown: Option<Arc<CooldownGate>>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(id: &str, base_url: &str, default_model: &str, cost: CostClass) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            default_model: default_model.to_string(),
            secondary_model: None,
            cost,
            retry: RetryPolicy::default(),
            cooldown: None,
            client: build_client(Duration::from_secs(300)),
        }
    }

    /// Free local engine.
    pub fn local(base_url: &str, model: &str) -> Self {
        Self::new("local", base_url, model, CostClass::Local)
    }

    /// Paid OpenAI API.
    pub fn openai(api_key: &str) -> Self {
        Self::new("openai", OPENAI_BASE_URL, "gpt-4o", CostClass::Paid)
            .with_api_key(api_key)
            .with_secondary_model("gpt-4o-mini")
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_secondary_model(mut self, model: &str) -> Self {
        self.secondary_model = Some(model.to_string());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_cooldown(mut self, interval: Duration) -> Self {
        self.cooldown = (!interval.is_zero()).then(|| Arc::new(CooldownGate::new(interval)));
        self
    }

    /// Cooldown that follows `local_cooldown_ms` across configuration reloads.
    pub fn with_routing_cooldown(mut self, config: RoutingConfigHandle) -> Self {
        self.cooldown = Some(Arc::new(CooldownGate::from_routing(config)));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(conversation: &Conversation, options: &CompletionOptions) -> Value {
        let messages: Vec<Value> = conversation
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();
        json!({
            "model": options.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        })
    }
}

/// Extract content and token usage from a chat completions response.
/// Missing usage falls back to a character-based estimate.
pub fn parse_chat_response(
    body: &Value,
    conversation: &Conversation,
) -> Result<(String, u64, u64), ProviderError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            ProviderError::Provider("response missing choices[0].message.content".to_string())
        })?
        .to_string();
    let input_tokens = body["usage"]["prompt_tokens"]
        .as_u64()
        .unwrap_or_else(|| conversation.estimated_tokens());
    let output_tokens = body["usage"]["completion_tokens"]
        .as_u64()
        .unwrap_or_else(|| (content.len() as u64).div_ceil(4));
    Ok((content, input_tokens, output_tokens))
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn cost_class(&self) -> CostClass {
        self.cost
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
        if self.cost == CostClass::Paid {
            return self.api_key.as_deref().is_some_and(|k| !k.is_empty());
        }
        let mut request = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn send(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<RouterResponse, ProviderError> {
        if let Some(gate) = &self.cooldown {
            gate.wait().await;
        }

        let start = Instant::now();
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&Self::request_body(conversation, options));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
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
        let (content, input_tokens, output_tokens) = parse_chat_response(&body, conversation)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            backend = %self.id,
            model = %options.model,
            input_tokens,
            output_tokens,
            duration_ms,
            "Chat completion finished"
        );

        Ok(RouterResponse {
            content,
            backend_id: self.id.clone(),
            model_id: options.model.clone(),
            input_tokens,
            output_tokens,
            cost: 0.0,
            duration_ms,
        })
    }
}
