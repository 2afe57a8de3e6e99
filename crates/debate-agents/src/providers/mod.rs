//! Backend providers behind a uniform completion contract.
//!
//! A provider performs one HTTP exchange per [`Provider::send`]. The provided
//! [`Provider::complete`] wraps it in the provider's bounded retry policy, so
//! callers only ever see errors that survived retrying (or were never
//! retriable).

pub mod anthropic;
pub mod cooldown;
pub mod errors;
pub mod openai;
pub mod retry;
pub mod scripted;

use async_trait::async_trait;
use coordination::{Conversation, CostClass, RetryPolicy};
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use cooldown::CooldownGate;
pub use errors::{ProviderError, RetryCategory};
pub use openai::OpenAiCompatProvider;
pub use retry::run_with_retry;
pub use scripted::{ScriptedProvider, ScriptedReply};

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
        }
    }
}

/// Result of a routed completion. Carries the backend and model that
/// actually answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterResponse {
    pub content: String,
    pub backend_id: String,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// USD; zero for free backends.
    pub cost: f64,
    pub duration_ms: u64,
}

impl RouterResponse {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A text-generation backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identifier referenced by the model hierarchy.
    fn id(&self) -> &str;

    fn cost_class(&self) -> CostClass;

    fn default_model(&self) -> &str;

    /// Model tried first when the requested one fails.
    fn secondary_model(&self) -> Option<&str> {
        None
    }

    fn retry_policy(&self) -> &RetryPolicy;

    async fn is_available(&self) -> bool;

    /// One attempt, no retries.
    async fn send(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<RouterResponse, ProviderError>;

    /// `send` with bounded retry for transient failures.
    async fn complete(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<RouterResponse, ProviderError> {
        run_with_retry(self.id(), self.retry_policy(), || {
            self.send(conversation, options)
        })
        .await
    }
}
