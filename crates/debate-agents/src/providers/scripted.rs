//! Deterministic in-process provider for tests and dry runs.
//!
//! Replies come from, in order: the scripted queue, a per-model failure
//! table, the responder closure, then a fixed default text.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordination::{Conversation, CostClass, RetryPolicy};

use super::errors::ProviderError;
use super::{CompletionOptions, Provider, RouterResponse};

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedReply {
    pub outcome: Result<String, ProviderError>,
    pub delay: Option<Duration>,
}

impl ScriptedReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            delay: None,
        }
    }

    pub fn err(error: ProviderError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = dyn Fn(&Conversation, &CompletionOptions) -> ScriptedReply + Send + Sync;

pub struct ScriptedProvider {
    id: String,
    cost: CostClass,
    default_model: String,
    secondary_model: Option<String>,
    retry: RetryPolicy,
    available: bool,
    queue: Mutex<VecDeque<ScriptedReply>>,
    model_errors: HashMap<String, ProviderError>,
    responder: Option<Arc<Responder>>,
    default_text: String,
    calls: AtomicU32,
    models_requested: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, cost: CostClass, default_model: &str) -> Self {
        Self {
            id: id.to_string(),
            cost,
            default_model: default_model.to_string(),
            secondary_model: None,
            retry: RetryPolicy::none(),
            available: true,
            queue: Mutex::new(VecDeque::new()),
            model_errors: HashMap::new(),
            responder: None,
            default_text: "Title: Scripted idea\nOverall score: 7\nVOTE: APPROVE".to_string(),
            calls: AtomicU32::new(0),
            models_requested: Mutex::new(Vec::new()),
        }
    }

    pub fn with_secondary(mut self, model: &str) -> Self {
        self.secondary_model = Some(model.to_string());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_replies(self, replies: Vec<ScriptedReply>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(replies);
        }
        self
    }

    /// Every call for `model` fails with `error` once the queue is empty.
    pub fn with_model_error(mut self, model: &str, error: ProviderError) -> Self {
        self.model_errors.insert(model.to_string(), error);
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Conversation, &CompletionOptions) -> ScriptedReply + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    pub fn with_default_text(mut self, text: &str) -> Self {
        self.default_text = text.to_string();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Number of `send` calls, retries included.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model names in call order.
    pub fn models_requested(&self) -> Vec<String> {
        self.models_requested
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, conversation: &Conversation, options: &CompletionOptions) -> ScriptedReply {
        if let Some(reply) = self.queue.lock().ok().and_then(|mut q| q.pop_front()) {
            return reply;
        }
        if let Some(error) = self.model_errors.get(&options.model) {
            return ScriptedReply::err(error.clone());
        }
        match &self.responder {
            Some(responder) => responder(conversation, options),
            None => ScriptedReply::ok(self.default_text.clone()),
        }
    }
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("id", &self.id)
            .field("cost", &self.cost)
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
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
        self.available
    }

    async fn send(
        &self,
        conversation: &Conversation,
        options: &CompletionOptions,
    ) -> Result<RouterResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut models) = self.models_requested.lock() {
            models.push(options.model.clone());
        }

        let reply = self.next_reply(conversation, options);
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        let content = reply.outcome?;
        let output_tokens = (content.len() as u64).div_ceil(4);

        Ok(RouterResponse {
            content,
            backend_id: self.id.clone(),
            model_id: options.model.clone(),
            input_tokens: conversation.estimated_tokens(),
            output_tokens,
            cost: 0.0,
            duration_ms: reply.delay.map_or(0, |d| d.as_millis() as u64),
        })
    }
}
