//! Budget-aware router.
//!
//! Resolves a backend for each request from the model hierarchy and the
//! ledger's budget state, then walks one declarative fallback chain:
//!
//! ```text
//! primary (hierarchy + budget)
//!   └─► same backend, secondary model
//!         └─► hierarchy free-tier candidate for the task
//!               └─► RouterError::Exhausted
//! ```
//!
//! Spend is recorded only for successful calls to paid backends.

use std::collections::HashMap;
use std::sync::Arc;

use coordination::budget::TracingUsageSink;
use coordination::{
    BudgetLedger, Candidate, ConfigError, Conversation, CostClass, LedgerError, ModelHierarchy,
    QualityTier, TaskType, UsageRecord, UsageSink,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::providers::{CompletionOptions, Provider, ProviderError, RouterResponse};

/// One routed completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub prompt: Conversation,
    pub task_type: TaskType,
    pub quality: QualityTier,
    pub temperature: f32,
    pub max_tokens: u32,
    pub force_local: bool,
    pub force_api: bool,
}

impl RouteRequest {
    pub fn new(prompt: Conversation, task_type: TaskType) -> Self {
        Self {
            prompt,
            task_type,
            quality: QualityTier::Normal,
            temperature: 0.7,
            max_tokens: 2048,
            force_local: false,
            force_api: false,
        }
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn force_local(mut self) -> Self {
        self.force_local = true;
        self
    }

    pub fn force_api(mut self) -> Self {
        self.force_api = true;
        self
    }

    /// Prompt tokens plus the full output allowance.
    pub fn estimated_tokens(&self) -> u64 {
        self.prompt.estimated_tokens() + u64::from(self.max_tokens)
    }
}

/// A failed step of the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteAttempt {
    pub backend: String,
    pub model: String,
    pub error: ProviderError,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouterError {
    #[error("all {} fallback steps failed; last: {}", .attempts.len(), last_error(.attempts))]
    Exhausted { attempts: Vec<RouteAttempt> },

    #[error("no registered backend for task {0}")]
    NoBackend(TaskType),

    #[error("failed to record spend: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn last_error(attempts: &[RouteAttempt]) -> String {
    attempts
        .last()
        .map_or_else(|| "none".to_string(), |a| format!("{}/{}: {}", a.backend, a.model, a.error))
}

impl RouterError {
    /// Whether any step failed in a way that needs external intervention.
    pub fn needs_escalation(&self) -> bool {
        match self {
            Self::Exhausted { attempts } => attempts.iter().any(|a| a.error.needs_escalation()),
            Self::Ledger(_) => true,
            _ => false,
        }
    }
}

pub struct Router {
    providers: HashMap<String, Arc<dyn Provider>>,
    ledger: Arc<BudgetLedger>,
    usage: Arc<dyn UsageSink>,
}

impl Router {
    /// Router over `ledger` and its routing configuration, reporting usage
    /// through tracing.
    pub fn new(ledger: Arc<BudgetLedger>) -> Self {
        Self {
            providers: HashMap::new(),
            ledger,
            usage: Arc::new(TracingUsageSink),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = sink;
        self
    }

    /// Register or replace a provider under its id.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            warn!(backend = %id, "Replaced registered provider");
        }
    }

    pub fn provider(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(id)
    }

    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Probe every registered provider.
    pub async fn availability(&self) -> Vec<(String, bool)> {
        let mut report = Vec::with_capacity(self.providers.len());
        for id in self.backend_ids() {
            if let Some(provider) = self.providers.get(&id) {
                report.push((id, provider.is_available().await));
            }
        }
        report
    }

    fn affordable(&self, candidate: &Candidate, estimated_tokens: u64) -> bool {
        !candidate.is_paid() || self.ledger.can_afford(&candidate.model, estimated_tokens)
    }

    /// First paid candidate that is registered and affordable.
    fn usable_paid<'h>(
        &self,
        hierarchy: &'h ModelHierarchy,
        task: TaskType,
        estimated_tokens: u64,
    ) -> Option<&'h Candidate> {
        hierarchy.candidates(task).iter().find(|c| {
            c.is_paid()
                && self.providers.contains_key(&c.backend)
                && self.affordable(c, estimated_tokens)
        })
    }

    /// Pick the first backend to try.
    fn resolve(
        &self,
        hierarchy: &ModelHierarchy,
        request: &RouteRequest,
        prefer_local: bool,
    ) -> Candidate {
        let task = request.task_type;
        let estimated = request.estimated_tokens();

        if request.force_local {
            return hierarchy.free_fallback(task).clone();
        }

        if request.force_api {
            if let Some(paid) = self.usable_paid(hierarchy, task, estimated) {
                return paid.clone();
            }
            warn!(task = %task, "force_api requested but no affordable paid candidate");
            return hierarchy.free_fallback(task).clone();
        }

        let paid = self.usable_paid(hierarchy, task, estimated);
        if request.quality.prefers_paid() && !prefer_local {
            if let Some(paid) = paid {
                return paid.clone();
            }
        }

        let budget_available = paid.is_some();
        let keep_free_tier = prefer_local || !request.quality.prefers_paid();
        hierarchy
            .select(task, keep_free_tier, budget_available)
            .clone()
    }

    /// Primary, then the primary backend's secondary model, then the
    /// free-tier candidate. Duplicates removed.
    fn fallback_chain(
        &self,
        hierarchy: &ModelHierarchy,
        task: TaskType,
        primary: Candidate,
    ) -> Vec<Candidate> {
        let mut chain = vec![primary];
        if let Some(provider) = self.providers.get(&chain[0].backend) {
            if let Some(secondary) = provider.secondary_model() {
                let step = Candidate::new(&chain[0].backend, secondary, provider.cost_class());
                if !chain.contains(&step) {
                    chain.push(step);
                }
            }
        }
        for free in [hierarchy.free_fallback(task), &hierarchy.default] {
            if !chain.iter().any(|c| c.backend == free.backend && c.model == free.model) {
                chain.push(free.clone());
            }
        }
        chain
    }

    /// Route one request through the fallback chain.
    pub async fn route(&self, request: &RouteRequest) -> Result<RouterResponse, RouterError> {
        let (hierarchy, ledger_critical) = self
            .ledger
            .config()
            .read(|c| (c.hierarchy.clone(), c.ledger_critical))?;
        let prefer_local = self.ledger.should_prefer_local();
        let estimated = request.estimated_tokens();

        let primary = self.resolve(&hierarchy, request, prefer_local);
        debug!(
            task = %request.task_type,
            quality = %request.quality,
            prefer_local,
            primary = %primary,
            "Resolved primary backend"
        );

        let chain = self.fallback_chain(&hierarchy, request.task_type, primary);
        let mut attempts: Vec<RouteAttempt> = Vec::new();

        for step in &chain {
            let Some(provider) = self.providers.get(&step.backend) else {
                debug!(backend = %step.backend, "Skipping unregistered backend");
                continue;
            };
            let paid = provider.cost_class() == CostClass::Paid;
            if paid && !self.ledger.can_afford(&step.model, estimated) {
                debug!(step = %step, "Skipping unaffordable paid step");
                continue;
            }

            let options = CompletionOptions::new(&step.model, request.temperature, request.max_tokens);
            match provider.complete(&request.prompt, &options).await {
                Ok(mut response) => {
                    if paid {
                        self.account(&mut response, ledger_critical)?;
                    } else {
                        response.cost = 0.0;
                    }
                    if !attempts.is_empty() {
                        info!(
                            task = %request.task_type,
                            backend = %response.backend_id,
                            model = %response.model_id,
                            failed_steps = attempts.len(),
                            "Fallback step succeeded"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        step = %step,
                        category = %err.retry_category(),
                        error = %err,
                        "Backend call failed; trying next fallback step"
                    );
                    attempts.push(RouteAttempt {
                        backend: step.backend.clone(),
                        model: step.model.clone(),
                        error: err,
                    });
                }
            }
        }

        if attempts.is_empty() {
            return Err(RouterError::NoBackend(request.task_type));
        }
        let err = RouterError::Exhausted { attempts };
        if err.needs_escalation() {
            error!(
                task = %request.task_type,
                error = %err,
                "Fallback chain exhausted on a non-retriable failure; escalation required"
            );
        }
        Err(err)
    }

    fn account(&self, response: &mut RouterResponse, ledger_critical: bool) -> Result<(), RouterError> {
        match self.ledger.record(
            &response.backend_id,
            &response.model_id,
            response.input_tokens,
            response.output_tokens,
        ) {
            Ok(cost) => response.cost = cost,
            Err(e) if ledger_critical => return Err(RouterError::Ledger(e)),
            Err(e) => {
                error!(backend = %response.backend_id, error = %e, "Failed to record spend");
                response.cost = self.ledger.estimate_cost(
                    &response.model_id,
                    response.input_tokens,
                    response.output_tokens,
                );
            }
        }
        self.usage.report(
            &UsageRecord::new(
                &response.backend_id,
                &response.model_id,
                response.input_tokens,
                response.output_tokens,
                response.cost,
            )
            .with_duration_ms(response.duration_ms),
        );
        Ok(())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("backends", &self.backend_ids())
            .field("ledger", &self.ledger)
            .finish()
    }
}
