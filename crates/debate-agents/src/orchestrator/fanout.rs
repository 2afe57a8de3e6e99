//! Per-round concurrent fan-out.
//!
//! Every agent call of a round is spawned into one `JoinSet` with its own
//! timeout and joined before the round is assembled. A failed, timed-out
//! or panicked call never affects its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use coordination::Persona;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::providers::RouterResponse;
use crate::router::{RouteRequest, Router, RouterError};

/// One agent turn to run.
#[derive(Debug, Clone)]
pub struct AgentCall {
    pub index: usize,
    pub persona: Persona,
    pub request: RouteRequest,
    /// Id of the idea or plan the call is about, if any.
    pub subject: Option<String>,
}

impl AgentCall {
    pub fn new(index: usize, persona: Persona, request: RouteRequest) -> Self {
        Self {
            index,
            persona,
            request,
            subject: None,
        }
    }

    pub fn about(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentFailure {
    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Result of one agent turn.
#[derive(Debug)]
pub struct AgentOutcome {
    pub index: usize,
    pub persona: Persona,
    pub subject: Option<String>,
    pub result: Result<RouterResponse, AgentFailure>,
    pub elapsed: Duration,
}

/// Run all calls concurrently and return their outcomes in call order.
/// Panicked tasks are logged and dropped; the returned count is how many.
pub async fn fan_out(
    router: &Arc<Router>,
    calls: Vec<AgentCall>,
    timeout: Duration,
) -> (Vec<AgentOutcome>, u32) {
    let mut join_set: JoinSet<AgentOutcome> = JoinSet::new();

    for call in calls {
        let router = Arc::clone(router);
        join_set.spawn(async move {
            let start = Instant::now();
            let result = match tokio::time::timeout(timeout, router.route(&call.request)).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(AgentFailure::Router(e)),
                Err(_) => Err(AgentFailure::Timeout(timeout)),
            };
            AgentOutcome {
                index: call.index,
                persona: call.persona,
                subject: call.subject,
                result,
                elapsed: start.elapsed(),
            }
        });
    }

    let mut outcomes = Vec::new();
    let mut panicked = 0u32;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => {
                debug!(
                    agent = %outcome.persona.id,
                    ok = outcome.result.is_ok(),
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Agent call finished"
                );
                outcomes.push(outcome);
            }
            Err(e) => {
                warn!(error = %e, "Agent task panicked");
                panicked += 1;
            }
        }
    }

    outcomes.sort_by_key(|o| o.index);
    (outcomes, panicked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, ScriptedReply};
    use coordination::{
        default_roster, BudgetLedger, Conversation, CostClass, RoutingConfigHandle, TaskType,
    };

    fn router(provider: ScriptedProvider) -> Arc<Router> {
        let ledger = Arc::new(BudgetLedger::in_memory(RoutingConfigHandle::default()));
        Arc::new(Router::new(ledger).with_provider(Arc::new(provider)))
    }

    fn calls(n: usize) -> Vec<AgentCall> {
        default_roster()
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(i, p)| {
                let prompt = Conversation::from_prompt(format!("agent {i}"));
                AgentCall::new(i, p, RouteRequest::new(prompt, TaskType::General))
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_in_call_order_with_timeout() {
        let provider = ScriptedProvider::new("local", CostClass::Local, "llama3.1:8b")
            .with_responder(|convo, _| {
                let prompt = convo.last_user().unwrap_or_default().to_string();
                if prompt == "agent 0" {
                    ScriptedReply::ok("slow").with_delay(Duration::from_secs(60))
                } else {
                    ScriptedReply::ok(format!("reply to {prompt}"))
                        .with_delay(Duration::from_millis(10))
                }
            });
        let (outcomes, panicked) =
            fan_out(&router(provider), calls(3), Duration::from_secs(5)).await;

        assert_eq!(panicked, 0);
        let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(matches!(outcomes[0].result, Err(AgentFailure::Timeout(_))));
        assert_eq!(outcomes[2].result.as_ref().unwrap().content, "reply to agent 2");
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let provider = ScriptedProvider::new("local", CostClass::Local, "llama3.1:8b")
            .with_replies(vec![ScriptedReply::err(
                crate::providers::ProviderError::Unavailable("down".into()),
            )])
            .with_default_text("fine");
        let (outcomes, _) = fan_out(&router(provider), calls(4), Duration::from_secs(5)).await;
        let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(ok, 3);
    }
}
