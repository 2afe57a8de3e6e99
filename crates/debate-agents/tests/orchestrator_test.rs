//! Orchestrator integration tests — full debate runs against scripted
//! backends behind the real router, ledger and protocol.
//!
//! Tests verify:
//! - Phases run in order and stop for the expected termination reason
//! - Failed and timed-out agent turns are absorbed without aborting the run
//! - Convergence ranks by score and keeps the top-K
//! - Planning keeps the longest draft and stops on consensus
//! - Observers receive every message, round and phase
//! - Unrecordable spend aborts the run only when the ledger is critical

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use coordination::budget::{InMemoryLedgerStore, LedgerEntry, LedgerError, LedgerKey, LedgerStore};
use coordination::debate::{CollectingObserver, JsonlObserver};
use coordination::{
    default_roster, BudgetLedger, Conversation, CostClass, DebatePhase, DebateProtocol,
    DebateProtocolConfig, MessageType, Persona, QualityTier, RoutingConfig, RoutingConfigHandle,
    TerminationReason,
};
use debate_agents::{
    CompletionOptions, DebateError, MultiStageOrchestrator, ProviderError, Router,
    ScriptedProvider, ScriptedReply,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Persona name from a system prompt of the form `You are <name>, <role>.`
fn speaker(conversation: &Conversation) -> String {
    conversation
        .system_prompt()
        .and_then(|s| s.strip_prefix("You are "))
        .and_then(|s| s.split(',').next())
        .unwrap_or_default()
        .to_string()
}

/// Idea number from an evaluation prompt's `# Idea: Idea <n>` heading.
fn idea_number(prompt: &str) -> Option<u32> {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("# Idea: Idea "))
        .and_then(|n| n.trim().parse().ok())
}

/// Answers every prompt kind the orchestrator sends.
///
/// Ideas are numbered in proposal order and every evaluator scores
/// `Idea <n>` with `n`, so later ideas rank higher.
fn debate_responder(
    reviewer_vote: fn(&str) -> &'static str,
) -> impl Fn(&Conversation, &CompletionOptions) -> ScriptedReply + Send + Sync + 'static {
    let proposed = Arc::new(AtomicU32::new(0));
    move |conversation, _options| {
        let prompt = conversation.last_user().unwrap_or_default();
        let name = speaker(conversation);
        if prompt.contains("# Plan under review") {
            return ScriptedReply::ok(format!("Reads well.\nVOTE: {}", reviewer_vote(&name)));
        }
        if prompt.contains("# Selected ideas") {
            return ScriptedReply::ok(format!(
                "Plan by {name}\n1. Build the prototype\n2. Measure adoption"
            ));
        }
        if let Some(n) = idea_number(prompt) {
            return ScriptedReply::ok(format!("Novelty: {n}\nOverall score: {n}\nFair."));
        }
        let n = proposed.fetch_add(1, Ordering::SeqCst) + 1;
        ScriptedReply::ok(format!("Title: Idea {n}\nA concrete proposal from {name}."))
    }
}

fn approve_all(_: &str) -> &'static str {
    "APPROVE"
}

fn local_backend(
    responder: impl Fn(&Conversation, &CompletionOptions) -> ScriptedReply + Send + Sync + 'static,
) -> Arc<ScriptedProvider> {
    Arc::new(
        ScriptedProvider::new("local", CostClass::Local, "llama3.1:8b").with_responder(responder),
    )
}

fn in_memory_ledger() -> Arc<BudgetLedger> {
    Arc::new(BudgetLedger::in_memory(RoutingConfigHandle::default()))
}

/// Router over a single local backend answering every prompt kind.
fn local_router(reviewer_vote: fn(&str) -> &'static str) -> Router {
    Router::new(in_memory_ledger()).with_provider(local_backend(debate_responder(reviewer_vote)))
}

/// The first three default personas: visionary, engineer, skeptic.
fn trio() -> Vec<Persona> {
    default_roster().into_iter().take(3).collect()
}

fn orchestrator(router: Router, config: DebateProtocolConfig) -> MultiStageOrchestrator {
    let protocol = DebateProtocol::new(config).unwrap();
    MultiStageOrchestrator::new(Arc::new(router), protocol)
        .with_roster(trio())
        .with_seed(42)
}

fn small_config() -> DebateProtocolConfig {
    DebateProtocolConfig {
        divergence_rounds: 2,
        divergence_agents_per_round: 3,
        min_ideas_to_generate: 6,
        convergence_rounds: 1,
        convergence_agents_per_round: 2,
        top_ideas_to_keep: 3,
        planning_rounds: 3,
        planning_agents_per_round: 3,
        agent_timeout_seconds: 30,
        ..Default::default()
    }
}

// ── Full run ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_run_reaches_consensus() {
    let router = local_router(approve_all);
    let observer = Arc::new(CollectingObserver::new());
    let orch = orchestrator(router, small_config()).with_observer(observer.clone());

    let result = orch
        .run_debate("Developer tooling for small teams", "", None)
        .await
        .unwrap();

    assert_eq!(
        result.termination(DebatePhase::Divergence),
        Some(TerminationReason::Natural)
    );
    assert_eq!(
        result.termination(DebatePhase::Convergence),
        Some(TerminationReason::Natural)
    );
    assert_eq!(
        result.termination(DebatePhase::Planning),
        Some(TerminationReason::Consensus)
    );

    // Ranked best first; top-K cut from the ranking
    let titles: Vec<&str> = result.ideas.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Idea 6", "Idea 5", "Idea 4", "Idea 3", "Idea 2", "Idea 1"]
    );
    let top: Vec<&str> = result.top_ideas.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(top, vec!["Idea 6", "Idea 5", "Idea 4"]);
    assert!(result.ideas.iter().all(|i| i.scores.len() == 2));

    // Longest draft wins: "The Visionary" is the longest persona name
    let plan = result.plan.as_ref().expect("plan drafted");
    assert_eq!(plan.author_id, "visionary");
    assert_eq!(plan.reviews.len(), 3);
    assert_eq!(plan.idea_ids.len(), 3);
    assert!(result.consensus);

    assert!(result.total_tokens > 0);
    assert_eq!(result.total_cost, 0.0);
    assert!(result.summary_line().contains("planning=consensus"));

    // 6 ideas + 12 evaluations + 3 drafts + 3 votes
    assert_eq!(observer.messages().len(), 24);
    // 2 divergence + 1 convergence + 2 planning rounds
    assert_eq!(observer.rounds().len(), 5);
    let phases: Vec<DebatePhase> = observer.phases().iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        vec![
            DebatePhase::Divergence,
            DebatePhase::Convergence,
            DebatePhase::Planning
        ]
    );
}

#[tokio::test]
async fn test_messages_match_their_phase() {
    let router = local_router(approve_all);
    let observer = Arc::new(CollectingObserver::new());
    let orch = orchestrator(router, small_config()).with_observer(observer.clone());
    orch.run_debate("topic", "", None).await.unwrap();

    for message in observer.messages() {
        let expected: &[MessageType] = match message.phase {
            DebatePhase::Divergence => &[MessageType::Idea],
            DebatePhase::Convergence => &[MessageType::Evaluation],
            _ => &[MessageType::Plan, MessageType::Vote],
        };
        assert!(
            expected.contains(&message.message_type),
            "{} in {}",
            message.message_type,
            message.phase
        );
        if message.message_type == MessageType::Evaluation {
            assert!(message.score.is_some());
            assert_eq!(message.references.len(), 1);
        }
    }
}

#[tokio::test]
async fn test_run_config_override_applies_to_one_run() {
    let router = local_router(approve_all);
    let orch = orchestrator(router, DebateProtocolConfig::default());

    let result = orch
        .run_debate("topic", "", Some(small_config()))
        .await
        .unwrap();

    assert_eq!(result.ideas.len(), 6);
    assert_eq!(result.top_ideas.len(), 3);
    // The orchestrator's own configuration is untouched
    assert_eq!(orch.protocol().config().min_ideas_to_generate, 15);
}

// ── Termination ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_divergence_round_stops_at_round_cap() {
    let router = local_router(approve_all);
    let config = DebateProtocolConfig {
        divergence_rounds: 1,
        divergence_agents_per_round: 2,
        min_ideas_to_generate: 100,
        ..small_config()
    };
    let pair: Vec<Persona> = default_roster().into_iter().take(2).collect();
    let result = orchestrator(router, config)
        .with_roster(pair)
        .run_debate("topic", "", None)
        .await
        .unwrap();

    let divergence = result.phase(DebatePhase::Divergence).unwrap();
    assert_eq!(divergence.rounds_run(), 1);
    assert_eq!(divergence.termination, TerminationReason::RoundCap);
    assert_eq!(result.ideas.len(), 2);
}

#[tokio::test]
async fn test_convergence_settled_early_is_natural() {
    let inner = debate_responder(approve_all);
    let router = Router::new(in_memory_ledger()).with_provider(local_backend(move |c, o| {
        let prompt = c.last_user().unwrap_or_default();
        if idea_number(prompt).is_some() {
            ScriptedReply::ok("Excellent.\nOverall score: 10")
        } else {
            inner(c, o)
        }
    }));
    let config = DebateProtocolConfig {
        divergence_rounds: 1,
        divergence_agents_per_round: 2,
        convergence_rounds: 3,
        ..small_config()
    };

    let result = orchestrator(router, config)
        .run_debate("topic", "", None)
        .await
        .unwrap();

    let convergence = result.phase(DebatePhase::Convergence).unwrap();
    assert_eq!(convergence.rounds_run(), 1);
    assert_eq!(convergence.termination, TerminationReason::Natural);
    assert!(result.ideas.iter().all(|i| i.is_max_scored()));
}

#[tokio::test]
async fn test_missing_approvals_run_planning_to_round_cap() {
    fn only_visionary(name: &str) -> &'static str {
        if name == "The Visionary" {
            "APPROVE"
        } else {
            "REJECT"
        }
    }
    let router = local_router(only_visionary);
    let result = orchestrator(router, small_config())
        .run_debate("topic", "", None)
        .await
        .unwrap();

    let planning = result.phase(DebatePhase::Planning).unwrap();
    // One drafting round, then two rounds of 1/3 approval against 0.7
    assert_eq!(planning.rounds_run(), 3);
    assert_eq!(planning.termination, TerminationReason::RoundCap);
    assert!(!result.consensus);
    assert!(result.plan.is_some());
    assert_eq!(result.plan.unwrap().reviews.len(), 6);
}

#[tokio::test]
async fn test_all_backends_down_stalls_every_phase() {
    let local = Arc::new(
        ScriptedProvider::new("local", CostClass::Local, "llama3.1:8b").with_model_error(
            "llama3.1:8b",
            ProviderError::Unavailable("connection refused".into()),
        ),
    );
    let router = Router::new(in_memory_ledger()).with_provider(local);

    let result = orchestrator(router, small_config())
        .run_debate("topic", "", None)
        .await
        .unwrap();

    for phase in &result.phases {
        assert_eq!(phase.termination, TerminationReason::Stalled, "{}", phase.phase);
        assert_eq!(phase.contributions, 0);
    }
    assert!(result.ideas.is_empty());
    assert!(result.plan.is_none());
    assert!(!result.consensus);
    // Convergence has nothing to score and runs no rounds
    assert_eq!(
        result.phase(DebatePhase::Convergence).unwrap().rounds_run(),
        0
    );
    // Planning keeps trying to draft until the cap
    assert_eq!(result.phase(DebatePhase::Planning).unwrap().rounds_run(), 3);
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_agent_is_absorbed() {
    let inner = debate_responder(approve_all);
    let router = Router::new(in_memory_ledger()).with_provider(local_backend(move |c, o| {
        if speaker(c) == "The Skeptic" {
            ScriptedReply::err(ProviderError::Provider("malformed completion".into()))
        } else {
            inner(c, o)
        }
    }));
    let config = DebateProtocolConfig {
        divergence_rounds: 1,
        ..small_config()
    };

    let result = orchestrator(router, config)
        .run_debate("topic", "", None)
        .await
        .unwrap();

    let divergence = result.phase(DebatePhase::Divergence).unwrap();
    assert_eq!(divergence.contributions, 2);
    assert_eq!(divergence.failures, 1);
    assert_eq!(divergence.rounds[0].failures(), 1);
    assert!(result.ideas.iter().all(|i| i.agent_id != "skeptic"));
    assert_eq!(result.ideas.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_agent_times_out_without_blocking_round() {
    let inner = debate_responder(approve_all);
    let router = Router::new(in_memory_ledger()).with_provider(local_backend(move |c, o| {
        let reply = inner(c, o);
        if speaker(c) == "The Engineer" {
            reply.with_delay(Duration::from_secs(600))
        } else {
            reply
        }
    }));
    let config = DebateProtocolConfig {
        divergence_rounds: 1,
        agent_timeout_seconds: 5,
        ..small_config()
    };

    let result = orchestrator(router, config)
        .run_debate("topic", "", None)
        .await
        .unwrap();

    let divergence = result.phase(DebatePhase::Divergence).unwrap();
    assert_eq!(divergence.failures, 1);
    assert_eq!(result.ideas.len(), 2);
    assert!(result.ideas.iter().all(|i| i.agent_id != "engineer"));
}

// ── Spend ────────────────────────────────────────────────────────────────────

fn paid_backend() -> Arc<ScriptedProvider> {
    Arc::new(
        ScriptedProvider::new("anthropic", CostClass::Paid, "claude-sonnet-4-5")
            .with_responder(debate_responder(approve_all)),
    )
}

#[tokio::test]
async fn test_high_quality_run_spend_matches_ledger() {
    let ledger = in_memory_ledger();
    let router = Router::new(ledger.clone())
        .with_provider(local_backend(debate_responder(approve_all)))
        .with_provider(paid_backend());

    let result = orchestrator(router, small_config())
        .with_quality(QualityTier::High)
        .run_debate("topic", "", None)
        .await
        .unwrap();

    let recorded = ledger.daily_spend(Utc::now().date_naive()).unwrap();
    assert!(result.total_cost > 0.0);
    assert!((result.total_cost - recorded).abs() < 1e-9);
    let by_phase: f64 = result.phases.iter().map(|p| p.total_cost).sum();
    assert!((by_phase - result.total_cost).abs() < 1e-12);
}

/// Reads succeed, writes fail.
struct ReadOnlyStore(InMemoryLedgerStore);

impl LedgerStore for ReadOnlyStore {
    fn increment(
        &self,
        _key: &LedgerKey,
        _delta: &LedgerEntry,
    ) -> Result<LedgerEntry, LedgerError> {
        Err(LedgerError::Io("disk full".into()))
    }

    fn entries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(LedgerKey, LedgerEntry)>, LedgerError> {
        self.0.entries_between(from, to)
    }

    fn name(&self) -> &str {
        "read_only"
    }
}

#[tokio::test]
async fn test_unrecordable_spend_aborts_when_ledger_critical() {
    let config = RoutingConfig {
        ledger_critical: true,
        ..Default::default()
    };
    let ledger = Arc::new(BudgetLedger::new(
        Arc::new(ReadOnlyStore(InMemoryLedgerStore::new())),
        RoutingConfigHandle::new(config),
    ));
    let router = Router::new(ledger)
        .with_provider(local_backend(debate_responder(approve_all)))
        .with_provider(paid_backend());
    let observer = Arc::new(CollectingObserver::new());

    let err = orchestrator(router, small_config())
        .with_quality(QualityTier::High)
        .with_observer(observer.clone())
        .run_debate("topic", "", None)
        .await
        .unwrap_err();

    assert_eq!(err, DebateError::Ledger(LedgerError::Io("disk full".into())));
    assert!(observer.phases().is_empty());
}

// ── Transcript ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_jsonl_transcript_records_every_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcript.jsonl");
    let router = local_router(approve_all);
    let orch = orchestrator(router, small_config())
        .with_observer(Arc::new(JsonlObserver::open(&path).unwrap()));

    orch.run_debate("topic", "", None).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let events: Vec<String> = text
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["event"].as_str().unwrap().to_string()
        })
        .collect();
    let count = |kind: &str| events.iter().filter(|e| *e == kind).count();
    assert_eq!(count("message"), 24);
    assert_eq!(count("round_complete"), 5);
    assert_eq!(count("phase_complete"), 3);
    assert_eq!(events.last().map(String::as_str), Some("phase_complete"));
}
