//! Multi-stage orchestrator.
//!
//! Drives the debate protocol through divergence, convergence and planning.
//! Each round samples personas, fans their calls out through the router,
//! folds successful replies into the idea pool or plan, and reports the
//! round to the observers before the protocol decides whether to go on.
//!
//! ```text
//! run_debate(topic, context)
//!   ├─ divergence   → IdeaPool (append-only)
//!   ├─ convergence  → scores recorded, ranked, top-K kept
//!   └─ planning     → merged draft, reviewer votes, consensus check
//! ```
//!
//! Agent failures are absorbed. A run aborts only on invalid configuration
//! or when spend cannot be recorded and the ledger is marked critical.

pub mod convergence;
pub mod divergence;
pub mod fanout;
pub mod planning;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use coordination::debate::{PhaseMachine, PhaseProgress, RoundBuilder};
use coordination::{
    default_roster, ConfigError, Conversation, DebateMessage, DebateObserver, DebatePhase,
    DebateProtocol, DebateProtocolConfig, DebateRound, Idea, LedgerError, Persona, PhaseOutput,
    PhaseResult, PlanDraft, ProtocolError, QualityTier, TaskType, TerminationReason,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::router::{RouteRequest, Router, RouterError};

pub use fanout::{fan_out, AgentCall, AgentFailure, AgentOutcome};

/// Failure that aborts a whole run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DebateError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("persona roster is empty")]
    EmptyRoster,

    #[error("spend could not be recorded: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DebateError {
    /// Router failures that must abort the run; everything else is absorbed.
    fn from_agent_failure(failure: &AgentFailure) -> Option<Self> {
        match failure {
            AgentFailure::Router(RouterError::Ledger(e)) => Some(Self::Ledger(e.clone())),
            AgentFailure::Router(RouterError::Config(e)) => Some(Self::Config(e.clone())),
            _ => None,
        }
    }
}

/// Final output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub id: String,
    pub topic: String,
    pub phases: Vec<PhaseResult>,
    /// Every idea, best first.
    pub ideas: Vec<Idea>,
    pub top_ideas: Vec<Idea>,
    pub plan: Option<PlanDraft>,
    pub consensus: bool,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DebateResult {
    pub fn phase(&self, phase: DebatePhase) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn termination(&self, phase: DebatePhase) -> Option<TerminationReason> {
        self.phase(phase).map(|p| p.termination)
    }

    pub fn summary_line(&self) -> String {
        let terminations: Vec<String> = self
            .phases
            .iter()
            .map(|p| format!("{}={}", p.phase, p.termination))
            .collect();
        format!(
            "{} ideas | top {} | plan: {} | consensus: {} | {} tokens | ${:.4} | {}ms | {}",
            self.ideas.len(),
            self.top_ideas.len(),
            if self.plan.is_some() { "yes" } else { "no" },
            self.consensus,
            self.total_tokens,
            self.total_cost,
            self.duration_ms,
            terminations.join(" ")
        )
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Topic and context shared by every prompt of a run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunContext<'a> {
    pub protocol: &'a DebateProtocol,
    pub topic: &'a str,
    pub context: &'a str,
}

/// Round bookkeeping for one phase.
pub(crate) struct PhaseTracker {
    phase: DebatePhase,
    start: Instant,
    progress: PhaseProgress,
    rounds: Vec<DebateRound>,
    total_tokens: u64,
    total_cost: f64,
    failures: u32,
    time_exhausted: bool,
}

impl PhaseTracker {
    pub fn new(phase: DebatePhase) -> Self {
        info!(phase = %phase, "Phase started");
        Self {
            phase,
            start: Instant::now(),
            progress: PhaseProgress::default(),
            rounds: Vec::new(),
            total_tokens: 0,
            total_cost: 0.0,
            failures: 0,
            time_exhausted: false,
        }
    }

    pub fn next_round(&self) -> u32 {
        self.progress.round + 1
    }

    pub fn progress_mut(&mut self) -> &mut PhaseProgress {
        &mut self.progress
    }

    pub fn record_success(&mut self, tokens: u64, cost: f64) {
        self.progress.contributions += 1;
        self.total_tokens += tokens;
        self.total_cost += cost;
    }

    /// Absorb a failed agent turn unless it is fatal for the run.
    pub fn record_failure(
        &mut self,
        outcome: &AgentOutcome,
        failure: &AgentFailure,
    ) -> Result<(), DebateError> {
        if let Some(fatal) = DebateError::from_agent_failure(failure) {
            return Err(fatal);
        }
        warn!(
            phase = %self.phase,
            round = self.next_round(),
            agent = %outcome.persona.id,
            error = %failure,
            "Agent turn failed; continuing without it"
        );
        self.failures += 1;
        Ok(())
    }

    pub fn record_panics(&mut self, panicked: u32) {
        self.failures += panicked;
    }

    /// Close the round, advance the counter and notify observers.
    pub fn complete_round(&mut self, round: DebateRound, observers: &[Arc<dyn DebateObserver>]) {
        self.progress.round = round.round_num();
        info!(
            phase = %self.phase,
            round = round.round_num(),
            messages = round.messages().len(),
            failures = round.failures(),
            "Round complete"
        );
        for observer in observers {
            observer.on_round_complete(&round);
        }
        self.rounds.push(round);
    }

    /// Whether to run another round, checking the time budget last.
    pub fn should_continue(&mut self, protocol: &DebateProtocol) -> bool {
        if !protocol.should_continue(self.phase, &self.progress) {
            return false;
        }
        if !protocol.may_start_round(self.phase, self.start.elapsed()) {
            warn!(phase = %self.phase, round = self.progress.round, "Phase time budget exhausted");
            self.time_exhausted = true;
            return false;
        }
        true
    }

    pub fn finish(
        self,
        protocol: &DebateProtocol,
        output: PhaseOutput,
        observers: &[Arc<dyn DebateObserver>],
    ) -> PhaseResult {
        let termination = protocol.termination_reason(self.phase, &self.progress, self.time_exhausted);
        let result = PhaseResult {
            phase: self.phase,
            rounds: self.rounds,
            output,
            duration_ms: self.start.elapsed().as_millis() as u64,
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            termination,
            contributions: self.progress.contributions,
            failures: self.failures,
        };
        info!("{}", result.status_line());
        for observer in observers {
            observer.on_phase_complete(&result);
        }
        result
    }
}

pub struct MultiStageOrchestrator {
    router: Arc<Router>,
    protocol: DebateProtocol,
    roster: Vec<Persona>,
    observers: Vec<Arc<dyn DebateObserver>>,
    quality: QualityTier,
    rng: Mutex<StdRng>,
}

impl MultiStageOrchestrator {
    pub fn new(router: Arc<Router>, protocol: DebateProtocol) -> Self {
        Self {
            router,
            protocol,
            roster: default_roster(),
            observers: Vec::new(),
            quality: QualityTier::Normal,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_roster(mut self, roster: Vec<Persona>) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DebateObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Quality tier requested for every agent turn.
    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    /// Deterministic agent sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn protocol(&self) -> &DebateProtocol {
        &self.protocol
    }

    pub fn roster(&self) -> &[Persona] {
        &self.roster
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// `min(count, roster)` distinct personas, chosen at random.
    pub(crate) fn sample_agents(&self, count: usize) -> Vec<Persona> {
        let count = count.min(self.roster.len());
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.roster
            .choose_multiple(&mut *rng, count)
            .cloned()
            .collect()
    }

    pub(crate) fn agent_timeout(&self, protocol: &DebateProtocol) -> Duration {
        protocol.config().agent_timeout()
    }

    /// Route request for one agent turn with the phase's sampling settings.
    pub(crate) fn request(
        &self,
        protocol: &DebateProtocol,
        phase: DebatePhase,
        prompt: Conversation,
        task: TaskType,
    ) -> RouteRequest {
        RouteRequest::new(prompt, task)
            .with_quality(self.quality)
            .with_temperature(protocol.temperature(phase))
            .with_max_tokens(protocol.config().max_tokens_per_response)
    }

    /// Validate and broadcast a message, then add it to the round.
    pub(crate) fn publish(
        &self,
        protocol: &DebateProtocol,
        builder: &mut RoundBuilder,
        message: DebateMessage,
    ) -> Result<(), DebateError> {
        protocol.validate_message(&message)?;
        for observer in &self.observers {
            observer.on_message(&message);
        }
        builder.push(message)?;
        Ok(())
    }

    pub(crate) fn observers(&self) -> &[Arc<dyn DebateObserver>] {
        &self.observers
    }

    /// Run all three phases on `topic`.
    ///
    /// `config` replaces the orchestrator's protocol configuration for this
    /// run only; it is validated before any round starts.
    pub async fn run_debate(
        &self,
        topic: &str,
        context: &str,
        config: Option<DebateProtocolConfig>,
    ) -> Result<DebateResult, DebateError> {
        let protocol = match config {
            Some(config) => self.protocol.reconfigured(config)?,
            None => self.protocol.clone(),
        };
        if self.roster.is_empty() {
            return Err(DebateError::EmptyRoster);
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            run_id = %run_id,
            topic,
            roster = self.roster.len(),
            quality = %self.quality,
            "Debate started"
        );

        let ctx = RunContext {
            protocol: &protocol,
            topic,
            context,
        };
        let mut machine = PhaseMachine::new();

        let (divergence, pool) = self.run_divergence(ctx).await?;
        machine.advance(&format!("divergence {}", divergence.termination))?;

        let (convergence, pool) = self.run_convergence(ctx, pool).await?;
        machine.advance(&format!("convergence {}", convergence.termination))?;
        let (ranked, top) = match &convergence.output {
            PhaseOutput::Convergence { ranked, top } => (ranked.clone(), top.clone()),
            _ => (pool.ranked(), pool.top(protocol.config().top_ideas_to_keep)),
        };

        let planning = self.run_planning(ctx, &top).await?;
        machine.advance(&format!("planning {}", planning.termination))?;
        let (plan, consensus) = match &planning.output {
            PhaseOutput::Planning {
                plan, consensus, ..
            } => (plan.clone(), *consensus),
            _ => (None, false),
        };

        let phases = vec![divergence, convergence, planning];
        let result = DebateResult {
            id: run_id,
            topic: topic.to_string(),
            total_tokens: phases.iter().map(|p| p.total_tokens).sum(),
            total_cost: phases.iter().map(|p| p.total_cost).sum(),
            phases,
            ideas: ranked,
            top_ideas: top,
            plan,
            consensus,
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
            completed_at: Utc::now(),
        };
        info!(run_id = %result.id, "{}", result.summary_line());
        Ok(result)
    }
}

impl std::fmt::Debug for MultiStageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStageOrchestrator")
            .field("router", &self.router)
            .field("roster", &self.roster.len())
            .field("observers", &self.observers.len())
            .field("quality", &self.quality)
            .finish()
    }
}
