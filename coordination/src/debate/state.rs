//! Debate state machine — phases, messages, rounds, and phase results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::consensus::VoteTally;
use super::idea::Idea;
use super::plan::PlanDraft;
use super::protocol::ProtocolError;

/// Phase of a debate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Idea generation.
    Divergence,
    /// Scoring and filtering.
    Convergence,
    /// Plan drafting and review.
    Planning,
    /// All phases finished.
    Complete,
}

impl DebatePhase {
    /// The three phases that run rounds, in order.
    pub fn active() -> &'static [DebatePhase] {
        &[Self::Divergence, Self::Convergence, Self::Planning]
    }

    /// Whether this is the terminal phase.
    pub fn is_terminal(self) -> bool {
        self == Self::Complete
    }

    /// The phase that follows this one.
    pub fn next(self) -> Option<DebatePhase> {
        match self {
            Self::Divergence => Some(Self::Convergence),
            Self::Convergence => Some(Self::Planning),
            Self::Planning => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Valid transitions from this phase. Never backward.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Divergence => &[Self::Convergence],
            Self::Convergence => &[Self::Planning],
            Self::Planning => &[Self::Complete],
            Self::Complete => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Divergence => write!(f, "divergence"),
            Self::Convergence => write!(f, "convergence"),
            Self::Planning => write!(f, "planning"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Kind of content an agent turn carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Idea,
    Elaboration,
    Question,
    Evaluation,
    Score,
    Critique,
    Merge,
    Plan,
    Review,
    Vote,
    Summary,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idea => write!(f, "idea"),
            Self::Elaboration => write!(f, "elaboration"),
            Self::Question => write!(f, "question"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Score => write!(f, "score"),
            Self::Critique => write!(f, "critique"),
            Self::Merge => write!(f, "merge"),
            Self::Plan => write!(f, "plan"),
            Self::Review => write!(f, "review"),
            Self::Vote => write!(f, "vote"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// One agent turn. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateMessage {
    pub id: String,
    pub phase: DebatePhase,
    pub round: u32,
    pub agent_id: String,
    pub agent_name: String,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    /// Ids of ideas or messages this one responds to.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl DebateMessage {
    pub fn new(
        phase: DebatePhase,
        round: u32,
        agent_id: &str,
        agent_name: &str,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phase,
            round,
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            message_type,
            content: content.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
            references: Vec::new(),
            score: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_reference(mut self, id: impl Into<String>) -> Self {
        self.references.push(id.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A completed round. Built through [`RoundBuilder`]; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    round_num: u32,
    phase: DebatePhase,
    topic: String,
    messages: Vec<DebateMessage>,
    summary: Option<String>,
    key_points: Vec<String>,
    decisions: Vec<String>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    failures: u32,
}

impl DebateRound {
    pub fn round_num(&self) -> u32 {
        self.round_num
    }

    pub fn phase(&self) -> DebatePhase {
        self.phase
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn messages(&self) -> &[DebateMessage] {
        &self.messages
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn key_points(&self) -> &[String] {
        &self.key_points
    }

    pub fn decisions(&self) -> &[String] {
        &self.decisions
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Agent turns that failed or timed out in this round.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Distinct agents that contributed at least one message.
    pub fn contributors(&self) -> usize {
        let mut ids: Vec<&str> = self.messages.iter().map(|m| m.agent_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Accumulates one round's messages while it is in flight.
#[derive(Debug)]
pub struct RoundBuilder {
    round_num: u32,
    phase: DebatePhase,
    topic: String,
    messages: Vec<DebateMessage>,
    summary: Option<String>,
    key_points: Vec<String>,
    decisions: Vec<String>,
    started_at: DateTime<Utc>,
    failures: u32,
}

impl RoundBuilder {
    pub fn new(round_num: u32, phase: DebatePhase, topic: &str) -> Self {
        Self {
            round_num,
            phase,
            topic: topic.to_string(),
            messages: Vec::new(),
            summary: None,
            key_points: Vec::new(),
            decisions: Vec::new(),
            started_at: Utc::now(),
            failures: 0,
        }
    }

    /// Append a message whose phase and round match this round.
    pub fn push(&mut self, message: DebateMessage) -> Result<(), ProtocolError> {
        if message.phase != self.phase {
            return Err(ProtocolError::PhaseMismatch {
                expected: self.phase,
                actual: message.phase,
            });
        }
        if message.round != self.round_num {
            return Err(ProtocolError::RoundMismatch {
                expected: self.round_num,
                actual: message.round,
            });
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn add_key_point(&mut self, point: impl Into<String>) {
        self.key_points.push(point.into());
    }

    pub fn add_decision(&mut self, decision: impl Into<String>) {
        self.decisions.push(decision.into());
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn finish(self) -> DebateRound {
        let duration_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;
        DebateRound {
            round_num: self.round_num,
            phase: self.phase,
            topic: self.topic,
            messages: self.messages,
            summary: self.summary,
            key_points: self.key_points,
            decisions: self.decisions,
            started_at: self.started_at,
            duration_ms,
            failures: self.failures,
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Forward-only phase tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMachine {
    phase: DebatePhase,
    transitions: Vec<PhaseTransition>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: DebatePhase::Divergence,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> DebatePhase {
        self.phase
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `to` if it is a valid forward transition.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), ProtocolError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(ProtocolError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Move to the next phase.
    pub fn advance(&mut self, reason: &str) -> Result<DebatePhase, ProtocolError> {
        let next = self.phase.next().ok_or(ProtocolError::InvalidTransition {
            from: self.phase,
            to: self.phase,
        })?;
        self.transition(next, reason)?;
        Ok(next)
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a phase stopped running rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The phase's own goal was met.
    Natural,
    /// The round bound was hit before the goal.
    RoundCap,
    /// Planning reached the approval threshold.
    Consensus,
    /// No agent contributed anything in the whole phase.
    Stalled,
    /// The phase wall-clock budget ran out before the next round.
    TimeBudget,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Natural => write!(f, "natural"),
            Self::RoundCap => write!(f, "round_cap"),
            Self::Consensus => write!(f, "consensus"),
            Self::Stalled => write!(f, "stalled"),
            Self::TimeBudget => write!(f, "time_budget"),
        }
    }
}

/// Phase-specific output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseOutput {
    Divergence {
        ideas: Vec<Idea>,
    },
    Convergence {
        /// Every idea, best first.
        ranked: Vec<Idea>,
        /// The top-K carried into planning.
        top: Vec<Idea>,
    },
    Planning {
        plan: Option<PlanDraft>,
        votes: VoteTally,
        consensus: bool,
    },
}

/// Terminal record of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: DebatePhase,
    pub rounds: Vec<DebateRound>,
    pub output: PhaseOutput,
    pub duration_ms: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub termination: TerminationReason,
    /// Successful agent turns across all rounds.
    pub contributions: u32,
    /// Failed or timed-out agent turns across all rounds.
    pub failures: u32,
}

impl PhaseResult {
    pub fn rounds_run(&self) -> u32 {
        self.rounds.len() as u32
    }

    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} rounds | {} ok / {} failed | {} tokens | ${:.4} | {}ms | {}",
            self.phase,
            self.rounds.len(),
            self.contributions,
            self.failures,
            self.total_tokens,
            self.total_cost,
            self.duration_ms,
            self.termination
        )
    }
}
