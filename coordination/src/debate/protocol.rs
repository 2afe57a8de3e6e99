//! Debate protocol — per-phase rules, message whitelists and termination.
//!
//! The protocol is pure: the orchestrator reports progress after every round
//! and asks whether to run another one.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::config::DebateProtocolConfig;
use super::consensus::{ConsensusProtocol, VoteTally};
use super::idea::ScoringCriteria;
use super::state::{DebateMessage, DebatePhase, MessageType, TerminationReason};
use super::techniques::{Technique, TechniqueLibrary};

/// Protocol violation or invalid configuration. Raised before any round runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("invalid debate configuration: {0}")]
    InvalidConfig(String),

    #[error("message type {message_type} is not allowed in phase {phase}")]
    MessageTypeNotAllowed {
        phase: DebatePhase,
        message_type: MessageType,
    },

    #[error("message belongs to phase {actual}, expected {expected}")]
    PhaseMismatch {
        expected: DebatePhase,
        actual: DebatePhase,
    },

    #[error("message belongs to round {actual}, expected {expected}")]
    RoundMismatch { expected: u32, actual: u32 },

    #[error("invalid phase transition {from} → {to}")]
    InvalidTransition { from: DebatePhase, to: DebatePhase },
}

const DIVERGENCE_TYPES: &[MessageType] = &[
    MessageType::Idea,
    MessageType::Elaboration,
    MessageType::Question,
    MessageType::Summary,
];

const CONVERGENCE_TYPES: &[MessageType] = &[
    MessageType::Evaluation,
    MessageType::Score,
    MessageType::Critique,
    MessageType::Merge,
    MessageType::Summary,
];

const PLANNING_TYPES: &[MessageType] = &[
    MessageType::Plan,
    MessageType::Review,
    MessageType::Vote,
    MessageType::Critique,
    MessageType::Summary,
];

/// Static rules for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRules {
    pub phase: DebatePhase,
    pub max_rounds: u32,
    pub agents_per_round: usize,
    pub temperature: f32,
    pub allowed: Vec<MessageType>,
}

/// Progress reported after a round.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseProgress {
    /// Rounds completed so far (1-indexed count).
    pub round: u32,
    /// Ideas in the pool.
    pub ideas_generated: usize,
    /// Votes from the latest planning round.
    pub votes: VoteTally,
    /// Successful agent turns across the phase.
    pub contributions: u32,
    /// Every idea in the pool holds the maximum score.
    pub all_scored: bool,
}

/// Rule engine for a run.
#[derive(Debug, Clone)]
pub struct DebateProtocol {
    config: DebateProtocolConfig,
    consensus: ConsensusProtocol,
    techniques: TechniqueLibrary,
    criteria: ScoringCriteria,
}

impl DebateProtocol {
    /// Validate the configuration and build the protocol.
    pub fn new(config: DebateProtocolConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let consensus =
            ConsensusProtocol::new(config.min_approval_ratio, config.require_unanimous_approval);
        Ok(Self {
            config,
            consensus,
            techniques: TechniqueLibrary::default(),
            criteria: ScoringCriteria::default(),
        })
    }

    pub fn with_techniques(mut self, techniques: TechniqueLibrary) -> Self {
        self.techniques = techniques;
        self
    }

    pub fn with_criteria(mut self, criteria: ScoringCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Same techniques and criteria under a different run configuration.
    pub fn reconfigured(&self, config: DebateProtocolConfig) -> Result<Self, ProtocolError> {
        Ok(Self::new(config)?
            .with_techniques(self.techniques.clone())
            .with_criteria(self.criteria.clone()))
    }

    pub fn config(&self) -> &DebateProtocolConfig {
        &self.config
    }

    pub fn consensus(&self) -> &ConsensusProtocol {
        &self.consensus
    }

    pub fn criteria(&self) -> &ScoringCriteria {
        &self.criteria
    }

    pub fn allowed_message_types(phase: DebatePhase) -> &'static [MessageType] {
        match phase {
            DebatePhase::Divergence => DIVERGENCE_TYPES,
            DebatePhase::Convergence => CONVERGENCE_TYPES,
            DebatePhase::Planning => PLANNING_TYPES,
            DebatePhase::Complete => &[],
        }
    }

    pub fn max_rounds(&self, phase: DebatePhase) -> u32 {
        match phase {
            DebatePhase::Divergence => self.config.divergence_rounds,
            DebatePhase::Convergence => self.config.convergence_rounds,
            DebatePhase::Planning => self.config.planning_rounds,
            DebatePhase::Complete => 0,
        }
    }

    pub fn agents_per_round(&self, phase: DebatePhase) -> usize {
        match phase {
            DebatePhase::Divergence => self.config.divergence_agents_per_round,
            DebatePhase::Convergence => self.config.convergence_agents_per_round,
            DebatePhase::Planning => self.config.planning_agents_per_round,
            DebatePhase::Complete => 0,
        }
    }

    pub fn temperature(&self, phase: DebatePhase) -> f32 {
        match phase {
            DebatePhase::Divergence => self.config.temperature_divergence,
            DebatePhase::Convergence => self.config.temperature_convergence,
            DebatePhase::Planning | DebatePhase::Complete => self.config.temperature_planning,
        }
    }

    pub fn phase_rules(&self, phase: DebatePhase) -> PhaseRules {
        PhaseRules {
            phase,
            max_rounds: self.max_rounds(phase),
            agents_per_round: self.agents_per_round(phase),
            temperature: self.temperature(phase),
            allowed: Self::allowed_message_types(phase).to_vec(),
        }
    }

    /// Reject message types outside the phase whitelist.
    pub fn validate_message(&self, message: &DebateMessage) -> Result<(), ProtocolError> {
        if Self::allowed_message_types(message.phase).contains(&message.message_type) {
            Ok(())
        } else {
            Err(ProtocolError::MessageTypeNotAllowed {
                phase: message.phase,
                message_type: message.message_type,
            })
        }
    }

    pub fn technique_for_round(&self, round: u32) -> Option<&Technique> {
        self.techniques.for_round(round)
    }

    pub fn consensus_reached(&self, votes: &VoteTally) -> bool {
        self.consensus.is_reached(votes)
    }

    /// Whether another round should run. The round cap always binds.
    pub fn should_continue(&self, phase: DebatePhase, progress: &PhaseProgress) -> bool {
        if progress.round >= self.max_rounds(phase) {
            return false;
        }
        match phase {
            DebatePhase::Divergence => {
                progress.ideas_generated < self.config.min_ideas_to_generate
            }
            DebatePhase::Convergence => !progress.all_scored,
            DebatePhase::Planning => !self.consensus_reached(&progress.votes),
            DebatePhase::Complete => false,
        }
    }

    /// Why a phase stopped, given its final progress.
    pub fn termination_reason(
        &self,
        phase: DebatePhase,
        progress: &PhaseProgress,
        time_exhausted: bool,
    ) -> TerminationReason {
        if progress.contributions == 0 {
            return TerminationReason::Stalled;
        }
        match phase {
            DebatePhase::Divergence
                if progress.ideas_generated >= self.config.min_ideas_to_generate =>
            {
                TerminationReason::Natural
            }
            DebatePhase::Convergence
                if progress.all_scored || progress.round >= self.max_rounds(phase) =>
            {
                TerminationReason::Natural
            }
            DebatePhase::Planning if self.consensus_reached(&progress.votes) => {
                TerminationReason::Consensus
            }
            _ if time_exhausted => TerminationReason::TimeBudget,
            _ => TerminationReason::RoundCap,
        }
    }

    /// Wall-clock budget for a phase.
    pub fn phase_time_budget(&self, phase: DebatePhase) -> Duration {
        if self.config.phase_timeout_seconds > 0 {
            return Duration::from_secs(self.config.phase_timeout_seconds);
        }
        self.config.round_timeout() * self.max_rounds(phase).max(1)
    }

    /// Whether a new round may start after `elapsed` in the phase.
    pub fn may_start_round(&self, phase: DebatePhase, elapsed: Duration) -> bool {
        elapsed < self.phase_time_budget(phase)
    }
}
