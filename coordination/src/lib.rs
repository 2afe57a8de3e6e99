//! Debate Coordination Library
//!
//! Deterministic core of the multi-agent debate engine:
//! - Debate protocol: phases, message whitelists, termination, consensus
//! - Idea scoring, ranking and best-effort extraction from model output
//! - Personas with a closed four-axis personality
//! - Model hierarchy mapping task types to ordered backend candidates
//! - Budget ledger tracking spend per (day, backend, model) against limits
//! - Hot-reloadable routing configuration (prices, hierarchy, limits)
//!
//! Everything here is synchronous. Backend calls, fan-out and the CLI live
//! in the `debate-agents` crate.

#![allow(clippy::uninlined_format_args)]

pub mod budget;
pub mod config;
pub mod conversation;
pub mod debate;
pub mod persona;
pub mod retry;
pub mod router;

// Re-export key debate types
pub use debate::{
    DebateMessage, DebateObserver, DebatePhase, DebateProtocol, DebateProtocolConfig,
    DebateRound, Idea, IdeaPool, MessageType, PhaseOutput, PhaseResult, PlanDraft, ProtocolError,
    ScoringCriteria, TerminationReason, Vote, VoteTally,
};

// Re-export budget types
pub use budget::{
    BudgetLedger, BudgetLimits, BudgetSnapshot, BudgetStatus, LedgerError, LedgerStore,
    PriceTable, UsageRecord, UsageSink,
};

// Re-export routing types
pub use config::{ConfigError, RoutingConfig, RoutingConfigHandle};
pub use router::{Candidate, CostClass, ModelHierarchy, QualityTier, TaskType};

pub use conversation::{ChatMessage, Conversation, Role};
pub use persona::{default_roster, Persona, Personality};
pub use retry::RetryPolicy;
