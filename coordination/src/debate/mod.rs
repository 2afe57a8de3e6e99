//! Multi-phase debate protocol.
//!
//! Deterministic core of a debate run: phase state machine, message
//! whitelists, termination rules, consensus, idea scoring and ranking,
//! free-text extraction, prompt assembly and observer callbacks. The async
//! orchestrator drives these types; nothing in here performs I/O except the
//! JSONL observer.
//!
//! # Debate Flow
//!
//! ```text
//! Divergence ──► Convergence ──► Planning ──► Complete
//!   │ rounds until   │ rounds until    │ round 1: drafts, longest wins
//!   │ ideas ≥ min    │ cap; then rank  │ round 2+: votes until consensus
//!   │ or cap         │ and keep top-K  │ or cap
//! ```

pub mod config;
pub mod consensus;
pub mod extraction;
pub mod idea;
pub mod observer;
pub mod plan;
pub mod prompts;
pub mod protocol;
pub mod state;
pub mod techniques;

pub use config::DebateProtocolConfig;
pub use consensus::{ConsensusProtocol, Vote, VoteTally};
pub use idea::{rank_ideas, Criterion, Idea, IdeaPool, IdeaScore, ScoringCriteria};
pub use observer::{CollectingObserver, DebateObserver, JsonlObserver, NoopObserver};
pub use plan::{merge_drafts, PlanDraft, PlanReview};
pub use protocol::{DebateProtocol, PhaseProgress, PhaseRules, ProtocolError};
pub use state::{
    DebateMessage, DebatePhase, DebateRound, MessageType, PhaseMachine, PhaseOutput, PhaseResult,
    RoundBuilder, TerminationReason,
};
pub use techniques::{Technique, TechniqueFamily, TechniqueLibrary};
