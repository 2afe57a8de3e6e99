//! Debate Agents
//!
//! Async runtime for the debate engine:
//! - Backend providers (local OpenAI-compatible engine, Anthropic, OpenAI)
//!   with bounded retry and a typed failure taxonomy
//! - Budget-aware router with a declarative fallback chain
//! - Multi-stage orchestrator fanning agent turns out per round
//! - Environment-driven engine configuration for the `debate-agents` binary

pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod router;

pub use config::EngineConfig;
pub use orchestrator::{DebateError, DebateResult, MultiStageOrchestrator};
pub use providers::{
    CompletionOptions, Provider, ProviderError, RetryCategory, RouterResponse, ScriptedProvider,
    ScriptedReply,
};
pub use router::{RouteAttempt, RouteRequest, Router, RouterError};
