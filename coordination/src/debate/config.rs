//! Run-level debate configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::protocol::ProtocolError;

/// Immutable settings for one debate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateProtocolConfig {
    pub divergence_rounds: u32,
    pub divergence_agents_per_round: usize,
    pub min_ideas_to_generate: usize,

    pub convergence_rounds: u32,
    pub convergence_agents_per_round: usize,
    pub top_ideas_to_keep: usize,

    pub planning_rounds: u32,
    pub planning_agents_per_round: usize,
    pub require_unanimous_approval: bool,
    pub min_approval_ratio: f64,

    pub max_tokens_per_response: u32,
    pub temperature_divergence: f32,
    pub temperature_convergence: f32,
    pub temperature_planning: f32,

    /// Per agent call.
    pub agent_timeout_seconds: u64,
    /// Per round; gates starting new rounds.
    pub round_timeout_seconds: u64,
    /// Per phase; 0 derives it from the round timeout and round cap.
    pub phase_timeout_seconds: u64,
}

impl Default for DebateProtocolConfig {
    fn default() -> Self {
        Self {
            divergence_rounds: 3,
            divergence_agents_per_round: 5,
            min_ideas_to_generate: 15,
            convergence_rounds: 2,
            convergence_agents_per_round: 4,
            top_ideas_to_keep: 5,
            planning_rounds: 3,
            planning_agents_per_round: 3,
            require_unanimous_approval: false,
            min_approval_ratio: 0.7,
            max_tokens_per_response: 2048,
            temperature_divergence: 0.9,
            temperature_convergence: 0.3,
            temperature_planning: 0.6,
            agent_timeout_seconds: 120,
            round_timeout_seconds: 600,
            phase_timeout_seconds: 0,
        }
    }
}

impl DebateProtocolConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ProtocolError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ProtocolError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProtocolError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let invalid = |msg: String| Err(ProtocolError::InvalidConfig(msg));

        for (name, rounds) in [
            ("divergence_rounds", self.divergence_rounds),
            ("convergence_rounds", self.convergence_rounds),
            ("planning_rounds", self.planning_rounds),
        ] {
            if rounds == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }
        for (name, agents) in [
            ("divergence_agents_per_round", self.divergence_agents_per_round),
            ("convergence_agents_per_round", self.convergence_agents_per_round),
            ("planning_agents_per_round", self.planning_agents_per_round),
        ] {
            if agents == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }
        if self.min_ideas_to_generate == 0 {
            return invalid("min_ideas_to_generate must be at least 1".to_string());
        }
        if self.top_ideas_to_keep == 0 {
            return invalid("top_ideas_to_keep must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_approval_ratio) {
            return invalid(format!(
                "min_approval_ratio must be within 0..=1, got {}",
                self.min_approval_ratio
            ));
        }
        if self.max_tokens_per_response == 0 {
            return invalid("max_tokens_per_response must be positive".to_string());
        }
        for (name, t) in [
            ("temperature_divergence", self.temperature_divergence),
            ("temperature_convergence", self.temperature_convergence),
            ("temperature_planning", self.temperature_planning),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return invalid(format!("{name} must be within 0..=2, got {t}"));
            }
        }
        if !(self.temperature_divergence > self.temperature_planning
            && self.temperature_planning > self.temperature_convergence)
        {
            return invalid(format!(
                "temperatures must satisfy divergence ({}) > planning ({}) > convergence ({})",
                self.temperature_divergence,
                self.temperature_planning,
                self.temperature_convergence
            ));
        }
        if self.agent_timeout_seconds == 0 || self.round_timeout_seconds == 0 {
            return invalid("timeouts must be positive".to_string());
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_seconds)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_seconds)
    }
}
