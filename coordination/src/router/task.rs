//! Task, quality and cost classification used for backend routing.

use serde::{Deserialize, Serialize};

/// Kind of work an agent turn performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Divergent idea generation.
    IdeaGeneration,
    /// Scoring ideas against criteria.
    Evaluation,
    /// Drafting an implementation plan.
    Planning,
    /// Reviewing and voting on a plan.
    Review,
    /// Condensing a round into a summary.
    Summarization,
    /// Anything else.
    General,
}

impl TaskType {
    /// All task types.
    pub fn all() -> &'static [TaskType] {
        &[
            Self::IdeaGeneration,
            Self::Evaluation,
            Self::Planning,
            Self::Review,
            Self::Summarization,
            Self::General,
        ]
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdeaGeneration => write!(f, "idea_generation"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Planning => write!(f, "planning"),
            Self::Review => write!(f, "review"),
            Self::Summarization => write!(f, "summarization"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Requested output quality for a routed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Low,
    Normal,
    High,
    Critical,
}

impl QualityTier {
    /// Whether this tier prefers paid backends when the budget allows.
    pub fn prefers_paid(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::str::FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown quality tier: {other}")),
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Cost class of a backend candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostClass {
    /// Locally hosted engine: free tier and zero cost.
    Local,
    /// Hosted but zero marginal cost (free API quota).
    FreeApi,
    /// Metered paid API.
    Paid,
}

impl CostClass {
    /// Free-tier candidates are the ones `prefer_local` keeps.
    pub fn is_free_tier(self) -> bool {
        matches!(self, Self::Local)
    }

    /// Zero-cost candidates are the ones kept when no budget is available.
    pub fn is_zero_cost(self) -> bool {
        !matches!(self, Self::Paid)
    }
}

impl std::fmt::Display for CostClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::FreeApi => write!(f, "free_api"),
            Self::Paid => write!(f, "paid"),
        }
    }
}
