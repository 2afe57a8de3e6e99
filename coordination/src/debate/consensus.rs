//! Consensus protocol — planning votes and the approval threshold.

use serde::{Deserialize, Serialize};

/// Reviewer vote on the current plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    /// Plan is acceptable as-is.
    Approve,
    /// Plan needs changes.
    Revise,
    /// Plan should be abandoned.
    Reject,
}

impl Vote {
    /// Marker string reviewers are asked to emit.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Revise => "REVISE",
            Self::Reject => "REJECT",
        }
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Revise => write!(f, "revise"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Vote counts for one planning round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: u32,
    pub revise: u32,
    pub reject: u32,
}

impl VoteTally {
    pub fn from_votes(votes: &[Vote]) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            tally.add(*vote);
        }
        tally
    }

    pub fn add(&mut self, vote: Vote) {
        match vote {
            Vote::Approve => self.approve += 1,
            Vote::Revise => self.revise += 1,
            Vote::Reject => self.reject += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.approve + self.revise + self.reject
    }

    /// Approvals over votes cast; `None` when nothing was cast.
    pub fn approval_ratio(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.approve as f64 / total as f64),
        }
    }
}

impl std::fmt::Display for VoteTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} approve / {} revise / {} reject",
            self.approve, self.revise, self.reject
        )
    }
}

/// Approval threshold for ending planning early.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusProtocol {
    /// Minimum approvals/total for consensus.
    pub min_approval_ratio: f64,
    /// Require every cast vote to approve.
    pub require_unanimous: bool,
}

impl ConsensusProtocol {
    pub fn new(min_approval_ratio: f64, require_unanimous: bool) -> Self {
        Self {
            min_approval_ratio,
            require_unanimous,
        }
    }

    /// Whether the tally reaches consensus. Zero votes never do.
    pub fn is_reached(&self, tally: &VoteTally) -> bool {
        let Some(ratio) = tally.approval_ratio() else {
            return false;
        };
        if self.require_unanimous {
            tally.approve == tally.total()
        } else {
            ratio >= self.min_approval_ratio
        }
    }
}

impl Default for ConsensusProtocol {
    fn default() -> Self {
        Self {
            min_approval_ratio: 0.7,
            require_unanimous: false,
        }
    }
}
