//! Model hierarchy — static task → ordered backend candidates.
//!
//! Selection is a pure function of the table and two budget signals:
//!
//! ```text
//! candidates(task)
//!   ├─ prefer_local      → keep free-tier (local) candidates
//!   ├─ !budget_available → keep zero-cost candidates
//!   └─ nothing left      → guaranteed free default
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::task::{CostClass, TaskType};

/// One backend/model pairing in a task's candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    /// Backend identifier (matches a registered provider).
    pub backend: String,
    /// Model name sent to the backend.
    pub model: String,
    /// Cost class of this pairing.
    pub cost: CostClass,
}

impl Candidate {
    pub fn new(backend: impl Into<String>, model: impl Into<String>, cost: CostClass) -> Self {
        Self {
            backend: backend.into(),
            model: model.into(),
            cost,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.cost == CostClass::Paid
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.backend, self.model)
    }
}

/// Invalid hierarchy table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("default candidate {0} is not free-tier")]
    DefaultNotFree(String),

    #[error("task {0} has an empty candidate list")]
    EmptyCandidates(TaskType),
}

/// Ordered candidate table per task type with a guaranteed free default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHierarchy {
    /// Guaranteed free-tier fallback.
    pub default: Candidate,
    /// Ordered candidates, most preferred first.
    #[serde(default)]
    pub tasks: BTreeMap<TaskType, Vec<Candidate>>,
}

impl ModelHierarchy {
    /// Build a hierarchy, checking the default is free-tier.
    pub fn new(
        default: Candidate,
        tasks: BTreeMap<TaskType, Vec<Candidate>>,
    ) -> Result<Self, HierarchyError> {
        let hierarchy = Self { default, tasks };
        hierarchy.validate()?;
        Ok(hierarchy)
    }

    pub fn validate(&self) -> Result<(), HierarchyError> {
        if !self.default.cost.is_free_tier() {
            return Err(HierarchyError::DefaultNotFree(self.default.to_string()));
        }
        if let Some((task, _)) = self.tasks.iter().find(|(_, c)| c.is_empty()) {
            return Err(HierarchyError::EmptyCandidates(*task));
        }
        Ok(())
    }

    /// Ordered candidates for a task (empty if the task has no entry).
    pub fn candidates(&self, task: TaskType) -> &[Candidate] {
        self.tasks.get(&task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pick the first candidate surviving the budget filters.
    pub fn select(&self, task: TaskType, prefer_local: bool, budget_available: bool) -> &Candidate {
        self.candidates(task)
            .iter()
            .filter(|c| !prefer_local || c.cost.is_free_tier())
            .find(|c| budget_available || c.cost.is_zero_cost())
            .unwrap_or(&self.default)
    }

    /// First free-tier candidate for the task, else the default.
    pub fn free_fallback(&self, task: TaskType) -> &Candidate {
        self.candidates(task)
            .iter()
            .find(|c| c.cost.is_free_tier())
            .unwrap_or(&self.default)
    }

    /// First paid candidate for the task, if any.
    pub fn first_paid(&self, task: TaskType) -> Option<&Candidate> {
        self.candidates(task).iter().find(|c| c.is_paid())
    }
}

impl Default for ModelHierarchy {
    fn default() -> Self {
        let local = Candidate::new("local", "llama3.1:8b", CostClass::Local);
        let sonnet = Candidate::new("anthropic", "claude-sonnet-4-5", CostClass::Paid);
        let opus = Candidate::new("anthropic", "claude-opus-4-5", CostClass::Paid);
        let haiku = Candidate::new("anthropic", "claude-haiku-4-5", CostClass::Paid);
        let gpt4o = Candidate::new("openai", "gpt-4o", CostClass::Paid);
        let gpt4o_mini = Candidate::new("openai", "gpt-4o-mini", CostClass::Paid);

        let mut tasks = BTreeMap::new();
        tasks.insert(
            TaskType::IdeaGeneration,
            vec![sonnet.clone(), gpt4o.clone(), local.clone()],
        );
        tasks.insert(
            TaskType::Evaluation,
            vec![gpt4o_mini.clone(), haiku.clone(), local.clone()],
        );
        tasks.insert(
            TaskType::Planning,
            vec![opus, sonnet.clone(), local.clone()],
        );
        tasks.insert(TaskType::Review, vec![sonnet, gpt4o, local.clone()]);
        tasks.insert(
            TaskType::Summarization,
            vec![local.clone(), gpt4o_mini],
        );
        tasks.insert(TaskType::General, vec![local.clone(), haiku]);

        Self {
            default: local,
            tasks,
        }
    }
}
