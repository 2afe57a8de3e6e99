//! Plan drafts and the review log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consensus::Vote;

/// Reviewer feedback on a plan. Kept for downstream use; never applied as edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReview {
    pub agent_id: String,
    pub agent_name: String,
    pub round: u32,
    pub vote: Vote,
    pub content: String,
}

/// One agent's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub round: u32,
    pub content: String,
    /// Ideas the plan was drafted from.
    #[serde(default)]
    pub idea_ids: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<PlanReview>,
    pub created_at: DateTime<Utc>,
}

impl PlanDraft {
    pub fn new(author_id: &str, author_name: &str, round: u32, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            round,
            content: content.to_string(),
            idea_ids: Vec::new(),
            reviews: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_ideas(mut self, idea_ids: Vec<String>) -> Self {
        self.idea_ids = idea_ids;
        self
    }

    pub fn add_review(&mut self, review: PlanReview) {
        self.reviews.push(review);
    }
}

/// Pick the longest draft by character count; first wins ties.
///
/// Placeholder merge strategy. A smarter merge would combine sections from
/// several drafts.
pub fn merge_drafts(drafts: Vec<PlanDraft>) -> Option<PlanDraft> {
    drafts.into_iter().fold(None, |best, draft| match best {
        Some(b) if b.content.chars().count() >= draft.content.chars().count() => Some(b),
        _ => Some(draft),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_picks_longest() {
        let drafts = vec![
            PlanDraft::new("a", "A", 1, "short"),
            PlanDraft::new("b", "B", 1, "the longest plan here"),
            PlanDraft::new("c", "C", 1, "medium plan"),
        ];
        assert_eq!(merge_drafts(drafts).unwrap().author_id, "b");
    }

    #[test]
    fn test_merge_tie_keeps_first() {
        let drafts = vec![
            PlanDraft::new("a", "A", 1, "same"),
            PlanDraft::new("b", "B", 1, "same"),
        ];
        assert_eq!(merge_drafts(drafts).unwrap().author_id, "a");
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_drafts(vec![]).is_none());
    }
}
