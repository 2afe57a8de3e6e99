//! Ideas, evaluator scores, weighted criteria and ranking.
//!
//! Ideas are created during divergence and only ever gain scores and merge
//! links afterwards. The pool has no removal operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Upper bound of every score.
pub const MAX_SCORE: f64 = 10.0;

/// Score used when none can be extracted.
pub const NEUTRAL_SCORE: f64 = 5.0;

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        NEUTRAL_SCORE
    } else {
        score.clamp(0.0, MAX_SCORE)
    }
}

/// Scoring criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Novelty,
    Feasibility,
    EcosystemRelevance,
    Impact,
    Urgency,
}

impl Criterion {
    pub fn all() -> &'static [Criterion] {
        &[
            Self::Novelty,
            Self::Feasibility,
            Self::EcosystemRelevance,
            Self::Impact,
            Self::Urgency,
        ]
    }

    /// Human label used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Novelty => "Novelty",
            Self::Feasibility => "Feasibility",
            Self::EcosystemRelevance => "Ecosystem relevance",
            Self::Impact => "Impact",
            Self::Urgency => "Urgency",
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Novelty => write!(f, "novelty"),
            Self::Feasibility => write!(f, "feasibility"),
            Self::EcosystemRelevance => write!(f, "ecosystem_relevance"),
            Self::Impact => write!(f, "impact"),
            Self::Urgency => write!(f, "urgency"),
        }
    }
}

/// Criterion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringCriteria {
    pub novelty: f64,
    pub feasibility: f64,
    pub ecosystem_relevance: f64,
    pub impact: f64,
    pub urgency: f64,
}

impl ScoringCriteria {
    pub fn weight(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Novelty => self.novelty,
            Criterion::Feasibility => self.feasibility,
            Criterion::EcosystemRelevance => self.ecosystem_relevance,
            Criterion::Impact => self.impact,
            Criterion::Urgency => self.urgency,
        }
    }

    /// Criteria ordered by descending weight.
    pub fn ranked(&self) -> Vec<(Criterion, f64)> {
        let mut ranked: Vec<(Criterion, f64)> = Criterion::all()
            .iter()
            .map(|c| (*c, self.weight(*c)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Weighted mean over the criteria present in `scores`.
    pub fn weighted(&self, scores: &BTreeMap<Criterion, f64>) -> Option<f64> {
        let (sum, weights) = scores
            .iter()
            .map(|(c, s)| (self.weight(*c), clamp_score(*s)))
            .filter(|(w, _)| *w > 0.0)
            .fold((0.0, 0.0), |(sum, weights), (w, s)| (sum + w * s, weights + w));
        (weights > 0.0).then(|| sum / weights)
    }
}

impl Default for ScoringCriteria {
    fn default() -> Self {
        Self {
            novelty: 0.30,
            feasibility: 0.20,
            ecosystem_relevance: 0.20,
            impact: 0.20,
            urgency: 0.10,
        }
    }
}

/// One evaluator's score for an idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaScore {
    pub evaluator_id: String,
    pub round: u32,
    pub score: f64,
    #[serde(default)]
    pub criteria: BTreeMap<Criterion, f64>,
}

impl IdeaScore {
    pub fn new(evaluator_id: &str, round: u32, score: f64) -> Self {
        Self {
            evaluator_id: evaluator_id.to_string(),
            round,
            score: clamp_score(score),
            criteria: BTreeMap::new(),
        }
    }

    pub fn with_criteria(mut self, criteria: BTreeMap<Criterion, f64>) -> Self {
        self.criteria = criteria;
        self
    }
}

/// A candidate proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: String,
    pub title: String,
    pub content: String,
    pub agent_id: String,
    pub agent_name: String,
    pub round: u32,
    #[serde(default)]
    pub scores: Vec<IdeaScore>,
    /// Ids of ideas folded into this one.
    #[serde(default)]
    pub merged_from: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Idea {
    pub fn new(title: &str, content: &str, agent_id: &str, agent_name: &str, round: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            round,
            scores: Vec::new(),
            merged_from: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Mean of recorded scores; `None` until someone scores it.
    pub fn total_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().map(|s| s.score).sum::<f64>() / self.scores.len() as f64)
    }

    pub fn record_score(&mut self, score: IdeaScore) {
        self.scores.push(IdeaScore {
            score: clamp_score(score.score),
            ..score
        });
    }

    pub fn is_max_scored(&self) -> bool {
        self.total_score().is_some_and(|s| s >= MAX_SCORE)
    }

    /// Record that `other_id` was folded into this idea.
    pub fn merge_from(&mut self, other_id: &str) -> bool {
        if other_id == self.id || self.merged_from.iter().any(|id| id == other_id) {
            return false;
        }
        self.merged_from.push(other_id.to_string());
        true
    }
}

/// Descending by total score, unscored last; ties keep input order.
pub fn compare_by_score(a: &Idea, b: &Idea) -> Ordering {
    match (a.total_score(), b.total_score()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn rank_ideas(ideas: &[Idea]) -> Vec<Idea> {
    let mut ranked = ideas.to_vec();
    ranked.sort_by(compare_by_score);
    ranked
}

/// Append-only idea collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaPool {
    ideas: Vec<Idea>,
}

impl IdeaPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ideas(ideas: Vec<Idea>) -> Self {
        Self { ideas }
    }

    pub fn push(&mut self, idea: Idea) {
        self.ideas.push(idea);
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }

    pub fn ideas(&self) -> &[Idea] {
        &self.ideas
    }

    pub fn get(&self, id: &str) -> Option<&Idea> {
        self.ideas.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Idea> {
        self.ideas.iter_mut().find(|i| i.id == id)
    }

    pub fn titles(&self) -> Vec<String> {
        self.ideas.iter().map(|i| i.title.clone()).collect()
    }

    /// Ideas still eligible for scoring.
    pub fn needing_scores(&self) -> Vec<Idea> {
        self.ideas
            .iter()
            .filter(|i| !i.is_max_scored())
            .cloned()
            .collect()
    }

    /// Link ideas with case-insensitively equal titles to the earliest one.
    /// Returns the number of new links.
    pub fn link_duplicates(&mut self) -> usize {
        let mut first_by_title: BTreeMap<String, usize> = BTreeMap::new();
        let mut links = Vec::new();
        for (idx, idea) in self.ideas.iter().enumerate() {
            let key = idea.title.trim().to_lowercase();
            match first_by_title.get(&key) {
                Some(&first) => links.push((first, idea.id.clone())),
                None => {
                    first_by_title.insert(key, idx);
                }
            }
        }
        links
            .into_iter()
            .filter(|(first, id)| self.ideas[*first].merge_from(id))
            .count()
    }

    pub fn ranked(&self) -> Vec<Idea> {
        rank_ideas(&self.ideas)
    }

    pub fn top(&self, k: usize) -> Vec<Idea> {
        self.ranked().into_iter().take(k).collect()
    }

    pub fn into_ideas(self) -> Vec<Idea> {
        self.ideas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea(title: &str) -> Idea {
        Idea::new(title, "content", "agent", "Agent", 1)
    }

    fn scored(title: &str, scores: &[f64]) -> Idea {
        let mut i = idea(title);
        for (n, s) in scores.iter().enumerate() {
            i.record_score(IdeaScore::new(&format!("e{n}"), 1, *s));
        }
        i
    }

    #[test]
    fn test_total_score_undefined_without_scores() {
        assert_eq!(idea("x").total_score(), None);
    }

    #[test]
    fn test_total_score_is_mean() {
        let i = scored("x", &[4.0, 8.0, 6.0]);
        assert_eq!(i.total_score(), Some(6.0));
    }

    #[test]
    fn test_scores_clamped() {
        let i = scored("x", &[42.0]);
        assert_eq!(i.total_score(), Some(MAX_SCORE));
        assert!(i.is_max_scored());
        let low = scored("y", &[-3.0]);
        assert_eq!(low.total_score(), Some(0.0));
    }

    #[test]
    fn test_rank_descending_unscored_last() {
        let ideas = vec![
            idea("unscored"),
            scored("low", &[2.0]),
            scored("high", &[9.0]),
            scored("mid", &[5.0]),
        ];
        let ranked = rank_ideas(&ideas);
        let titles: Vec<&str> = ranked.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid", "low", "unscored"]);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let ideas = vec![scored("a", &[5.0]), scored("b", &[5.0]), scored("c", &[5.0])];
        let ranked = rank_ideas(&ideas);
        assert_eq!(ranked[0].title, "a");
        assert_eq!(ranked[2].title, "c");
    }

    #[test]
    fn test_merge_from_keeps_provenance() {
        let mut a = idea("a");
        let b = idea("b");
        assert!(a.merge_from(&b.id));
        assert!(!a.merge_from(&b.id));
        let self_id = a.id.clone();
        assert!(!a.merge_from(&self_id));
        assert_eq!(a.merged_from, vec![b.id]);
    }

    #[test]
    fn test_link_duplicates_never_removes() {
        let mut pool = IdeaPool::new();
        pool.push(idea("Shared Cache"));
        pool.push(idea("shared cache "));
        pool.push(idea("Other"));
        assert_eq!(pool.link_duplicates(), 1);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.ideas()[0].merged_from.len(), 1);
        // idempotent
        assert_eq!(pool.link_duplicates(), 0);
    }

    #[test]
    fn test_needing_scores_skips_max() {
        let pool = IdeaPool::from_ideas(vec![scored("max", &[10.0]), scored("mid", &[5.0]), idea("new")]);
        let pending = pool.needing_scores();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|i| i.title != "max"));
    }

    #[test]
    fn test_weighted_criteria() {
        let criteria = ScoringCriteria::default();
        let mut scores = BTreeMap::new();
        scores.insert(Criterion::Novelty, 10.0);
        scores.insert(Criterion::Urgency, 0.0);
        // (0.3 * 10 + 0.1 * 0) / 0.4
        let weighted = criteria.weighted(&scores).unwrap();
        assert!((weighted - 7.5).abs() < 1e-9);
        assert!(criteria.weighted(&BTreeMap::new()).is_none());
    }

    #[test]
    fn test_novelty_weighs_most() {
        let ranked = ScoringCriteria::default().ranked();
        assert_eq!(ranked[0].0, Criterion::Novelty);
    }

    #[test]
    fn test_top_k() {
        let pool = IdeaPool::from_ideas(vec![scored("a", &[1.0]), scored("b", &[9.0]), scored("c", &[5.0])]);
        let top: Vec<String> = pool.top(2).into_iter().map(|i| i.title).collect();
        assert_eq!(top, vec!["b", "c"]);
    }
}
