//! Best-effort extraction of titles, scores and votes from model output.
//!
//! Every function here returns a value or a default. Nothing panics or
//! errors on malformed text.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::consensus::Vote;
use super::idea::{clamp_score, Criterion, ScoringCriteria, NEUTRAL_SCORE};

const MAX_TITLE_CHARS: usize = 120;

static TITLE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t>*#-]*\**title\**[ \t]*[:\-–][ \t]*(.+)$")
        .expect("TITLE_LABEL_RE regex should compile")
});

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{1,3}[ \t]+(.+)$").expect("HEADING_RE regex should compile")
});

static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*\n]{3,})\*\*").expect("BOLD_RE regex should compile")
});

static OVERALL_SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:overall|total|final)(?:\s+score)?\s*[:=]?\s*\**\s*(\d+(?:\.\d+)?)")
        .expect("OVERALL_SCORE_RE regex should compile")
});

static SCORE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bscore\s*[:=]\s*\**\s*(\d+(?:\.\d+)?)")
        .expect("SCORE_LABEL_RE regex should compile")
});

static OUT_OF_TEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*10\b").expect("OUT_OF_TEN_RE regex should compile")
});

static CRITERION_RES: LazyLock<Vec<(Criterion, Regex)>> = LazyLock::new(|| {
    let keyword = |c: Criterion| match c {
        Criterion::Novelty => "novelty",
        Criterion::Feasibility => "feasibility",
        Criterion::EcosystemRelevance => r"ecosystem(?:[ _]relevance)?",
        Criterion::Impact => "impact",
        Criterion::Urgency => "urgency",
    };
    Criterion::all()
        .iter()
        .map(|c| {
            let pattern = format!(r"(?i)\b{}\b[^\d\n]{{0,30}}?(\d+(?:\.\d+)?)", keyword(*c));
            (
                *c,
                Regex::new(&pattern).expect("criterion regex should compile"),
            )
        })
        .collect()
});

static VOTE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bvote\s*[:=\-]\s*[\*\[]*\s*(approve|revise|reject)")
        .expect("VOTE_LABEL_RE regex should compile")
});

static VOTE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(APPROVE|REVISE|REJECT)\b").expect("VOTE_MARKER_RE regex should compile")
});

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[-*•]|\d+[.)])[ \t]+(.+)$").expect("BULLET_RE regex should compile")
});

fn clean_title(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == '#' || c == '`')
        .trim();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.chars().take(MAX_TITLE_CHARS).collect())
}

/// Title from an explicit `Title:` line, a heading, or the first bold span.
pub fn extract_title(text: &str) -> Option<String> {
    [&*TITLE_LABEL_RE, &*HEADING_RE, &*BOLD_RE]
        .iter()
        .find_map(|re| {
            re.captures_iter(text)
                .find_map(|caps| caps.get(1).and_then(|m| clean_title(m.as_str())))
        })
}

/// Fallback title naming the agent and round.
pub fn default_title(agent_name: &str, round: u32) -> String {
    format!("Idea from {} (round {})", agent_name, round)
}

pub fn title_or_default(text: &str, agent_name: &str, round: u32) -> String {
    extract_title(text).unwrap_or_else(|| default_title(agent_name, round))
}

fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Overall score, trying an overall label, a score label, then `N/10`.
pub fn extract_score(text: &str) -> Option<f64> {
    [&*OVERALL_SCORE_RE, &*SCORE_LABEL_RE, &*OUT_OF_TEN_RE]
        .iter()
        .find_map(|re| first_number(re, text))
        .map(clamp_score)
}

/// Per-criterion scores found in the text.
pub fn extract_criterion_scores(text: &str) -> BTreeMap<Criterion, f64> {
    CRITERION_RES
        .iter()
        .filter_map(|(c, re)| first_number(re, text).map(|s| (*c, clamp_score(s))))
        .collect()
}

/// Where an evaluation's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    Explicit,
    Criteria,
    Neutral,
}

impl std::fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Criteria => write!(f, "criteria"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Parsed evaluator output.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub criteria: BTreeMap<Criterion, f64>,
    pub source: ScoreSource,
}

/// Score from an explicit overall value, else the weighted criteria,
/// else neutral.
pub fn extract_evaluation(text: &str, weights: &ScoringCriteria) -> Evaluation {
    let criteria = extract_criterion_scores(text);
    if let Some(score) = extract_score(text) {
        return Evaluation {
            score,
            criteria,
            source: ScoreSource::Explicit,
        };
    }
    match weights.weighted(&criteria) {
        Some(score) => Evaluation {
            score,
            criteria,
            source: ScoreSource::Criteria,
        },
        None => Evaluation {
            score: NEUTRAL_SCORE,
            criteria,
            source: ScoreSource::Neutral,
        },
    }
}

/// Vote from a `VOTE:` label or a bare uppercase marker; `Revise` otherwise.
pub fn extract_vote(text: &str) -> Vote {
    let parse = |s: &str| match s.to_ascii_uppercase().as_str() {
        "APPROVE" => Some(Vote::Approve),
        "REJECT" => Some(Vote::Reject),
        "REVISE" => Some(Vote::Revise),
        _ => None,
    };
    [&*VOTE_LABEL_RE, &*VOTE_MARKER_RE]
        .iter()
        .find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse(m.as_str()))
        })
        .unwrap_or(Vote::Revise)
}

/// Up to `limit` bullet or numbered list items.
pub fn extract_key_points(text: &str, limit: usize) -> Vec<String> {
    BULLET_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_label() {
        let text = "Some preamble\n**Title:** Shared Build Cache\nDescription: ...";
        assert_eq!(extract_title(text).unwrap(), "Shared Build Cache");
    }

    #[test]
    fn test_title_heading() {
        let text = "## Incremental Indexer\n\nThe idea is...";
        assert_eq!(extract_title(text).unwrap(), "Incremental Indexer");
    }

    #[test]
    fn test_title_bold_fallback() {
        let text = "I propose **Streaming Diff Viewer** because it helps.";
        assert_eq!(extract_title(text).unwrap(), "Streaming Diff Viewer");
    }

    #[test]
    fn test_title_default() {
        assert_eq!(
            title_or_default("just some words", "The Skeptic", 2),
            "Idea from The Skeptic (round 2)"
        );
        assert_eq!(title_or_default("", "X", 1), "Idea from X (round 1)");
    }

    #[test]
    fn test_title_truncated() {
        let long = format!("Title: {}", "a".repeat(500));
        assert_eq!(extract_title(&long).unwrap().chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_score_variants() {
        assert_eq!(extract_score("Overall score: 8.5"), Some(8.5));
        assert_eq!(extract_score("FINAL: **7**"), Some(7.0));
        assert_eq!(extract_score("Score = 6"), Some(6.0));
        assert_eq!(extract_score("I'd give it 9/10."), Some(9.0));
        assert_eq!(extract_score("Overall: 85"), Some(10.0));
        assert_eq!(extract_score("no numbers here"), None);
    }

    #[test]
    fn test_criterion_scores() {
        let text = "Novelty: 9\nFeasibility - 4/10\nEcosystem relevance: 7\nImpact 8\nurgency: 2";
        let scores = extract_criterion_scores(text);
        assert_eq!(scores.len(), 5);
        assert_eq!(scores[&Criterion::Novelty], 9.0);
        assert_eq!(scores[&Criterion::Feasibility], 4.0);
        assert_eq!(scores[&Criterion::EcosystemRelevance], 7.0);
        assert_eq!(scores[&Criterion::Urgency], 2.0);
    }

    #[test]
    fn test_evaluation_falls_back_to_neutral() {
        let eval = extract_evaluation("Looks interesting but unclear.", &ScoringCriteria::default());
        assert_eq!(eval.score, NEUTRAL_SCORE);
        assert_eq!(eval.source, ScoreSource::Neutral);
    }

    #[test]
    fn test_evaluation_uses_criteria_without_overall() {
        let eval = extract_evaluation("Novelty: 10\nUrgency: 0", &ScoringCriteria::default());
        assert_eq!(eval.source, ScoreSource::Criteria);
        assert!((eval.score - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_vote_markers() {
        assert_eq!(extract_vote("VOTE: APPROVE\nLooks good."), Vote::Approve);
        assert_eq!(extract_vote("vote - reject"), Vote::Reject);
        assert_eq!(extract_vote("My verdict: [REVISE] the timeline"), Vote::Revise);
        assert_eq!(extract_vote("I think we should REJECT this."), Vote::Reject);
    }

    #[test]
    fn test_vote_defaults_to_revise() {
        assert_eq!(extract_vote("I approve of parts of this"), Vote::Revise);
        assert_eq!(extract_vote(""), Vote::Revise);
    }

    #[test]
    fn test_key_points() {
        let text = "Plan:\n- First step\n* Second step\n1. Third step\n2) Fourth\nprose";
        let points = extract_key_points(text, 3);
        assert_eq!(points, vec!["First step", "Second step", "Third step"]);
    }
}
