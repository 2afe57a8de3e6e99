//! Prompt assembly for each phase.
//!
//! The system message is the persona; the user message carries phase
//! instructions, the technique (divergence only), topic and context. Output
//! markers requested here are the ones `extraction` looks for.

use crate::conversation::Conversation;
use crate::persona::Persona;

use super::idea::{Idea, ScoringCriteria};
use super::plan::PlanDraft;
use super::techniques::Technique;

/// Context text beyond this many characters is cut.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("\n[...truncated]");
    cut
}

fn conversation(persona: &Persona, body: String) -> Conversation {
    Conversation::from_prompt(body).with_system(persona.system_prompt())
}

/// Divergence: propose one new idea.
pub fn divergence_prompt(
    persona: &Persona,
    topic: &str,
    context: &str,
    technique: Option<&Technique>,
    prior_titles: &[String],
) -> Conversation {
    let mut body = format!("# Topic\n{}\n\n", topic);
    if !context.trim().is_empty() {
        body.push_str(&format!("# Context\n{}\n\n", truncate(context, MAX_CONTEXT_CHARS)));
    }
    if let Some(t) = technique {
        body.push_str(&format!("# Technique: {}\n{}\n\n", t.name, t.instruction));
    }
    if !prior_titles.is_empty() {
        body.push_str("# Ideas already proposed (do not repeat these)\n");
        for title in prior_titles {
            body.push_str(&format!("- {}\n", title));
        }
        body.push('\n');
    }
    body.push_str(
        "# Task\nPropose ONE new idea. Start with a line `Title: <short title>`, \
         then describe the idea, who benefits, and how it could be built.",
    );
    conversation(persona, body)
}

/// Convergence: score one idea.
pub fn evaluation_prompt(
    persona: &Persona,
    topic: &str,
    idea: &Idea,
    criteria: &ScoringCriteria,
) -> Conversation {
    let mut body = format!(
        "# Topic\n{}\n\n# Idea: {}\n{}\n\n# Criteria (weight)\n",
        topic, idea.title, idea.content
    );
    for (criterion, weight) in criteria.ranked() {
        body.push_str(&format!("- {} ({:.2})\n", criterion.label(), weight));
    }
    body.push_str(
        "\n# Task\nScore the idea from 0 to 10 on each criterion using lines like \
         `Novelty: 7`, then give `Overall score: N` and a short justification.",
    );
    conversation(persona, body)
}

/// Planning round 1: draft a plan from the top ideas.
pub fn plan_draft_prompt(persona: &Persona, topic: &str, top_ideas: &[Idea]) -> Conversation {
    let mut body = format!("# Topic\n{}\n\n# Selected ideas\n", topic);
    for (n, idea) in top_ideas.iter().enumerate() {
        let score = idea
            .total_score()
            .map_or("unscored".to_string(), |s| format!("{:.1}", s));
        body.push_str(&format!("{}. {} [{}]\n{}\n\n", n + 1, idea.title, score, idea.content));
    }
    body.push_str(
        "# Task\nWrite an implementation plan covering these ideas: goals, ordered \
         milestones as a numbered list, risks, and how success will be measured.",
    );
    conversation(persona, body)
}

/// Planning review: vote on the current plan.
pub fn review_prompt(persona: &Persona, topic: &str, plan: &PlanDraft, round: u32) -> Conversation {
    let body = format!(
        "# Topic\n{}\n\n# Plan under review (round {}, by {})\n{}\n\n# Task\n\
         Review the plan. End with exactly one line `VOTE: APPROVE`, `VOTE: REVISE` \
         or `VOTE: REJECT`, followed by your reasons.",
        topic, round, plan.author_name, plan.content
    );
    conversation(persona, body)
}
