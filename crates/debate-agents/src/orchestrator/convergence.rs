//! Convergence: sampled evaluators score every idea not yet at the maximum,
//! then the pool is ranked and the top-K kept.

use coordination::debate::extraction::extract_evaluation;
use coordination::debate::prompts::evaluation_prompt;
use coordination::debate::{IdeaScore, RoundBuilder};
use coordination::{
    DebateMessage, DebatePhase, IdeaPool, MessageType, PhaseOutput, PhaseResult, TaskType,
};
use tracing::{debug, info, warn};

use super::fanout::{fan_out, AgentCall};
use super::{DebateError, MultiStageOrchestrator, PhaseTracker, RunContext};

impl MultiStageOrchestrator {
    pub(crate) async fn run_convergence(
        &self,
        ctx: RunContext<'_>,
        mut pool: IdeaPool,
    ) -> Result<(PhaseResult, IdeaPool), DebateError> {
        let phase = DebatePhase::Convergence;
        let protocol = ctx.protocol;
        let criteria = protocol.criteria();
        let mut tracker = PhaseTracker::new(phase);
        tracker.progress_mut().ideas_generated = pool.len();

        loop {
            let pending = pool.needing_scores();
            if pending.is_empty() {
                info!(ideas = pool.len(), "No ideas left to score");
                tracker.progress_mut().all_scored = true;
                break;
            }

            let round = tracker.next_round();
            let evaluators = self.sample_agents(protocol.agents_per_round(phase));
            let mut calls = Vec::with_capacity(evaluators.len() * pending.len());
            for persona in &evaluators {
                for idea in &pending {
                    let prompt = evaluation_prompt(persona, ctx.topic, idea, criteria);
                    let request = self.request(protocol, phase, prompt, TaskType::Evaluation);
                    let index = calls.len();
                    calls.push(AgentCall::new(index, persona.clone(), request).about(&idea.id));
                }
            }

            let (outcomes, panicked) =
                fan_out(self.router(), calls, self.agent_timeout(protocol)).await;
            tracker.record_panics(panicked);

            let mut builder = RoundBuilder::new(round, phase, ctx.topic);
            for _ in 0..panicked {
                builder.record_failure();
            }
            let mut scored = 0usize;

            for outcome in &outcomes {
                let response = match &outcome.result {
                    Ok(response) => response,
                    Err(failure) => {
                        tracker.record_failure(outcome, failure)?;
                        builder.record_failure();
                        continue;
                    }
                };
                let persona = &outcome.persona;
                let Some(idea_id) = outcome.subject.as_deref() else {
                    continue;
                };

                let evaluation = extract_evaluation(&response.content, criteria);
                let message = DebateMessage::new(
                    phase,
                    round,
                    &persona.id,
                    &persona.name,
                    MessageType::Evaluation,
                    response.content.clone(),
                )
                .with_reference(idea_id)
                .with_score(evaluation.score)
                .with_metadata("score_source", evaluation.source.to_string());
                self.publish(protocol, &mut builder, message)?;
                tracker.record_success(response.total_tokens(), response.cost);

                match pool.get_mut(idea_id) {
                    Some(idea) => {
                        idea.record_score(
                            IdeaScore::new(&persona.id, round, evaluation.score)
                                .with_criteria(evaluation.criteria),
                        );
                        scored += 1;
                        debug!(
                            agent = %persona.id,
                            idea = %idea.title,
                            score = evaluation.score,
                            source = %evaluation.source,
                            "Idea scored"
                        );
                    }
                    None => warn!(idea_id, "Evaluation refers to an unknown idea"),
                }
            }

            let leader = pool.top(1).into_iter().next();
            if let Some(idea) = &leader {
                builder.add_key_point(format!(
                    "leader: {} ({:.1})",
                    idea.title,
                    idea.total_score().unwrap_or_default()
                ));
            }
            builder.set_summary(format!(
                "{} scores recorded across {} ideas",
                scored,
                pending.len()
            ));
            tracker.complete_round(builder.finish(), self.observers());
            tracker.progress_mut().all_scored = pool.needing_scores().is_empty();

            if !tracker.should_continue(protocol) {
                break;
            }
        }

        let merged = pool.link_duplicates();
        if merged > 0 {
            info!(merged, "Linked ideas with duplicate titles");
        }
        let ranked = pool.ranked();
        let top = pool.top(protocol.config().top_ideas_to_keep);
        info!(
            ranked = ranked.len(),
            kept = top.len(),
            best = top.first().map(|i| i.title.as_str()).unwrap_or("none"),
            "Ideas ranked"
        );

        let output = PhaseOutput::Convergence { ranked, top };
        Ok((tracker.finish(protocol, output, self.observers()), pool))
    }
}
