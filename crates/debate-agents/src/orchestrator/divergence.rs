//! Divergence: sampled personas each propose one idea per round.

use coordination::debate::extraction::title_or_default;
use coordination::debate::prompts::divergence_prompt;
use coordination::debate::RoundBuilder;
use coordination::{
    DebateMessage, DebatePhase, Idea, IdeaPool, MessageType, PhaseOutput, PhaseResult, TaskType,
};
use tracing::debug;

use super::fanout::{fan_out, AgentCall};
use super::{DebateError, MultiStageOrchestrator, PhaseTracker, RunContext};

impl MultiStageOrchestrator {
    pub(crate) async fn run_divergence(
        &self,
        ctx: RunContext<'_>,
    ) -> Result<(PhaseResult, IdeaPool), DebateError> {
        let phase = DebatePhase::Divergence;
        let protocol = ctx.protocol;
        let mut tracker = PhaseTracker::new(phase);
        let mut pool = IdeaPool::new();

        loop {
            let round = tracker.next_round();
            let technique = protocol.technique_for_round(round).cloned();
            let prior_titles = pool.titles();

            let calls: Vec<AgentCall> = self
                .sample_agents(protocol.agents_per_round(phase))
                .into_iter()
                .enumerate()
                .map(|(index, persona)| {
                    let prompt = divergence_prompt(
                        &persona,
                        ctx.topic,
                        ctx.context,
                        technique.as_ref(),
                        &prior_titles,
                    );
                    let request = self.request(protocol, phase, prompt, TaskType::IdeaGeneration);
                    AgentCall::new(index, persona, request)
                })
                .collect();

            let (outcomes, panicked) =
                fan_out(self.router(), calls, self.agent_timeout(protocol)).await;
            tracker.record_panics(panicked);

            let mut builder = RoundBuilder::new(round, phase, ctx.topic);
            for _ in 0..panicked {
                builder.record_failure();
            }
            let before = pool.len();

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
                let title = title_or_default(&response.content, &persona.name, round);
                let mut idea =
                    Idea::new(&title, &response.content, &persona.id, &persona.name, round)
                        .with_metadata("backend", response.backend_id.as_str())
                        .with_metadata("model", response.model_id.as_str());
                if let Some(t) = &technique {
                    idea = idea.with_metadata("technique", t.name.as_str());
                }

                let message = DebateMessage::new(
                    phase,
                    round,
                    &persona.id,
                    &persona.name,
                    MessageType::Idea,
                    response.content.clone(),
                )
                .with_reference(idea.id.clone())
                .with_metadata("title", title.as_str());
                self.publish(protocol, &mut builder, message)?;

                debug!(agent = %persona.id, round, title = %title, "Idea proposed");
                tracker.record_success(response.total_tokens(), response.cost);
                pool.push(idea);
            }

            let added = &pool.ideas()[before..];
            for idea in added {
                builder.add_key_point(idea.title.clone());
            }
            builder.set_summary(format!(
                "{} new ideas ({} total){}",
                added.len(),
                pool.len(),
                technique
                    .as_ref()
                    .map(|t| format!(" using {}", t.name))
                    .unwrap_or_default()
            ));

            tracker.progress_mut().ideas_generated = pool.len();
            tracker.complete_round(builder.finish(), self.observers());

            if !tracker.should_continue(protocol) {
                break;
            }
        }

        let output = PhaseOutput::Divergence {
            ideas: pool.ideas().to_vec(),
        };
        Ok((tracker.finish(protocol, output, self.observers()), pool))
    }
}
