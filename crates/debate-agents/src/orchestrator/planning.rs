//! Planning: the first round drafts plans from the top ideas and keeps the
//! longest; later rounds collect reviewer votes until consensus or the cap.
//!
//! If no draft survives a drafting round, the next round drafts again.
//! Reviews are logged on the plan but never applied as edits.

use coordination::debate::extraction::extract_vote;
use coordination::debate::prompts::{plan_draft_prompt, review_prompt};
use coordination::debate::{merge_drafts, PlanReview, RoundBuilder};
use coordination::{
    DebateMessage, DebatePhase, Idea, MessageType, PhaseOutput, PhaseResult, PlanDraft, TaskType,
    VoteTally,
};
use tracing::{debug, info};

use super::fanout::{fan_out, AgentCall};
use super::{DebateError, MultiStageOrchestrator, PhaseTracker, RunContext};

impl MultiStageOrchestrator {
    pub(crate) async fn run_planning(
        &self,
        ctx: RunContext<'_>,
        top: &[Idea],
    ) -> Result<PhaseResult, DebateError> {
        let phase = DebatePhase::Planning;
        let protocol = ctx.protocol;
        let mut tracker = PhaseTracker::new(phase);
        tracker.progress_mut().ideas_generated = top.len();
        let idea_ids: Vec<String> = top.iter().map(|i| i.id.clone()).collect();
        let mut plan: Option<PlanDraft> = None;

        loop {
            let round = tracker.next_round();
            let agents = self.sample_agents(protocol.agents_per_round(phase));
            let drafting = plan.is_none();

            let calls: Vec<AgentCall> = agents
                .into_iter()
                .enumerate()
                .map(|(index, persona)| {
                    let (prompt, task) = match &plan {
                        None => (
                            plan_draft_prompt(&persona, ctx.topic, top),
                            TaskType::Planning,
                        ),
                        Some(p) => (
                            review_prompt(&persona, ctx.topic, p, round),
                            TaskType::Review,
                        ),
                    };
                    let request = self.request(protocol, phase, prompt, task);
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
            let mut drafts = Vec::new();
            let mut tally = VoteTally::default();

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

                match plan.as_mut() {
                    None => {
                        let draft =
                            PlanDraft::new(&persona.id, &persona.name, round, &response.content)
                                .with_ideas(idea_ids.clone());
                        let mut message = DebateMessage::new(
                            phase,
                            round,
                            &persona.id,
                            &persona.name,
                            MessageType::Plan,
                            response.content.clone(),
                        )
                        .with_metadata("plan_id", draft.id.as_str());
                        for id in &idea_ids {
                            message = message.with_reference(id.clone());
                        }
                        self.publish(protocol, &mut builder, message)?;
                        drafts.push(draft);
                    }
                    Some(current) => {
                        let vote = extract_vote(&response.content);
                        let message = DebateMessage::new(
                            phase,
                            round,
                            &persona.id,
                            &persona.name,
                            MessageType::Vote,
                            response.content.clone(),
                        )
                        .with_reference(current.id.clone())
                        .with_metadata("vote", vote.marker());
                        self.publish(protocol, &mut builder, message)?;
                        current.add_review(PlanReview {
                            agent_id: persona.id.clone(),
                            agent_name: persona.name.clone(),
                            round,
                            vote,
                            content: response.content.clone(),
                        });
                        tally.add(vote);
                        debug!(agent = %persona.id, round, vote = vote.marker(), "Plan reviewed");
                    }
                }
                tracker.record_success(response.total_tokens(), response.cost);
            }

            if drafting {
                let count = drafts.len();
                plan = merge_drafts(drafts);
                match &plan {
                    Some(p) => {
                        info!(
                            drafts = count,
                            author = %p.author_id,
                            chars = p.content.len(),
                            "Plan drafted"
                        );
                        builder.add_decision(format!(
                            "plan by {} selected from {} drafts",
                            p.author_name, count
                        ));
                        builder.set_summary(format!("{} drafts submitted", count));
                    }
                    None => builder.set_summary("no drafts submitted"),
                }
            } else {
                let reached = protocol.consensus_reached(&tally);
                info!(
                    round,
                    approve = tally.approve,
                    revise = tally.revise,
                    reject = tally.reject,
                    consensus = reached,
                    "Votes tallied"
                );
                builder.add_key_point(format!(
                    "{} approve / {} revise / {} reject",
                    tally.approve, tally.revise, tally.reject
                ));
                if reached {
                    builder.add_decision("plan approved");
                }
                builder.set_summary(format!("{} votes cast", tally.total()));
                tracker.progress_mut().votes = tally;
            }

            tracker.complete_round(builder.finish(), self.observers());

            if !tracker.should_continue(protocol) {
                break;
            }
        }

        let votes = tracker.progress_mut().votes;
        let consensus = protocol.consensus_reached(&votes);
        let output = PhaseOutput::Planning {
            plan,
            votes,
            consensus,
        };
        Ok(tracker.finish(protocol, output, self.observers()))
    }
}
