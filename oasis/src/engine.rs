//! Discussion engine: round orchestration, consensus, summarization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use tempo::llm::{CompletionRequest, LlmClient};
use tempo::message::Message;
use tempo::prompts::render;

use crate::board::ForumBoard;
use crate::experts::{participate, ExpertBackend};
use crate::models::DiscussionStatus;
use crate::roster::ExpertConfig;
use crate::schedule::{Schedule, Step};

/// Consensus fraction: the top post must hold upvotes from at least this
/// share of the selected experts (rounded up).
const CONSENSUS_FRACTION: f64 = 0.7;
/// Budget for the final summarization call.
const SUMMARY_TIMEOUT: Duration = Duration::from_secs(60);

/// Orchestrates one complete discussion on a board.
pub struct DiscussionEngine {
    board: Arc<ForumBoard>,
    experts: Vec<ExpertConfig>,
    backend: Arc<dyn ExpertBackend>,
    schedule: Option<Schedule>,
    summarizer: Arc<dyn LlmClient>,
    summary_template: String,
}

impl DiscussionEngine {
    /// Selects experts by tag from the visible set (empty or unmatched tags
    /// fall back to everyone) and wires the backend.
    pub fn new(
        board: Arc<ForumBoard>,
        visible_experts: Vec<ExpertConfig>,
        expert_tags: &[String],
        schedule: Option<Schedule>,
        backend: Arc<dyn ExpertBackend>,
        summarizer: Arc<dyn LlmClient>,
        summary_template: String,
    ) -> Self {
        let mut experts: Vec<ExpertConfig> = if expert_tags.is_empty() {
            visible_experts.clone()
        } else {
            visible_experts
                .iter()
                .filter(|e| expert_tags.contains(&e.tag))
                .cloned()
                .collect()
        };
        if experts.is_empty() {
            experts = visible_experts;
        }
        Self {
            board,
            experts,
            backend,
            schedule,
            summarizer,
            summary_template,
        }
    }

    pub fn expert_count(&self) -> usize {
        self.experts.len()
    }

    /// Runs the discussion to a terminal state. Spawned by the server; a
    /// panic in here is caught at the spawn site and turns into `error`.
    pub async fn run(self) {
        self.board.set_status(DiscussionStatus::Discussing).await;
        tracing::info!(
            topic = %self.board.topic_id,
            experts = self.experts.len(),
            scheduled = self.schedule.is_some(),
            "discussion started"
        );

        match &self.schedule {
            Some(schedule) => self.run_scheduled(schedule.clone()).await,
            None => self.run_parallel().await,
        }

        let conclusion = self.summarize().await;
        self.board.set_conclusion(conclusion).await;
        self.board.set_status(DiscussionStatus::Concluded).await;
        tracing::info!(topic = %self.board.topic_id, "discussion concluded");
    }

    /// Default mode: every selected expert participates concurrently each
    /// round; consensus is checked from round 2.
    async fn run_parallel(&self) {
        let max_rounds = self.board.max_rounds().await;
        for round in 1..=max_rounds {
            self.board.set_current_round(round).await;
            tracing::info!(topic = %self.board.topic_id, round, max_rounds, "round");
            self.all_experts_speak().await;
            if round >= 2 && self.consensus_reached().await {
                tracing::info!(topic = %self.board.topic_id, round, "consensus reached");
                break;
            }
        }
    }

    async fn run_scheduled(&self, schedule: Schedule) {
        if schedule.repeat {
            let max_rounds = self.board.max_rounds().await;
            for round in 1..=max_rounds {
                self.board.set_current_round(round).await;
                for step in &schedule.steps {
                    self.execute_step(step).await;
                }
                if round >= 2 && self.consensus_reached().await {
                    tracing::info!(topic = %self.board.topic_id, round, "consensus reached");
                    break;
                }
            }
        } else {
            // Once mode: each step is one round; the round total shown to
            // clients becomes the step count.
            let steps = schedule.steps.len() as u32;
            self.board.set_max_rounds(steps).await;
            for (index, step) in schedule.steps.iter().enumerate() {
                self.board.set_current_round(index as u32 + 1).await;
                self.execute_step(step).await;
                if index >= 1 && self.consensus_reached().await {
                    tracing::info!(topic = %self.board.topic_id, step = index + 1, "consensus reached");
                    break;
                }
            }
        }
    }

    async fn execute_step(&self, step: &Step) {
        match step {
            Step::Manual {
                author,
                content,
                reply_to,
            } => {
                self.board.publish(author, content, *reply_to).await;
            }
            Step::Expert(name) => {
                if let Some(expert) = self.resolve(name) {
                    participate(expert, &self.board, self.backend.as_ref()).await;
                }
            }
            Step::Parallel(names) => {
                let experts: Vec<&ExpertConfig> =
                    names.iter().filter_map(|n| self.resolve(n)).collect();
                join_all(
                    experts
                        .iter()
                        .map(|e| participate(e, &self.board, self.backend.as_ref())),
                )
                .await;
            }
            Step::AllExperts => self.all_experts_speak().await,
        }
    }

    fn resolve(&self, name: &str) -> Option<&ExpertConfig> {
        let found = self.experts.iter().find(|e| e.name == name);
        if found.is_none() {
            tracing::warn!(expert = name, "schedule references unknown expert; skipping");
        }
        found
    }

    async fn all_experts_speak(&self) {
        join_all(
            self.experts
                .iter()
                .map(|e| participate(e, &self.board, self.backend.as_ref())),
        )
        .await;
    }

    /// Early-stop check: the top post holds upvotes from ⌈0.7 × experts⌉.
    async fn consensus_reached(&self) -> bool {
        let top = self.board.top_k(1).await;
        let Some(top) = top.first() else {
            return false;
        };
        let threshold = (CONSENSUS_FRACTION * self.experts.len() as f64).ceil() as u32;
        top.upvotes >= threshold
    }

    /// Summarizes the top posts into the conclusion. Failures are folded
    /// into the conclusion text; the topic still concludes.
    async fn summarize(&self) -> String {
        let top = self.board.top_k(5).await;
        if top.is_empty() {
            return "The discussion produced no substantive posts.".to_string();
        }
        let posts_text = top
            .iter()
            .map(|p| format!("[+{} -{}] {}: {}", p.upvotes, p.downvotes, p.author, p.content))
            .collect::<Vec<_>>()
            .join("\n");
        let values = HashMap::from([
            ("question", self.board.question.clone()),
            ("post_count", self.board.count().await.to_string()),
            ("round_count", self.board.current_round().await.to_string()),
            ("posts_text", posts_text),
        ]);
        let prompt = render(&self.summary_template, &values);
        let request = CompletionRequest::new(vec![Message::user(prompt)])
            .with_temperature(0.3)
            .with_max_tokens(2048);

        match tokio::time::timeout(SUMMARY_TIMEOUT, self.summarizer.complete(request)).await {
            Ok(Ok(response)) => response.content,
            Ok(Err(e)) => format!("summary generation failed: {e}"),
            Err(_) => "summary generation failed: timed out".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::board::Post;
    use tempo::llm::MockLlm;
    use tempo::prompts::PromptSet;

    fn experts(tags: &[&str]) -> Vec<ExpertConfig> {
        tags.iter()
            .map(|tag| ExpertConfig {
                name: format!("{tag} expert"),
                tag: tag.to_string(),
                persona: "persona".into(),
                temperature: 0.5,
            })
            .collect()
    }

    /// Backend that always endorses post 1 so consensus forms fast.
    struct AgreeingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExpertBackend for AgreeingBackend {
        async fn respond(
            &self,
            _expert: &ExpertConfig,
            _question: &str,
            others: &[Post],
        ) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let votes = if others.iter().any(|p| p.id == 1) {
                r#"[{"post_id": 1, "direction": "up"}]"#
            } else {
                "[]"
            };
            Ok(format!(
                r#"{{"reply_to": null, "content": "I think so", "votes": {votes}}}"#
            ))
        }
    }

    fn engine_with(
        board: Arc<ForumBoard>,
        tags: &[&str],
        selected: &[String],
        schedule: Option<Schedule>,
        backend: Arc<dyn ExpertBackend>,
    ) -> DiscussionEngine {
        DiscussionEngine::new(
            board,
            experts(tags),
            selected,
            schedule,
            backend,
            Arc::new(MockLlm::new().reply("各方观点已总结。")),
            PromptSet::default().oasis_summary,
        )
    }

    /// **Scenario**: empty tag filter selects everyone; unmatched tags fall
    /// back to everyone.
    #[test]
    fn tag_selection_falls_back_to_all()  {
        let board = Arc::new(ForumBoard::new("t", "q", "ada", 3));
        let backend: Arc<dyn ExpertBackend> = Arc::new(AgreeingBackend {
            calls: AtomicUsize::new(0),
        });
        let engine = engine_with(board.clone(), &["a", "b", "c"], &[], None, backend.clone());
        assert_eq!(engine.expert_count(), 3);
        let engine = engine_with(
            board.clone(),
            &["a", "b", "c"],
            &["b".to_string()],
            None,
            backend.clone(),
        );
        assert_eq!(engine.expert_count(), 1);
        let engine = engine_with(board, &["a", "b"], &["zzz".to_string()], None, backend);
        assert_eq!(engine.expert_count(), 2);
    }

    /// **Scenario**: with max_rounds = 1 exactly one round runs, the
    /// consensus check is skipped, and the topic concludes with a summary.
    #[tokio::test]
    async fn single_round_runs_once_and_concludes() {
        let board = Arc::new(ForumBoard::new("t", "q", "ada", 1));
        let backend = Arc::new(AgreeingBackend {
            calls: AtomicUsize::new(0),
        });
        let engine = engine_with(board.clone(), &["a", "b"], &[], None, backend.clone());
        engine.run().await;

        assert_eq!(backend.calls.load(Ordering::Relaxed), 2); // one round, two experts
        assert_eq!(board.status().await, DiscussionStatus::Concluded);
        assert_eq!(board.current_round().await, 1);
        assert_eq!(board.conclusion().await.as_deref(), Some("各方观点已总结。"));
    }

    /// **Scenario**: when the top post collects ≥ ⌈0.7×experts⌉ upvotes the
    /// engine stops before max_rounds, and the threshold invariant holds at
    /// that moment.
    #[tokio::test]
    async fn consensus_stops_early() {
        let board = Arc::new(ForumBoard::new("t", "q", "ada", 10));
        let backend = Arc::new(AgreeingBackend {
            calls: AtomicUsize::new(0),
        });
        // 4 experts → threshold ⌈2.8⌉ = 3; by round 2 every expert has seen
        // post 1, so its 3 non-authors have all voted it up.
        let engine = engine_with(
            board.clone(),
            &["a", "b", "c", "d"],
            &[],
            None,
            backend.clone(),
        );
        engine.run().await;

        let round = board.current_round().await;
        assert!(round < 10, "stopped early at round {round}");
        assert_eq!(board.status().await, DiscussionStatus::Concluded);
        let top = board.top_k(1).await;
        assert!(top[0].upvotes >= (0.7f64 * 4.0).ceil() as u32);
    }

    /// **Scenario**: a scheduled once-mode plan runs each step as one round
    /// and rewrites the round total for display.
    #[tokio::test]
    async fn once_mode_schedule_runs_steps_in_order() {
        let board = Arc::new(ForumBoard::new("t", "q", "ada", 5));
        let backend = Arc::new(AgreeingBackend {
            calls: AtomicUsize::new(0),
        });
        let schedule = crate::schedule::parse_schedule(
            r#"
repeat: false
plan:
  - manual:
      content: "opening statement"
  - expert: "a expert"
  - parallel:
      - "b expert"
      - "ghost expert"
"#,
        )
        .unwrap();
        let engine = engine_with(board.clone(), &["a", "b"], &[], Some(schedule), backend);
        engine.run().await;

        let posts = board.browse(None, false).await;
        assert_eq!(posts[0].author, "moderator");
        assert_eq!(posts[0].content, "opening statement");
        assert_eq!(posts[1].author, "a expert");
        // ghost expert was skipped; only b expert spoke in the parallel step
        assert_eq!(posts.len(), 3);
        assert_eq!(board.max_rounds().await, 3);
        assert_eq!(board.status().await, DiscussionStatus::Concluded);
    }

    /// **Scenario**: a failing summarizer still concludes the topic, with
    /// the failure recorded in the conclusion.
    #[tokio::test]
    async fn summarizer_failure_is_recorded_in_conclusion() {
        struct FailingLlm;
        #[async_trait]
        impl LlmClient for FailingLlm {
            async fn complete(
                &self,
                _r: CompletionRequest,
            ) -> Result<tempo::llm::LlmResponse, tempo::AgentError> {
                Err(tempo::AgentError::Model("boom".into()))
            }
        }
        let board = Arc::new(ForumBoard::new("t", "q", "ada", 1));
        let backend = Arc::new(AgreeingBackend {
            calls: AtomicUsize::new(0),
        });
        let engine = DiscussionEngine::new(
            board.clone(),
            experts(&["a"]),
            &[],
            None,
            backend,
            Arc::new(FailingLlm),
            PromptSet::default().oasis_summary,
        );
        engine.run().await;
        assert_eq!(board.status().await, DiscussionStatus::Concluded);
        assert!(board
            .conclusion()
            .await
            .unwrap()
            .contains("summary generation failed"));
    }
}
