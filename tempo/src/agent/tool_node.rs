//! Tool node: execute the trailing assistant message's tool calls.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::RuntimeContext;
use crate::error::AgentError;
use crate::graph::{Node, RunContext};
use crate::memory::SqliteCheckpointStore;
use crate::state::{thread_id, AgentState};
use crate::stream::AgentEvent;
use crate::tools::invoke_calls;

pub struct ToolNode {
    ctx: Arc<RuntimeContext>,
    store: Arc<SqliteCheckpointStore>,
}

impl ToolNode {
    pub fn new(ctx: Arc<RuntimeContext>, store: Arc<SqliteCheckpointStore>) -> Self {
        Self { ctx, store }
    }
}

#[async_trait]
impl Node<AgentState> for ToolNode {
    fn id(&self) -> &str {
        "tools"
    }

    async fn run(&self, mut state: AgentState, rctx: &RunContext) -> Result<AgentState, AgentError> {
        let calls = state
            .messages
            .last()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        if calls.is_empty() {
            return Ok(state);
        }

        for call in &calls {
            rctx.emit(AgentEvent::ToolStart {
                name: call.name.clone(),
            })
            .await;
        }

        let results = invoke_calls(
            &self.ctx.registry,
            &calls,
            state.enabled_tools.as_deref(),
            &state.user_id,
            &state.session_id,
        )
        .await;

        for call in &calls {
            rctx.emit(AgentEvent::ToolEnd {
                name: call.name.clone(),
            })
            .await;
        }

        // Each result is recorded in the writes table; loads fold pending
        // rows onto the snapshot until the post-node save clears them, so a
        // turn that dies here resumes with its results present.
        let tid = thread_id(&state.user_id, &state.session_id);
        for result in &results {
            if let Err(e) = self.store.append_write(&tid, result).await {
                tracing::warn!("append_write failed: {e}");
            }
        }

        state.messages.extend(results);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::message::{Message, ToolCall};
    use crate::prompts::PromptSet;
    use crate::tools::ToolRegistry;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// **Scenario**: with an empty registry every call fails soft — one tool
    /// message per call, turn continues.
    #[tokio::test]
    async fn unknown_tools_produce_error_results() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(RuntimeContext::new(
            Arc::new(MockLlm::new()),
            Arc::new(ToolRegistry::empty()),
            Arc::new(PromptSet::default()),
            config::DataDirs::new(dir.path()),
        ));
        let store =
            Arc::new(SqliteCheckpointStore::new(dir.path().join("cp.db")).unwrap());
        let node = ToolNode::new(ctx, store);

        let (tx, mut rx) = mpsc::channel(8);
        let rctx = RunContext::new(Some(tx), CancellationToken::new());
        let state = AgentState {
            messages: vec![Message::assistant_with_calls(
                "",
                vec![ToolCall {
                    id: "c1".into(),
                    name: "ghost_tool".into(),
                    arguments: serde_json::json!({}),
                }],
            )],
            user_id: "ada".into(),
            session_id: "s1".into(),
            ..Default::default()
        };
        let out = node.run(state, &rctx).await.unwrap();
        assert_eq!(out.messages.len(), 2);
        match &out.messages[1] {
            Message::Tool { call_id, content, .. } => {
                assert_eq!(call_id, "c1");
                assert!(content.contains("failed") || content.contains("unknown"));
            }
            other => panic!("expected tool message, got {other:?}"),
        }
        assert_eq!(
            rx.recv().await,
            Some(AgentEvent::ToolStart {
                name: "ghost_tool".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(AgentEvent::ToolEnd {
                name: "ghost_tool".into()
            })
        );
    }
}
