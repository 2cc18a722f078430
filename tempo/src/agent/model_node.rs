//! Model node: assemble the prompt, call the gateway, append the assistant
//! message (and its tool-call requests) to state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::agent::{load_profile, load_skills_block, sanitize_messages, RuntimeContext};
use crate::error::AgentError;
use crate::graph::{Node, RunContext};
use crate::llm::CompletionRequest;
use crate::message::{strip_old_multimodal, Message, MessageContent, Part};
use crate::prompts::{render, OASIS_TRIGGER_MARKER, SYSTEM_TRIGGER_MARKER};
use crate::state::{AgentState, TriggerSource};
use crate::stream::AgentEvent;

pub struct ModelNode {
    ctx: Arc<RuntimeContext>,
}

impl ModelNode {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        Self { ctx }
    }

    /// Base system prompt: template + full tool list + user profile + skills.
    /// The tool list is always the complete one; per-turn restrictions are
    /// announced through the change notice so the prompt prefix stays stable
    /// (and prefix-cacheable) across turns.
    fn compose_base_prompt(&self, user_id: &str) -> String {
        let names = self.ctx.registry.names().join(", ");
        let mut prompt = format!(
            "{}\n\n[Default tool list]\n{}\nAll tools above are enabled by default; \
             any change will be announced separately.\n",
            self.ctx.prompts.base_system, names
        );
        let profile = load_profile(&self.ctx.dirs, user_id);
        if !profile.is_empty() {
            prompt.push_str(&format!("\n{profile}\n"));
        }
        prompt.push_str(&load_skills_block(&self.ctx.dirs, user_id));
        prompt.push('\n');
        prompt
    }

    /// One-shot tool-state notice, driven by the per-user cache of the last
    /// enabled set. Returns the rendered notice when the set changed.
    fn tool_state_notice(&self, state: &AgentState) -> Option<String> {
        let all: BTreeSet<String> = self.ctx.registry.names().iter().cloned().collect();
        let current: BTreeSet<String> = match &state.enabled_tools {
            Some(v) => v.iter().cloned().collect(),
            None => all.clone(),
        };
        let user_key = if state.user_id.is_empty() {
            "__global__".to_string()
        } else {
            state.user_id.clone()
        };
        let last = self
            .ctx
            .last_tool_state
            .get(&user_key)
            .map(|entry| entry.value().clone());
        self.ctx.last_tool_state.insert(user_key, current.clone());

        let lists = notice_lists(&all, &current, last.as_ref(), state.enabled_tools.is_some())?;
        let values = HashMap::from([
            ("enabled_tools", lists.0),
            ("disabled_tools", lists.1),
        ]);
        Some(render(&self.ctx.prompts.tool_status, &values))
    }
}

/// Decides whether a notice is due and renders the two tool lists.
///
/// First turn of a user with an explicit restriction: notice when anything is
/// disabled. Later turns: notice exactly when the set differs from the
/// cached one.
fn notice_lists(
    all: &BTreeSet<String>,
    current: &BTreeSet<String>,
    last: Option<&BTreeSet<String>>,
    explicit_restriction: bool,
) -> Option<(String, String)> {
    let disabled: Vec<String> = all.difference(current).cloned().collect();
    let due = match last {
        Some(prev) => prev != current,
        None => explicit_restriction && !disabled.is_empty(),
    };
    if !due {
        return None;
    }
    let enabled: Vec<String> = all.intersection(current).cloned().collect();
    let fmt = |v: Vec<String>| {
        if v.is_empty() {
            "none".to_string()
        } else {
            v.join(", ")
        }
    };
    Some((fmt(enabled), fmt(disabled)))
}

/// Wraps the trailing user message in the system-trigger template. Persisted
/// in state so the thread records that no human typed it; idempotent on the
/// wrap markers.
fn wrap_system_trigger(state: &mut AgentState, template: &str) {
    let Some(Message::User { content }) = state.messages.last_mut() else {
        return;
    };
    let text = content.text();
    if text.starts_with(SYSTEM_TRIGGER_MARKER) || text.starts_with(OASIS_TRIGGER_MARKER) {
        return;
    }
    let values = HashMap::from([("original_text", text)]);
    *content = MessageContent::Plain(render(template, &values));
}

/// Prepends the notice to the latest user message: as a text part when the
/// message is multimodal, as a text prefix otherwise.
fn inject_notice(history: &mut [Message], notice: &str) {
    let Some(Message::User { content }) = history.last_mut() else {
        return;
    };
    let prefix = format!("[system notice] {notice}\n\n---\n");
    match content {
        MessageContent::Multipart(parts) => {
            parts.insert(0, Part::Text { text: prefix });
        }
        MessageContent::Plain(text) => {
            *content = MessageContent::Plain(format!("{prefix}{text}"));
        }
    }
}

#[async_trait]
impl Node<AgentState> for ModelNode {
    fn id(&self) -> &str {
        "model"
    }

    async fn run(&self, mut state: AgentState, rctx: &RunContext) -> Result<AgentState, AgentError> {
        if state.trigger_source == TriggerSource::System {
            wrap_system_trigger(&mut state, &self.ctx.prompts.system_trigger);
        }

        let registry = &self.ctx.registry;
        let mut history = sanitize_messages(&state.messages, |name| registry.contains(name));
        history = strip_old_multimodal(&history);

        if let Some(notice) = self.tool_state_notice(&state) {
            inject_notice(&mut history, &notice);
        }

        let mut input = Vec::with_capacity(history.len() + 1);
        input.push(Message::system(self.compose_base_prompt(&state.user_id)));
        input.extend(history);

        let mut tools = self
            .ctx
            .registry
            .specs_filtered(state.enabled_tools.as_deref());
        tools.extend(state.external_tools.iter().cloned());

        let request = CompletionRequest::new(input)
            .with_tools(tools)
            .with_temperature(self.ctx.temperature)
            .with_max_tokens(self.ctx.max_tokens);

        let response = if rctx.events.is_some() {
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<crate::stream::MessageChunk>(64);
            let forward = async {
                while let Some(chunk) = chunk_rx.recv().await {
                    rctx.emit(AgentEvent::Token(chunk.content)).await;
                }
            };
            let (result, ()) = tokio::join!(self.ctx.llm.complete_stream(request, chunk_tx), forward);
            result
        } else {
            self.ctx.llm.complete(request).await
        };

        let assistant = match response {
            Ok(r) => Message::assistant_with_calls(r.content, r.tool_calls),
            Err(e) => {
                // Vendor failures stay user-visible instead of killing the turn.
                tracing::warn!("model call failed: {e}");
                let text = format!("Model call failed: {e}");
                rctx.emit(AgentEvent::Token(text.clone())).await;
                Message::assistant(text)
            }
        };
        state.messages.push(assistant);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::prompts::PromptSet;
    use crate::tools::ToolRegistry;
    use tokio_util::sync::CancellationToken;

    fn ctx_with(llm: MockLlm) -> (Arc<RuntimeContext>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new(
            Arc::new(llm),
            Arc::new(ToolRegistry::empty()),
            Arc::new(PromptSet::default()),
            config::DataDirs::new(dir.path()),
        );
        (Arc::new(ctx), dir)
    }

    fn all(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn appends_assistant_reply() {
        let (ctx, _dir) = ctx_with(MockLlm::new().reply("hi there"));
        let node = ModelNode::new(ctx);
        let state = AgentState {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let out = node.run(state, &RunContext::detached()).await.unwrap();
        assert_eq!(out.last_assistant_reply(), Some("hi there"));
    }

    /// **Scenario**: streaming run forwards model chunks as Token events.
    #[tokio::test]
    async fn streaming_emits_tokens() {
        let (ctx, _dir) = ctx_with(MockLlm::new().reply("streamed"));
        let node = ModelNode::new(ctx);
        let (tx, mut rx) = mpsc::channel(8);
        let rctx = RunContext::new(Some(tx), CancellationToken::new());
        let state = AgentState {
            messages: vec![Message::user("go")],
            ..Default::default()
        };
        node.run(state, &rctx).await.unwrap();
        match rx.recv().await {
            Some(AgentEvent::Token(t)) => assert_eq!(t, "streamed"),
            other => panic!("expected token event, got {other:?}"),
        }
    }

    /// **Scenario**: the system prompt goes first and carries profile text
    /// and the skills block.
    #[tokio::test]
    async fn system_prompt_carries_profile_and_skills() {
        let mock = Arc::new(MockLlm::new().reply("ok"));
        let dir = tempfile::tempdir().unwrap();
        let dirs = config::DataDirs::new(dir.path());
        std::fs::create_dir_all(dirs.user_dir("ada")).unwrap();
        std::fs::write(dirs.user_profile("ada"), "speaks French").unwrap();
        let ctx = Arc::new(RuntimeContext::new(
            mock.clone(),
            Arc::new(ToolRegistry::empty()),
            Arc::new(PromptSet::default()),
            dirs,
        ));
        let node = ModelNode::new(ctx);
        let state = AgentState {
            messages: vec![Message::user("bonjour")],
            user_id: "ada".into(),
            ..Default::default()
        };
        node.run(state, &RunContext::detached()).await.unwrap();

        let requests = mock.seen_requests();
        assert_eq!(requests.len(), 1);
        match &requests[0].messages[0] {
            Message::System { content } => {
                assert!(content.contains("speaks French"));
                assert!(content.contains("[User skills]"));
            }
            other => panic!("expected leading system message, got {other:?}"),
        }
    }

    /// **Scenario**: system trigger wraps the stored user message once.
    #[tokio::test]
    async fn system_trigger_wrap_is_persistent_and_idempotent() {
        let (ctx, _dir) = ctx_with(MockLlm::new().reply("done"));
        let node = ModelNode::new(ctx);
        let state = AgentState {
            messages: vec![Message::user("status?")],
            trigger_source: TriggerSource::System,
            ..Default::default()
        };
        let out = node.run(state, &RunContext::detached()).await.unwrap();
        let wrapped = match &out.messages[0] {
            Message::User { content } => content.text(),
            other => panic!("expected user message, got {other:?}"),
        };
        assert!(wrapped.starts_with(SYSTEM_TRIGGER_MARKER));
        assert!(wrapped.contains("status?"));

        // Second pass (tool loop re-entry) leaves it unchanged.
        let again = node.run(out.clone(), &RunContext::detached()).await.unwrap();
        match &again.messages[0] {
            Message::User { content } => assert_eq!(content.text(), wrapped),
            other => panic!("expected user message, got {other:?}"),
        }
    }

    #[test]
    fn notice_due_on_change_only() {
        let every = all(&["a", "b"]);
        // first sight with restriction and something disabled
        let first = notice_lists(&every, &all(&["a"]), None, true);
        assert_eq!(first, Some(("a".to_string(), "b".to_string())));
        // unchanged set → no notice
        assert!(notice_lists(&every, &all(&["a"]), Some(&all(&["a"])), true).is_none());
        // change back to everything → notice with none disabled
        let back = notice_lists(&every, &every, Some(&all(&["a"])), false);
        assert_eq!(back, Some(("a, b".to_string(), "none".to_string())));
        // no restriction, never seen → silent
        assert!(notice_lists(&every, &every, None, false).is_none());
    }

    #[test]
    fn notice_injection_into_multipart() {
        let mut history = vec![Message::user_parts(vec![Part::Image {
            data_uri: "data:image/png;base64,AA".into(),
        }])];
        inject_notice(&mut history, "tools changed");
        match &history[0] {
            Message::User {
                content: MessageContent::Multipart(parts),
            } => match &parts[0] {
                Part::Text { text } => assert!(text.starts_with("[system notice]")),
                other => panic!("expected text part first, got {other:?}"),
            },
            other => panic!("expected multipart user message, got {other:?}"),
        }
    }
}
