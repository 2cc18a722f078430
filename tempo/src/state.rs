//! Graph state for the conversational agent.

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::tools::ToolSpec;

/// Who originated the latest user message of a turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    #[default]
    User,
    /// Scheduler or another internal caller; the prompt gets the
    /// system-trigger wrap so the model knows no human is waiting.
    System,
}

/// State flowing through the agent graph.
///
/// `messages` is the thread history plus this turn's input; the executor
/// appends to it and checkpoints after every node. The remaining fields are
/// per-turn context and are not interesting after END.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub trigger_source: TriggerSource,
    /// Subset of tool names allowed this turn. `None` = all, `Some([])` = none.
    #[serde(default)]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    /// Tools the caller will execute itself. A model call naming one of these
    /// ends the run with the assistant message left unanswered.
    #[serde(default)]
    pub external_tools: Vec<ToolSpec>,
}

impl AgentState {
    /// Turn input: the new messages plus routing context. History is merged
    /// in by the executor from the checkpoint.
    pub fn turn(
        messages: Vec<Message>,
        trigger_source: TriggerSource,
        enabled_tools: Option<Vec<String>>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            messages,
            trigger_source,
            enabled_tools,
            user_id: user_id.into(),
            session_id: session_id.into(),
            external_tools: Vec::new(),
        }
    }

    /// Content of the final assistant message, if any.
    pub fn last_assistant_reply(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Composes a thread id from user and session. The `#` separator is a
/// composition rule only; thread ids are otherwise opaque.
pub fn thread_id(user_id: &str, session_id: &str) -> String {
    format!("{user_id}#{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_composition() {
        assert_eq!(thread_id("ada", "default"), "ada#default");
    }

    #[test]
    fn last_assistant_reply_skips_tool_messages() {
        let state = AgentState {
            messages: vec![
                Message::user("hi"),
                Message::assistant("answer"),
                Message::tool("c1", "list_files", "a.txt"),
            ],
            ..Default::default()
        };
        assert_eq!(state.last_assistant_reply(), Some("answer"));
    }
}
