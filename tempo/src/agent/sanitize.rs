//! History sanitization before a model call.

use std::collections::HashSet;

use crate::message::Message;

/// Drops trailing assistant messages whose tool-call requests are not all
/// answered by tool results — except when every unanswered call is external
/// (not a registry tool), because those are legitimately awaiting the
/// caller's results and must survive.
///
/// `is_internal` is the same registry-membership test the graph router uses,
/// so "external" means the same thing in both places.
///
/// Operates on a copy; the stored thread is repaired elsewhere (cancellation
/// cleanup), this only protects the prompt we are about to send.
pub fn sanitize_messages<F>(messages: &[Message], is_internal: F) -> Vec<Message>
where
    F: Fn(&str) -> bool,
{
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Tool { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();

    let mut clean: Vec<Message> = messages.to_vec();
    while let Some(last) = clean.last() {
        let calls = last.tool_calls();
        if calls.is_empty() {
            break;
        }
        let unanswered: Vec<_> = calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .collect();
        if unanswered.is_empty() {
            break;
        }
        if unanswered.iter().all(|c| !is_internal(&c.name)) {
            break;
        }
        clean.pop();
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    /// Registry stand-in: only these names are internal tools.
    fn internal(name: &str) -> bool {
        ["list_files", "a", "b"].contains(&name)
    }

    #[test]
    fn complete_history_passes_through() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call("c1", "list_files")]),
            Message::tool("c1", "list_files", "a.txt"),
            Message::assistant("one file"),
        ];
        assert_eq!(sanitize_messages(&msgs, internal), msgs);
    }

    /// **Scenario**: a trailing assistant message with an unanswered internal
    /// call is dropped.
    #[test]
    fn dangling_internal_calls_are_truncated() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call("c1", "list_files")]),
        ];
        let clean = sanitize_messages(&msgs, internal);
        assert_eq!(clean, vec![Message::user("q")]);
    }

    /// **Scenario**: unanswered calls to tools outside the registry survive —
    /// the caller still owes their results.
    #[test]
    fn pending_external_calls_are_preserved() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call("c1", "publish_post")]),
        ];
        assert_eq!(sanitize_messages(&msgs, internal), msgs);
    }

    /// **Scenario**: a mixed internal/external unanswered pair still
    /// truncates — only an all-external tail is awaiting the caller.
    #[test]
    fn mixed_unanswered_calls_are_truncated() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant_with_calls(
                "",
                vec![call("c1", "list_files"), call("c2", "publish_post")],
            ),
        ];
        let clean = sanitize_messages(&msgs, internal);
        assert_eq!(clean, vec![Message::user("q")]);
    }

    /// **Scenario**: truncation only looks at the tail — an assistant
    /// message followed by a tool result is not the tail, so it stays even
    /// when one of its calls is unanswered.
    #[test]
    fn only_trailing_assistant_is_truncated() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call("c1", "a"), call("c2", "b")]),
            Message::tool("c1", "a", "ok"),
        ];
        assert_eq!(sanitize_messages(&msgs, internal), msgs);
    }

    /// **Scenario**: repeated dangling assistant tails are all dropped.
    #[test]
    fn multiple_dangling_tails_are_dropped() {
        let msgs = vec![
            Message::user("q"),
            Message::assistant_with_calls("", vec![call("c1", "a")]),
            Message::assistant_with_calls("", vec![call("c2", "b")]),
        ];
        let clean = sanitize_messages(&msgs, internal);
        assert_eq!(clean, vec![Message::user("q")]);
    }
}
