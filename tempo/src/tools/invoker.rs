//! Tool invocation policy: enabled-set interception, identity injection,
//! parallel dispatch in request order.

use serde_json::Value;

use crate::message::{Message, ToolCall};
use crate::tools::ToolRegistry;

/// Tools that execute in the caller's user scope and therefore get a
/// `username` argument injected before dispatch.
pub const USER_INJECTED_TOOLS: &[&str] = &[
    // file management
    "list_files",
    "read_file",
    "write_file",
    "append_file",
    "delete_file",
    // command execution
    "run_command",
    // alarm management
    "add_alarm",
    "list_alarms",
    "delete_alarm",
    // push notifications
    "set_push_key",
    "send_push_notification",
    "get_push_status",
    // forum topics are owned by the requesting user (sub-agent sessions run
    // in that user's namespace)
    "post_to_oasis",
];

fn disabled_text(name: &str) -> String {
    format!(
        "Tool '{name}' is currently disabled. This usually protects the system or keeps the \
         session lean. Re-enable it in the control panel if you really need it, or tell me \
         your end goal and I will look for an alternative among the enabled tools."
    )
}

fn inject_identity(call: &ToolCall, user_id: &str, session_id: &str) -> Value {
    let mut args = call.arguments.clone();
    if !args.is_object() {
        // A model that produced non-object args still reaches the provider,
        // which reports its own validation error.
        return args;
    }
    let obj = args.as_object_mut().unwrap();
    if USER_INJECTED_TOOLS.contains(&call.name.as_str()) {
        obj.insert("username".to_string(), Value::String(user_id.to_string()));
    }
    // The alarm remembers which session it should fire back into.
    if call.name == "add_alarm" {
        obj.insert(
            "session_id".to_string(),
            Value::String(session_id.to_string()),
        );
    }
    args
}

/// Executes one assistant message's tool calls and returns one tool-result
/// message per call, in request order.
///
/// Calls outside `enabled` short-circuit with a disabled notice and never
/// reach a provider. Allowed calls run concurrently; calls sharing a provider
/// serialize on its channel. A provider failure becomes the result text of
/// that call only — the turn continues.
pub async fn invoke_calls(
    registry: &ToolRegistry,
    calls: &[ToolCall],
    enabled: Option<&[String]>,
    user_id: &str,
    session_id: &str,
) -> Vec<Message> {
    let futures: Vec<_> = calls
        .iter()
        .map(|call| async move {
            let allowed = match enabled {
                Some(set) => set.iter().any(|e| e == &call.name),
                None => true,
            };
            if !allowed {
                tracing::info!(tool = %call.name, "blocked disabled tool call");
                return Message::tool(&call.id, &call.name, disabled_text(&call.name));
            }
            let args = inject_identity(call, user_id, session_id);
            tracing::info!(tool = %call.name, "dispatching tool call");
            match registry.call(&call.name, args).await {
                Ok(content) => Message::tool(&call.id, &call.name, content),
                Err(e) => Message::tool(
                    &call.id,
                    &call.name,
                    format!("tool '{}' failed: {e}", call.name),
                ),
            }
        })
        .collect();
    futures::future::join_all(futures).await
}
