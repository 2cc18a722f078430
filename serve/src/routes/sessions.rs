//! Session endpoints: listing, history, deletion.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use tempo::message::Message;

use crate::auth::check_password;
use crate::dto::{DeleteSessionRequest, SessionHistoryRequest, SessionListRequest};
use crate::state::AppState;

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionListRequest>,
) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    match state.manager.list_sessions(&request.user_id).await {
        Ok(sessions) => {
            Json(serde_json::json!({"status": "success", "sessions": sessions})).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Shapes one stored message for the history payload. Multimodal user
/// content passes through as-is (string or part array).
fn history_entry(message: &Message) -> Option<serde_json::Value> {
    match message {
        Message::User { content } => Some(serde_json::json!({
            "role": "user",
            "content": content,
        })),
        Message::Assistant {
            content,
            tool_calls,
        } => {
            if content.is_empty() && tool_calls.is_empty() {
                return None;
            }
            let mut entry = serde_json::json!({
                "role": "assistant",
                "content": content,
            });
            if !tool_calls.is_empty() {
                entry["tool_calls"] = serde_json::json!(tool_calls
                    .iter()
                    .map(|tc| serde_json::json!({"name": tc.name, "args": tc.arguments}))
                    .collect::<Vec<_>>());
            }
            Some(entry)
        }
        Message::Tool { name, content, .. } => Some(serde_json::json!({
            "role": "tool",
            "content": content,
            "tool_name": name,
        })),
        Message::System { .. } => None,
    }
}

pub async fn session_history(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionHistoryRequest>,
) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    match state
        .manager
        .session_history(&request.user_id, &request.session_id)
        .await
    {
        Ok(messages) => {
            let entries: Vec<_> = messages.iter().filter_map(history_entry).collect();
            Json(serde_json::json!({"status": "success", "messages": entries})).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteSessionRequest>,
) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    let session = (!request.session_id.is_empty()).then_some(request.session_id.as_str());
    match state.manager.delete_session(&request.user_id, session).await {
        Ok(()) => {
            let message = match session {
                Some(sid) => format!("session {sid} deleted"),
                None => format!("all sessions of {} deleted", request.user_id),
            };
            Json(serde_json::json!({"status": "success", "message": message})).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("delete failed: {e}")).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo::message::ToolCall;

    #[test]
    fn history_entries_match_wire_shape() {
        let assistant = Message::assistant_with_calls(
            "checking",
            vec![ToolCall {
                id: "c1".into(),
                name: "list_files".into(),
                arguments: serde_json::json!({"username": "ada"}),
            }],
        );
        let entry = history_entry(&assistant).unwrap();
        assert_eq!(entry["role"], "assistant");
        assert_eq!(entry["tool_calls"][0]["name"], "list_files");

        let tool = Message::tool("c1", "list_files", "a.txt");
        let entry = history_entry(&tool).unwrap();
        assert_eq!(entry["role"], "tool");
        assert_eq!(entry["tool_name"], "list_files");

        assert!(history_entry(&Message::system("hidden")).is_none());
        assert!(history_entry(&Message::assistant("")).is_none());
    }
}
