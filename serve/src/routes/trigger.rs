//! Internal-service endpoints: `/system_trigger` and the OASIS bridge.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};

use tempo::message::Message;
use tempo::prompts::render;
use tempo::state::{thread_id, AgentState, TriggerSource};

use crate::auth::check_internal;
use crate::dto::{OasisAskRequest, SystemTriggerRequest};
use crate::state::AppState;

/// One sub-agent participation may run this long before the bridge answers
/// with a timeout payload.
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Fires an internal prompt into a thread. Fire-and-forget: the graph runs
/// in the background and the scheduler gets its acknowledgement immediately.
pub async fn system_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SystemTriggerRequest>,
) -> Response {
    if let Err(resp) = check_internal(&state, &headers) {
        return resp;
    }
    let input = AgentState::turn(
        vec![Message::user(&request.text)],
        TriggerSource::System,
        None,
        &request.user_id,
        &request.session_id,
    );
    let manager = state.manager.clone();
    let user_id = request.user_id.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.ask(input).await {
            tracing::warn!(user = %user_id, "system trigger turn failed: {e}");
        }
    });
    Json(serde_json::json!({
        "status": "received",
        "message": format!("system trigger accepted for user {}", request.user_id),
    }))
    .into_response()
}

/// The forum invites this agent to participate in a discussion. Delivers
/// only the delta of posts the session has not seen (per-session offsets;
/// an unknown offset resends everything once), wraps it in the conference
/// template, and runs a full turn in the expert's own thread.
pub async fn oasis_ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<OasisAskRequest>,
) -> Response {
    if let Err(resp) = check_internal(&state, &headers) {
        return resp;
    }

    let session_id = format!("oasis_{}", request.session_id);
    let thread = thread_id(&request.user_id, &session_id);

    let delivered = state.manager.oasis_offset(&thread);
    let start = delivered.min(request.history.len());
    let new_posts = &request.history[start..];
    if new_posts.is_empty() && delivered > 0 {
        return Json(serde_json::json!({
            "content": "I am up to date with the discussion; nothing to add.",
            "status": "skipped",
        }))
        .into_response();
    }
    let formatted: String = new_posts
        .iter()
        .map(|p| format!("[{}]: {}", p.role, p.content))
        .collect::<Vec<_>>()
        .join("\n");
    state
        .manager
        .set_oasis_offset(&thread, request.history.len());

    let values = std::collections::HashMap::from([
        ("topic", request.topic.clone()),
        ("new_input", formatted),
    ]);
    let mut trigger_text = render(&state.runtime.prompts.oasis_trigger, &values);
    if delivered == 0 {
        if let Some(persona) = request.persona.as_deref() {
            // First contact: the persona instruction rides along and lives
            // in the thread from then on. Inserted after the invitation
            // marker so the wrap-detection prefix stays intact.
            trigger_text = trigger_text.replacen(
                tempo::prompts::OASIS_TRIGGER_MARKER,
                &format!(
                    "{}\nYour persona for this conference:\n{persona}\n",
                    tempo::prompts::OASIS_TRIGGER_MARKER
                ),
                1,
            );
        }
    }

    let input = AgentState::turn(
        vec![Message::user(trigger_text)],
        TriggerSource::System,
        request.enabled_tools.clone(),
        &request.user_id,
        &session_id,
    );

    match tokio::time::timeout(BRIDGE_TIMEOUT, state.manager.ask(input)).await {
        Ok(Ok(content)) => Json(serde_json::json!({
            "content": content,
            "expert_name": "TempoAgent",
            "status": "success",
        }))
        .into_response(),
        Ok(Err(e)) => Json(serde_json::json!({
            "content": format!("(agent error: {e})"),
            "expert_name": "TempoAgent",
            "status": "error",
        }))
        .into_response(),
        Err(_) => {
            // The dropped turn may have left the trailing assistant message
            // with unanswered tool calls; restore the thread invariant.
            let store = state.manager.store().clone();
            let repair_thread = thread.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    tempo::session::repair_after_cancel(&store, &repair_thread, "").await
                {
                    tracing::warn!(thread = %repair_thread, "bridge timeout repair failed: {e}");
                }
            });
            Json(serde_json::json!({
                "content": "(subagent thought too long, no response in time)",
                "expert_name": "TempoAgent",
                "status": "timeout",
            }))
            .into_response()
        }
    }
}
