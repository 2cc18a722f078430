//! Turn endpoints: `/ask`, `/ask_stream`, `/cancel`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use tempo::state::{AgentState, TriggerSource};

use crate::auth::check_password;
use crate::dto::{build_user_message, CancelRequest, UserRequest};
use crate::sse::item_to_event;
use crate::state::AppState;

fn turn_input(request: &UserRequest) -> AgentState {
    AgentState::turn(
        vec![build_user_message(request)],
        TriggerSource::User,
        request.enabled_tools.clone(),
        &request.user_id,
        &request.session_id,
    )
}

/// Non-streaming turn: runs the graph to END and returns the final text.
pub async fn ask(State(state): State<Arc<AppState>>, Json(request): Json<UserRequest>) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    match state.manager.ask(turn_input(&request)).await {
        Ok(response) => Json(serde_json::json!({
            "status": "success",
            "response": response,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("ask failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Streaming turn: tokens and tool markers as SSE, ending with `[DONE]`.
/// Starting a stream cancels any active turn on the same session.
pub async fn ask_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserRequest>,
) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    let rx = state.manager.spawn_stream(turn_input(&request)).await;
    let stream = ReceiverStream::new(rx).map(|item| Ok::<_, Infallible>(item_to_event(&item)));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// Cancels the session's active turn; the thread is repaired before this
/// returns.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CancelRequest>,
) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    state
        .manager
        .cancel(&request.user_id, &request.session_id)
        .await;
    Json(serde_json::json!({"status": "success", "message": "terminated"})).into_response()
}
