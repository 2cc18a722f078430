//! Router assembly.

mod ask;
mod misc;
mod sessions;
mod trigger;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", post(misc::login))
        .route("/tools", get(misc::tools))
        .route("/tts", post(misc::tts))
        .route("/ask", post(ask::ask))
        .route("/ask_stream", post(ask::ask_stream))
        .route("/cancel", post(ask::cancel))
        .route("/sessions", post(sessions::list_sessions))
        .route("/session_history", post(sessions::session_history))
        .route("/delete_session", post(sessions::delete_session))
        .route("/system_trigger", post(trigger::system_trigger))
        .route("/oasis/ask", post(trigger::oasis_ask))
        .with_state(state)
}
