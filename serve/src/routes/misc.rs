//! Login, tool catalog, and the TTS passthrough.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::auth::{check_internal, check_password};
use crate::dto::{LoginRequest, TtsRequest};
use crate::state::AppState;

const MAX_TTS_CHARS: usize = 4_000;

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match check_password(&state, &request.user_id, &request.password) {
        Ok(()) => {
            Json(serde_json::json!({"status": "success", "message": "login ok"})).into_response()
        }
        Err(resp) => resp,
    }
}

/// Tool catalog for the control panel. Internal-token guarded; the frontend
/// proxy is the intended caller.
pub async fn tools(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = check_internal(&state, &headers) {
        return resp;
    }
    let tools: Vec<_> = state
        .runtime
        .registry
        .tools_info()
        .into_iter()
        .map(|(name, description)| serde_json::json!({"name": name, "description": description}))
        .collect();
    Json(serde_json::json!({"status": "success", "tools": tools})).into_response()
}

/// Text-to-speech passthrough: proxies to the vendor's `/audio/speech` and
/// streams the mp3 back.
pub async fn tts(State(state): State<Arc<AppState>>, Json(request): Json<TtsRequest>) -> Response {
    if let Err(resp) = check_password(&state, &request.user_id, &request.password) {
        return resp;
    }
    let text: String = request.text.trim().chars().take(MAX_TTS_CHARS).collect();
    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, "text must not be empty").into_response();
    }

    let api_key = config::env_or("LLM_API_KEY", "");
    let base_url = config::env_or("LLM_BASE_URL", "");
    if api_key.is_empty() || base_url.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "TTS API is not configured").into_response();
    }
    let model = config::env_or("TTS_MODEL", "gemini-2.5-flash-preview-tts");
    let voice = request
        .voice
        .clone()
        .unwrap_or_else(|| config::env_or("TTS_VOICE", "charon"));

    let url = format!("{}/audio/speech", base_url.trim_end_matches('/'));
    let upstream = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .json(&serde_json::json!({
            "model": model,
            "input": text,
            "voice": voice,
            "response_format": "mp3",
        }))
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await;

    match upstream {
        Ok(resp) if resp.status().is_success() => {
            let stream = resp.bytes_stream();
            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "audio/mpeg")
                .header("content-disposition", "inline; filename=tts_output.mp3")
                .body(Body::from_stream(stream))
                .unwrap_or_else(|e| {
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                })
        }
        Ok(resp) => {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            let clipped: String = detail.chars().take(200).collect();
            (
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                format!("TTS API error: {clipped}"),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            format!("TTS upstream unreachable: {e}"),
        )
            .into_response(),
    }
}
