//! HTTP surface of the forum service.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use tempo::llm::LlmClient;
use tempo::prompts::PromptSet;
use tempo::stream::sse_escape;

use crate::board::ForumBoard;
use crate::engine::DiscussionEngine;
use crate::experts::{BotSessionBackend, DirectLlmBackend, ExpertBackend};
use crate::models::{CreateTopicRequest, DiscussionStatus, TopicSummary};
use crate::roster::{ExpertConfig, Roster, RosterError};
use crate::schedule::{load_schedule_file, parse_schedule, Schedule};

/// Shared state of the forum process. Topics live here for their lifetime;
/// nothing is persisted.
pub struct ForumState {
    pub topics: DashMap<String, Arc<ForumBoard>>,
    pub roster: Arc<Roster>,
    pub prompts: Arc<PromptSet>,
    pub llm: Arc<dyn LlmClient>,
    pub agent_base: String,
    pub internal_token: String,
}

pub fn router(state: Arc<ForumState>) -> Router {
    Router::new()
        .route("/topics", post(create_topic).get(list_topics))
        .route("/topics/:topic_id", get(get_topic))
        .route("/topics/:topic_id/stream", get(stream_topic))
        .route("/topics/:topic_id/conclusion", get(get_conclusion))
        .route("/experts", get(list_experts))
        .route("/experts/user", post(add_user_expert))
        .route(
            "/experts/user/:tag",
            axum::routing::put(update_user_expert).delete(delete_user_expert),
        )
        .with_state(state)
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, message.into()).into_response()
}

fn roster_error(e: RosterError) -> Response {
    match e {
        RosterError::Storage(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        _ => bad_request(e.to_string()),
    }
}

fn resolve_schedule(req: &CreateTopicRequest) -> Result<Option<Schedule>, Response> {
    if let Some(yaml) = req.schedule_yaml.as_deref() {
        return parse_schedule(yaml).map(Some).map_err(|e| bad_request(e.to_string()));
    }
    if let Some(path) = req.schedule_file.as_deref() {
        return load_schedule_file(path).map(Some).map_err(|e| bad_request(e.to_string()));
    }
    Ok(None)
}

async fn create_topic(
    State(state): State<Arc<ForumState>>,
    Json(req): Json<CreateTopicRequest>,
) -> Response {
    if req.question.trim().is_empty() {
        return bad_request("question must not be empty");
    }
    let schedule = match resolve_schedule(&req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let max_rounds = req.max_rounds.clamp(1, 20);
    let topic_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

    let board = Arc::new(ForumBoard::new(
        &topic_id,
        &req.question,
        &req.user_id,
        max_rounds,
    ));
    state.topics.insert(topic_id.clone(), board.clone());

    let backend: Arc<dyn ExpertBackend> = if req.use_bot_session {
        Arc::new(BotSessionBackend::new(
            &state.agent_base,
            &state.internal_token,
            &topic_id,
            &req.user_id,
            req.bot_enabled_tools.clone(),
        ))
    } else {
        Arc::new(DirectLlmBackend::new(state.llm.clone()))
    };

    let engine = DiscussionEngine::new(
        board.clone(),
        state.roster.visible(&req.user_id),
        &req.expert_tags,
        schedule,
        backend,
        state.llm.clone(),
        state.prompts.oasis_summary.clone(),
    );
    let expert_count = engine.expert_count();

    // The discussion runs in the background; a panic still lands the topic
    // in a terminal state.
    let watchdog_board = board.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(engine.run()).await {
            tracing::error!(topic = %watchdog_board.topic_id, "discussion crashed: {e}");
            watchdog_board
                .set_conclusion(format!("discussion failed: {e}"))
                .await;
            watchdog_board.set_status(DiscussionStatus::Error).await;
        }
    });

    Json(serde_json::json!({
        "topic_id": topic_id,
        "status": "pending",
        "message": format!("Discussion started with {expert_count} experts"),
    }))
    .into_response()
}

async fn get_topic(
    State(state): State<Arc<ForumState>>,
    Path(topic_id): Path<String>,
) -> Response {
    // Clone the Arc out so no map guard lives across the await.
    let board = state.topics.get(&topic_id).map(|b| b.value().clone());
    match board {
        Some(board) => Json(board.detail().await).into_response(),
        None => (StatusCode::NOT_FOUND, "Topic not found").into_response(),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    user_id: Option<String>,
}

async fn list_topics(
    State(state): State<Arc<ForumState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<TopicSummary>> {
    let boards: Vec<Arc<ForumBoard>> = state
        .topics
        .iter()
        .filter(|entry| match &query.user_id {
            Some(user_id) => &entry.value().owner == user_id,
            None => true,
        })
        .map(|entry| entry.value().clone())
        .collect();
    let mut summaries = Vec::new();
    for board in boards {
        summaries.push(board.summary().await);
    }
    summaries.sort_by(|a, b| {
        b.created_at
            .partial_cmp(&a.created_at)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Json(summaries)
}

/// SSE stream of a live discussion: round banners, each new post, the
/// conclusion, `[DONE]`. Payloads are escaped to stay single-line.
async fn stream_topic(
    State(state): State<Arc<ForumState>>,
    Path(topic_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let Some(board) = state.topics.get(&topic_id).map(|b| b.value().clone()) else {
        return Err((StatusCode::NOT_FOUND, "Topic not found").into_response());
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let mut seen_posts = 0usize;
        let mut seen_round = 0u32;
        loop {
            let detail = board.detail().await;
            if detail.current_round > seen_round {
                seen_round = detail.current_round;
                let _ = tx.send(format!("📢 === Round {seen_round} ===")).await;
            }
            for post in &detail.posts[seen_posts..] {
                let prefix = post
                    .reply_to
                    .map(|r| format!("↳ reply to #{r}"))
                    .unwrap_or_else(|| "📌".to_string());
                let _ = tx
                    .send(format!(
                        "{prefix} [{}] (+{}): {}",
                        post.author, post.upvotes, post.content
                    ))
                    .await;
            }
            seen_posts = detail.posts.len();

            if detail.status.is_terminal() {
                if let Some(conclusion) = detail.conclusion {
                    let _ = tx
                        .send(format!("🏆 === Conclusion ===\n{conclusion}"))
                        .await;
                }
                let _ = tx.send("[DONE]".to_string()).await;
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|payload| Ok::<_, Infallible>(Event::default().data(sse_escape(&payload))));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
struct ConclusionQuery {
    #[serde(default = "default_wait")]
    timeout: u64,
}

fn default_wait() -> u64 {
    300
}

/// Blocks until the discussion reaches a terminal state, up to `timeout`
/// seconds.
async fn get_conclusion(
    State(state): State<Arc<ForumState>>,
    Path(topic_id): Path<String>,
    Query(query): Query<ConclusionQuery>,
) -> Response {
    let Some(board) = state.topics.get(&topic_id).map(|b| b.value().clone()) else {
        return (StatusCode::NOT_FOUND, "Topic not found").into_response();
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(query.timeout);
    loop {
        let status = board.status().await;
        if status == DiscussionStatus::Error {
            let reason = board.conclusion().await.unwrap_or_default();
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Discussion failed: {reason}"),
            )
                .into_response();
        }
        if status == DiscussionStatus::Concluded {
            return Json(serde_json::json!({
                "topic_id": board.topic_id,
                "question": board.question,
                "conclusion": board.conclusion().await,
                "rounds": board.current_round().await,
                "total_posts": board.count().await,
            }))
            .into_response();
        }
        if tokio::time::Instant::now() >= deadline {
            return (StatusCode::GATEWAY_TIMEOUT, "Discussion timed out").into_response();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[derive(Deserialize)]
struct ExpertsQuery {
    #[serde(default)]
    user_id: String,
}

async fn list_experts(
    State(state): State<Arc<ForumState>>,
    Query(query): Query<ExpertsQuery>,
) -> Response {
    Json(serde_json::json!({ "experts": state.roster.list(&query.user_id) })).into_response()
}

#[derive(Debug, Deserialize)]
struct UserExpertRequest {
    user_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    persona: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

impl UserExpertRequest {
    fn config(&self, tag_override: Option<&str>) -> ExpertConfig {
        ExpertConfig {
            name: self.name.clone(),
            tag: tag_override.unwrap_or(&self.tag).to_string(),
            persona: self.persona.clone(),
            temperature: self.temperature,
        }
    }
}

async fn add_user_expert(
    State(state): State<Arc<ForumState>>,
    Json(req): Json<UserExpertRequest>,
) -> Response {
    match state.roster.add(&req.user_id, req.config(None)).await {
        Ok(expert) => Json(serde_json::json!({"status": "ok", "expert": expert})).into_response(),
        Err(e) => roster_error(e),
    }
}

async fn update_user_expert(
    State(state): State<Arc<ForumState>>,
    Path(tag): Path<String>,
    Json(req): Json<UserExpertRequest>,
) -> Response {
    match state
        .roster
        .update(&req.user_id, &tag, req.config(Some(&tag)))
        .await
    {
        Ok(expert) => Json(serde_json::json!({"status": "ok", "expert": expert})).into_response(),
        Err(e) => roster_error(e),
    }
}

#[derive(Deserialize)]
struct DeleteExpertQuery {
    user_id: String,
}

async fn delete_user_expert(
    State(state): State<Arc<ForumState>>,
    Path(tag): Path<String>,
    Query(query): Query<DeleteExpertQuery>,
) -> Response {
    match state.roster.delete(&query.user_id, &tag).await {
        Ok(deleted) => Json(serde_json::json!({"status": "ok", "deleted": deleted})).into_response(),
        Err(e) => roster_error(e),
    }
}
