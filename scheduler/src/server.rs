//! HTTP surface of the scheduler: task CRUD.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, post};
use axum::Router;
use serde::Deserialize;

use crate::Scheduler;

#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub user_id: String,
    pub cron: String,
    pub text: String,
    #[serde(default = "default_session")]
    pub session_id: String,
}

fn default_session() -> String {
    "default".to_string()
}

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/tasks", post(add_task).get(list_tasks))
        .route("/tasks/:task_id", delete(remove_task))
        .with_state(scheduler)
}

async fn add_task(
    State(scheduler): State<Arc<Scheduler>>,
    Json(body): Json<CreateTask>,
) -> Response {
    match scheduler
        .add(&body.user_id, &body.cron, &body.text, &body.session_id)
        .await
    {
        Ok((task_id, next_run)) => Json(serde_json::json!({
            "task_id": task_id,
            "user_id": body.user_id,
            "cron": body.cron,
            "text": body.text,
            "next_run": next_run,
        }))
        .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn list_tasks(State(scheduler): State<Arc<Scheduler>>) -> Response {
    Json(scheduler.list().await).into_response()
}

async fn remove_task(
    State(scheduler): State<Arc<Scheduler>>,
    Path(task_id): Path<String>,
) -> Response {
    if scheduler.remove(&task_id).await {
        Json(serde_json::json!({"status": "deleted"})).into_response()
    } else {
        (StatusCode::NOT_FOUND, "no such task").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt as _;

    fn app() -> Router {
        router(Arc::new(Scheduler::new(
            "http://127.0.0.1:1/system_trigger",
            "token",
        )))
    }

    #[tokio::test]
    async fn create_then_delete_over_http() {
        let app = app();
        let request = axum::http::Request::post("/tasks")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                r#"{"user_id":"ada","cron":"0 9 * * 1","text":"weekly plan"}"#,
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let request = axum::http::Request::delete(format!("/tasks/{task_id}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = axum::http::Request::delete(format!("/tasks/{task_id}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_cron_is_400() {
        let request = axum::http::Request::post("/tasks")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                r#"{"user_id":"ada","cron":"not a cron","text":"x"}"#,
            ))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
