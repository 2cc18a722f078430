//! Alarm tools: thin HTTP client of the cron scheduler service.

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

use super::{object_schema, optional_str, required_str, ToolGroup};

pub struct AlarmGroup {
    client: reqwest::Client,
    scheduler_url: String,
}

impl AlarmGroup {
    pub fn from_env() -> Self {
        let port = config::env_or("PORT_SCHEDULER", "51201");
        let base = config::env_or("SCHEDULER_BASE_URL", &format!("http://127.0.0.1:{port}"));
        Self::new(base)
    }

    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            scheduler_url: format!("{}/tasks", base.into().trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ToolGroup for AlarmGroup {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "add_alarm".into(),
                description:
                    "Set a scheduled task (alarm) for the user. `cron` is the five-field \
                     expression `minute hour day month weekday`, e.g. \"0 1 * * *\" for 01:00 \
                     daily. `text` is the instruction to run when it fires."
                        .into(),
                parameters_schema: object_schema(
                    &[
                        ("username", "string", "user the alarm belongs to (injected)"),
                        ("session_id", "string", "session the alarm fires into (injected)"),
                        ("cron", "string", "five-field cron expression"),
                        ("text", "string", "instruction to execute at fire time"),
                    ],
                    &["session_id"],
                ),
            },
            ToolDescriptor {
                name: "list_alarms".into(),
                description: "List the user's scheduled tasks.".into(),
                parameters_schema: object_schema(
                    &[("username", "string", "user whose alarms to list (injected)")],
                    &[],
                ),
            },
            ToolDescriptor {
                name: "delete_alarm".into(),
                description: "Delete a scheduled task by its id.".into(),
                parameters_schema: object_schema(
                    &[
                        ("username", "string", "user the alarm belongs to (injected)"),
                        ("task_id", "string", "id returned when the alarm was created"),
                    ],
                    &[],
                ),
            },
        ]
    }

    async fn call(&self, name: &str, args: &Value) -> String {
        match name {
            "add_alarm" => self.add_alarm(args).await,
            "list_alarms" => self.list_alarms(args).await,
            "delete_alarm" => self.delete_alarm(args).await,
            other => format!("unhandled tool: {other}"),
        }
    }
}

impl AlarmGroup {
    async fn add_alarm(&self, args: &Value) -> String {
        let (username, cron, text) = match (
            required_str(args, "username"),
            required_str(args, "cron"),
            required_str(args, "text"),
        ) {
            (Ok(u), Ok(c), Ok(t)) => (u, c, t),
            (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => return format!("cannot set alarm: {e}"),
        };
        let session_id = optional_str(args, "session_id").unwrap_or("default");
        let payload = serde_json::json!({
            "user_id": username,
            "cron": cron,
            "text": text,
            "session_id": session_id,
        });
        match self.client.post(&self.scheduler_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => format!(
                    "alarm created. task id: {}, next run: {}",
                    body["task_id"].as_str().unwrap_or("?"),
                    body["next_run"].as_str().unwrap_or("?"),
                ),
                Err(e) => format!("alarm created, but the response was unreadable: {e}"),
            },
            Ok(resp) => format!(
                "scheduler rejected the alarm: {}",
                resp.text().await.unwrap_or_default()
            ),
            Err(e) => format!("cannot reach the scheduler service: {e}"),
        }
    }

    async fn list_alarms(&self, args: &Value) -> String {
        let username = match required_str(args, "username") {
            Ok(u) => u,
            Err(e) => return format!("cannot list alarms: {e}"),
        };
        match self.client.get(&self.scheduler_url).send().await {
            Ok(resp) => match resp.json::<Vec<Value>>().await {
                Ok(tasks) => {
                    let mine: Vec<String> = tasks
                        .iter()
                        .filter(|t| t["user_id"].as_str() == Some(username))
                        .map(|t| {
                            format!(
                                "- [id: {}] cron: {}, text: {}",
                                t["task_id"].as_str().unwrap_or("?"),
                                t["cron"].as_str().unwrap_or("?"),
                                t["text"].as_str().unwrap_or("?"),
                            )
                        })
                        .collect();
                    if mine.is_empty() {
                        "no alarms set".to_string()
                    } else {
                        format!("current alarms:\n{}", mine.join("\n"))
                    }
                }
                Err(e) => format!("cannot read the scheduler's reply: {e}"),
            },
            Err(e) => format!("cannot reach the scheduler service: {e}"),
        }
    }

    async fn delete_alarm(&self, args: &Value) -> String {
        let task_id = match required_str(args, "task_id") {
            Ok(t) => t,
            Err(e) => return format!("cannot delete alarm: {e}"),
        };
        let url = format!("{}/{}", self.scheduler_url, task_id);
        match self.client.delete(&url).send().await {
            Ok(resp) if resp.status().is_success() => format!("alarm {task_id} deleted"),
            Ok(resp) => format!(
                "delete failed: {}",
                resp.text().await.unwrap_or_default()
            ),
            Err(e) => format!("cannot reach the scheduler service: {e}"),
        }
    }
}
