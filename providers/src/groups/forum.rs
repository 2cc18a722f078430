//! Forum facade tools: let the agent start and inspect OASIS discussions.

use std::time::Duration;

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

use super::{object_schema, optional_str, required_str, ToolGroup};

/// How long `post_to_oasis` waits for a conclusion before giving up. Kept
/// under the invoker's call deadline so the caller sees our message, not a
/// transport timeout.
const CONCLUSION_WAIT_SECS: u64 = 280;

pub struct ForumGroup {
    client: reqwest::Client,
    base_url: String,
}

impl ForumGroup {
    pub fn from_env() -> Self {
        let port = config::env_or("PORT_OASIS", "51202");
        Self::new(config::env_or(
            "OASIS_BASE_URL",
            &format!("http://127.0.0.1:{port}"),
        ))
    }

    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ToolGroup for ForumGroup {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "post_to_oasis".into(),
                description:
                    "Submit a question to the OASIS forum for multi-expert discussion and wait \
                     for the conclusion. Use for questions that benefit from several \
                     perspectives: strategy, pros/cons, controversial topics. Set \
                     use_bot_session=true to back each expert with a stateful tool-capable \
                     agent session."
                        .into(),
                parameters_schema: object_schema(
                    &[
                        ("username", "string", "topic owner (injected)"),
                        ("question", "string", "the question or topic to discuss"),
                        ("max_rounds", "integer", "discussion rounds, 1-20 (default 5)"),
                        (
                            "use_bot_session",
                            "boolean",
                            "back experts with stateful agent sessions (default false)",
                        ),
                    ],
                    &["max_rounds", "use_bot_session"],
                ),
            },
            ToolDescriptor {
                name: "check_oasis_discussion".into(),
                description:
                    "Check the status of an OASIS discussion: progress, recent posts, and the \
                     conclusion when available."
                        .into(),
                parameters_schema: object_schema(
                    &[("topic_id", "string", "topic id returned by post_to_oasis")],
                    &[],
                ),
            },
            ToolDescriptor {
                name: "list_oasis_topics".into(),
                description: "List discussion topics on the OASIS forum.".into(),
                parameters_schema: object_schema(
                    &[("user_id", "string", "optional filter by owner")],
                    &["user_id"],
                ),
            },
        ]
    }

    async fn call(&self, name: &str, args: &Value) -> String {
        match name {
            "post_to_oasis" => self.post_to_oasis(args).await,
            "check_oasis_discussion" => self.check_discussion(args).await,
            "list_oasis_topics" => self.list_topics(args).await,
            other => format!("unhandled tool: {other}"),
        }
    }
}

impl ForumGroup {
    async fn post_to_oasis(&self, args: &Value) -> String {
        let question = match required_str(args, "question") {
            Ok(q) => q,
            Err(e) => return format!("cannot create topic: {e}"),
        };
        let username = optional_str(args, "username").unwrap_or("agent_user");
        let max_rounds = args.get("max_rounds").and_then(Value::as_u64).unwrap_or(5);
        let use_bot_session = args
            .get("use_bot_session")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let create = self
            .client
            .post(format!("{}/topics", self.base_url))
            .json(&serde_json::json!({
                "question": question,
                "user_id": username,
                "max_rounds": max_rounds,
                "use_bot_session": use_bot_session,
            }))
            .send()
            .await;
        let topic_id = match create {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => body["topic_id"].as_str().unwrap_or_default().to_string(),
                Err(e) => return format!("topic created but response unreadable: {e}"),
            },
            Ok(resp) => {
                return format!(
                    "failed to create topic: {}",
                    resp.text().await.unwrap_or_default()
                )
            }
            Err(e) => {
                return format!(
                    "cannot connect to the OASIS forum service: {e}. Is it running?"
                )
            }
        };

        let conclusion = self
            .client
            .get(format!("{}/topics/{}/conclusion", self.base_url, topic_id))
            .query(&[("timeout", CONCLUSION_WAIT_SECS)])
            .timeout(Duration::from_secs(CONCLUSION_WAIT_SECS + 10))
            .send()
            .await;
        match conclusion {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => format!(
                    "OASIS discussion finished\ntopic: {}\nrounds: {}\nposts: {}\n\nconclusion:\n{}\n\n(full transcript: topic id {topic_id})",
                    body["question"].as_str().unwrap_or(question),
                    body["rounds"],
                    body["total_posts"],
                    body["conclusion"].as_str().unwrap_or("(none)"),
                ),
                Err(e) => format!("conclusion reply unreadable: {e}"),
            },
            Ok(resp) if resp.status().as_u16() == 504 => format!(
                "the discussion did not finish in time (topic id {topic_id}); check later with check_oasis_discussion"
            ),
            Ok(resp) => format!(
                "failed to fetch the conclusion: {}",
                resp.text().await.unwrap_or_default()
            ),
            Err(e) => format!("cannot fetch the conclusion: {e}"),
        }
    }

    async fn check_discussion(&self, args: &Value) -> String {
        let topic_id = match required_str(args, "topic_id") {
            Ok(t) => t,
            Err(e) => return format!("cannot check discussion: {e}"),
        };
        let resp = self
            .client
            .get(format!("{}/topics/{}", self.base_url, topic_id))
            .send()
            .await;
        let body = match resp {
            Ok(r) if r.status().as_u16() == 404 => {
                return format!("no discussion with topic id {topic_id}")
            }
            Ok(r) if r.status().is_success() => match r.json::<Value>().await {
                Ok(b) => b,
                Err(e) => return format!("discussion reply unreadable: {e}"),
            },
            Ok(r) => return format!("query failed: {}", r.text().await.unwrap_or_default()),
            Err(e) => return format!("cannot connect to the OASIS forum service: {e}"),
        };

        let mut lines = vec![
            "OASIS discussion".to_string(),
            format!("topic: {}", body["question"].as_str().unwrap_or("?")),
            format!(
                "status: {} (round {}/{})",
                body["status"].as_str().unwrap_or("?"),
                body["current_round"],
                body["max_rounds"],
            ),
            "".to_string(),
            "--- recent posts ---".to_string(),
        ];
        let posts = body["posts"].as_array().cloned().unwrap_or_default();
        let start = posts.len().saturating_sub(10);
        for p in &posts[start..] {
            let reply = p["reply_to"]
                .as_i64()
                .map(|r| format!("(reply to #{r}) "))
                .unwrap_or_default();
            let content = p["content"].as_str().unwrap_or("");
            let clipped: String = content.chars().take(150).collect();
            let suffix = if content.chars().count() > 150 { "..." } else { "" };
            lines.push(format!(
                "#{} {} {}[+{} -{}]: {clipped}{suffix}",
                p["id"],
                p["author"].as_str().unwrap_or("?"),
                reply,
                p["upvotes"],
                p["downvotes"],
            ));
        }
        if let Some(conclusion) = body["conclusion"].as_str() {
            lines.push(String::new());
            lines.push("=== conclusion ===".to_string());
            lines.push(conclusion.to_string());
        } else if body["status"].as_str() == Some("discussing") {
            lines.push(String::new());
            lines.push("discussion still in progress...".to_string());
        }
        lines.join("\n")
    }

    async fn list_topics(&self, args: &Value) -> String {
        let mut request = self.client.get(format!("{}/topics", self.base_url));
        if let Some(user_id) = optional_str(args, "user_id") {
            request = request.query(&[("user_id", user_id)]);
        }
        match request.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Vec<Value>>().await {
                Ok(topics) if topics.is_empty() => "the forum has no topics yet".to_string(),
                Ok(topics) => {
                    let mut lines = vec![format!("OASIS forum — {} topic(s)", topics.len())];
                    for t in topics {
                        let question = t["question"].as_str().unwrap_or("?");
                        let clipped: String = question.chars().take(50).collect();
                        lines.push(format!(
                            "[{}] {} | {} | {} post(s) | round {}/{}",
                            t["topic_id"].as_str().unwrap_or("?"),
                            clipped,
                            t["status"].as_str().unwrap_or("?"),
                            t["post_count"],
                            t["current_round"],
                            t["max_rounds"],
                        ));
                    }
                    lines.join("\n")
                }
                Err(e) => format!("topic list unreadable: {e}"),
            },
            Ok(resp) => format!("query failed: {}", resp.text().await.unwrap_or_default()),
            Err(e) => format!("cannot connect to the OASIS forum service: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_forum_fails_soft() {
        let group = ForumGroup::new("http://127.0.0.1:1");
        let out = group
            .call(
                "post_to_oasis",
                &serde_json::json!({"question": "should we?", "username": "ada"}),
            )
            .await;
        assert!(out.contains("cannot connect"), "got: {out}");
    }

    #[tokio::test]
    async fn topic_id_required_for_check() {
        let group = ForumGroup::new("http://127.0.0.1:1");
        let out = group.call("check_oasis_discussion", &serde_json::json!({})).await;
        assert!(out.contains("missing required argument 'topic_id'"));
    }
}
