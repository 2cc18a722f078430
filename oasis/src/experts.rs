//! Expert participation: backends and the reply contract.
//!
//! An expert invocation reads the other experts' posts, asks its backend for
//! a strict JSON reply `{reply_to, content, votes}`, then publishes and
//! votes. Two backends exist: a stateless direct LLM call, and a stateful
//! sub-agent session bridged through the agent's `/oasis/ask`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use tempo::llm::{CompletionRequest, LlmClient};
use tempo::message::Message;

use crate::board::{ForumBoard, Post, VoteDirection};
use crate::roster::ExpertConfig;

/// Wall-clock budget for one sub-agent participation.
const SUBAGENT_TIMEOUT: Duration = Duration::from_secs(120);
/// Post published when the sub-agent missed its deadline.
pub const SUBAGENT_TIMEOUT_POST: &str = "(subagent thought too long, no response in time)";
/// Fallback posts truncate the raw reply to this many characters.
const FALLBACK_MAX_CHARS: usize = 300;

/// Parsed expert reply.
#[derive(Debug, PartialEq)]
pub struct ExpertReply {
    pub reply_to: Option<u64>,
    pub content: String,
    pub votes: Vec<(u64, VoteDirection)>,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    reply_to: Option<u64>,
    content: String,
    #[serde(default)]
    votes: Vec<serde_json::Value>,
}

/// Strips a Markdown code fence around the payload, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") up to the first newline
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses the strict reply schema. Returns `None` when the payload is not a
/// JSON object with `content`; individual malformed votes are dropped
/// silently rather than failing the reply.
pub fn parse_expert_reply(raw: &str) -> Option<ExpertReply> {
    let parsed: RawReply = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let votes = parsed
        .votes
        .iter()
        .filter_map(|v| {
            let post_id = v.get("post_id")?.as_u64()?;
            let direction = match v.get("direction")?.as_str()? {
                "up" => VoteDirection::Up,
                "down" => VoteDirection::Down,
                _ => return None,
            };
            Some((post_id, direction))
        })
        .collect();
    Some(ExpertReply {
        reply_to: parsed.reply_to,
        content: parsed.content,
        votes,
    })
}

/// Renders the other experts' posts into the compact block shown to an
/// expert.
pub fn format_posts(posts: &[Post]) -> String {
    if posts.is_empty() {
        return "(no posts yet — you open the discussion)".to_string();
    }
    posts
        .iter()
        .map(|p| {
            let reply = p
                .reply_to
                .map(|r| format!(" (reply to #{r})"))
                .unwrap_or_default();
            format!(
                "#{} [{}] (+{}/-{}){}: {}",
                p.id, p.author, p.upvotes, p.downvotes, reply, p.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One way of producing an expert's raw reply text.
#[async_trait]
pub trait ExpertBackend: Send + Sync {
    async fn respond(
        &self,
        expert: &ExpertConfig,
        question: &str,
        others: &[Post],
    ) -> Result<String, String>;
}

/// Backend A: a fresh stateless LLM call carrying the full visible post
/// list. Simple, cheap, no tools.
pub struct DirectLlmBackend {
    llm: std::sync::Arc<dyn LlmClient>,
}

impl DirectLlmBackend {
    pub fn new(llm: std::sync::Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

const REPLY_CONTRACT: &str = r#"Reply with exactly one JSON object, nothing else:
{"reply_to": <post id you are responding to, or null>, "content": "<your post>", "votes": [{"post_id": <id>, "direction": "up" | "down"}]}
Vote up posts you endorse and down posts you find flawed. Do not vote on your own posts."#;

#[async_trait]
impl ExpertBackend for DirectLlmBackend {
    async fn respond(
        &self,
        expert: &ExpertConfig,
        question: &str,
        others: &[Post],
    ) -> Result<String, String> {
        let system = format!(
            "{}\nYou are {}, one expert in a multi-expert forum discussion.",
            expert.persona, expert.name
        );
        let user = format!(
            "Discussion topic: {question}\n\nThe other experts' posts so far:\n{}\n\n{REPLY_CONTRACT}",
            format_posts(others)
        );
        let request = CompletionRequest::new(vec![Message::system(system), Message::user(user)])
            .with_temperature(expert.temperature)
            .with_max_tokens(2048);
        self.llm
            .complete(request)
            .await
            .map(|r| r.content)
            .map_err(|e| e.to_string())
    }
}

/// Backend B: each expert is a thread in the agent runtime, owned by the
/// topic's user and reached through `/oasis/ask` with the internal token.
/// The agent keeps per-session delivery offsets, so this side always sends
/// the full post list and lets the agent diff.
pub struct BotSessionBackend {
    client: reqwest::Client,
    agent_base: String,
    internal_token: String,
    topic_id: String,
    owner: String,
    enabled_tools: Option<Vec<String>>,
}

impl BotSessionBackend {
    pub fn new(
        agent_base: impl Into<String>,
        internal_token: impl Into<String>,
        topic_id: impl Into<String>,
        owner: impl Into<String>,
        enabled_tools: Option<Vec<String>>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            agent_base: agent_base.into().trim_end_matches('/').to_string(),
            internal_token: internal_token.into(),
            topic_id: topic_id.into(),
            owner: owner.into(),
            enabled_tools,
        }
    }
}

#[async_trait]
impl ExpertBackend for BotSessionBackend {
    async fn respond(
        &self,
        expert: &ExpertConfig,
        question: &str,
        others: &[Post],
    ) -> Result<String, String> {
        let history: Vec<HashMap<&str, String>> = others
            .iter()
            .map(|p| {
                HashMap::from([
                    ("role", p.author.clone()),
                    ("content", p.content.clone()),
                ])
            })
            .collect();
        let session_id = format!("{}_{}", self.topic_id, expert.name.replace(' ', "_"));
        let body = serde_json::json!({
            "session_id": session_id,
            "topic": question,
            "history": history,
            "user_id": self.owner,
            "enabled_tools": self.enabled_tools,
            "persona": format!("{}\nYou are {}.\n\n{}", expert.persona, expert.name, REPLY_CONTRACT),
        });

        let result = self
            .client
            .post(format!("{}/oasis/ask", self.agent_base))
            .header("X-Internal-Token", &self.internal_token)
            .json(&body)
            .timeout(SUBAGENT_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<serde_json::Value>()
                .await
                .map(|v| v["content"].as_str().unwrap_or_default().to_string())
                .map_err(|e| format!("bridge reply unreadable: {e}")),
            Ok(resp) => Err(format!("agent bridge returned {}", resp.status())),
            Err(e) if e.is_timeout() => Ok(SUBAGENT_TIMEOUT_POST.to_string()),
            Err(e) => Err(format!("agent bridge unreachable: {e}")),
        }
    }
}

/// One full participation: read, respond, publish, vote. Backend failures
/// are logged and skipped; unparseable replies fall back to a truncated raw
/// post so a stubborn model still contributes.
pub async fn participate(expert: &ExpertConfig, board: &ForumBoard, backend: &dyn ExpertBackend) {
    let others = board.browse(Some(&expert.name), true).await;
    let raw = match backend.respond(expert, &board.question, &others).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(expert = %expert.name, "participation failed: {e}");
            return;
        }
    };

    match parse_expert_reply(&raw) {
        Some(reply) => {
            // Soft dialog structure: default to answering the latest
            // non-self post when the model named none.
            let reply_to = reply.reply_to.or_else(|| others.last().map(|p| p.id));
            board.publish(&expert.name, &reply.content, reply_to).await;
            for (post_id, direction) in reply.votes {
                board.vote(&expert.name, post_id, direction).await;
            }
        }
        None => {
            let truncated: String = raw.chars().take(FALLBACK_MAX_CHARS).collect();
            if truncated.is_empty() {
                tracing::warn!(expert = %expert.name, "empty reply; skipping post");
                return;
            }
            board.publish(&expert.name, &truncated, None).await;
        }
    }
}
