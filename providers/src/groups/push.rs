//! Push notification tools over a Bark-style gateway. The gateway is an
//! external collaborator; the per-user device key lives in the user's area.

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

use super::{object_schema, optional_str, required_str, ToolGroup};

pub struct PushGroup {
    client: reqwest::Client,
    dirs: config::DataDirs,
    gateway: String,
}

impl PushGroup {
    pub fn from_env() -> Self {
        Self::new(
            config::DataDirs::from_env(),
            config::env_or("PUSH_BASE_URL", "https://api.day.app"),
        )
    }

    pub fn new(dirs: config::DataDirs, gateway: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            dirs,
            gateway: gateway.into().trim_end_matches('/').to_string(),
        }
    }

    fn key_path(&self, username: &str) -> std::path::PathBuf {
        self.dirs.user_dir(username).join("push_key.txt")
    }

    fn load_key(&self, username: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(username))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl ToolGroup for PushGroup {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "set_push_key".into(),
                description: "Store the user's push device key for notifications.".into(),
                parameters_schema: object_schema(
                    &[
                        ("username", "string", "key owner (injected)"),
                        ("key", "string", "device key from the push app"),
                    ],
                    &[],
                ),
            },
            ToolDescriptor {
                name: "send_push_notification".into(),
                description: "Send a push notification to the user's device.".into(),
                parameters_schema: object_schema(
                    &[
                        ("username", "string", "recipient (injected)"),
                        ("title", "string", "notification title"),
                        ("content", "string", "notification body"),
                    ],
                    &["title"],
                ),
            },
            ToolDescriptor {
                name: "get_push_status".into(),
                description: "Check whether push notifications are configured for the user."
                    .into(),
                parameters_schema: object_schema(
                    &[("username", "string", "user to check (injected)")],
                    &[],
                ),
            },
        ]
    }

    async fn call(&self, name: &str, args: &Value) -> String {
        let username = match required_str(args, "username") {
            Ok(u) => u,
            Err(e) => return format!("push failed: {e}"),
        };
        match name {
            "set_push_key" => {
                let key = match required_str(args, "key") {
                    Ok(k) => k,
                    Err(e) => return format!("push failed: {e}"),
                };
                let path = self.key_path(username);
                if let Some(parent) = path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        return format!("cannot store the key: {e}");
                    }
                }
                match std::fs::write(&path, key) {
                    Ok(()) => "push key stored".to_string(),
                    Err(e) => format!("cannot store the key: {e}"),
                }
            }
            "get_push_status" => match self.load_key(username) {
                Some(_) => "push notifications are configured".to_string(),
                None => "no push key stored; use set_push_key first".to_string(),
            },
            "send_push_notification" => {
                let Some(key) = self.load_key(username) else {
                    return "no push key stored; use set_push_key first".to_string();
                };
                let content = match required_str(args, "content") {
                    Ok(c) => c,
                    Err(e) => return format!("push failed: {e}"),
                };
                let title = optional_str(args, "title").unwrap_or("Tempo");
                let url = format!("{}/{key}/{}/{}", self.gateway, encode(title), encode(content));
                match self.client.get(url).send().await {
                    Ok(resp) if resp.status().is_success() => "notification sent".to_string(),
                    Ok(resp) => format!("push gateway error: {}", resp.status()),
                    Err(e) => format!("cannot reach the push gateway: {e}"),
                }
            }
            other => format!("unhandled tool: {other}"),
        }
    }
}

/// Minimal percent-encoding for path segments.
fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_roundtrip_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let group = PushGroup::new(config::DataDirs::new(dir.path()), "http://127.0.0.1:1");
        let status = group
            .call("get_push_status", &serde_json::json!({"username": "ada"}))
            .await;
        assert!(status.contains("no push key"));
        group
            .call(
                "set_push_key",
                &serde_json::json!({"username": "ada", "key": "abc123"}),
            )
            .await;
        let status = group
            .call("get_push_status", &serde_json::json!({"username": "ada"}))
            .await;
        assert!(status.contains("configured"));
    }

    #[test]
    fn encode_escapes_non_ascii() {
        assert_eq!(encode("hi there"), "hi%20there");
        assert_eq!(encode("ok"), "ok");
    }
}
