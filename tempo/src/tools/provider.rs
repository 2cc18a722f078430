//! Provider session: stdio transport with line-framed JSON-RPC
//! request/response.
//!
//! Spawns the provider process, then serializes calls over its single
//! stdin/stdout channel — one JSON object per line, response matched to the
//! request by id. A single channel cannot interleave calls, so the handle
//! holds the channel behind an async mutex; parallelism across *different*
//! providers is the registry's business.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use provider_protocol::{CallToolResult, ListToolsResult, ProviderRequest, ProviderResponse};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Deadline for a `list_tools` answer at startup.
const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(20);
/// Deadline for one tool execution. Generous: the forum facade blocks on a
/// whole discussion.
const CALL_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from provider transport and protocol handling.
#[derive(Debug, thiserror::Error)]
pub enum ToolSourceError {
    #[error("spawn provider: {0}")]
    Spawn(String),
    #[error("provider transport: {0}")]
    Transport(String),
    #[error("provider timeout after {0:?}")]
    Timeout(Duration),
    #[error("provider protocol: {0}")]
    Protocol(String),
    #[error("{0}")]
    Provider(String),
}

/// How to launch one provider subprocess.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Group name, e.g. `filemanager`; used in logs only.
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
        }
    }
}

struct Channel {
    // Held so the child is killed when the handle drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A running tool-provider subprocess plus its serialized request channel.
pub struct ProviderHandle {
    name: String,
    channel: tokio::sync::Mutex<Channel>,
    next_id: AtomicU64,
}

impl ProviderHandle {
    /// Spawns the provider. Stderr is inherited so provider logs land in the
    /// service log.
    pub fn spawn(config: &ProviderConfig) -> Result<Self, ToolSourceError> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolSourceError::Spawn(format!("{} ({})", e, config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolSourceError::Spawn("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolSourceError::Spawn("no stdout pipe".to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            channel: tokio::sync::Mutex::new(Channel {
                _child: child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends one request and waits for the matching response line. Responses
    /// with a different id are skipped with a warning (a provider that
    /// answered a timed-out call late).
    async fn request(
        &self,
        request: ProviderRequest,
        timeout: Duration,
    ) -> Result<Value, ToolSourceError> {
        let id = request.id;
        let line = serde_json::to_string(&request)
            .map_err(|e| ToolSourceError::Protocol(e.to_string()))?;

        let mut channel = self.channel.lock().await;
        channel
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        channel
            .stdin
            .write_all(b"\n")
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        channel
            .stdin
            .flush()
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ToolSourceError::Timeout(timeout));
            }
            let next = tokio::time::timeout(remaining, channel.stdout.next_line())
                .await
                .map_err(|_| ToolSourceError::Timeout(timeout))?
                .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
            let Some(line) = next else {
                return Err(ToolSourceError::Transport(format!(
                    "provider {} closed its stdout",
                    self.name
                )));
            };
            if line.trim().is_empty() {
                continue;
            }
            let response: ProviderResponse = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(provider = %self.name, "unparseable provider line: {e}");
                    continue;
                }
            };
            if response.id != id {
                tracing::warn!(
                    provider = %self.name,
                    got = response.id,
                    want = id,
                    "skipping stale provider response"
                );
                continue;
            }
            if let Some(err) = response.error {
                return Err(ToolSourceError::Provider(err.message));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Asks the provider for its advertised tools.
    pub async fn list_tools(
        &self,
    ) -> Result<Vec<provider_protocol::ToolDescriptor>, ToolSourceError> {
        let result = self
            .request(ProviderRequest::list_tools(self.fresh_id()), LIST_TOOLS_TIMEOUT)
            .await?;
        let parsed: ListToolsResult =
            serde_json::from_value(result).map_err(|e| ToolSourceError::Protocol(e.to_string()))?;
        Ok(parsed.tools)
    }

    /// Executes one tool call; the text result is the tool-message content.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<String, ToolSourceError> {
        let result = self
            .request(
                ProviderRequest::call_tool(self.fresh_id(), name, args),
                CALL_TOOL_TIMEOUT,
            )
            .await?;
        let parsed: CallToolResult =
            serde_json::from_value(result).map_err(|e| ToolSourceError::Protocol(e.to_string()))?;
        Ok(parsed.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: a round-trip against a `cat`-style echo process: the
    /// handle writes a request line and reads it back; the id mismatch with
    /// a fabricated response is exercised by piping a scripted shell.
    #[tokio::test]
    async fn request_matches_response_by_id() {
        // The "provider" answers id 1 with a stale id first, then correctly.
        let script = r#"read line; echo '{"id":999,"result":{}}'; echo "{\"id\":1,\"result\":{\"content\":\"ok\"}}""#;
        let handle = ProviderHandle::spawn(&ProviderConfig::new(
            "scripted",
            "sh",
            vec!["-c".to_string(), script.to_string()],
        ))
        .unwrap();
        let content = handle
            .call_tool("anything", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(content, "ok");
    }

    /// **Scenario**: a provider that reports an error yields `Provider` with
    /// the message.
    #[tokio::test]
    async fn provider_error_is_surfaced() {
        let script = r#"read line; echo '{"id":1,"error":{"message":"boom"}}'"#;
        let handle = ProviderHandle::spawn(&ProviderConfig::new(
            "scripted",
            "sh",
            vec!["-c".to_string(), script.to_string()],
        ))
        .unwrap();
        let err = handle
            .call_tool("anything", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolSourceError::Provider(m) if m == "boom"));
    }

    /// **Scenario**: a provider that exits without answering is a transport
    /// error, not a hang.
    #[tokio::test]
    async fn closed_stdout_is_transport_error() {
        let handle = ProviderHandle::spawn(&ProviderConfig::new(
            "dead",
            "sh",
            vec!["-c".to_string(), "read line; exit 0".to_string()],
        ))
        .unwrap();
        let err = handle
            .call_tool("anything", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolSourceError::Transport(_)));
    }
}
