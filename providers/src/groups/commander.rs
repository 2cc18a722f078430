//! Command execution in the user's file area.
//!
//! The working directory is the user's sandboxed file area; deeper isolation
//! (containers, seccomp) is an external collaborator's job and out of scope
//! here.

use std::time::Duration;

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

use super::{object_schema, required_str, ToolGroup};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_OUTPUT_CHARS: usize = 10_000;

pub struct CommanderGroup {
    dirs: config::DataDirs,
}

impl CommanderGroup {
    pub fn from_env() -> Self {
        Self {
            dirs: config::DataDirs::from_env(),
        }
    }

    pub fn new(dirs: config::DataDirs) -> Self {
        Self { dirs }
    }
}

fn clip(s: String) -> String {
    if s.chars().count() > MAX_OUTPUT_CHARS {
        let clipped: String = s.chars().take(MAX_OUTPUT_CHARS).collect();
        format!("{clipped}\n... (output truncated)")
    } else {
        s
    }
}

#[async_trait]
impl ToolGroup for CommanderGroup {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "run_command".into(),
            description:
                "Run a shell command in your personal file area and return its output. \
                 Times out after 60 seconds."
                    .into(),
            parameters_schema: object_schema(
                &[
                    ("username", "string", "owner of the work dir (injected)"),
                    ("command", "string", "shell command line to run"),
                ],
                &[],
            ),
        }]
    }

    async fn call(&self, name: &str, args: &Value) -> String {
        if name != "run_command" {
            return format!("unhandled tool: {name}");
        }
        let (username, command) = match (
            required_str(args, "username"),
            required_str(args, "command"),
        ) {
            (Ok(u), Ok(c)) => (u, c),
            (Err(e), _) | (_, Err(e)) => return format!("command failed: {e}"),
        };

        let cwd = self.dirs.user_work_dir(username);
        if let Err(e) = std::fs::create_dir_all(&cwd) {
            return format!("command failed: cannot create work dir: {e}");
        }

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(COMMAND_TIMEOUT, child).await {
            Err(_) => format!("command timed out after {}s", COMMAND_TIMEOUT.as_secs()),
            Ok(Err(e)) => format!("command failed to start: {e}"),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let mut text = String::new();
                if !stdout.is_empty() {
                    text.push_str(&stdout);
                }
                if !stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str("[stderr]\n");
                    text.push_str(&stderr);
                }
                if text.is_empty() {
                    text = "(no output)".to_string();
                }
                if !output.status.success() {
                    text.push_str(&format!("\n[exit status: {}]", output.status));
                }
                clip(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> (tempfile::TempDir, CommanderGroup) {
        let dir = tempfile::tempdir().unwrap();
        let group = CommanderGroup::new(config::DataDirs::new(dir.path()));
        (dir, group)
    }

    #[tokio::test]
    async fn runs_in_user_dir_and_captures_output() {
        let (_dir, group) = group();
        let out = group
            .call(
                "run_command",
                &serde_json::json!({"username": "ada", "command": "echo hi > f.txt && cat f.txt"}),
            )
            .await;
        assert_eq!(out.trim(), "hi");
        // file landed in ada's area
        let out = group
            .call(
                "run_command",
                &serde_json::json!({"username": "ada", "command": "ls"}),
            )
            .await;
        assert!(out.contains("f.txt"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let (_dir, group) = group();
        let out = group
            .call(
                "run_command",
                &serde_json::json!({"username": "ada", "command": "exit 3"}),
            )
            .await;
        assert!(out.contains("exit status"), "got: {out}");
    }
}
