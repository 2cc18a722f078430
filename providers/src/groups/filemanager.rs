//! File management tools, rooted in the calling user's file area.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

use super::{object_schema, required_str, ToolGroup};

const MAX_READ_CHARS: usize = 50_000;

pub struct FileManagerGroup {
    dirs: config::DataDirs,
}

impl FileManagerGroup {
    pub fn from_env() -> Self {
        Self {
            dirs: config::DataDirs::from_env(),
        }
    }

    pub fn new(dirs: config::DataDirs) -> Self {
        Self { dirs }
    }

    /// Resolves a user-relative file name inside the user's area. Rejects
    /// absolute paths and `..` so a file name can never escape the root.
    fn resolve(&self, username: &str, filename: &str) -> Result<PathBuf, String> {
        let rel = Path::new(filename);
        if rel.is_absolute() {
            return Err("absolute paths are not allowed".to_string());
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err("path may not leave your file area".to_string()),
            }
        }
        Ok(self.dirs.user_work_dir(username).join(rel))
    }

    fn root(&self, username: &str) -> PathBuf {
        self.dirs.user_work_dir(username)
    }
}

fn list_dir(root: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut names = Vec::new();
    if !root.is_dir() {
        return Ok(names);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(root) {
                names.push(rel.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl ToolGroup for FileManagerGroup {
    fn tools(&self) -> Vec<ToolDescriptor> {
        let file_arg = [
            ("username", "string", "owner of the file area (injected)"),
            ("filename", "string", "file name inside your file area"),
        ];
        let content_arg = [
            ("username", "string", "owner of the file area (injected)"),
            ("filename", "string", "file name inside your file area"),
            ("content", "string", "text content to write"),
        ];
        vec![
            ToolDescriptor {
                name: "list_files".into(),
                description: "List all files in your personal file area.".into(),
                parameters_schema: object_schema(
                    &[("username", "string", "owner of the file area (injected)")],
                    &[],
                ),
            },
            ToolDescriptor {
                name: "read_file".into(),
                description: "Read a text file from your file area.".into(),
                parameters_schema: object_schema(&file_arg, &[]),
            },
            ToolDescriptor {
                name: "write_file".into(),
                description: "Create or overwrite a text file in your file area.".into(),
                parameters_schema: object_schema(&content_arg, &[]),
            },
            ToolDescriptor {
                name: "append_file".into(),
                description: "Append text to a file in your file area (creates it if missing)."
                    .into(),
                parameters_schema: object_schema(&content_arg, &[]),
            },
            ToolDescriptor {
                name: "delete_file".into(),
                description: "Delete a file from your file area.".into(),
                parameters_schema: object_schema(&file_arg, &[]),
            },
        ]
    }

    async fn call(&self, name: &str, args: &Value) -> String {
        match self.dispatch(name, args) {
            Ok(text) => text,
            Err(e) => format!("file operation failed: {e}"),
        }
    }
}

impl FileManagerGroup {
    fn dispatch(&self, name: &str, args: &Value) -> Result<String, String> {
        let username = required_str(args, "username")?;
        match name {
            "list_files" => {
                let files = list_dir(&self.root(username)).map_err(|e| e.to_string())?;
                if files.is_empty() {
                    Ok("your file area is empty".to_string())
                } else {
                    Ok(format!("{} file(s):\n{}", files.len(), files.join("\n")))
                }
            }
            "read_file" => {
                let path = self.resolve(username, required_str(args, "filename")?)?;
                let content = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
                if content.chars().count() > MAX_READ_CHARS {
                    let truncated: String = content.chars().take(MAX_READ_CHARS).collect();
                    Ok(format!("{truncated}\n\n... (file too long, truncated)"))
                } else {
                    Ok(content)
                }
            }
            "write_file" => {
                let path = self.resolve(username, required_str(args, "filename")?)?;
                let content = required_str(args, "content")?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                std::fs::write(&path, content).map_err(|e| e.to_string())?;
                Ok(format!("wrote {} bytes", content.len()))
            }
            "append_file" => {
                let path = self.resolve(username, required_str(args, "filename")?)?;
                let content = required_str(args, "content")?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                use std::io::Write;
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| e.to_string())?;
                file.write_all(content.as_bytes()).map_err(|e| e.to_string())?;
                Ok(format!("appended {} bytes", content.len()))
            }
            "delete_file" => {
                let path = self.resolve(username, required_str(args, "filename")?)?;
                std::fs::remove_file(&path).map_err(|e| e.to_string())?;
                Ok("file deleted".to_string())
            }
            other => Err(format!("unhandled tool: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> (tempfile::TempDir, FileManagerGroup) {
        let dir = tempfile::tempdir().unwrap();
        let group = FileManagerGroup::new(config::DataDirs::new(dir.path()));
        (dir, group)
    }

    #[tokio::test]
    async fn write_list_read_delete_cycle() {
        let (_dir, group) = group();
        let args = serde_json::json!({
            "username": "ada", "filename": "notes.txt", "content": "hello"
        });
        assert!(group.call("write_file", &args).await.contains("wrote"));
        let listing = group
            .call("list_files", &serde_json::json!({"username": "ada"}))
            .await;
        assert!(listing.contains("notes.txt"));
        let content = group
            .call(
                "read_file",
                &serde_json::json!({"username": "ada", "filename": "notes.txt"}),
            )
            .await;
        assert_eq!(content, "hello");
        group
            .call(
                "delete_file",
                &serde_json::json!({"username": "ada", "filename": "notes.txt"}),
            )
            .await;
        let listing = group
            .call("list_files", &serde_json::json!({"username": "ada"}))
            .await;
        assert!(listing.contains("empty"));
    }

    /// **Scenario**: traversal outside the user's area is refused.
    #[tokio::test]
    async fn rejects_parent_traversal() {
        let (_dir, group) = group();
        let out = group
            .call(
                "read_file",
                &serde_json::json!({"username": "ada", "filename": "../../etc/passwd"}),
            )
            .await;
        assert!(out.contains("may not leave"));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (_dir, group) = group();
        group
            .call(
                "write_file",
                &serde_json::json!({"username": "ada", "filename": "a.txt", "content": "x"}),
            )
            .await;
        let listing = group
            .call("list_files", &serde_json::json!({"username": "bob"}))
            .await;
        assert!(listing.contains("empty"));
    }
}
