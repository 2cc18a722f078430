//! Internal service token: shared secret between the agent, forum, and
//! scheduler processes. Read from `INTERNAL_TOKEN`; generated and persisted
//! to the `.env` file on first start so every service picks up the same one.

use std::path::Path;

use rand::RngCore;

/// Returns the internal token, generating one when the env has none.
///
/// A generated token is appended to `env_path` (replacing an empty
/// `INTERNAL_TOKEN=` placeholder line when present) and exported into the
/// process environment. Persistence failures are logged, not fatal: the
/// token still works for this process lifetime.
pub fn ensure_internal_token(env_path: &Path) -> String {
    if let Ok(token) = std::env::var("INTERNAL_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return token;
        }
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

    if let Err(e) = persist_token(env_path, &token) {
        tracing::warn!(path = %env_path.display(), "could not persist INTERNAL_TOKEN: {e}");
    } else {
        tracing::info!(path = %env_path.display(), "generated INTERNAL_TOKEN and wrote it to .env");
    }
    std::env::set_var("INTERNAL_TOKEN", &token);
    token
}

fn persist_token(env_path: &Path, token: &str) -> std::io::Result<()> {
    let existing = std::fs::read_to_string(env_path).unwrap_or_default();
    let placeholder = existing
        .lines()
        .any(|l| l.trim() == "INTERNAL_TOKEN=" || l.trim() == "INTERNAL_TOKEN");
    let content = if placeholder {
        existing
            .lines()
            .map(|l| {
                if l.trim() == "INTERNAL_TOKEN=" || l.trim() == "INTERNAL_TOKEN" {
                    format!("INTERNAL_TOKEN={token}")
                } else {
                    l.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n"
    } else {
        let sep = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        format!("{existing}{sep}\n# service-to-service secret (auto-generated)\nINTERNAL_TOKEN={token}\n")
    };
    if let Some(parent) = env_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(env_path, content)
}
