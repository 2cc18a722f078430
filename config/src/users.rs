//! Users file: a JSON object mapping user id to the sha-256 hex of the password.
//!
//! Loaded per verification so operators can add users without a restart.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsersError {
    #[error("read users file: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse users file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Hex sha-256 of a password, matching the stored format.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Loads `{user_id: password_hash}`. A missing file is an empty map, so a
/// fresh deployment denies everyone instead of erroring.
pub fn load_users(path: &Path) -> Result<HashMap<String, String>, UsersError> {
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "users file missing; all logins will fail");
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Checks a `(user_id, password)` pair against the users file.
pub fn verify_password(path: &Path, user_id: &str, password: &str) -> bool {
    match load_users(path) {
        Ok(users) => users
            .get(user_id)
            .is_some_and(|stored| *stored == hash_password(password)),
        Err(e) => {
            tracing::error!("users file unreadable: {e}");
            false
        }
    }
}
