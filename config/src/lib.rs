//! Load configuration from a project `.env` and apply it to the process
//! environment with priority: **existing env > .env**. Also the single home
//! for the data-directory layout, the users file, and the internal token.

mod dotenv;
mod paths;
mod token;
mod users;

use std::path::Path;
use thiserror::Error;

pub use paths::DataDirs;
pub use token::ensure_internal_token;
pub use users::{hash_password, load_users, verify_password, UsersError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads the project `.env` (from `override_dir` or the current directory)
/// and sets environment variables only for keys that are **not** already set,
/// so existing env always wins.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;
    for (key, value) in dotenv_map {
        if std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}

/// Reads an env var with a default when unset or empty.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

/// Reads a boolean env var; `"true"` (case-insensitive) is true, anything else false.
/// Unset falls back to `default`.
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => v.trim().eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}
