//! Expert roster: built-in personas plus per-user custom experts.
//!
//! Built-ins come from `data/prompts/oasis_experts.json` when present,
//! otherwise from compiled-in defaults. Custom experts live in one JSON file
//! per user; tag-uniqueness checks and file writes for one user are
//! serialized by a per-user lock.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One expert persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertConfig {
    pub name: String,
    /// Unique among the experts visible to a user.
    pub tag: String,
    pub persona: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// Where an expert comes from, as shown in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpertSource {
    Public,
    Custom,
}

/// Catalog row: the config plus its source.
#[derive(Debug, Clone, Serialize)]
pub struct ExpertInfo {
    pub name: String,
    pub tag: String,
    pub persona: String,
    pub source: ExpertSource,
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("{0}")]
    Validation(String),
    #[error("no custom expert with tag '{0}'")]
    NotFound(String),
    #[error("storage: {0}")]
    Storage(String),
}

fn default_experts() -> Vec<ExpertConfig> {
    vec![
        ExpertConfig {
            name: "Creative Strategist".into(),
            tag: "creative".into(),
            persona: "You are an optimistic innovator who hunts for opportunities and \
                      unconventional solutions. You challenge received wisdom and propose \
                      bold, forward-looking ideas."
                .into(),
            temperature: 0.9,
        },
        ExpertConfig {
            name: "Critical Reviewer".into(),
            tag: "critical".into(),
            persona: "You are a rigorous critical thinker who surfaces risks, gaps, and \
                      logical flaws. You point out the weaknesses in a proposal so the \
                      discussion cannot gloss over important details."
                .into(),
            temperature: 0.3,
        },
        ExpertConfig {
            name: "Data Analyst".into(),
            tag: "data".into(),
            persona: "You are a data-driven analyst who trusts only numbers and evidence. \
                      You back every claim with figures, cases, and step-by-step reasoning."
                .into(),
            temperature: 0.5,
        },
        ExpertConfig {
            name: "Synthesis Advisor".into(),
            tag: "synthesis".into(),
            persona: "You weigh the different viewpoints, look for balanced and actionable \
                      middle ground, identify where the group agrees, and propose pragmatic \
                      recommendations that serve everyone's interests."
                .into(),
            temperature: 0.5,
        },
    ]
}

/// The catalog of built-in and per-user experts.
pub struct Roster {
    builtin: Vec<ExpertConfig>,
    dirs: config::DataDirs,
    user_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Roster {
    /// Loads built-ins from the experts file, or falls back to defaults.
    pub fn load(dirs: config::DataDirs) -> Self {
        let builtin = std::fs::read_to_string(dirs.experts_file())
            .ok()
            .and_then(|content| serde_json::from_str::<Vec<ExpertConfig>>(&content).ok())
            .filter(|experts| !experts.is_empty())
            .unwrap_or_else(|| {
                tracing::info!("no experts file; using built-in defaults");
                default_experts()
            });
        Self {
            builtin,
            dirs,
            user_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn read_custom(&self, user_id: &str) -> Result<Vec<ExpertConfig>, RosterError> {
        let path = self.dirs.user_experts_file(user_id);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| RosterError::Storage(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| RosterError::Storage(e.to_string()))
    }

    fn write_custom(&self, user_id: &str, experts: &[ExpertConfig]) -> Result<(), RosterError> {
        let path = self.dirs.user_experts_file(user_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RosterError::Storage(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(experts)
            .map_err(|e| RosterError::Storage(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| RosterError::Storage(e.to_string()))
    }

    /// Experts visible to a user: built-ins plus their customs.
    pub fn visible(&self, user_id: &str) -> Vec<ExpertConfig> {
        let mut experts = self.builtin.clone();
        if let Ok(custom) = self.read_custom(user_id) {
            experts.extend(custom);
        }
        experts
    }

    /// Catalog listing with sources.
    pub fn list(&self, user_id: &str) -> Vec<ExpertInfo> {
        let mut out: Vec<ExpertInfo> = self
            .builtin
            .iter()
            .map(|e| info(e, ExpertSource::Public))
            .collect();
        if let Ok(custom) = self.read_custom(user_id) {
            out.extend(custom.iter().map(|e| info(e, ExpertSource::Custom)));
        }
        out
    }

    /// Adds a custom expert for the user. The tag must not collide with a
    /// built-in tag or another of the user's custom tags.
    pub async fn add(&self, user_id: &str, expert: ExpertConfig) -> Result<ExpertConfig, RosterError> {
        validate(&expert)?;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if self.builtin.iter().any(|e| e.tag == expert.tag) {
            return Err(RosterError::Validation(format!(
                "tag '{}' collides with a built-in expert",
                expert.tag
            )));
        }
        let mut custom = self.read_custom(user_id)?;
        if custom.iter().any(|e| e.tag == expert.tag) {
            return Err(RosterError::Validation(format!(
                "you already have an expert tagged '{}'",
                expert.tag
            )));
        }
        custom.push(expert.clone());
        self.write_custom(user_id, &custom)?;
        Ok(expert)
    }

    /// Updates a custom expert by tag; the tag itself is immutable, other
    /// non-empty fields overwrite.
    pub async fn update(
        &self,
        user_id: &str,
        tag: &str,
        changes: ExpertConfig,
    ) -> Result<ExpertConfig, RosterError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut custom = self.read_custom(user_id)?;
        let Some(expert) = custom.iter_mut().find(|e| e.tag == tag) else {
            return Err(RosterError::NotFound(tag.to_string()));
        };
        if !changes.name.trim().is_empty() {
            expert.name = changes.name;
        }
        if !changes.persona.trim().is_empty() {
            expert.persona = changes.persona;
        }
        if !(0.0..=1.0).contains(&changes.temperature) {
            return Err(RosterError::Validation(
                "temperature must be between 0 and 1".to_string(),
            ));
        }
        expert.temperature = changes.temperature;
        let updated = expert.clone();
        self.write_custom(user_id, &custom)?;
        Ok(updated)
    }

    /// Deletes a custom expert by tag; returns the removed config.
    pub async fn delete(&self, user_id: &str, tag: &str) -> Result<ExpertConfig, RosterError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut custom = self.read_custom(user_id)?;
        let Some(index) = custom.iter().position(|e| e.tag == tag) else {
            return Err(RosterError::NotFound(tag.to_string()));
        };
        let removed = custom.remove(index);
        self.write_custom(user_id, &custom)?;
        Ok(removed)
    }
}

fn info(e: &ExpertConfig, source: ExpertSource) -> ExpertInfo {
    ExpertInfo {
        name: e.name.clone(),
        tag: e.tag.clone(),
        persona: e.persona.clone(),
        source,
    }
}

fn validate(expert: &ExpertConfig) -> Result<(), RosterError> {
    for (field, value) in [
        ("name", &expert.name),
        ("tag", &expert.tag),
        ("persona", &expert.persona),
    ] {
        if value.trim().is_empty() {
            return Err(RosterError::Validation(format!("{field} must not be empty")));
        }
    }
    if !(0.0..=1.0).contains(&expert.temperature) {
        return Err(RosterError::Validation(
            "temperature must be between 0 and 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> (tempfile::TempDir, Roster) {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::load(config::DataDirs::new(dir.path()));
        (dir, roster)
    }

    fn custom(tag: &str) -> ExpertConfig {
        ExpertConfig {
            name: "Historian".into(),
            tag: tag.into(),
            persona: "You reason from historical precedent.".into(),
            temperature: 0.6,
        }
    }

    #[tokio::test]
    async fn add_list_delete_roundtrip() {
        let (_dir, roster) = roster();
        let added = roster.add("ada", custom("history")).await.unwrap();

        let listing = roster.list("ada");
        let row = listing.iter().find(|e| e.tag == "history").unwrap();
        assert_eq!(row.source, ExpertSource::Custom);
        assert!(listing.iter().any(|e| e.source == ExpertSource::Public));

        let removed = roster.delete("ada", "history").await.unwrap();
        assert_eq!(removed, added);
        assert!(!roster.list("ada").iter().any(|e| e.tag == "history"));
    }

    /// **Scenario**: tag collisions with built-ins and with the user's own
    /// customs are rejected; another user may reuse the tag.
    #[tokio::test]
    async fn tag_uniqueness_is_per_user() {
        let (_dir, roster) = roster();
        let err = roster.add("ada", custom("critical")).await.unwrap_err();
        assert!(err.to_string().contains("built-in"));

        roster.add("ada", custom("history")).await.unwrap();
        let err = roster.add("ada", custom("history")).await.unwrap_err();
        assert!(err.to_string().contains("already have"));

        // tag uniqueness is scoped to one user's view
        roster.add("bob", custom("history")).await.unwrap();

        // invariant: no duplicate tags among what one user sees
        let tags: Vec<String> = roster.list("ada").iter().map(|e| e.tag.clone()).collect();
        let mut dedup = tags.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(tags.len(), dedup.len());
    }

    #[tokio::test]
    async fn update_keeps_tag_and_overwrites_fields() {
        let (_dir, roster) = roster();
        roster.add("ada", custom("history")).await.unwrap();
        let updated = roster
            .update(
                "ada",
                "history",
                ExpertConfig {
                    name: "Archivist".into(),
                    tag: "ignored".into(),
                    persona: String::new(),
                    temperature: 0.2,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.tag, "history");
        assert_eq!(updated.name, "Archivist");
        assert_eq!(updated.persona, "You reason from historical precedent.");
        assert!((updated.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn validation_rejects_empty_fields_and_bad_temperature() {
        let (_dir, roster) = roster();
        let mut bad = custom("x");
        bad.persona = "  ".into();
        assert!(roster.add("ada", bad).await.is_err());

        let mut bad = custom("y");
        bad.temperature = 1.5;
        assert!(roster.add("ada", bad).await.is_err());
    }

    #[tokio::test]
    async fn visible_merges_builtin_and_custom() {
        let (_dir, roster) = roster();
        let baseline = roster.visible("ada").len();
        roster.add("ada", custom("history")).await.unwrap();
        assert_eq!(roster.visible("ada").len(), baseline + 1);
        assert_eq!(roster.visible("bob").len(), baseline);
    }
}
