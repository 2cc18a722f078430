//! Data-directory layout shared by every tempo service.
//!
//! Everything lives under one root (default `./data`, override with
//! `TEMPO_DATA_DIR`):
//!
//! ```text
//! data/
//!   agent_memory.db          checkpoint database
//!   users.json               { user_id: sha256(password) }
//!   prompts/                 *.txt templates, oasis_experts.json
//!   experts/<user>.json      per-user custom experts
//!   user_files/<user>/       user_profile.txt, skills_manifest.json, skills/, files/
//! ```

use std::path::{Path, PathBuf};

/// Resolved layout of the data directory. Cheap to clone; all methods are
/// pure path joins, nothing is created until a writer needs it.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout from `TEMPO_DATA_DIR`, defaulting to `./data`.
    pub fn from_env() -> Self {
        Self::new(crate::env_or("TEMPO_DATA_DIR", "data"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint_db(&self) -> PathBuf {
        self.root.join("agent_memory.db")
    }

    pub fn users_file(&self) -> PathBuf {
        self.root.join("users.json")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    pub fn experts_file(&self) -> PathBuf {
        self.prompts_dir().join("oasis_experts.json")
    }

    pub fn user_experts_dir(&self) -> PathBuf {
        self.root.join("experts")
    }

    pub fn user_experts_file(&self, user_id: &str) -> PathBuf {
        self.user_experts_dir().join(format!("{user_id}.json"))
    }

    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join("user_files").join(user_id)
    }

    pub fn user_profile(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("user_profile.txt")
    }

    pub fn skills_manifest(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("skills_manifest.json")
    }

    pub fn skills_dir(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("skills")
    }

    /// Sandbox for the file/command tool groups of one user.
    pub fn user_work_dir(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("files")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_stable() {
        let dirs = DataDirs::new("/srv/tempo");
        assert_eq!(dirs.checkpoint_db(), PathBuf::from("/srv/tempo/agent_memory.db"));
        assert_eq!(dirs.users_file(), PathBuf::from("/srv/tempo/users.json"));
        assert_eq!(
            dirs.user_profile("ada"),
            PathBuf::from("/srv/tempo/user_files/ada/user_profile.txt")
        );
        assert_eq!(
            dirs.user_experts_file("ada"),
            PathBuf::from("/srv/tempo/experts/ada.json")
        );
        assert_eq!(
            dirs.user_work_dir("ada"),
            PathBuf::from("/srv/tempo/user_files/ada/files")
        );
    }
}
