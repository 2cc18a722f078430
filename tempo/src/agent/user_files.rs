//! Per-user prompt material: profile text and the skills manifest block.

use serde::Deserialize;

use config::DataDirs;

/// Free-form profile text injected into the base prompt; empty when the user
/// has none. No structure is imposed on the file.
pub fn load_profile(dirs: &DataDirs, user_id: &str) -> String {
    std::fs::read_to_string(dirs.user_profile(user_id))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct SkillEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    file: String,
}

/// Renders the skills block for the system prompt. The manifest and skills
/// directory locations are always included — even with no skills — so the
/// model can register new ones through the file tools.
pub fn load_skills_block(dirs: &DataDirs, user_id: &str) -> String {
    let manifest_path = dirs.skills_manifest(user_id);
    let skills_dir = dirs.skills_dir(user_id);

    let entries: Vec<SkillEntry> = std::fs::read_to_string(&manifest_path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default();

    let mut lines = vec![
        "\n[User skills]".to_string(),
        format!("Manifest file: {}", manifest_path.display()),
        format!("Skills directory: {}", skills_dir.display()),
    ];
    if entries.is_empty() {
        lines.push("No skills registered yet.".to_string());
        lines.push("Add entries to the manifest file to register skills.".to_string());
    } else {
        lines.push("Available skills:".to_string());
        for entry in &entries {
            let name = if entry.name.is_empty() { "(unnamed)" } else { &entry.name };
            let desc = if entry.description.is_empty() {
                "(no description)"
            } else {
                &entry.description
            };
            lines.push(format!("  - {name}: {desc}"));
            if !entry.file.is_empty() {
                lines.push(format!("    file: {}", skills_dir.join(&entry.file).display()));
            }
        }
        lines.push("Read a skill's file with the file tools before using it.".to_string());
    }
    lines.join("\n")
}
