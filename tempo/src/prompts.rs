//! Prompt templates, loaded once at startup from `data/prompts/` with
//! compiled-in defaults for anything missing.
//!
//! Templates use `{name}` placeholders filled by [`render`]. The two wrap
//! markers are load-bearing: session listing hides threads whose user
//! messages all start with one of them, and the system-trigger wrap is
//! idempotent on the marker.

use std::collections::HashMap;
use std::path::Path;

/// Marker prefix of a scheduler/internal-trigger user message.
pub const SYSTEM_TRIGGER_MARKER: &str = "[system trigger]";
/// Marker prefix of a forum-invitation user message.
pub const OASIS_TRIGGER_MARKER: &str = "[conference invitation]";

const DEFAULT_BASE_SYSTEM: &str = "\
You are Tempo, a personal assistant with access to tools for files, commands, \
scheduling, web search, push notifications, and an expert discussion forum. \
Answer in the user's language, be concrete, and prefer using a tool over \
guessing when one applies.";

const DEFAULT_SYSTEM_TRIGGER: &str = "\
[system trigger] This message was fired by an automated schedule, not typed by \
the user. Scheduled instruction: {original_text}\n\
Carry the instruction out now and report the outcome as if speaking to the \
user. If the instruction needs a push notification to reach them, send one.";

const DEFAULT_TOOL_STATUS: &str = "\
Tool availability changed for this conversation.\n\
Enabled tools: {enabled_tools}\n\
Disabled tools: {disabled_tools}\n\
Do not call disabled tools; if one is needed, tell the user it is disabled.";

const DEFAULT_OASIS_TRIGGER: &str = "\
[conference invitation]\n\
You are invited to an OASIS expert discussion.\n\
Topic: {topic}\n\n\
--- latest posts from the other experts ---\n\
{new_input}\n\
--- end of posts ---\n\n\
Read the posts and contribute your expert view on the topic. Reply with your \
opinion directly; no tools are required.";

const DEFAULT_OASIS_SUMMARY: &str = "\
You are the summarizer of a multi-expert discussion on the question \
\u{300c}{question}\u{300d}. The discussion produced {post_count} posts over \
{round_count} rounds.\n\n\
Most-endorsed posts:\n{posts_text}\n\n\
Write the final conclusion in Chinese, at most 300 characters, covering: the \
core viewpoints, where the experts agree, where they disagree, and one \
concrete recommendation.";

/// The five templates the platform uses.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub base_system: String,
    pub system_trigger: String,
    pub tool_status: String,
    pub oasis_trigger: String,
    pub oasis_summary: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            base_system: DEFAULT_BASE_SYSTEM.to_string(),
            system_trigger: DEFAULT_SYSTEM_TRIGGER.to_string(),
            tool_status: DEFAULT_TOOL_STATUS.to_string(),
            oasis_trigger: DEFAULT_OASIS_TRIGGER.to_string(),
            oasis_summary: DEFAULT_OASIS_SUMMARY.to_string(),
        }
    }
}

impl PromptSet {
    /// Loads `<name>.txt` files from `dir`, falling back to the defaults.
    pub fn load(dir: &Path) -> Self {
        let mut set = Self::default();
        for (name, slot) in [
            ("base_system", &mut set.base_system),
            ("system_trigger", &mut set.system_trigger),
            ("tool_status", &mut set.tool_status),
            ("oasis_trigger", &mut set.oasis_trigger),
            ("oasis_summary", &mut set.oasis_summary),
        ] {
            let path = dir.join(format!("{name}.txt"));
            match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    *slot = content.trim().to_string();
                    tracing::info!(template = name, "loaded prompt template");
                }
                Ok(_) => tracing::warn!(template = name, "prompt file empty; using default"),
                Err(_) => tracing::debug!(template = name, "no prompt file; using default"),
            }
        }
        set
    }
}

/// Fills `{key}` placeholders. Unknown placeholders are left verbatim.
pub fn render(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_placeholders() {
        let values = HashMap::from([("topic", "launch?".to_string())]);
        assert_eq!(render("Topic: {topic} ({other})", &values), "Topic: launch? ({other})");
    }

    #[test]
    fn load_prefers_files_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base_system.txt"), "custom base\n").unwrap();
        let set = PromptSet::load(dir.path());
        assert_eq!(set.base_system, "custom base");
        // untouched template keeps its default
        assert!(set.system_trigger.starts_with(SYSTEM_TRIGGER_MARKER));
    }

    #[test]
    fn default_wrap_templates_carry_markers() {
        let set = PromptSet::default();
        assert!(set.system_trigger.starts_with(SYSTEM_TRIGGER_MARKER));
        assert!(set.oasis_trigger.starts_with(OASIS_TRIGGER_MARKER));
    }
}
