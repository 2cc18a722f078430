//! Tool groups, one per provider subprocess.

mod alarm;
mod commander;
mod filemanager;
mod forum;
mod push;
mod search;

use async_trait::async_trait;
use provider_protocol::ToolDescriptor;
use serde_json::Value;

pub use alarm::AlarmGroup;
pub use commander::CommanderGroup;
pub use filemanager::FileManagerGroup;
pub use forum::ForumGroup;
pub use push::PushGroup;
pub use search::SearchGroup;

/// One group of tools served by a provider process.
///
/// `call` returns the tool-result text. Backend failures come back as
/// readable text too — the agent keeps the turn alive either way — while
/// protocol-level problems (unknown tool, bad params) are real errors and
/// handled by the serve loop.
#[async_trait]
pub trait ToolGroup: Send + Sync {
    fn tools(&self) -> Vec<ToolDescriptor>;

    async fn call(&self, name: &str, args: &Value) -> String;
}

/// Resolves a group by its launch name.
pub fn group_by_name(name: &str) -> Option<Box<dyn ToolGroup>> {
    match name {
        "filemanager" => Some(Box::new(FileManagerGroup::from_env())),
        "commander" => Some(Box::new(CommanderGroup::from_env())),
        "scheduler" => Some(Box::new(AlarmGroup::from_env())),
        "forum" => Some(Box::new(ForumGroup::from_env())),
        "search" => Some(Box::new(SearchGroup::from_env())),
        "push" => Some(Box::new(PushGroup::from_env())),
        _ => None,
    }
}

/// Reads a required string argument, or explains which one is missing.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Schema helper: object with the given `(name, type, description)` columns,
/// all required unless listed in `optional`.
pub(crate) fn object_schema(props: &[(&str, &str, &str)], optional: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, ty, desc) in props {
        properties.insert(
            name.to_string(),
            serde_json::json!({ "type": ty, "description": desc }),
        );
    }
    let required: Vec<&str> = props
        .iter()
        .map(|(name, _, _)| *name)
        .filter(|name| !optional.contains(name))
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
