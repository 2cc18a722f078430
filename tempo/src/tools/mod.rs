//! Tool registry and invoker.
//!
//! At startup the registry launches a fixed set of tool-provider subprocesses
//! and collects their advertised tools into one flat namespace. The invoker
//! executes a model turn's tool calls against that namespace: calls outside
//! the enabled set are intercepted with a "disabled" result, user-scoped
//! tools get the caller's identity injected, and everything else is
//! dispatched to its provider.

mod invoker;
mod provider;
mod registry;

pub use invoker::{invoke_calls, USER_INJECTED_TOOLS};
pub use provider::{ProviderConfig, ProviderHandle, ToolSourceError};
pub use registry::ToolRegistry;

use serde_json::Value;

/// One tool as advertised to the model: name, description, JSON schema of
/// the parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }
}

impl From<provider_protocol::ToolDescriptor> for ToolSpec {
    fn from(d: provider_protocol::ToolDescriptor) -> Self {
        Self {
            name: d.name,
            description: (!d.description.is_empty()).then_some(d.description),
            parameters: d.parameters_schema,
        }
    }
}
