//! Flat tool namespace across all launched providers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::tools::provider::{ProviderConfig, ProviderHandle, ToolSourceError};
use crate::tools::ToolSpec;

struct RegisteredTool {
    provider: Arc<ProviderHandle>,
    spec: ToolSpec,
}

/// Immutable after startup: the set of known tools and which provider serves
/// each. Shared as `Arc<ToolRegistry>` by the graph, the invoker, and the
/// `/tools` endpoint.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    /// Advertisement order: providers in launch order, tools in provider order.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Launches every configured provider and collects its tool list. A
    /// provider that fails to launch or list is logged and skipped — the
    /// agent still runs with the remaining groups.
    pub async fn launch(configs: &[ProviderConfig]) -> Self {
        let mut tools = HashMap::new();
        let mut order = Vec::new();
        for config in configs {
            let handle = match ProviderHandle::spawn(config) {
                Ok(h) => Arc::new(h),
                Err(e) => {
                    tracing::error!(provider = %config.name, "launch failed: {e}");
                    continue;
                }
            };
            let descriptors = match handle.list_tools().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(provider = %config.name, "list_tools failed: {e}");
                    continue;
                }
            };
            tracing::info!(
                provider = %config.name,
                tool_count = descriptors.len(),
                "provider ready"
            );
            for descriptor in descriptors {
                let spec: ToolSpec = descriptor.into();
                if tools.contains_key(&spec.name) {
                    tracing::warn!(tool = %spec.name, provider = %config.name, "duplicate tool name; first provider wins");
                    continue;
                }
                order.push(spec.name.clone());
                tools.insert(
                    spec.name.clone(),
                    RegisteredTool {
                        provider: handle.clone(),
                        spec,
                    },
                );
            }
        }
        Self { tools, order }
    }

    /// Registry with no providers. Tests compose it via [`Self::launch`]
    /// with scripted commands instead.
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names in advertisement order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// All specs, optionally restricted to an enabled subset.
    pub fn specs_filtered(&self, enabled: Option<&[String]>) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter(|name| match enabled {
                Some(set) => set.iter().any(|e| e == *name),
                None => true,
            })
            .filter_map(|name| self.tools.get(name).map(|t| t.spec.clone()))
            .collect()
    }

    /// `(name, description)` pairs for the tool catalog endpoint.
    pub fn tools_info(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| {
                (
                    t.spec.name.clone(),
                    t.spec.description.clone().unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Executes one call on the owning provider.
    pub async fn call(&self, name: &str, args: Value) -> Result<String, ToolSourceError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolSourceError::Provider(format!("unknown tool: {name}")))?;
        tool.provider.call_tool(name, args).await
    }
}
