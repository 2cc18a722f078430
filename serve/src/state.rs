//! Shared server state and startup wiring.

use std::path::Path;
use std::sync::Arc;

use tempo::agent::{build_agent_graph, RuntimeContext};
use tempo::llm::ChatOpenAI;
use tempo::memory::SqliteCheckpointStore;
use tempo::prompts::PromptSet;
use tempo::session::SessionManager;
use tempo::tools::{ProviderConfig, ToolRegistry};

/// Everything a handler needs, built once at startup.
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub runtime: Arc<RuntimeContext>,
    pub internal_token: String,
}

impl AppState {
    pub fn users_file(&self) -> std::path::PathBuf {
        self.runtime.dirs.users_file()
    }
}

/// The fixed set of tool-provider subprocesses, one per group. The provider
/// binary sits next to the server binary unless `TOOL_PROVIDER_BIN` points
/// elsewhere.
fn provider_configs() -> Vec<ProviderConfig> {
    let binary = std::env::var("TOOL_PROVIDER_BIN")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            std::env::current_exe().ok().and_then(|exe| {
                exe.parent()
                    .map(|dir| dir.join("tool-provider").to_string_lossy().to_string())
            })
        })
        .unwrap_or_else(|| "tool-provider".to_string());

    ["scheduler", "search", "filemanager", "commander", "forum", "push"]
        .into_iter()
        .map(|group| ProviderConfig::new(group, &binary, vec![group.to_string()]))
        .collect()
}

/// Builds the whole runtime: providers, gateway, graph, session manager.
pub async fn build_state() -> Result<Arc<AppState>, String> {
    let internal_token = config::ensure_internal_token(Path::new(".env"));
    let dirs = config::DataDirs::from_env();
    let prompts = Arc::new(PromptSet::load(&dirs.prompts_dir()));

    let registry = Arc::new(ToolRegistry::launch(&provider_configs()).await);
    tracing::info!(tools = registry.names().len(), "tool registry ready");

    let llm = Arc::new(ChatOpenAI::from_env().map_err(|e| e.to_string())?);
    let runtime = Arc::new(RuntimeContext::new(llm, registry, prompts, dirs.clone()));

    let store = Arc::new(
        SqliteCheckpointStore::new(dirs.checkpoint_db()).map_err(|e| e.to_string())?,
    );
    let graph = Arc::new(
        build_agent_graph(runtime.clone(), store.clone()).map_err(|e| e.to_string())?,
    );
    let manager = Arc::new(SessionManager::new(graph, store));

    Ok(Arc::new(AppState {
        manager,
        runtime,
        internal_token,
    }))
}
