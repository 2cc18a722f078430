//! Forum service entrypoint.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing_subscriber::EnvFilter;

use oasis::{router, ForumState, Roster};
use tempo::llm::ChatOpenAI;
use tempo::prompts::PromptSet;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = config::load_and_apply(None) {
        tracing::warn!("config load failed: {e}");
    }
    let internal_token = config::ensure_internal_token(Path::new(".env"));
    let dirs = config::DataDirs::from_env();

    let llm = match ChatOpenAI::from_env() {
        Ok(llm) => Arc::new(llm),
        Err(e) => {
            tracing::error!("cannot build the LLM client: {e}");
            std::process::exit(1);
        }
    };
    let agent_port = config::env_or("PORT_AGENT", "51200");
    let state = Arc::new(ForumState {
        topics: DashMap::new(),
        roster: Arc::new(Roster::load(dirs.clone())),
        prompts: Arc::new(PromptSet::load(&dirs.prompts_dir())),
        llm,
        agent_base: config::env_or("AGENT_BASE_URL", &format!("http://127.0.0.1:{agent_port}")),
        internal_token,
    });

    let port = config::env_or("PORT_OASIS", "51202");
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "forum server listening");
    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!("server error: {e}");
    }
}
