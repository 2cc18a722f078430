//! Scheduler service entrypoint.

use std::path::Path;
use std::sync::Arc;

use scheduler::{server, Scheduler};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = config::load_and_apply(None) {
        tracing::warn!("config load failed: {e}");
    }
    let internal_token = config::ensure_internal_token(Path::new(".env"));

    let agent_port = config::env_or("PORT_AGENT", "51200");
    let trigger_url = config::env_or(
        "AGENT_TRIGGER_URL",
        &format!("http://127.0.0.1:{agent_port}/system_trigger"),
    );
    let scheduler = Arc::new(Scheduler::new(trigger_url, internal_token));
    tokio::spawn(scheduler.clone().run_loop());

    let port = config::env_or("PORT_SCHEDULER", "51201");
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "scheduler listening");
    if let Err(e) = axum::serve(listener, server::router(scheduler)).await {
        tracing::error!("server error: {e}");
    }
}
