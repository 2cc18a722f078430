//! Agent service entrypoint.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = config::load_and_apply(None) {
        tracing::warn!("config load failed: {e}");
    }

    let state = match serve::build_state().await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    let port = config::env_or("PORT_AGENT", "51200");
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "agent listening");
    if let Err(e) = axum::serve(listener, serve::router(state)).await {
        tracing::error!("server error: {e}");
    }
}
