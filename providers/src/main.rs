//! `tool-provider <group>`: serve one tool group over stdio.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tool-provider", about = "Tempo tool-provider subprocess")]
struct Args {
    /// Tool group to serve: filemanager, commander, alarm, forum, search, push
    group: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    // stdout is the protocol channel; logs go to stderr only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config::load_and_apply(None) {
        tracing::warn!("config load failed: {e}");
    }

    let args = Args::parse();
    let Some(group) = providers::group_by_name(&args.group) else {
        eprintln!("unknown tool group: {}", args.group);
        std::process::exit(2);
    };
    tracing::info!(group = %args.group, "tool provider serving on stdio");
    providers::serve_stdio(group).await
}
