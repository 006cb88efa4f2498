use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use itinerary_daemon::{build_coordinator, config::DaemonConfig, http};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "itinerary-daemon", version, about = "Delivery manifest coordinator")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Fleet engine provider id.
    #[arg(long, default_value = "local-provider")]
    provider_id: String,

    /// Fleet engine REST base URL. Without it, an in-memory fleet engine is used.
    #[arg(long)]
    fleet_engine_url: Option<String>,

    /// Bearer token for the fleet engine.
    #[arg(long)]
    fleet_token: Option<String>,

    /// Fleet engine request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    request_timeout_seconds: u64,

    /// SurrealKV directory. Without it, manifests are kept in memory.
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Delivery configuration (JSON) to load at start-up.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig {
        listen: cli.listen,
        provider_id: cli.provider_id,
        fleet_engine_url: cli.fleet_engine_url,
        fleet_token: cli.fleet_token,
        request_timeout: Duration::from_secs(cli.request_timeout_seconds),
        db_dir: cli.db_dir,
        config_file: cli.config,
    };
    info!(
        listen = %config.listen,
        provider_id = %config.provider_id,
        fleet_engine = config.fleet_engine_url.as_deref().unwrap_or("in-memory"),
        "starting itinerary daemon"
    );

    let coordinator = build_coordinator(&config).await?;
    let app = http::router(coordinator);

    axum::serve(tokio::net::TcpListener::bind(config.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
