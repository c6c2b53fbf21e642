use std::time::Duration;

use clap::Parser;
use race_contracts::{reason, ServerFrameV1};
use race_server::api;
use race_server::api::state::{AppState, RuntimeConfig};
use race_server::db;
use race_server::sweeper;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "race-server")]
#[command(about = "Live race runtime — seed-randomized multiplayer speedrun race rooms")]
struct Args {
    /// HTTP/WebSocket server port
    #[arg(long, default_value = "3001")]
    port: u16,

    /// SQLite database path
    #[arg(long, default_value = "race-runtime.db")]
    db_path: String,

    /// Seconds to wait for the first (`auth`) frame on a mod connection
    #[arg(long, default_value = "10")]
    auth_timeout_secs: u64,

    /// Ping cadence to mod connections, seconds
    #[arg(long, default_value = "30")]
    ping_interval_secs: u64,

    /// Leaderboard broadcast coalescing window, milliseconds
    #[arg(long, default_value = "100")]
    leaderboard_coalesce_ms: u64,

    /// Seconds of no `igt_ms` advancement before a playing participant is
    /// considered inactive
    #[arg(long, default_value = "300")]
    inactivity_threshold_secs: u64,

    /// Inactivity sweep cadence, seconds
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let pool = db::create_pool(&args.db_path).await?;
    db::run_migrations(&pool).await?;

    let config = RuntimeConfig {
        auth_timeout: Duration::from_secs(args.auth_timeout_secs),
        ping_interval: Duration::from_secs(args.ping_interval_secs),
        leaderboard_coalesce: Duration::from_millis(args.leaderboard_coalesce_ms),
        inactivity_threshold: Duration::from_secs(args.inactivity_threshold_secs),
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
    };

    let state = AppState::new(pool, config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper_state = state.clone();
    let sweeper_handle = tokio::spawn(sweeper::run(sweeper_state, shutdown_rx));

    let app = api::router(state.clone());
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;

    info!(port = %args.port, "race-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down: notifying connected sessions");
    state
        .registry
        .broadcast_all(ServerFrameV1::Error { reason: reason::SERVER_SHUTTING_DOWN.to_string() })
        .await;

    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
