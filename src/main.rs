//! Autobattle Match Server
//!
//! Usage: `autobattle-server [port]`. Bind address and store paths can also
//! be set with `AUTOBATTLE_BIND`, `AUTOBATTLE_LEADERBOARD` and
//! `AUTOBATTLE_TAGS`.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use autobattle::{GameServer, ServerConfig, TICK_RATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let mut config = ServerConfig::from_env();
    if let Some(arg) = std::env::args().nth(1) {
        let port: u16 = arg.parse().with_context(|| format!("Invalid port '{}'", arg))?;
        config = config.with_port(port);
    }

    info!("Autobattle Server v{}", VERSION);
    info!("Tick Rate: {} Hz, max sessions: {}", TICK_RATE, config.max_sessions);
    info!("Leaderboard: {}, tags: {}", config.leaderboard_path.display(), config.tags_path.display());

    let server = std::sync::Arc::new(GameServer::new(config));
    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
