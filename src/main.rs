//! Bomber Game Server
//!
//! Serves the lobby and the round over WebSocket.

use tracing::info;
use tracing_subscriber::EnvFilter;

use bomber::{config::ServerConfig, network::GameServer, TICK_RATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    info!("Bomber Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);
    info!("Round seed base: {:#x}", config.seed);

    let server = GameServer::new(config);
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
