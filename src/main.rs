//! Card Duel Server
//!
//! Binds the configured address and serves card duels until Ctrl-C.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use card_duel::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().context("Invalid configuration")?;
    info!("Card Duel Server v{}", VERSION);
    info!("Bind: {}  Path: {}", config.bind_addr, config.ws_path);

    let server = GameServer::new(config).context("Failed to create server")?;

    tokio::select! {
        result = server.run() => {
            result.context("Server stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
