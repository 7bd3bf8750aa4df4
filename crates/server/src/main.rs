//! MapSpace server binary.

use anyhow::Context;
use mapspace_server::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("MAPSPACE_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "Loading configuration file");
            ServerConfig::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        Err(_) => ServerConfig::from_env().context("loading configuration from environment")?,
    };

    let server = MapSpaceServer::new(config).context("creating server")?;
    server.run().await.context("running server")?;
    Ok(())
}
