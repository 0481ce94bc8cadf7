//! slircbot binary entry point.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slirc_bot::{Bot, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "slircbot.toml".to_string());
    info!(path = %path, "loading configuration");
    let config = Config::load(&path)
        .inspect_err(|e| error!(error = %e, path = %path, "configuration failed to load"))
        .with_context(|| format!("loading {path}"))?;

    let bot = Bot::new(config);
    bot.run().await?;
    info!("goodbye");
    Ok(())
}
