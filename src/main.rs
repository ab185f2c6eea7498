mod bot;
mod config;
mod downloader;
mod platform;
mod relay;
mod tiktok;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::downloader::YtDlp;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the filter is built so RUST_LOG can live there too
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tiktok_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file, using process environment"),
        Err(e) => warn!("Failed to load .env: {}", e),
    }

    let config = Config::from_env().context("Failed to load configuration")?;

    let ytdlp = YtDlp::new(&config.ytdlp_path);
    match ytdlp.version() {
        Ok(version) => info!("Using yt-dlp {}", version),
        Err(e) => warn!("yt-dlp is not usable, downloads will fail: {:#}", e),
    }

    let state = Arc::new(AppState::new(config, Arc::new(ytdlp)));

    info!("Bot started");
    bot::run(state).await?;

    Ok(())
}
