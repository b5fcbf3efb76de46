mod config;
mod credentials;
mod dispatch;
mod error;
mod graph;
mod pages;
mod profiles;
mod realtime;
mod server;
mod webhook;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,page_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration: config file when present, environment otherwise
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
        Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        info!(
            "{} not found, loading configuration from environment",
            config_path.display()
        );
        dotenvy::dotenv().ok();
        Config::from_env().context("Failed to load config from environment")?
    };

    let state = AppState::new(config);

    info!("Configuration loaded successfully");
    info!("  Listen: {}", state.config().listen_addr());
    info!("  Graph API: {}", state.config().graph.base_url);
    info!("  Pages: {:?}", state.credentials().page_ids());
    match state.config().profiles.max_entries {
        Some(max) => info!("  Profile cache: up to {} entries", max),
        None => info!("  Profile cache: unbounded"),
    }

    server::serve(state).await
}
