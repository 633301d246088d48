use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use feedgate::config::{Config, API_KEY_ENV};
use feedgate::fetch::HttpFetcher;
use feedgate::server::{router, AppState};
use feedgate::util::UrlSafetyValidator;

#[derive(Parser, Debug)]
#[command(
    name = "feedgate",
    version,
    about = "CORS proxy for browser feed readers with feed discovery and article extraction"
)]
struct Args {
    /// Path to a TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => Config::default(),
    };
    let mut config = config.with_api_key_override(std::env::var(API_KEY_ENV).ok());
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    tracing::debug!(config = ?config, "Effective configuration");

    if config.api_key.is_none() {
        tracing::warn!("No API key configured; every caller is accepted");
    }

    let validator = UrlSafetyValidator::with_extra_hosts(config.blocked_hosts.iter().cloned());
    let fetcher = HttpFetcher::new(&config.user_agent, validator)
        .context("Failed to build HTTP client")?;

    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config, Arc::new(fetcher)));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;
    tracing::info!(addr = %bind, "feedgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
