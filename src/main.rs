mod routes;
mod state;

use std::path::PathBuf;

use anyhow::{Context, Result};
use calmerge_core::MergerConfig;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "calmerge")]
#[command(about = "Serve the busy times of several calendars as one ICS feed")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CALMERGE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = MergerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let state = AppState::new(&config)?;

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        address = %addr,
        sources = config.calendar_urls.len(),
        "calmerge listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
