//! Funding console server
//!
//! Serves the dashboard, history and config pages over HTTP/WebSocket.

use anyhow::{Context, Result};
use funding_console::config::AppConfig;
use funding_console::dashboard::{start_server, ConsoleState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(config.logging.json);

    info!("🚀 Funding console v{}", env!("CARGO_PKG_VERSION"));
    info!("⚙️ Config: {}", config.digest());

    let state = Arc::new(ConsoleState::from_config(&config)?);
    info!(
        stats = %state.stats.base_url(),
        config = %state.config.base_url(),
        "🔗 Backend services resolved"
    );

    let addr: SocketAddr = format!("{}:{}", config.console.host, config.console.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid console address {}:{}",
                config.console.host, config.console.port
            )
        })?;

    start_server(state, addr).await
}
