//! Configuration management for the funding console
//!
//! Loads from optional config files + environment variables via .env

mod types;

pub use types::*;

use crate::api::{ConfigClient, HostContext, ServiceLocator, StatsClient};
use crate::polling::RefreshPolicy;
use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub console: ConsoleConfig,
    pub stats_api: ServiceConfig,
    pub config_api: ServiceConfig,
    pub polling: PollingConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::defaults()
            .context("Failed to set configuration defaults")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FUNDING_CONSOLE__*)
            .add_source(Environment::with_prefix("FUNDING_CONSOLE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let stats_port = StatsClient::DEFAULT_PORT;
        let config_port = ConfigClient::DEFAULT_PORT;

        Config::builder()
            // Console server
            .set_default("console.host", "0.0.0.0")?
            .set_default("console.port", 3000)?
            // Backend services
            .set_default("stats_api.port", i64::from(stats_port))?
            .set_default(
                "stats_api.fallback_url",
                format!("http://127.0.0.1:{}", stats_port),
            )?
            .set_default("config_api.port", i64::from(config_port))?
            .set_default(
                "config_api.fallback_url",
                format!("http://127.0.0.1:{}", config_port),
            )?
            // Polling
            .set_default(
                "polling.interval_ms",
                RefreshPolicy::DEFAULT_INTERVAL.as_millis() as i64,
            )?
            .set_default("polling.snapshot_limit", 60)?
            .set_default("polling.event_limit", 100)?
            .set_default("polling.start_manual", false)?
            // HTTP client
            .set_default("http.connect_timeout_ms", 5000)?
            // Logging
            .set_default("logging.json", false)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.http.connect_timeout_ms)
    }

    fn host_context(&self) -> Option<HostContext> {
        self.console
            .public_url
            .as_deref()
            .and_then(HostContext::from_url)
    }

    pub fn stats_locator(&self) -> ServiceLocator {
        ServiceLocator::new(
            StatsClient::URL_ENV,
            self.stats_api.port,
            self.host_context(),
            self.stats_api.fallback_url.clone(),
        )
    }

    pub fn config_locator(&self) -> ServiceLocator {
        ServiceLocator::new(
            ConfigClient::URL_ENV,
            self.config_api.port,
            self.host_context(),
            self.config_api.fallback_url.clone(),
        )
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "console={}:{} stats_port={} config_port={} interval_ms={} snapshots={} events={}",
            self.console.host,
            self.console.port,
            self.stats_api.port,
            self.config_api.port,
            self.polling.interval_ms,
            self.polling.snapshot_limit,
            self.polling.event_limit
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
