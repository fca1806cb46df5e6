//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Bind address of the console server
    pub host: String,
    pub port: u16,
    /// URL the console is reached at; its scheme and hostname locate the
    /// backend services when no explicit override is set
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub port: u16,
    /// Used when neither an override nor a public URL is available
    pub fallback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Auto refresh period in milliseconds
    pub interval_ms: u64,
    /// Daily snapshots fetched by the history page
    pub snapshot_limit: u32,
    /// Events fetched by the history page
    pub event_limit: u32,
    /// Start the dashboard in manual refresh mode
    pub start_manual: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}
