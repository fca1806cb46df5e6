//! Backend API clients
//!
//! Thin HTTP wrappers around the stats and config services. Each call
//! resolves its base URL at call time, disables caching, decodes JSON and
//! surfaces any failure as a [`FetchError`] naming the endpoint. No retries.

mod config_service;
mod stats_service;

pub use config_service::ConfigClient;
pub use stats_service::StatsClient;

use anyhow::Context;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A failed call to a backend endpoint.
///
/// Unreachable services, non-2xx statuses and undecodable bodies all
/// collapse into this one error; `status` is kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to {endpoint}: {detail}")]
pub struct FetchError {
    /// Semantic endpoint name, e.g. "fetch dynamic stats"
    pub endpoint: &'static str,
    pub status: Option<u16>,
    pub detail: String,
}

impl FetchError {
    pub fn status(endpoint: &'static str, status: u16) -> Self {
        Self {
            endpoint,
            status: Some(status),
            detail: format!("HTTP {}", status),
        }
    }

    pub fn transport(endpoint: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            endpoint,
            status: None,
            detail: err.to_string(),
        }
    }
}

/// Scheme and hostname of the page the console is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub scheme: String,
    pub hostname: String,
}

impl HostContext {
    /// Parse a public URL such as `http://10.0.0.5:3000/`
    pub fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        let hostname = url.host_str()?.to_string();
        Some(Self {
            scheme: url.scheme().to_string(),
            hostname,
        })
    }
}

/// Pick the base URL for a backend service.
///
/// First match wins: a non-empty explicit override, then the current
/// host's scheme and hostname with the service's port, then `fallback`.
pub fn resolve_base_url(
    explicit_override: Option<&str>,
    current_host: Option<&HostContext>,
    port: u16,
    fallback: &str,
) -> String {
    if let Some(url) = explicit_override.map(str::trim).filter(|url| !url.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }

    if let Some(host) = current_host {
        return format!("{}://{}:{}", host.scheme, host.hostname, port);
    }

    fallback.trim_end_matches('/').to_string()
}

/// Where a service lives; re-evaluated on every request so one deployed
/// binary can be pointed elsewhere through the environment.
#[derive(Debug, Clone)]
pub struct ServiceLocator {
    /// Environment variable holding an explicit base URL
    pub override_var: Option<&'static str>,
    pub port: u16,
    pub current_host: Option<HostContext>,
    pub fallback: String,
}

impl ServiceLocator {
    pub fn new(
        override_var: &'static str,
        port: u16,
        current_host: Option<HostContext>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            override_var: Some(override_var),
            port,
            current_host,
            fallback: fallback.into(),
        }
    }

    /// Always resolve to `base_url`, ignoring the environment
    pub fn fixed(base_url: impl Into<String>) -> Self {
        Self {
            override_var: None,
            port: 0,
            current_host: None,
            fallback: base_url.into(),
        }
    }

    pub fn base_url(&self) -> String {
        let explicit = self.override_var.and_then(|var| std::env::var(var).ok());
        resolve_base_url(
            explicit.as_deref(),
            self.current_host.as_ref(),
            self.port,
            &self.fallback,
        )
    }
}

/// Shared reqwest client for both services
pub fn build_http_client(connect_timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Send a request with caching disabled and decode a JSON body
async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    endpoint: &'static str,
) -> Result<T, FetchError> {
    let response = request
        .header(CACHE_CONTROL, "no-store")
        .send()
        .await
        .map_err(|e| FetchError::transport(endpoint, e))?;

    let status = response.status();
    if !status.is_success() {
        debug!(endpoint, status = status.as_u16(), "Backend returned non-success status");
        return Err(FetchError::status(endpoint, status.as_u16()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| FetchError::transport(endpoint, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(scheme: &str, hostname: &str) -> HostContext {
        HostContext {
            scheme: scheme.to_string(),
            hostname: hostname.to_string(),
        }
    }

    #[test]
    fn explicit_override_wins() {
        let url = resolve_base_url(
            Some("https://stats.internal/"),
            Some(&host("http", "10.0.0.5")),
            8006,
            "http://127.0.0.1:8006",
        );
        assert_eq!(url, "https://stats.internal");
    }

    #[test]
    fn blank_override_is_ignored() {
        let url = resolve_base_url(
            Some("   "),
            Some(&host("https", "console.example.com")),
            8003,
            "http://127.0.0.1:8003",
        );
        assert_eq!(url, "https://console.example.com:8003");
    }

    #[test]
    fn loopback_fallback_without_host() {
        let url = resolve_base_url(None, None, 8006, "http://127.0.0.1:8006");
        assert_eq!(url, "http://127.0.0.1:8006");
    }

    #[test]
    fn host_context_drops_console_port() {
        let ctx = HostContext::from_url("http://47.84.57.96:3000/history").expect("valid url");
        assert_eq!(ctx, host("http", "47.84.57.96"));
        assert_eq!(
            resolve_base_url(None, Some(&ctx), 8006, "unused"),
            "http://47.84.57.96:8006"
        );
    }

    #[test]
    fn locator_reads_override_at_call_time() {
        const VAR: &str = "FUNDING_CONSOLE_TEST_LOCATOR_URL";
        let locator = ServiceLocator::new(VAR, 8006, None, "http://127.0.0.1:8006");

        std::env::remove_var(VAR);
        assert_eq!(locator.base_url(), "http://127.0.0.1:8006");

        std::env::set_var(VAR, "http://stats.staging:9000");
        assert_eq!(locator.base_url(), "http://stats.staging:9000");
        std::env::remove_var(VAR);
    }

    #[test]
    fn http_client_builds_with_connect_timeout() {
        tokio_test::assert_ok!(build_http_client(Duration::from_millis(250)));
    }

    #[test]
    fn fetch_error_names_endpoint() {
        let err = FetchError::status("fetch dynamic stats", 502);
        assert_eq!(err.to_string(), "Failed to fetch dynamic stats: HTTP 502");
    }
}
