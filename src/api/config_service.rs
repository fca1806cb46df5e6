//! Config service client

use super::{send_json, FetchError, ServiceLocator};
use crate::types::{ConfigResponse, ConfigUpdatePayload};
use reqwest::Client;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConfigClient {
    http: Client,
    locator: ServiceLocator,
}

impl ConfigClient {
    pub const DEFAULT_PORT: u16 = 8003;
    pub const URL_ENV: &'static str = "CONFIG_API_URL";

    pub fn new(http: Client, locator: ServiceLocator) -> Self {
        Self { http, locator }
    }

    pub fn base_url(&self) -> String {
        self.locator.base_url()
    }

    /// GET /config/current
    pub async fn fetch_config(&self) -> Result<ConfigResponse, FetchError> {
        let url = format!("{}/config/current", self.base_url());
        send_json(self.http.get(url), "fetch config").await
    }

    /// PUT /config/current. The service stores a new version and returns it.
    pub async fn update_config(
        &self,
        payload: &ConfigUpdatePayload,
    ) -> Result<ConfigResponse, FetchError> {
        let url = format!("{}/config/current", self.base_url());
        let updated: ConfigResponse =
            send_json(self.http.put(url).json(payload), "update config").await?;
        info!(
            version = updated.version,
            global_enable = updated.global_enable,
            "📝 Configuration updated"
        );
        Ok(updated)
    }
}
