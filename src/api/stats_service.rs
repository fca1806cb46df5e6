//! Stats/positions service client

use super::{send_json, FetchError, ServiceLocator};
use crate::types::{DynamicStats, OpenPosition, PositionEventItem, SnapshotSummary};
use reqwest::Client;
use tracing::debug;

/// Largest snapshot window the service accepts
const MAX_SNAPSHOT_LIMIT: u32 = 365;
/// Largest event window the service accepts
const MAX_EVENT_LIMIT: u32 = 500;

#[derive(Debug, Clone)]
pub struct StatsClient {
    http: Client,
    locator: ServiceLocator,
}

impl StatsClient {
    pub const DEFAULT_PORT: u16 = 8006;
    pub const URL_ENV: &'static str = "STATS_API_URL";

    pub fn new(http: Client, locator: ServiceLocator) -> Self {
        Self { http, locator }
    }

    pub fn base_url(&self) -> String {
        self.locator.base_url()
    }

    /// GET /stats/dynamic
    pub async fn fetch_dynamic_stats(&self) -> Result<DynamicStats, FetchError> {
        let url = format!("{}/stats/dynamic", self.base_url());
        send_json(self.http.get(url), "fetch dynamic stats").await
    }

    /// GET /positions/open
    pub async fn fetch_open_positions(&self) -> Result<Vec<OpenPosition>, FetchError> {
        let url = format!("{}/positions/open", self.base_url());
        send_json(self.http.get(url), "fetch open positions").await
    }

    /// GET /stats/static/list?limit=N
    pub async fn fetch_snapshot_list(&self, limit: u32) -> Result<Vec<SnapshotSummary>, FetchError> {
        let url = format!("{}/stats/static/list", self.base_url());
        let limit = clamp_limit("snapshot list", limit, MAX_SNAPSHOT_LIMIT);
        send_json(
            self.http.get(url).query(&[("limit", limit)]),
            "fetch snapshot list",
        )
        .await
    }

    /// GET /events/recent?limit=N
    pub async fn fetch_recent_events(
        &self,
        limit: u32,
    ) -> Result<Vec<PositionEventItem>, FetchError> {
        let url = format!("{}/events/recent", self.base_url());
        let limit = clamp_limit("recent events", limit, MAX_EVENT_LIMIT);
        send_json(
            self.http.get(url).query(&[("limit", limit)]),
            "fetch recent events",
        )
        .await
    }
}

/// Keep a query limit inside the range the service accepts
fn clamp_limit(query: &'static str, requested: u32, max: u32) -> u32 {
    let limit = requested.clamp(1, max);
    if limit != requested {
        debug!(query, requested, limit, "Query limit out of range, clamped");
    }
    limit
}
