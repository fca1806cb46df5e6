//! Data sources backing the polled cache entries

use crate::api::{ConfigClient, FetchError, StatsClient};
use crate::types::{ConfigResponse, DynamicStats, OpenPosition, PositionEventItem, SnapshotSummary};
use async_trait::async_trait;

/// Something the orchestrator can poll
#[async_trait]
pub trait DataSource<T>: Send + Sync {
    /// Cache key, unique per payload and query
    fn key(&self) -> String;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fetch a fresh payload
    async fn fetch(&self) -> Result<T, FetchError>;
}

pub struct DynamicStatsSource {
    client: StatsClient,
}

impl DynamicStatsSource {
    pub fn new(client: StatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource<DynamicStats> for DynamicStatsSource {
    fn key(&self) -> String {
        "/stats/dynamic".to_string()
    }

    fn name(&self) -> &'static str {
        "dynamic-stats"
    }

    async fn fetch(&self) -> Result<DynamicStats, FetchError> {
        self.client.fetch_dynamic_stats().await
    }
}

pub struct OpenPositionsSource {
    client: StatsClient,
}

impl OpenPositionsSource {
    pub fn new(client: StatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource<Vec<OpenPosition>> for OpenPositionsSource {
    fn key(&self) -> String {
        "/positions/open".to_string()
    }

    fn name(&self) -> &'static str {
        "open-positions"
    }

    async fn fetch(&self) -> Result<Vec<OpenPosition>, FetchError> {
        self.client.fetch_open_positions().await
    }
}

pub struct SnapshotListSource {
    client: StatsClient,
    limit: u32,
}

impl SnapshotListSource {
    pub fn new(client: StatsClient, limit: u32) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl DataSource<Vec<SnapshotSummary>> for SnapshotListSource {
    fn key(&self) -> String {
        format!("/stats/static/list?limit={}", self.limit)
    }

    fn name(&self) -> &'static str {
        "snapshot-list"
    }

    async fn fetch(&self) -> Result<Vec<SnapshotSummary>, FetchError> {
        self.client.fetch_snapshot_list(self.limit).await
    }
}

pub struct RecentEventsSource {
    client: StatsClient,
    limit: u32,
}

impl RecentEventsSource {
    pub fn new(client: StatsClient, limit: u32) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl DataSource<Vec<PositionEventItem>> for RecentEventsSource {
    fn key(&self) -> String {
        format!("/events/recent?limit={}", self.limit)
    }

    fn name(&self) -> &'static str {
        "recent-events"
    }

    async fn fetch(&self) -> Result<Vec<PositionEventItem>, FetchError> {
        self.client.fetch_recent_events(self.limit).await
    }
}

pub struct CurrentConfigSource {
    client: ConfigClient,
}

impl CurrentConfigSource {
    pub fn new(client: ConfigClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource<ConfigResponse> for CurrentConfigSource {
    fn key(&self) -> String {
        "/config/current".to_string()
    }

    fn name(&self) -> &'static str {
        "current-config"
    }

    async fn fetch(&self) -> Result<ConfigResponse, FetchError> {
        self.client.fetch_config().await
    }
}
