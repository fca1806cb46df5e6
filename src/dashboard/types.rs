//! Console API Types
//!
//! DTOs for HTTP/WebSocket communication with the browser.

use crate::pages::{ConfigConsoleView, DashboardView, HistoryView, PageState, ValueMetric};
use crate::polling::RefreshMode;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────

/// PUT /api/dashboard/refresh-mode
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshModeRequest {
    pub mode: RefreshMode,
}

/// PUT /api/dashboard/value-metric
#[derive(Debug, Clone, Deserialize)]
pub struct ValueMetricRequest {
    pub metric: ValueMetric,
}

// ─────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ControlsResponse {
    pub refresh_mode: RefreshMode,
    pub value_metric: ValueMetric,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cached_sources: Vec<String>,
    pub mounted_pages: Vec<&'static str>,
    pub ws_viewers: usize,
    pub timestamp: i64,
}

// ─────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    Dashboard(PageState<DashboardView>),
    History(PageState<HistoryView>),
    Config(PageState<ConfigConsoleView>),
    /// Keep-alive, epoch millis
    Heartbeat(i64),
}

// ─────────────────────────────────────────────────────────────────
// API Response wrapper
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
