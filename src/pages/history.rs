//! Historical statistics: daily snapshots, trend charts and the event log

use super::{Cell, PageState};
use crate::api::StatsClient;
use crate::polling::{
    Orchestrator, PollError, RecentEventsSource, RefreshPolicy, SnapshotListSource, Subscription,
};
use crate::types::{PositionEventItem, SnapshotSummary};
use crate::view_model::{
    format_amount, format_timestamp, logic_close_series, map_events, map_snapshots,
    net_profit_series, EventRow, LogicBar, SnapshotRow, Tone, TrendPoint, BLANK,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const LOAD_FAILED_MESSAGE: &str =
    "Failed to fetch historical statistics, please check service status";
const EMPTY_SNAPSHOTS_HINT: &str = "No historical statistics yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryOptions {
    pub snapshot_limit: u32,
    pub event_limit: u32,
    pub interval: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            snapshot_limit: 60,
            event_limit: 100,
            interval: RefreshPolicy::DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRowView {
    pub key: String,
    pub snapshot_date: String,
    pub total_open: String,
    pub total_close: String,
    pub net_profit: Cell,
    pub logic_amounts: [String; 5],
}

impl From<&SnapshotRow> for SnapshotRowView {
    fn from(row: &SnapshotRow) -> Self {
        Self {
            key: row.key.clone(),
            snapshot_date: row.snapshot_date.clone(),
            total_open: format_amount(row.total_open),
            total_close: format_amount(row.total_close),
            net_profit: Cell::new(format_amount(row.net_profit), Tone::of_sign(row.net_profit)),
            logic_amounts: row.logic_amounts.map(format_amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRowView {
    pub key: String,
    pub created_at: String,
    pub event_type: String,
    pub symbol: String,
    pub logic_reason: String,
    pub realized_pnl: Cell,
    pub notional: String,
}

impl From<&EventRow> for EventRowView {
    fn from(row: &EventRow) -> Self {
        Self {
            key: row.id.clone(),
            created_at: format_timestamp(&row.created_at),
            event_type: row.event_type.clone(),
            symbol: row.symbol.clone(),
            logic_reason: row
                .logic_reason
                .clone()
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| BLANK.to_string()),
            realized_pnl: Cell::new(row.pnl_text(), row.pnl_tone()),
            notional: row.notional_text(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub loading: bool,
    pub validating: bool,
    pub net_profit_trend: Vec<TrendPoint>,
    pub logic_closes: Vec<LogicBar>,
    pub snapshots: Vec<SnapshotRowView>,
    pub events: Vec<EventRowView>,
    pub empty_hint: Option<&'static str>,
}

pub struct HistoryPage {
    snapshots: Subscription<Vec<SnapshotSummary>>,
    events: Subscription<Vec<PositionEventItem>>,
}

impl HistoryPage {
    pub fn mount(
        orchestrator: &Orchestrator,
        client: &StatsClient,
        options: HistoryOptions,
    ) -> Result<Self, PollError> {
        let policy = RefreshPolicy::auto(options.interval);
        let snapshots = orchestrator.subscribe::<Vec<SnapshotSummary>>(
            Arc::new(SnapshotListSource::new(client.clone(), options.snapshot_limit)),
            policy,
        )?;
        let events = orchestrator.subscribe::<Vec<PositionEventItem>>(
            Arc::new(RecentEventsSource::new(client.clone(), options.event_limit)),
            policy,
        )?;
        Ok(Self { snapshots, events })
    }

    pub fn keys(&self) -> Vec<String> {
        vec![self.snapshots.key().to_string(), self.events.key().to_string()]
    }

    pub async fn ready(&self) {
        self.snapshots.settled().await;
        self.events.settled().await;
    }

    pub fn view(&self) -> PageState<HistoryView> {
        let snapshots = self.snapshots.snapshot();
        let events = self.events.snapshot();

        if snapshots.has_error() || events.has_error() {
            return PageState::failed(LOAD_FAILED_MESSAGE);
        }

        let loading = snapshots.is_loading() || events.is_loading();
        let rows = map_snapshots(snapshots.data.as_deref().unwrap_or_default());
        let event_rows = map_events(events.data.as_deref().unwrap_or_default());

        PageState::Ready(HistoryView {
            loading,
            validating: snapshots.is_validating() || events.is_validating(),
            net_profit_trend: net_profit_series(&rows),
            logic_closes: logic_close_series(&rows),
            empty_hint: (rows.is_empty() && !loading).then_some(EMPTY_SNAPSHOTS_HINT),
            snapshots: rows.iter().map(SnapshotRowView::from).collect(),
            events: event_rows.iter().map(EventRowView::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_model::map_event;

    #[test]
    fn pending_event_renders_blank_pnl_and_reason() {
        let row = map_event(&PositionEventItem {
            id: "7".to_string(),
            created_at: "2025-10-22T09:15:30".to_string(),
            event_type: "OPEN".to_string(),
            symbol: "BTCUSDT".to_string(),
            ..PositionEventItem::default()
        });
        let view = EventRowView::from(&row);

        assert_eq!(view.realized_pnl.text, BLANK);
        assert_eq!(view.realized_pnl.tone, Tone::Muted);
        assert_eq!(view.logic_reason, BLANK);
        assert_eq!(view.notional, BLANK);
        assert_eq!(view.created_at, "2025-10-22 09:15:30");
    }

    #[test]
    fn snapshot_row_view_formats_two_decimals() {
        let rows = map_snapshots(&[SnapshotSummary {
            snapshot_date: Some("2025-10-21".to_string()),
            net_profit: Some(-1.5),
            logic2_amount: Some(3.333),
            ..SnapshotSummary::default()
        }]);
        let view = SnapshotRowView::from(&rows[0]);

        assert_eq!(view.net_profit.text, "-1.50");
        assert_eq!(view.net_profit.tone, Tone::Negative);
        assert_eq!(view.logic_amounts[1], "3.33");
        assert_eq!(view.total_open, "0.00");
    }
}
