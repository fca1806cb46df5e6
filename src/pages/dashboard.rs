//! Live dashboard: aggregate stats and open position groups

use super::{Cell, PageState};
use crate::api::StatsClient;
use crate::polling::{
    fan_out, DynamicStatsSource, OpenPositionsSource, Orchestrator, PollError, RefreshMode,
    RefreshPolicy, RefreshReport, Subscription,
};
use crate::types::{DynamicStats, OpenPosition};
use crate::view_model::{
    format_amount, format_grouped, format_percent, format_timestamp, map_headline_stats,
    map_logic_stats, map_positions, PositionRow, StatCard, Tone, BLANK, NET_PROFIT_TITLE,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load data, please check the backend services";
const EMPTY_POSITIONS_HINT: &str = "No open positions";

/// What the dashboard's metric column shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMetric {
    #[default]
    Notional,
    Duration,
}

impl ValueMetric {
    pub fn label(&self) -> &'static str {
        match self {
            ValueMetric::Notional => "Notional value",
            ValueMetric::Duration => "Holding time",
        }
    }

    fn render(&self, row: &PositionRow) -> String {
        match self {
            ValueMetric::Notional => format!("{} USDT", format_grouped(row.notional_value)),
            ValueMetric::Duration => row.duration().to_string(),
        }
    }
}

/// User-selected dashboard controls, kept across mounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardControls {
    pub mode: RefreshMode,
    pub metric: ValueMetric,
    pub interval: Duration,
}

impl Default for DashboardControls {
    fn default() -> Self {
        Self {
            mode: RefreshMode::Auto,
            metric: ValueMetric::Notional,
            interval: RefreshPolicy::DEFAULT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCardView {
    pub title: String,
    pub amount: String,
    pub count: Option<i64>,
    pub tone: Tone,
}

impl From<&StatCard> for StatCardView {
    fn from(card: &StatCard) -> Self {
        let tone = if card.title == NET_PROFIT_TITLE {
            Tone::of_sign(card.amount)
        } else {
            Tone::Neutral
        };
        Self {
            title: card.title.clone(),
            amount: format_amount(card.amount),
            count: card.count,
            tone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRowView {
    pub key: String,
    pub symbol: String,
    pub long_exchange: String,
    pub short_exchange: String,
    pub long_return: Cell,
    pub short_return: Cell,
    pub total_return: Cell,
    pub funding_diff: Cell,
    pub countdown: Cell,
    pub metric: String,
    pub tone: Tone,
}

impl PositionRowView {
    fn render(row: &PositionRow, metric: ValueMetric) -> Self {
        Self {
            key: row.key.clone(),
            symbol: row.symbol.clone(),
            long_exchange: row.long_exchange.clone(),
            short_exchange: row.short_exchange.clone(),
            long_return: Cell::new(format_percent(row.long_return, 2), Tone::of_sign(row.long_return)),
            short_return: Cell::new(
                format_percent(row.short_return, 2),
                Tone::of_sign(row.short_return),
            ),
            total_return: Cell::new(
                format_percent(row.total_return, 2),
                Tone::of_sign(row.total_return),
            ),
            funding_diff: Cell::new(format_percent(row.funding_diff, 3), row.funding_diff_tone()),
            countdown: Cell::new(row.countdown().to_string(), row.countdown_tone()),
            metric: metric.render(row),
            tone: row.tone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub refresh_mode: RefreshMode,
    pub refresh_mode_label: &'static str,
    pub value_metric: ValueMetric,
    pub value_metric_label: &'static str,
    /// Manual fan-out refresh in flight
    pub refreshing: bool,
    /// First load in flight for any source
    pub loading: bool,
    /// Any fetch in flight, background revalidation included
    pub validating: bool,
    pub last_updated: String,
    pub headline: Vec<StatCardView>,
    pub logic_closes: Vec<StatCardView>,
    pub positions: Vec<PositionRowView>,
    pub empty_hint: Option<&'static str>,
}

/// Clears the flag when the refresh completes or is cancelled
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DashboardPage {
    stats: Subscription<DynamicStats>,
    positions: Subscription<Vec<OpenPosition>>,
    metric: Mutex<ValueMetric>,
    refreshing: AtomicBool,
}

impl DashboardPage {
    pub fn mount(
        orchestrator: &Orchestrator,
        client: &StatsClient,
        controls: DashboardControls,
    ) -> Result<Self, PollError> {
        let policy = RefreshPolicy::with_mode(controls.mode, controls.interval);
        let stats = orchestrator
            .subscribe::<DynamicStats>(Arc::new(DynamicStatsSource::new(client.clone())), policy)?;
        let positions = orchestrator.subscribe::<Vec<OpenPosition>>(
            Arc::new(OpenPositionsSource::new(client.clone())),
            policy,
        )?;

        Ok(Self {
            stats,
            positions,
            metric: Mutex::new(controls.metric),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn keys(&self) -> Vec<String> {
        vec![self.stats.key().to_string(), self.positions.key().to_string()]
    }

    /// Wait for the first fetch of every source
    pub async fn ready(&self) {
        self.stats.settled().await;
        self.positions.settled().await;
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.stats.mode()
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        self.stats.set_mode(mode);
        self.positions.set_mode(mode);
    }

    pub fn value_metric(&self) -> ValueMetric {
        *self.metric.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_value_metric(&self, metric: ValueMetric) {
        *self.metric.lock().unwrap_or_else(PoisonError::into_inner) = metric;
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Refresh stats and positions together; resolves once both settle
    pub async fn refresh(&self) -> RefreshReport {
        self.refreshing.store(true, Ordering::SeqCst);
        let _flag = FlagGuard(&self.refreshing);
        fan_out(vec![self.stats.outcome(), self.positions.outcome()]).await
    }

    pub fn view(&self) -> PageState<DashboardView> {
        let stats = self.stats.snapshot();
        let positions = self.positions.snapshot();

        if stats.has_error() || positions.has_error() {
            return PageState::failed(LOAD_FAILED_MESSAGE);
        }

        let metric = self.value_metric();
        let mode = self.refresh_mode();
        let loading = stats.is_loading() || positions.is_loading();
        let validating = stats.is_validating() || positions.is_validating();

        let summary = stats.data.unwrap_or_default();
        let rows = map_positions(positions.data.as_deref().unwrap_or_default());
        let last_updated = summary
            .updated_at
            .as_deref()
            .map(format_timestamp)
            .unwrap_or_else(|| BLANK.to_string());

        PageState::Ready(DashboardView {
            refresh_mode: mode,
            refresh_mode_label: mode.label(),
            value_metric: metric,
            value_metric_label: metric.label(),
            refreshing: self.is_refreshing(),
            loading,
            validating,
            last_updated,
            headline: map_headline_stats(&summary).iter().map(StatCardView::from).collect(),
            logic_closes: map_logic_stats(&summary).iter().map(StatCardView::from).collect(),
            empty_hint: (rows.is_empty() && !loading).then_some(EMPTY_POSITIONS_HINT),
            positions: rows.iter().map(|row| PositionRowView::render(row, metric)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view_model::map_position;

    fn row(countdown: f64, duration: f64, notional: f64) -> PositionRow {
        let mut row = map_position(&OpenPosition {
            group_id: "g-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            notional_per_leg: Some(notional),
            ..OpenPosition::default()
        });
        row.countdown_secs = countdown;
        row.duration_secs = duration;
        row
    }

    #[test]
    fn metric_column_switches_between_notional_and_duration() {
        let row = row(-1.0, 3723.0, 6250.0);
        assert_eq!(ValueMetric::Notional.render(&row), "12,500 USDT");
        assert_eq!(ValueMetric::Duration.render(&row), "01:02:03");
    }

    #[test]
    fn row_view_formats_percentages_and_unknown_countdown() {
        let mut base = row(-1.0, 0.0, 100.0);
        base.long_return = 0.0123;
        base.short_return = -0.0023;
        base.total_return = 0.01;
        base.funding_diff = 0.00052;

        let view = PositionRowView::render(&base, ValueMetric::Notional);
        assert_eq!(view.long_return.text, "1.23%");
        assert_eq!(view.short_return.tone, Tone::Negative);
        assert_eq!(view.funding_diff.text, "0.052%");
        assert_eq!(view.funding_diff.tone, Tone::Positive);
        assert_eq!(view.countdown.text, BLANK);
        assert_eq!(view.metric, "200 USDT");
    }

    #[test]
    fn net_profit_card_is_toned_by_sign() {
        let loss = StatCardView::from(&StatCard {
            title: NET_PROFIT_TITLE.to_string(),
            amount: -4.2,
            count: None,
        });
        assert_eq!(loss.tone, Tone::Negative);
        assert_eq!(loss.amount, "-4.20");

        let opened = StatCardView::from(&StatCard {
            title: "Total opened".to_string(),
            amount: -4.2,
            count: Some(1),
        });
        assert_eq!(opened.tone, Tone::Neutral);
    }
}
