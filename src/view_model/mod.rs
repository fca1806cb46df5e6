//! View-model mappers
//!
//! Pure functions turning raw service payloads into display rows. Absent
//! numbers are coerced to defaults here, once, so nothing downstream does
//! arithmetic on missing values. Derived fields are computed at mapping
//! time. Percentage-like fields stay fractions; formatting lives in
//! [`format`].

pub mod format;

pub use format::{
    format_amount, format_countdown, format_grouped, format_percent, format_timestamp, Countdown,
    BLANK,
};

use crate::types::{DynamicStats, OpenPosition, PositionEventItem, SnapshotSummary};
use serde::Serialize;

/// A position's total return at or above this is highlighted as a win
const ROW_POSITIVE_RETURN: f64 = 0.02;
/// A position's total return at or below this is highlighted as a loss
const ROW_NEGATIVE_RETURN: f64 = -0.01;
/// Funding spread worth highlighting
const FUNDING_DIFF_HIGHLIGHT: f64 = 0.0005;
const COUNTDOWN_DANGER_MINUTES: f64 = 5.0;
const COUNTDOWN_WARNING_MINUTES: f64 = 30.0;

/// Visual emphasis for a cell or row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Muted,
    Positive,
    Negative,
    Warning,
    Danger,
}

impl Tone {
    /// Positive for `>= 0`, negative otherwise
    pub fn of_sign(value: f64) -> Self {
        if value >= 0.0 {
            Tone::Positive
        } else {
            Tone::Negative
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Positions
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub key: String,
    pub symbol: String,
    pub long_exchange: String,
    pub short_exchange: String,
    pub long_return: f64,
    pub short_return: f64,
    /// `long_return + short_return`
    pub total_return: f64,
    pub funding_diff: f64,
    /// `-1` when the backend did not report a countdown
    pub countdown_secs: f64,
    pub duration_secs: f64,
    pub notional_per_leg: f64,
    /// Both legs: `notional_per_leg * 2`
    pub notional_value: f64,
}

impl PositionRow {
    pub fn countdown(&self) -> Countdown {
        Countdown::from_secs(self.countdown_secs)
    }

    pub fn duration(&self) -> Countdown {
        Countdown::from_secs(self.duration_secs)
    }

    /// Row highlight by total return
    pub fn tone(&self) -> Tone {
        if self.total_return >= ROW_POSITIVE_RETURN {
            Tone::Positive
        } else if self.total_return <= ROW_NEGATIVE_RETURN {
            Tone::Negative
        } else {
            Tone::Neutral
        }
    }

    pub fn funding_diff_tone(&self) -> Tone {
        if self.funding_diff.abs() >= FUNDING_DIFF_HIGHLIGHT {
            Tone::Positive
        } else {
            Tone::Muted
        }
    }

    /// Urgency of the next funding settlement
    pub fn countdown_tone(&self) -> Tone {
        if !self.countdown().is_known() {
            return Tone::Muted;
        }
        let minutes = self.countdown_secs / 60.0;
        if minutes <= COUNTDOWN_DANGER_MINUTES {
            Tone::Danger
        } else if minutes <= COUNTDOWN_WARNING_MINUTES {
            Tone::Warning
        } else {
            Tone::Neutral
        }
    }
}

pub fn map_position(position: &OpenPosition) -> PositionRow {
    let long = position.long_leg();
    let short = position.short_leg();
    let long_return = long.return_rate.unwrap_or(0.0);
    let short_return = short.return_rate.unwrap_or(0.0);
    let notional_per_leg = position.notional_per_leg.unwrap_or(0.0);

    PositionRow {
        key: position.group_id.clone(),
        symbol: position.symbol.clone(),
        long_exchange: long.exchange.unwrap_or_default().to_uppercase(),
        short_exchange: short.exchange.unwrap_or_default().to_uppercase(),
        long_return,
        short_return,
        total_return: long_return + short_return,
        funding_diff: position.current_funding_diff.unwrap_or(0.0),
        countdown_secs: position.current_countdown_secs.unwrap_or(-1.0),
        duration_secs: position.duration_seconds.unwrap_or(0.0),
        notional_per_leg,
        notional_value: notional_per_leg * 2.0,
    }
}

pub fn map_positions(positions: &[OpenPosition]) -> Vec<PositionRow> {
    positions.iter().map(map_position).collect()
}

// ─────────────────────────────────────────────────────────────────
// Aggregate stats
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCard {
    pub title: String,
    pub amount: f64,
    /// `None` for cards without a count (net profit)
    pub count: Option<i64>,
}

impl StatCard {
    fn new(title: impl Into<String>, amount: Option<f64>, count: Option<Option<i64>>) -> Self {
        Self {
            title: title.into(),
            amount: amount.unwrap_or(0.0),
            count: count.map(|c| c.unwrap_or(0)),
        }
    }
}

pub const NET_PROFIT_TITLE: &str = "Net profit";

/// Headline cards: live exposure, opened, closed, net profit
pub fn map_headline_stats(stats: &DynamicStats) -> Vec<StatCard> {
    vec![
        StatCard::new(
            "Active positions",
            stats.active_notional,
            Some(stats.active_group_count),
        ),
        StatCard::new("Total opened", stats.total_open, Some(stats.total_open_count)),
        StatCard::new("Total closed", stats.total_close, Some(stats.total_close_count)),
        StatCard::new(NET_PROFIT_TITLE, stats.net_profit, None),
    ]
}

/// One card per close-trigger logic
pub fn map_logic_stats(stats: &DynamicStats) -> Vec<StatCard> {
    stats
        .logic_breakdown()
        .iter()
        .enumerate()
        .map(|(i, (amount, count))| {
            StatCard::new(format!("Logic {} closes", i + 1), *amount, Some(*count))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    pub key: String,
    pub snapshot_date: String,
    pub total_open: f64,
    pub total_close: f64,
    pub net_profit: f64,
    pub logic_amounts: [f64; 5],
}

pub fn map_snapshots(snapshots: &[SnapshotSummary]) -> Vec<SnapshotRow> {
    snapshots
        .iter()
        .enumerate()
        .map(|(idx, snapshot)| {
            let date = snapshot.snapshot_date.clone();
            SnapshotRow {
                key: date.clone().unwrap_or_else(|| idx.to_string()),
                snapshot_date: date.unwrap_or_else(|| BLANK.to_string()),
                total_open: snapshot.total_open.unwrap_or(0.0),
                total_close: snapshot.total_close.unwrap_or(0.0),
                net_profit: snapshot.net_profit.unwrap_or(0.0),
                logic_amounts: snapshot.logic_amounts().map(|amount| amount.unwrap_or(0.0)),
            }
        })
        .collect()
}

/// Point of the net-profit trend line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub snapshot_date: String,
    pub net_profit: f64,
}

pub fn net_profit_series(rows: &[SnapshotRow]) -> Vec<TrendPoint> {
    rows.iter()
        .map(|row| TrendPoint {
            snapshot_date: row.snapshot_date.clone(),
            net_profit: row.net_profit,
        })
        .collect()
}

/// Bar of the grouped per-logic close chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicBar {
    pub snapshot_date: String,
    pub logic: String,
    pub value: f64,
}

/// Five bars per snapshot, one per logic, in logic order
pub fn logic_close_series(rows: &[SnapshotRow]) -> Vec<LogicBar> {
    rows.iter()
        .flat_map(|row| {
            row.logic_amounts
                .iter()
                .enumerate()
                .map(move |(i, value)| LogicBar {
                    snapshot_date: row.snapshot_date.clone(),
                    logic: format!("Logic {}", i + 1),
                    value: *value,
                })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub id: String,
    pub created_at: String,
    pub event_type: String,
    pub symbol: String,
    pub logic_reason: Option<String>,
    /// `None` while pending settlement; never coerced to zero
    pub realized_pnl: Option<f64>,
    /// Both legs; `None` when the payload carries no (or a zero) notional
    pub notional_value: Option<f64>,
}

impl EventRow {
    pub fn pnl_text(&self) -> String {
        self.realized_pnl
            .map(format_amount)
            .unwrap_or_else(|| BLANK.to_string())
    }

    pub fn pnl_tone(&self) -> Tone {
        self.realized_pnl.map(Tone::of_sign).unwrap_or(Tone::Muted)
    }

    pub fn notional_text(&self) -> String {
        self.notional_value
            .map(format_amount)
            .unwrap_or_else(|| BLANK.to_string())
    }
}

pub fn map_event(event: &PositionEventItem) -> EventRow {
    EventRow {
        id: event.id.clone(),
        created_at: event.created_at.clone(),
        event_type: event.event_type.clone(),
        symbol: event.symbol.clone(),
        logic_reason: event.logic_reason.clone(),
        realized_pnl: event.realized_pnl,
        notional_value: event
            .notional_per_leg()
            .filter(|value| *value != 0.0 && value.is_finite())
            .map(|value| value * 2.0),
    }
}

pub fn map_events(events: &[PositionEventItem]) -> Vec<EventRow> {
    events.iter().map(map_event).collect()
}
