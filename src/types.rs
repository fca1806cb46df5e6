//! Core types used throughout the console
//!
//! Wire DTOs for the stats and config services. Backend payloads are
//! best-effort, so every numeric field the views consume is optional and
//! defaulted by the mappers in `view_model`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────
// Stats service
// ─────────────────────────────────────────────────────────────────

/// Aggregate live trading stats (`GET /stats/dynamic`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicStats {
    pub active_notional: Option<f64>,
    pub active_group_count: Option<i64>,
    pub total_open: Option<f64>,
    pub total_open_count: Option<i64>,
    pub total_close: Option<f64>,
    pub total_close_count: Option<i64>,
    pub net_profit: Option<f64>,
    pub logic1_amount: Option<f64>,
    pub logic1_count: Option<i64>,
    pub logic2_amount: Option<f64>,
    pub logic2_count: Option<i64>,
    pub logic3_amount: Option<f64>,
    pub logic3_count: Option<i64>,
    pub logic4_amount: Option<f64>,
    pub logic4_count: Option<i64>,
    pub logic5_amount: Option<f64>,
    pub logic5_count: Option<i64>,
    pub updated_at: Option<String>,
}

impl DynamicStats {
    /// Close amount and count per logic (1..=5)
    pub fn logic_breakdown(&self) -> [(Option<f64>, Option<i64>); 5] {
        [
            (self.logic1_amount, self.logic1_count),
            (self.logic2_amount, self.logic2_count),
            (self.logic3_amount, self.logic3_count),
            (self.logic4_amount, self.logic4_count),
            (self.logic5_amount, self.logic5_count),
        ]
    }
}

/// One side of a position group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionLeg {
    pub exchange: Option<String>,
    #[serde(rename = "return")]
    pub return_rate: Option<f64>,
}

/// One open arbitrage position group (`GET /positions/open`)
///
/// The stats service emits the legs flattened (`long_exchange`,
/// `long_return`, ...) while older builds nest them under `long` / `short`.
/// Both shapes are accepted; the nested one wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenPosition {
    pub group_id: String,
    pub symbol: String,
    pub long: Option<PositionLeg>,
    pub short: Option<PositionLeg>,
    pub current_funding_diff: Option<f64>,
    pub current_countdown_secs: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub notional_per_leg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_return: Option<f64>,
}

impl OpenPosition {
    pub fn long_leg(&self) -> PositionLeg {
        merge_leg(
            self.long.as_ref(),
            self.long_exchange.as_ref(),
            self.long_return,
        )
    }

    pub fn short_leg(&self) -> PositionLeg {
        merge_leg(
            self.short.as_ref(),
            self.short_exchange.as_ref(),
            self.short_return,
        )
    }
}

fn merge_leg(nested: Option<&PositionLeg>, exchange: Option<&String>, ret: Option<f64>) -> PositionLeg {
    PositionLeg {
        exchange: nested
            .and_then(|leg| leg.exchange.clone())
            .or_else(|| exchange.cloned()),
        return_rate: nested.and_then(|leg| leg.return_rate).or(ret),
    }
}

/// One day's closed-book statistics (`GET /stats/static/list`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSummary {
    pub snapshot_date: Option<String>,
    pub total_open: Option<f64>,
    pub total_close: Option<f64>,
    pub net_profit: Option<f64>,
    pub logic1_amount: Option<f64>,
    pub logic2_amount: Option<f64>,
    pub logic3_amount: Option<f64>,
    pub logic4_amount: Option<f64>,
    pub logic5_amount: Option<f64>,
}

impl SnapshotSummary {
    pub fn logic_amounts(&self) -> [Option<f64>; 5] {
        [
            self.logic1_amount,
            self.logic2_amount,
            self.logic3_amount,
            self.logic4_amount,
            self.logic5_amount,
        ]
    }
}

/// One open/close event record (`GET /events/recent`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionEventItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub created_at: String,
    pub event_type: String,
    pub symbol: String,
    pub logic_reason: Option<String>,
    /// `None` while the event is pending settlement
    pub realized_pnl: Option<f64>,
    pub data: Option<Map<String, Value>>,
}

impl PositionEventItem {
    pub fn notional_per_leg(&self) -> Option<f64> {
        self.data
            .as_ref()
            .and_then(|data| data.get("notional_per_leg"))
            .and_then(Value::as_f64)
    }
}

/// Event ids are integers in the service and strings in older payloads.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Int(value) => value.to_string(),
        RawId::Float(value) => value.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────
// Config service
// ─────────────────────────────────────────────────────────────────

/// Open/close trigger thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub aa: f64,
    pub bb: f64,
    pub cc: f64,
    /// Minutes before funding settlement
    pub dd: f64,
    pub ee: f64,
    pub ff: f64,
    pub gg: f64,
    pub hh: f64,
}

impl Thresholds {
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("aa", self.aa),
            ("bb", self.bb),
            ("cc", self.cc),
            ("dd", self.dd),
            ("ee", self.ee),
            ("ff", self.ff),
            ("gg", self.gg),
            ("hh", self.hh),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    pub group_max: u32,
    pub duplicate_max: u32,
    pub leverage_max: f64,
    pub margin_per_leg: f64,
    pub taker_fee: f64,
    pub maker_fee: f64,
    pub trade_fee: f64,
}

impl RiskLimits {
    pub fn entries(&self) -> [(&'static str, f64); 7] {
        [
            ("group_max", f64::from(self.group_max)),
            ("duplicate_max", f64::from(self.duplicate_max)),
            ("leverage_max", self.leverage_max),
            ("margin_per_leg", self.margin_per_leg),
            ("taker_fee", self.taker_fee),
            ("maker_fee", self.maker_fee),
            ("trade_fee", self.trade_fee),
        ]
    }
}

/// Current strategy configuration (`GET|PUT /config/current`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigResponse {
    pub version: i64,
    pub thresholds: Thresholds,
    pub risk_limits: RiskLimits,
    pub global_enable: bool,
    pub created_by: String,
    pub created_at: String,
    pub scan_interval_seconds: Option<f64>,
    pub close_interval_seconds: Option<f64>,
    pub open_interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aa: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hh: Option<f64>,
}

impl From<Thresholds> for ThresholdsPatch {
    fn from(t: Thresholds) -> Self {
        Self {
            aa: Some(t.aa),
            bb: Some(t.bb),
            cc: Some(t.cc),
            dd: Some(t.dd),
            ee: Some(t.ee),
            ff: Some(t.ff),
            gg: Some(t.gg),
            hh: Some(t.hh),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskLimitsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_per_leg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taker_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maker_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_fee: Option<f64>,
}

impl From<RiskLimits> for RiskLimitsPatch {
    fn from(r: RiskLimits) -> Self {
        Self {
            group_max: Some(r.group_max),
            duplicate_max: Some(r.duplicate_max),
            leverage_max: Some(r.leverage_max),
            margin_per_leg: Some(r.margin_per_leg),
            taker_fee: Some(r.taker_fee),
            maker_fee: Some(r.maker_fee),
            trade_fee: Some(r.trade_fee),
        }
    }
}

/// Body of `PUT /config/current`. Every field is optional; omitted fields
/// keep their current server-side value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_enable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ThresholdsPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_limits: Option<RiskLimitsPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_interval_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_interval_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_interval_seconds: Option<f64>,
}

/// Every editable configuration field, as held by the config console form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFormValues {
    pub global_enable: bool,
    pub thresholds: Thresholds,
    pub risk_limits: RiskLimits,
    pub scan_interval_seconds: Option<f64>,
    pub close_interval_seconds: Option<f64>,
    pub open_interval_seconds: Option<f64>,
}

impl ConfigFormValues {
    /// Copy every editable field verbatim from the server's configuration
    pub fn from_config(config: &ConfigResponse) -> Self {
        Self {
            global_enable: config.global_enable,
            thresholds: config.thresholds,
            risk_limits: config.risk_limits,
            scan_interval_seconds: config.scan_interval_seconds,
            close_interval_seconds: config.close_interval_seconds,
            open_interval_seconds: config.open_interval_seconds,
        }
    }

    /// Full-set update payload
    pub fn to_payload(&self) -> ConfigUpdatePayload {
        ConfigUpdatePayload {
            global_enable: Some(self.global_enable),
            thresholds: Some(self.thresholds.into()),
            risk_limits: Some(self.risk_limits.into()),
            scan_interval_seconds: self.scan_interval_seconds,
            close_interval_seconds: self.close_interval_seconds,
            open_interval_seconds: self.open_interval_seconds,
        }
    }

    pub fn intervals(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("scan_interval_seconds", self.scan_interval_seconds),
            ("close_interval_seconds", self.close_interval_seconds),
            ("open_interval_seconds", self.open_interval_seconds),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_position_shape_fills_legs() {
        let raw = r#"{
            "group_id": "g-1",
            "symbol": "BTCUSDT",
            "long_exchange": "binance",
            "long_return": 0.01,
            "short_exchange": "okx",
            "short_return": -0.02,
            "notional_per_leg": 500
        }"#;
        let position: OpenPosition = serde_json::from_str(raw).expect("valid position");

        assert_eq!(position.long_leg().exchange.as_deref(), Some("binance"));
        assert_eq!(position.short_leg().return_rate, Some(-0.02));
        assert_eq!(position.current_countdown_secs, None);
    }

    #[test]
    fn nested_leg_takes_precedence_over_flat_fields() {
        let raw = r#"{
            "group_id": "g-2",
            "symbol": "ETHUSDT",
            "long": { "exchange": "bybit", "return": 0.003 },
            "long_exchange": "binance"
        }"#;
        let position: OpenPosition = serde_json::from_str(raw).expect("valid position");

        assert_eq!(position.long_leg().exchange.as_deref(), Some("bybit"));
        assert_eq!(position.long_leg().return_rate, Some(0.003));
        assert_eq!(position.short_leg(), PositionLeg::default());
    }

    #[test]
    fn event_id_accepts_integers_and_null_pnl() {
        let raw = r#"{
            "id": 42,
            "created_at": "2025-10-20T08:00:00",
            "event_type": "OPEN",
            "symbol": "SOLUSDT",
            "logic_reason": null,
            "realized_pnl": null,
            "data": { "notional_per_leg": 250.0 }
        }"#;
        let event: PositionEventItem = serde_json::from_str(raw).expect("valid event");

        assert_eq!(event.id, "42");
        assert_eq!(event.realized_pnl, None);
        assert_eq!(event.notional_per_leg(), Some(250.0));
    }

    #[test]
    fn dynamic_stats_tolerates_missing_fields() {
        let stats: DynamicStats =
            serde_json::from_str(r#"{ "net_profit": 12.5 }"#).expect("valid stats");
        assert_eq!(stats.net_profit, Some(12.5));
        assert_eq!(stats.active_notional, None);
        assert_eq!(stats.logic_breakdown()[4], (None, None));
    }

    #[test]
    fn form_payload_carries_the_full_set() {
        let config = ConfigResponse {
            version: 3,
            global_enable: true,
            thresholds: Thresholds {
                aa: 0.0005,
                dd: 5.0,
                ..Thresholds::default()
            },
            risk_limits: RiskLimits {
                group_max: 20,
                ..RiskLimits::default()
            },
            scan_interval_seconds: Some(10.0),
            ..ConfigResponse::default()
        };

        let payload = ConfigFormValues::from_config(&config).to_payload();
        let json = serde_json::to_value(&payload).expect("serializable payload");

        assert_eq!(json["global_enable"], Value::Bool(true));
        assert_eq!(json["thresholds"]["dd"], serde_json::json!(5.0));
        assert_eq!(json["risk_limits"]["group_max"], serde_json::json!(20));
        assert_eq!(json["scan_interval_seconds"], serde_json::json!(10.0));
        assert!(json.get("open_interval_seconds").is_none());
    }
}
