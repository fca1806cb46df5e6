//! Display formatting for view-model values

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;

/// Placeholder shown for unknown or missing values
pub const BLANK: &str = "-";

/// A countdown or elapsed duration decomposed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Countdown {
    /// Negative or non-finite input
    Unknown,
    Clock { hours: u64, minutes: u8, seconds: u8 },
}

impl Countdown {
    pub fn from_secs(secs: f64) -> Self {
        if !secs.is_finite() || secs < 0.0 {
            return Countdown::Unknown;
        }
        let hours = (secs / 3600.0).floor() as u64;
        let minutes = ((secs % 3600.0) / 60.0).floor() as u8;
        let seconds = (secs % 60.0).floor() as u8;
        Countdown::Clock {
            hours,
            minutes,
            seconds,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Countdown::Clock { .. })
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Unknown => f.write_str(BLANK),
            Countdown::Clock {
                hours,
                minutes,
                seconds,
            } => write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds),
        }
    }
}

/// `HH:MM:SS`, or `-` for negative / non-finite input. Hours never wrap.
pub fn format_countdown(secs: f64) -> String {
    Countdown::from_secs(secs).to_string()
}

/// Fraction rendered as a percentage, e.g. `0.0123` → `1.23%`
pub fn format_percent(value: f64, digits: usize) -> String {
    format!("{:.*}%", digits, value * 100.0)
}

/// Amount with two decimals
pub fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

/// Rounded to a whole number with thousands separators, e.g. `12,500`
pub fn format_grouped(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative && rounded != 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Backend timestamp as local `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts RFC 3339 and naive ISO 8601 (as emitted by the services);
/// anything else is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    const DISPLAY: &str = "%Y-%m-%d %H:%M:%S";

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Local).format(DISPLAY).to_string();
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return ts.format(DISPLAY).to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_pads_each_field() {
        assert_eq!(format_countdown(0.0), "00:00:00");
        assert_eq!(format_countdown(61.0), "00:01:01");
        assert_eq!(format_countdown(3599.9), "00:59:59");
        assert_eq!(format_countdown(3723.0), "01:02:03");
    }

    #[test]
    fn countdown_hours_do_not_wrap() {
        assert_eq!(format_countdown(90_000.0), "25:00:00");
        assert_eq!(format_countdown(360_000.0), "100:00:00");
    }

    #[test]
    fn countdown_unknown_for_negative_or_non_finite() {
        for secs in [-1.0, -0.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(format_countdown(secs), BLANK, "input {secs}");
            assert!(!Countdown::from_secs(secs).is_known());
        }
    }

    #[test]
    fn percent_keeps_fraction_semantics() {
        assert_eq!(format_percent(0.0123, 2), "1.23%");
        assert_eq!(format_percent(-0.01, 2), "-1.00%");
        assert_eq!(format_percent(0.00052, 3), "0.052%");
    }

    #[test]
    fn grouped_inserts_separators() {
        assert_eq!(format_grouped(1000.0), "1,000");
        assert_eq!(format_grouped(999.4), "999");
        assert_eq!(format_grouped(1_234_567.8), "1,234,568");
        assert_eq!(format_grouped(-12_500.0), "-12,500");
        assert_eq!(format_grouped(0.0), "0");
    }

    #[test]
    fn naive_timestamps_are_reformatted() {
        assert_eq!(
            format_timestamp("2025-10-22T09:15:30.123456"),
            "2025-10-22 09:15:30"
        );
        assert_eq!(format_timestamp("not a date"), "not a date");
    }
}
