//! Configuration console
//!
//! Shows the current strategy configuration and edits it through a form.
//! The form is populated verbatim from every successful fetch; a save
//! sends the full set, then re-fetches so the form shows the canonical
//! server values. A failed save leaves the edits in place.

use super::{NotificationLevel, Notification, Notifications, PageState};
use crate::api::ConfigClient;
use crate::polling::{
    CurrentConfigSource, Orchestrator, PollError, RefreshPolicy, Revalidation, Subscription,
};
use crate::types::{ConfigFormValues, ConfigResponse};
use crate::view_model::{format_timestamp, BLANK};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub const LOAD_FAILED_MESSAGE: &str =
    "Failed to load configuration, please check the config service";

pub const SAVED_MESSAGE: &str = "Configuration saved";
pub const SAVE_FAILED_MESSAGE: &str = "Save failed";
pub const INVALID_MESSAGE: &str = "Some fields are invalid";
pub const SYNCING_MESSAGE: &str = "Syncing latest configuration…";
pub const SYNCED_MESSAGE: &str = "Pulled latest configuration";
pub const SYNC_FAILED_MESSAGE: &str = "Refresh failed, please try again later";
pub const RESET_MESSAGE: &str = "Form reset to the last fetched configuration";

// ─────────────────────────────────────────────────────────────────
// Field metadata
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldMeta {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub min: f64,
    pub step: f64,
}

const fn field(
    key: &'static str,
    label: &'static str,
    description: &'static str,
    step: f64,
) -> FieldMeta {
    FieldMeta {
        key,
        label,
        description,
        min: 0.0,
        step,
    }
}

pub const THRESHOLD_FIELDS: [FieldMeta; 8] = [
    field("aa", "Threshold aa", "Consider opening only when |funding diff| ≥ aa", 0.0001),
    field("bb", "Threshold bb", "Logic 1 closes once the funding diff falls to ≤ bb", 0.0001),
    field("cc", "Threshold cc", "Close when total return ≥ cc and the diff has narrowed", 0.0001),
    field("dd", "Threshold dd (minutes)", "Logic 1 fires within dd minutes of settlement", 1.0),
    field("ee", "Threshold ee", "Logic 2 closes when one leg loses hh but total return ≥ ee", 0.0001),
    field("ff", "Threshold ff", "Logic 3 closes immediately once total return ≥ ff", 0.0001),
    field("gg", "Threshold gg", "Logic 4 stops out when the group return ≤ -gg%", 0.0001),
    field("hh", "Threshold hh", "Logic 2 triggers when a single leg loses hh%", 0.1),
];

pub const RISK_FIELDS: [FieldMeta; 7] = [
    field("group_max", "Max position groups", "Most position groups open at once", 1.0),
    field("duplicate_max", "Max groups per symbol", "Most position groups on one symbol", 1.0),
    field("leverage_max", "Max leverage", "Leverage ceiling for new positions", 0.1),
    field("margin_per_leg", "Margin per leg", "Margin allocated to each leg", 1.0),
    field("taker_fee", "Taker fee", "Taker fee used in strategy math", 0.0001),
    field("maker_fee", "Maker fee", "Maker fee used in strategy math", 0.0001),
    field("trade_fee", "Trade fee", "Blanket fee assumption (may equal taker/maker)", 0.0001),
];

pub const INTERVAL_FIELDS: [FieldMeta; 3] = [
    field("scan_interval_seconds", "Scan interval (s)", "Funding rate and market scan frequency", 0.5),
    field("close_interval_seconds", "Close check interval (s)", "How often close logic is evaluated", 0.5),
    field("open_interval_seconds", "Open check interval (s)", "How often open opportunities are refreshed", 0.5),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldGroups {
    pub thresholds: &'static [FieldMeta],
    pub risk_limits: &'static [FieldMeta],
    pub intervals: &'static [FieldMeta],
}

pub const FIELD_GROUPS: FieldGroups = FieldGroups {
    thresholds: &THRESHOLD_FIELDS,
    risk_limits: &RISK_FIELDS,
    intervals: &INTERVAL_FIELDS,
};

// ─────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every numeric field must be finite and at least its minimum (0)
pub fn validate(values: &ConfigFormValues) -> Result<(), Vec<FieldError>> {
    let thresholds = values
        .thresholds
        .entries()
        .map(|(key, value)| (format!("thresholds.{}", key), Some(value)));
    let risk = values
        .risk_limits
        .entries()
        .map(|(key, value)| (format!("risk_limits.{}", key), Some(value)));
    let intervals = values
        .intervals()
        .map(|(key, value)| (key.to_string(), value));

    let errors: Vec<FieldError> = thresholds
        .into_iter()
        .chain(risk)
        .chain(intervals)
        .filter_map(|(field, value)| match value {
            Some(v) if !v.is_finite() => Some(FieldError {
                field,
                message: "must be a number".to_string(),
            }),
            Some(v) if v < 0.0 => Some(FieldError {
                field,
                message: "must be ≥ 0".to_string(),
            }),
            _ => None,
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ─────────────────────────────────────────────────────────────────
// Page
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Stored as `version`; `refetched` is false if the follow-up read failed
    Saved { version: i64, refetched: bool },
    Rejected { errors: Vec<FieldError> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigConsoleView {
    pub loading: bool,
    pub syncing: bool,
    pub submitting: bool,
    pub running: bool,
    pub status_label: &'static str,
    pub last_updated: String,
    pub version: Option<i64>,
    pub created_by: Option<String>,
    pub form: Option<ConfigFormValues>,
    pub fields: FieldGroups,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Default)]
struct FormState {
    values: Option<ConfigFormValues>,
    /// `updated_at` of the fetch the form was last populated from
    synced_at: Option<DateTime<Utc>>,
}

struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ConfigConsolePage {
    config: Subscription<ConfigResponse>,
    client: ConfigClient,
    form: Mutex<FormState>,
    notifications: Mutex<Notifications>,
    syncing: AtomicBool,
    submitting: AtomicBool,
}

impl ConfigConsolePage {
    /// Fetches once on mount; further reads are explicit
    pub fn mount(orchestrator: &Orchestrator, client: &ConfigClient) -> Result<Self, PollError> {
        let config = orchestrator.subscribe::<ConfigResponse>(
            Arc::new(CurrentConfigSource::new(client.clone())),
            RefreshPolicy::manual(),
        )?;
        Ok(Self {
            config,
            client: client.clone(),
            form: Mutex::new(FormState::default()),
            notifications: Mutex::new(Notifications::default()),
            syncing: AtomicBool::new(false),
            submitting: AtomicBool::new(false),
        })
    }

    pub fn keys(&self) -> Vec<String> {
        vec![self.config.key().to_string()]
    }

    pub async fn ready(&self) {
        self.config.settled().await;
    }

    fn lock_form(&self) -> MutexGuard<'_, FormState> {
        self.form.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(level, message);
    }

    /// Repopulate the form if a newer fetch has landed since the last sync
    fn sync_form(&self) {
        let state = self.config.snapshot();
        let Some(config) = state.data else {
            return;
        };
        let mut form = self.lock_form();
        if form.values.is_none() || form.synced_at != state.updated_at {
            form.values = Some(ConfigFormValues::from_config(&config));
            form.synced_at = state.updated_at;
        }
    }

    /// Current form values, if a configuration has ever loaded
    pub fn form_values(&self) -> Option<ConfigFormValues> {
        self.sync_form();
        self.lock_form().values.clone()
    }

    /// Validate and save the whole form
    pub async fn submit(&self, values: ConfigFormValues) -> SubmitOutcome {
        self.sync_form();
        self.lock_form().values = Some(values.clone());

        if let Err(errors) = validate(&values) {
            self.notify(NotificationLevel::Error, INVALID_MESSAGE);
            return SubmitOutcome::Rejected { errors };
        }

        self.submitting.store(true, Ordering::SeqCst);
        let _flag = FlagGuard(&self.submitting);

        match self.client.update_config(&values.to_payload()).await {
            Ok(saved) => {
                self.notify(NotificationLevel::Success, SAVED_MESSAGE);
                let refetched = self.config.refresh().await.is_updated();
                self.sync_form();
                SubmitOutcome::Saved {
                    version: saved.version,
                    refetched,
                }
            }
            Err(err) => {
                warn!(error = %err, "❌ Failed to save configuration");
                self.notify(NotificationLevel::Error, SAVE_FAILED_MESSAGE);
                SubmitOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Re-fetch the configuration and overwrite the form with it
    pub async fn pull_latest(&self) -> Revalidation<ConfigResponse> {
        self.syncing.store(true, Ordering::SeqCst);
        let _flag = FlagGuard(&self.syncing);
        self.notify(NotificationLevel::Info, SYNCING_MESSAGE);

        let result = self.config.refresh().await;
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dismiss(SYNCING_MESSAGE);

        match &result {
            Revalidation::Updated(config) => {
                info!(version = config.version, "📥 Pulled latest configuration");
                self.sync_form();
                self.notify(NotificationLevel::Success, SYNCED_MESSAGE);
            }
            Revalidation::Failed(err) => {
                warn!(error = %err, "Failed to pull latest configuration");
                self.notify(NotificationLevel::Error, SYNC_FAILED_MESSAGE);
            }
        }
        result
    }

    /// Discard edits, restoring the last fetched configuration
    pub fn reset(&self) -> Option<ConfigFormValues> {
        let state = self.config.snapshot();
        let config = state.data?;
        let values = ConfigFormValues::from_config(&config);
        {
            let mut form = self.lock_form();
            form.values = Some(values.clone());
            form.synced_at = state.updated_at;
        }
        self.notify(NotificationLevel::Info, RESET_MESSAGE);
        Some(values)
    }

    pub fn view(&self) -> PageState<ConfigConsoleView> {
        self.sync_form();
        let state = self.config.snapshot();

        // Only blank the page when nothing has ever loaded
        if state.data.is_none() && state.has_error() {
            return PageState::failed(LOAD_FAILED_MESSAGE);
        }

        let config = state.data.as_ref();
        let running = config.map(|c| c.global_enable).unwrap_or(false);
        let last_updated = config
            .map(|c| c.created_at.as_str())
            .filter(|ts| !ts.is_empty())
            .map(format_timestamp)
            .unwrap_or_else(|| BLANK.to_string());
        let notifications = self
            .notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active();

        PageState::Ready(ConfigConsoleView {
            loading: state.is_loading() || (state.data.is_none() && !state.is_settled()),
            syncing: self.syncing.load(Ordering::SeqCst),
            submitting: self.submitting.load(Ordering::SeqCst),
            running,
            status_label: if running { "Running" } else { "Paused" },
            last_updated,
            version: config.map(|c| c.version),
            created_by: config.map(|c| c.created_by.clone()),
            form: self.lock_form().values.clone(),
            fields: FIELD_GROUPS,
            notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskLimits, Thresholds};

    fn values() -> ConfigFormValues {
        ConfigFormValues {
            global_enable: true,
            thresholds: Thresholds {
                aa: 0.0005,
                dd: 5.0,
                ..Thresholds::default()
            },
            risk_limits: RiskLimits {
                group_max: 10,
                ..RiskLimits::default()
            },
            scan_interval_seconds: Some(2.5),
            ..ConfigFormValues::default()
        }
    }

    #[test]
    fn valid_form_passes() {
        assert_eq!(validate(&values()), Ok(()));
    }

    #[test]
    fn negative_and_non_finite_fields_are_rejected() {
        let mut form = values();
        form.thresholds.bb = -0.1;
        form.risk_limits.leverage_max = f64::NAN;
        form.open_interval_seconds = Some(-1.0);

        let errors = validate(&form).expect_err("invalid form");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["thresholds.bb", "risk_limits.leverage_max", "open_interval_seconds"]
        );
        assert_eq!(errors[1].message, "must be a number");
    }

    #[test]
    fn metadata_covers_every_editable_field() {
        let form = values();
        let thresholds: Vec<&str> = form.thresholds.entries().iter().map(|(k, _)| *k).collect();
        let meta: Vec<&str> = THRESHOLD_FIELDS.iter().map(|f| f.key).collect();
        assert_eq!(thresholds, meta);

        let risk: Vec<&str> = form.risk_limits.entries().iter().map(|(k, _)| *k).collect();
        let meta: Vec<&str> = RISK_FIELDS.iter().map(|f| f.key).collect();
        assert_eq!(risk, meta);

        assert!(FIELD_GROUPS.intervals.iter().all(|f| f.min == 0.0));
    }
}
