//! Page views
//!
//! A page mounts its subscriptions on the orchestrator, keeps its own UI
//! state (refresh mode, form, notifications) and renders a display-ready
//! view on demand. Dropping a page drops its subscriptions.

pub mod config_console;
pub mod dashboard;
pub mod history;

pub use config_console::{ConfigConsolePage, ConfigConsoleView, SubmitOutcome};
pub use dashboard::{DashboardControls, DashboardPage, DashboardView, ValueMetric};
pub use history::{HistoryOptions, HistoryPage, HistoryView};

use crate::view_model::Tone;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Rendered page: content, or a static failure message in its place
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "view", rename_all = "snake_case")]
pub enum PageState<V> {
    Ready(V),
    Failed { message: String },
}

/// Formatted value plus its emphasis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub text: String,
    pub tone: Tone,
}

impl Cell {
    pub fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

impl<V> PageState<V> {
    pub fn failed(message: impl Into<String>) -> Self {
        PageState::Failed {
            message: message.into(),
        }
    }

    pub fn ready(&self) -> Option<&V> {
        match self {
            PageState::Ready(view) => Some(view),
            PageState::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageState::Failed { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    #[serde(skip)]
    raised_at: Instant,
}

/// Transient toast-style messages
#[derive(Debug)]
pub struct Notifications {
    ttl: Duration,
    items: VecDeque<Notification>,
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

impl Notifications {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3);
    const MAX_ITEMS: usize = 8;

    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, level: NotificationLevel, message: impl Into<String>) {
        if self.items.len() >= Self::MAX_ITEMS {
            self.items.pop_front();
        }
        self.items.push_back(Notification {
            level,
            message: message.into(),
            raised_at: Instant::now(),
        });
    }

    /// Unexpired notifications, oldest first
    pub fn active(&mut self) -> Vec<Notification> {
        let ttl = self.ttl;
        self.items.retain(|n| n.raised_at.elapsed() < ttl);
        self.items.iter().cloned().collect()
    }

    /// Drop a pending message with this exact text (e.g. a loading hint)
    pub fn dismiss(&mut self, message: &str) {
        self.items.retain(|n| n.message != message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn notifications_expire_after_ttl() {
        let mut notes = Notifications::default();
        notes.push(NotificationLevel::Success, "Configuration saved");

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(notes.active().len(), 1);

        notes.push(NotificationLevel::Error, "Save failed");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let active = notes.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NotificationLevel::Error);
    }

    #[test]
    fn failed_state_serializes_with_message() {
        let state: PageState<u8> = PageState::failed("backend down");
        let json = serde_json::to_value(&state).expect("serializable");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["view"]["message"], "backend down");
        assert!(state.is_failed());
    }
}
