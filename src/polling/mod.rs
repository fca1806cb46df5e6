//! Polling orchestrator
//!
//! Owns one cache entry per data source key. Each entry has a driver task
//! that fetches once on creation and then on a fixed interval while in
//! [`RefreshMode::Auto`]. Consumers hold a [`Subscription`] and read
//! snapshots; only the driver writes. The last dropped subscription
//! removes the entry and aborts its task.

pub mod sources;

pub use sources::{
    CurrentConfigSource, DataSource, DynamicStatsSource, OpenPositionsSource, RecentEventsSource,
    SnapshotListSource,
};

use crate::api::FetchError;
use chrono::{DateTime, Utc};
use futures_util::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Cache key {0} is already bound to a different payload type")]
    KeyTypeMismatch(String),
}

// ─────────────────────────────────────────────────────────────────
// Refresh policy
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    #[default]
    Auto,
    Manual,
}

impl RefreshMode {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshMode::Auto => "Auto refresh",
            RefreshMode::Manual => "Manual refresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub mode: RefreshMode,
    pub interval: Duration,
}

impl RefreshPolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
    const MIN_INTERVAL: Duration = Duration::from_millis(100);

    pub fn auto(interval: Duration) -> Self {
        Self {
            mode: RefreshMode::Auto,
            interval: interval.max(Self::MIN_INTERVAL),
        }
    }

    /// Fetch on mount and on explicit refresh only
    pub fn manual() -> Self {
        Self {
            mode: RefreshMode::Manual,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_mode(mode: RefreshMode, interval: Duration) -> Self {
        Self {
            mode,
            ..Self::auto(interval)
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::auto(Self::DEFAULT_INTERVAL)
    }
}

// ─────────────────────────────────────────────────────────────────
// Source state
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePhase {
    Idle,
    Loading,
    Success,
    Error,
}

/// Stale-while-revalidate view of one source.
///
/// `data` is the latest successful payload and survives failed
/// revalidations; `error` is cleared by the next success.
#[derive(Debug, Clone)]
pub struct SourceState<T> {
    pub data: Option<T>,
    pub phase: SourcePhase,
    pub error: Option<FetchError>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for SourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            phase: SourcePhase::Idle,
            error: None,
            updated_at: None,
        }
    }
}

impl<T> SourceState<T> {
    /// First load still in flight
    pub fn is_loading(&self) -> bool {
        self.phase == SourcePhase::Loading && self.data.is_none()
    }

    /// Any fetch in flight, including background revalidation
    pub fn is_validating(&self) -> bool {
        self.phase == SourcePhase::Loading
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.phase, SourcePhase::Success | SourcePhase::Error)
    }

    fn begin(&mut self) {
        self.phase = SourcePhase::Loading;
    }

    fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.error = None;
        self.phase = SourcePhase::Success;
        self.updated_at = Some(Utc::now());
    }

    fn fail(&mut self, error: FetchError) {
        self.error = Some(error);
        self.phase = SourcePhase::Error;
    }
}

/// Result of one revalidation, handed back to whoever triggered it
#[derive(Debug, Clone, PartialEq)]
pub enum Revalidation<T> {
    Updated(T),
    Failed(FetchError),
}

impl<T> Revalidation<T> {
    pub fn is_updated(&self) -> bool {
        matches!(self, Revalidation::Updated(_))
    }
}

// ─────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────

struct SourceDriver<T> {
    key: String,
    source: Arc<dyn DataSource<T>>,
    state: watch::Sender<SourceState<T>>,
    mode: watch::Sender<RefreshMode>,
    interval: Duration,
    /// Serializes revalidations of this key
    gate: tokio::sync::Mutex<()>,
    changes: broadcast::Sender<String>,
}

impl<T> SourceDriver<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Revalidate in a task of its own and wait for the result.
    ///
    /// The caller may be dropped mid-fetch; the task still settles the
    /// state, so the entry never stays in `Loading`.
    async fn revalidate(self: &Arc<Self>) -> Revalidation<T> {
        let driver = Arc::clone(self);
        match tokio::spawn(async move { driver.revalidate_now().await }).await {
            Ok(result) => result,
            Err(err) => Revalidation::Failed(FetchError::transport(self.source.name(), err)),
        }
    }

    async fn revalidate_now(&self) -> Revalidation<T> {
        let _gate = self.gate.lock().await;

        self.state.send_modify(SourceState::begin);
        self.announce();
        debug!(key = %self.key, source = self.source.name(), "Revalidating");

        let result = match self.source.fetch().await {
            Ok(data) => {
                self.state.send_modify(|state| state.succeed(data.clone()));
                Revalidation::Updated(data)
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "⚠️ Revalidation failed, keeping last payload");
                self.state.send_modify(|state| state.fail(err.clone()));
                Revalidation::Failed(err)
            }
        };
        self.announce();
        result
    }

    fn announce(&self) {
        // No listeners is fine
        let _ = self.changes.send(self.key.clone());
    }

    async fn run(self: Arc<Self>) {
        self.revalidate_now().await;

        let mut mode_rx = self.mode.subscribe();
        loop {
            let mode = *mode_rx.borrow_and_update();
            match mode {
                RefreshMode::Auto => {
                    let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                self.revalidate_now().await;
                            }
                            changed = mode_rx.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                                break;
                            }
                        }
                    }
                }
                RefreshMode::Manual => {
                    if mode_rx.changed().await.is_err() {
                        return;
                    }
                }
            }
            debug!(key = %self.key, mode = ?*mode_rx.borrow(), "Refresh mode changed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Cache and orchestrator
// ─────────────────────────────────────────────────────────────────

struct CacheEntry {
    driver: Arc<dyn Any + Send + Sync>,
    subscribers: usize,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct PollCache {
    entries: HashMap<String, CacheEntry>,
}

fn lock_cache(cache: &Mutex<PollCache>) -> MutexGuard<'_, PollCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to the polling cache
#[derive(Clone)]
pub struct Orchestrator {
    cache: Arc<Mutex<PollCache>>,
    changes: broadcast::Sender<String>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            cache: Arc::new(Mutex::new(PollCache::default())),
            changes,
        }
    }

    /// Subscribe to a source, creating and starting its entry if needed.
    ///
    /// An existing entry keeps its own policy; the new subscriber shares
    /// its cached payload.
    pub fn subscribe<T>(
        &self,
        source: Arc<dyn DataSource<T>>,
        policy: RefreshPolicy,
    ) -> Result<Subscription<T>, PollError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = source.key();
        let mut cache = lock_cache(&self.cache);

        if let Some(entry) = cache.entries.get_mut(&key) {
            let driver = entry
                .driver
                .clone()
                .downcast::<SourceDriver<T>>()
                .map_err(|_| PollError::KeyTypeMismatch(key.clone()))?;
            entry.subscribers += 1;
            debug!(key = %key, subscribers = entry.subscribers, "Joined cached source");
            return Ok(Subscription {
                key,
                driver,
                cache: self.cache.clone(),
            });
        }

        let (state, _) = watch::channel(SourceState::default());
        let (mode, _) = watch::channel(policy.mode);
        let driver = Arc::new(SourceDriver {
            key: key.clone(),
            source,
            state,
            mode,
            interval: policy.interval,
            gate: tokio::sync::Mutex::new(()),
            changes: self.changes.clone(),
        });
        let task = tokio::spawn(driver.clone().run());

        info!(
            key = %key,
            mode = ?policy.mode,
            interval_ms = policy.interval.as_millis() as u64,
            "📡 Polling source mounted"
        );
        cache.entries.insert(
            key.clone(),
            CacheEntry {
                driver: driver.clone(),
                subscribers: 1,
                task,
            },
        );

        Ok(Subscription {
            key,
            driver,
            cache: self.cache.clone(),
        })
    }

    /// Stream of keys whose state changed
    pub fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock_cache(&self.cache).entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_cached(&self, key: &str) -> bool {
        lock_cache(&self.cache).entries.contains_key(key)
    }
}

// ─────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────

/// A consumer's handle on one cache entry
pub struct Subscription<T> {
    key: String,
    driver: Arc<SourceDriver<T>>,
    cache: Arc<Mutex<PollCache>>,
}

impl<T> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> SourceState<T> {
        self.driver.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.driver.state.borrow().data.clone()
    }

    /// Trigger a revalidation now and wait for it
    pub async fn refresh(&self) -> Revalidation<T> {
        self.driver.revalidate().await
    }

    /// Refresh, reduced to a report line for fan-out
    pub fn outcome(&self) -> BoxFuture<'_, SourceOutcome> {
        Box::pin(async move {
            let error = match self.refresh().await {
                Revalidation::Updated(_) => None,
                Revalidation::Failed(err) => Some(err.to_string()),
            };
            SourceOutcome {
                key: self.key.clone(),
                ok: error.is_none(),
                error,
            }
        })
    }

    pub fn mode(&self) -> RefreshMode {
        *self.driver.mode.borrow()
    }

    /// Switch the entry between auto and manual refresh
    pub fn set_mode(&self, mode: RefreshMode) {
        let changed = self.driver.mode.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            *current = mode;
            true
        });
        if changed {
            info!(key = %self.key, mode = ?mode, "🔁 Refresh mode switched");
        }
    }

    /// Wait until at least one fetch has completed or a payload is cached
    pub async fn settled(&self) {
        let mut rx = self.driver.state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.is_settled() || state.data.is_some() {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut cache = lock_cache(&self.cache);
        let last = match cache.entries.get_mut(&self.key) {
            Some(entry) => {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                entry.subscribers == 0
            }
            None => false,
        };
        if last {
            if let Some(entry) = cache.entries.remove(&self.key) {
                entry.task.abort();
                info!(key = %self.key, "🧹 Polling source released");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Fan-out refresh
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub key: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub outcomes: Vec<SourceOutcome>,
    pub completed_at: DateTime<Utc>,
}

impl RefreshReport {
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|o| o.ok)
    }
}

/// Run every refresh concurrently and resolve once all have settled,
/// whether they succeeded or not.
pub async fn fan_out(refreshes: Vec<BoxFuture<'_, SourceOutcome>>) -> RefreshReport {
    let outcomes = join_all(refreshes).await;
    let failed = outcomes.iter().filter(|o| !o.ok).count();
    info!(
        sources = outcomes.len(),
        failed,
        "🔄 Manual refresh complete"
    );
    RefreshReport {
        outcomes,
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    struct StubSource {
        key: &'static str,
        calls: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
        delay: Duration,
    }

    impl StubSource {
        fn new(key: &'static str) -> Self {
            Self {
                key,
                calls: Arc::new(AtomicUsize::new(0)),
                failing: Arc::new(AtomicBool::new(false)),
                delay: Duration::ZERO,
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl DataSource<u32> for StubSource {
        fn key(&self) -> String {
            self.key.to_string()
        }

        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch(&self) -> Result<u32, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                Err(FetchError::status("fetch stub", 500))
            } else {
                Ok(call as u32)
            }
        }
    }

    struct TextSource;

    #[async_trait]
    impl DataSource<String> for TextSource {
        fn key(&self) -> String {
            "/stub/shared".to_string()
        }

        fn name(&self) -> &'static str {
            "text"
        }

        async fn fetch(&self) -> Result<String, FetchError> {
            Ok("text".to_string())
        }
    }

    fn calls_of(source: &StubSource) -> Arc<AtomicUsize> {
        source.calls.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn auto_polls_until_switched_to_manual() {
        let orchestrator = Orchestrator::new();
        let source = StubSource::new("/stub/auto");
        let calls = calls_of(&source);

        let sub = assert_ok!(orchestrator.subscribe::<u32>(
            Arc::new(source),
            RefreshPolicy::auto(Duration::from_millis(5000)),
        ));
        sub.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        sub.set_mode(RefreshMode::Manual);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        sub.set_mode(RefreshMode::Auto);
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_mode_fetches_once_on_mount() {
        let orchestrator = Orchestrator::new();
        let source = StubSource::new("/stub/manual");
        let calls = calls_of(&source);

        let sub = assert_ok!(orchestrator.subscribe::<u32>(Arc::new(source), RefreshPolicy::manual()));
        sub.settled().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sub.data(), Some(1));
        assert_eq!(sub.mode(), RefreshMode::Manual);
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_waits_for_every_source_even_on_failure() {
        let orchestrator = Orchestrator::new();
        let slow = StubSource::new("/stub/slow").delayed(Duration::from_millis(1000));
        let broken = StubSource::new("/stub/broken").delayed(Duration::from_millis(200));
        let broken_flag = broken.failing.clone();

        let slow = assert_ok!(orchestrator.subscribe::<u32>(Arc::new(slow), RefreshPolicy::manual()));
        let broken =
            assert_ok!(orchestrator.subscribe::<u32>(Arc::new(broken), RefreshPolicy::manual()));
        slow.settled().await;
        broken.settled().await;

        broken_flag.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let report = fan_out(vec![slow.outcome(), broken.outcome()]).await;

        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.all_ok());
        assert!(report.outcomes[0].ok);
        assert!(!report.outcomes[1].ok);
        assert_eq!(slow.data(), Some(2));
        assert!(slow.snapshot().is_settled());
        assert!(broken.snapshot().is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_revalidation_keeps_last_payload() {
        let orchestrator = Orchestrator::new();
        let source = StubSource::new("/stub/swr");
        let failing = source.failing.clone();

        let sub = assert_ok!(orchestrator.subscribe::<u32>(Arc::new(source), RefreshPolicy::manual()));
        sub.settled().await;
        assert_eq!(sub.data(), Some(1));

        failing.store(true, Ordering::SeqCst);
        let result = sub.refresh().await;
        assert!(!result.is_updated());

        let state = sub.snapshot();
        assert_eq!(state.data, Some(1));
        assert_eq!(state.phase, SourcePhase::Error);
        assert!(state.has_error());
        assert!(!state.is_loading());

        failing.store(false, Ordering::SeqCst);
        assert_eq!(sub.refresh().await, Revalidation::Updated(3));
        assert!(!sub.snapshot().has_error());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_refresh_still_settles_the_source() {
        let orchestrator = Orchestrator::new();
        let source = StubSource::new("/stub/cancelled").delayed(Duration::from_secs(1));
        let calls = calls_of(&source);

        let sub = assert_ok!(orchestrator.subscribe::<u32>(Arc::new(source), RefreshPolicy::manual()));
        sub.settled().await;
        assert_eq!(sub.data(), Some(1));

        let dropped = tokio::time::timeout(Duration::from_millis(100), sub.refresh()).await;
        assert!(dropped.is_err());
        assert!(sub.snapshot().is_validating());

        let settled = tokio::time::timeout(Duration::from_secs(60), sub.settled()).await;
        assert!(settled.is_ok());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let state = sub.snapshot();
        assert_eq!(state.phase, SourcePhase::Success);
        assert!(!state.is_validating());
        assert_eq!(state.data, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(sub.refresh().await, Revalidation::Updated(3));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_lives_as_long_as_its_subscribers() {
        let orchestrator = Orchestrator::new();
        let source = StubSource::new("/stub/shared");
        let calls = calls_of(&source);

        let first = assert_ok!(orchestrator.subscribe::<u32>(
            Arc::new(source),
            RefreshPolicy::auto(Duration::from_secs(5)),
        ));
        let second = assert_ok!(orchestrator.subscribe::<u32>(
            Arc::new(StubSource::new("/stub/shared")),
            RefreshPolicy::manual(),
        ));
        first.settled().await;
        second.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.data(), Some(1));
        assert_eq!(orchestrator.cached_keys(), vec!["/stub/shared".to_string()]);

        drop(first);
        assert!(orchestrator.is_cached("/stub/shared"));

        drop(second);
        assert!(orchestrator.cached_keys().is_empty());

        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn reusing_a_key_with_another_payload_type_fails() {
        let orchestrator = Orchestrator::new();
        let _numbers = assert_ok!(orchestrator.subscribe::<u32>(
            Arc::new(StubSource::new("/stub/shared")),
            RefreshPolicy::manual(),
        ));

        let result = orchestrator.subscribe::<String>(Arc::new(TextSource), RefreshPolicy::manual());
        assert!(matches!(result, Err(PollError::KeyTypeMismatch(key)) if key == "/stub/shared"));
    }

    #[tokio::test]
    async fn changes_announce_the_key() {
        let orchestrator = Orchestrator::new();
        let mut changes = orchestrator.changes();
        let _sub = assert_ok!(orchestrator.subscribe::<u32>(
            Arc::new(StubSource::new("/stub/announce")),
            RefreshPolicy::manual(),
        ));

        let key = assert_ok!(changes.recv().await);
        assert_eq!(key, "/stub/announce");
    }
}
