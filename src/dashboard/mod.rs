//! Console Server
//!
//! HTTP/WebSocket host for the dashboard, history and config pages.
//! A page stays mounted (its sources polled) while anyone is viewing it:
//! each open socket and each in-flight request holds a lease.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;
mod websocket;

pub use api::create_router;
pub use types::*;
pub use websocket::WebSocketBroadcaster;

use crate::api::{build_http_client, ConfigClient, StatsClient};
use crate::config::AppConfig;
use crate::pages::{
    ConfigConsolePage, DashboardControls, DashboardPage, HistoryOptions, HistoryPage, ValueMetric,
};
use crate::polling::{Orchestrator, PollError, RefreshMode};
use anyhow::Context;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A page the console can host
pub trait ConsolePage: Send + Sync + 'static {
    const NAME: &'static str;

    /// Cache keys whose changes should re-render the page
    fn keys(&self) -> Vec<String>;

    fn render(&self) -> WsMessage;
}

impl ConsolePage for DashboardPage {
    const NAME: &'static str = "dashboard";

    fn keys(&self) -> Vec<String> {
        DashboardPage::keys(self)
    }

    fn render(&self) -> WsMessage {
        WsMessage::Dashboard(self.view())
    }
}

impl ConsolePage for HistoryPage {
    const NAME: &'static str = "history";

    fn keys(&self) -> Vec<String> {
        HistoryPage::keys(self)
    }

    fn render(&self) -> WsMessage {
        WsMessage::History(self.view())
    }
}

impl ConsolePage for ConfigConsolePage {
    const NAME: &'static str = "config";

    fn keys(&self) -> Vec<String> {
        ConfigConsolePage::keys(self)
    }

    fn render(&self) -> WsMessage {
        WsMessage::Config(self.view())
    }
}

// ─────────────────────────────────────────────────────────────────
// Page hosting
// ─────────────────────────────────────────────────────────────────

struct Hosted<P> {
    page: Arc<P>,
    viewers: usize,
    relay: JoinHandle<()>,
}

/// Mount point for one page
pub struct PageHost<P> {
    slot: Mutex<Option<Hosted<P>>>,
    broadcaster: WebSocketBroadcaster,
}

impl<P: ConsolePage> Default for PageHost<P> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            broadcaster: WebSocketBroadcaster::default(),
        }
    }
}

impl<P: ConsolePage> PageHost<P> {
    fn lock(&self) -> MutexGuard<'_, Option<Hosted<P>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a lease on the page, mounting it on first use
    pub fn acquire(
        &self,
        orchestrator: &Orchestrator,
        mount: impl FnOnce() -> Result<P, PollError>,
    ) -> Result<PageLease<'_, P>, PollError> {
        let mut slot = self.lock();
        if let Some(hosted) = slot.as_mut() {
            hosted.viewers += 1;
            return Ok(PageLease {
                host: self,
                page: hosted.page.clone(),
            });
        }

        let page = Arc::new(mount()?);
        let relay = tokio::spawn(relay_updates(
            Arc::downgrade(&page),
            orchestrator.changes(),
            self.broadcaster.clone(),
        ));
        info!(page = P::NAME, "🖥️ Page mounted");

        *slot = Some(Hosted {
            page: page.clone(),
            viewers: 1,
            relay,
        });
        Ok(PageLease { host: self, page })
    }

    fn release(&self) {
        let mut slot = self.lock();
        let last = match slot.as_mut() {
            Some(hosted) => {
                hosted.viewers = hosted.viewers.saturating_sub(1);
                hosted.viewers == 0
            }
            None => false,
        };
        if last {
            if let Some(hosted) = slot.take() {
                hosted.relay.abort();
                info!(page = P::NAME, "🖥️ Page unmounted");
            }
        }
    }

    /// The mounted page, if anyone is viewing it
    pub fn current(&self) -> Option<Arc<P>> {
        self.lock().as_ref().map(|hosted| hosted.page.clone())
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().is_some()
    }

    pub fn updates(&self) -> broadcast::Receiver<String> {
        self.broadcaster.subscribe()
    }
}

/// Keeps a page mounted while held
pub struct PageLease<'a, P: ConsolePage> {
    host: &'a PageHost<P>,
    page: Arc<P>,
}

impl<P: ConsolePage> PageLease<'_, P> {
    pub fn updates(&self) -> broadcast::Receiver<String> {
        self.host.updates()
    }
}

impl<P: ConsolePage> Deref for PageLease<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.page
    }
}

impl<P: ConsolePage> Drop for PageLease<'_, P> {
    fn drop(&mut self) {
        self.host.release();
    }
}

/// Re-render the page whenever one of its sources changes.
///
/// Holds the page weakly so unmounting drops its subscriptions at once.
async fn relay_updates<P: ConsolePage>(
    page: Weak<P>,
    mut changes: broadcast::Receiver<String>,
    broadcaster: WebSocketBroadcaster,
) {
    let Some(keys) = page.upgrade().map(|page| page.keys()) else {
        return;
    };
    let render = |broadcaster: &WebSocketBroadcaster| match page.upgrade() {
        Some(page) => {
            broadcaster.broadcast(&page.render());
            true
        }
        None => false,
    };

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        let alive = tokio::select! {
            changed = changes.recv() => match changed {
                Ok(key) if keys.contains(&key) => render(&broadcaster),
                Ok(_) => true,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(page = P::NAME, skipped, "Relay lagged, re-rendering");
                    render(&broadcaster)
                }
                Err(broadcast::error::RecvError::Closed) => false,
            },
            _ = heartbeat.tick() => {
                broadcaster.broadcast_heartbeat();
                true
            }
        };
        if !alive {
            break;
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Console state
// ─────────────────────────────────────────────────────────────────

/// Everything the console server shares between requests
pub struct ConsoleState {
    pub orchestrator: Orchestrator,
    pub stats: StatsClient,
    pub config: ConfigClient,
    pub history_options: HistoryOptions,
    controls: Mutex<DashboardControls>,
    pub dashboard: PageHost<DashboardPage>,
    pub history: PageHost<HistoryPage>,
    pub config_console: PageHost<ConfigConsolePage>,
}

impl ConsoleState {
    pub fn new(
        stats: StatsClient,
        config: ConfigClient,
        controls: DashboardControls,
        history_options: HistoryOptions,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(),
            stats,
            config,
            history_options,
            controls: Mutex::new(controls),
            dashboard: PageHost::default(),
            history: PageHost::default(),
            config_console: PageHost::default(),
        }
    }

    pub fn from_config(app: &AppConfig) -> anyhow::Result<Self> {
        let http = build_http_client(app.connect_timeout())?;
        let interval = app.poll_interval();
        let mode = if app.polling.start_manual {
            RefreshMode::Manual
        } else {
            RefreshMode::Auto
        };

        Ok(Self::new(
            StatsClient::new(http.clone(), app.stats_locator()),
            ConfigClient::new(http, app.config_locator()),
            DashboardControls {
                mode,
                metric: ValueMetric::Notional,
                interval,
            },
            HistoryOptions {
                snapshot_limit: app.polling.snapshot_limit,
                event_limit: app.polling.event_limit,
                interval,
            },
        ))
    }

    fn lock_controls(&self) -> MutexGuard<'_, DashboardControls> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn controls(&self) -> DashboardControls {
        *self.lock_controls()
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) -> DashboardControls {
        let controls = {
            let mut controls = self.lock_controls();
            controls.mode = mode;
            *controls
        };
        if let Some(page) = self.dashboard.current() {
            page.set_refresh_mode(mode);
        }
        controls
    }

    pub fn set_value_metric(&self, metric: ValueMetric) -> DashboardControls {
        let controls = {
            let mut controls = self.lock_controls();
            controls.metric = metric;
            *controls
        };
        if let Some(page) = self.dashboard.current() {
            page.set_value_metric(metric);
            self.dashboard.broadcaster.broadcast(&page.render());
        }
        controls
    }

    pub fn mount_dashboard(&self) -> Result<PageLease<'_, DashboardPage>, PollError> {
        let controls = self.controls();
        self.dashboard.acquire(&self.orchestrator, || {
            DashboardPage::mount(&self.orchestrator, &self.stats, controls)
        })
    }

    pub fn mount_history(&self) -> Result<PageLease<'_, HistoryPage>, PollError> {
        self.history.acquire(&self.orchestrator, || {
            HistoryPage::mount(&self.orchestrator, &self.stats, self.history_options)
        })
    }

    pub fn mount_config_console(&self) -> Result<PageLease<'_, ConfigConsolePage>, PollError> {
        self.config_console.acquire(&self.orchestrator, || {
            ConfigConsolePage::mount(&self.orchestrator, &self.config)
        })
    }

    /// Mount (or join) the dashboard and wait for its first data
    pub async fn open_dashboard(&self) -> Result<PageLease<'_, DashboardPage>, PollError> {
        let lease = self.mount_dashboard()?;
        lease.ready().await;
        Ok(lease)
    }

    pub async fn open_history(&self) -> Result<PageLease<'_, HistoryPage>, PollError> {
        let lease = self.mount_history()?;
        lease.ready().await;
        Ok(lease)
    }

    pub async fn open_config_console(
        &self,
    ) -> Result<PageLease<'_, ConfigConsolePage>, PollError> {
        let lease = self.mount_config_console()?;
        lease.ready().await;
        Ok(lease)
    }

    /// Open WebSocket connections across all pages
    pub fn ws_viewers(&self) -> usize {
        self.dashboard.broadcaster.receiver_count()
            + self.history.broadcaster.receiver_count()
            + self.config_console.broadcaster.receiver_count()
    }

    pub fn mounted_pages(&self) -> Vec<&'static str> {
        let mut pages = Vec::new();
        if self.dashboard.is_mounted() {
            pages.push(DashboardPage::NAME);
        }
        if self.history.is_mounted() {
            pages.push(HistoryPage::NAME);
        }
        if self.config_console.is_mounted() {
            pages.push(ConfigConsolePage::NAME);
        }
        pages
    }
}

/// Start the console server; returns after Ctrl-C
pub async fn start_server(state: Arc<ConsoleState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(state);

    info!("🖥️ Console starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind console server to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Console server error")?;

    info!("🛑 Console stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchError;
    use crate::polling::{DataSource, RefreshPolicy, Revalidation, Subscription};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticPage;

    impl ConsolePage for StaticPage {
        const NAME: &'static str = "static";

        fn keys(&self) -> Vec<String> {
            vec!["/static".to_string()]
        }

        fn render(&self) -> WsMessage {
            WsMessage::Heartbeat(0)
        }
    }

    #[derive(Default)]
    struct CounterSource {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DataSource<u32> for CounterSource {
        fn key(&self) -> String {
            "/counter".to_string()
        }

        fn name(&self) -> &'static str {
            "counter"
        }

        async fn fetch(&self) -> Result<u32, FetchError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) as u32 + 1)
        }
    }

    /// Renders the counter's latest value as the heartbeat payload
    struct CounterPage {
        counter: Subscription<u32>,
    }

    impl ConsolePage for CounterPage {
        const NAME: &'static str = "counter";

        fn keys(&self) -> Vec<String> {
            vec![self.counter.key().to_string()]
        }

        fn render(&self) -> WsMessage {
            WsMessage::Heartbeat(i64::from(self.counter.data().unwrap_or(0)))
        }
    }

    fn mount_counter(orchestrator: &Orchestrator) -> Result<CounterPage, PollError> {
        orchestrator
            .subscribe::<u32>(Arc::new(CounterSource::default()), RefreshPolicy::manual())
            .map(|counter| CounterPage { counter })
    }

    async fn next_counter_value(rx: &mut broadcast::Receiver<String>) -> i64 {
        let msg = rx.recv().await.expect("rendered page");
        let json: serde_json::Value = serde_json::from_str(&msg).expect("json");
        json["data"].as_i64().expect("counter value")
    }

    #[tokio::test]
    async fn source_change_pushes_a_render_until_released() {
        let orchestrator = Orchestrator::new();
        let host = PageHost::<CounterPage>::default();

        let lease = host
            .acquire(&orchestrator, || mount_counter(&orchestrator))
            .expect("mount");
        lease.counter.settled().await;

        let mut rx = lease.updates();
        assert_eq!(host.broadcaster.receiver_count(), 1);

        assert_eq!(lease.counter.refresh().await, Revalidation::Updated(2));
        let pushed = tokio::time::timeout(Duration::from_secs(1), async {
            while next_counter_value(&mut rx).await != 2 {}
        })
        .await;
        assert!(pushed.is_ok());

        drop(lease);
        assert!(!host.is_mounted());
        assert!(orchestrator.cached_keys().is_empty());
        while rx.try_recv().is_ok() {}

        // Same key again, but the released page no longer listens
        let other = orchestrator
            .subscribe::<u32>(Arc::new(CounterSource::default()), RefreshPolicy::manual())
            .expect("resubscribe");
        other.settled().await;
        other.refresh().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn page_is_mounted_once_and_released_with_last_lease() {
        let orchestrator = Orchestrator::new();
        let host = PageHost::<StaticPage>::default();
        let mounts = AtomicUsize::new(0);
        let mount = || {
            mounts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, PollError>(StaticPage)
        };

        let first = host.acquire(&orchestrator, mount).expect("mount");
        let second = host.acquire(&orchestrator, mount).expect("join");
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert!(host.is_mounted());

        drop(first);
        assert!(host.current().is_some());

        drop(second);
        assert!(!host.is_mounted());

        let _third = host.acquire(&orchestrator, mount).expect("remount");
        assert_eq!(mounts.load(Ordering::SeqCst), 2);
    }
}
