//! Connectivity monitor.
//!
//! Combines two sources of truth: the platform's reachability signal
//! (pushed in through [`ConnectivityMonitor::handle_event`]) and a periodic
//! liveness probe against the backend. A failing probe forces `offline`
//! even when the platform claims the link is up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::info::{ConnectionInfo, ConnectionStatus, LinkQuality};
use super::notify::Notifier;
use super::probe::LivenessProbe;
use super::target::SyncTarget;
use crate::config::MonitorConfig;

/// Reachability events reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlatformEvent {
    /// The platform regained a network link
    Reachable,
    /// The platform lost its network link
    Unreachable,
    /// Link metrics changed
    LinkChanged(LinkQuality),
}

type StatusCallback = Arc<dyn Fn(&ConnectionInfo) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, StatusCallback)>,
}

/// Handle returned by [`ConnectivityMonitor::on_status_change`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    /// Stop receiving status changes.
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Debug)]
struct State {
    platform_reachable: bool,
    probe_ok: bool,
    link: LinkQuality,
    status: ConnectionStatus,
    disposed: bool,
}

/// Observes network state and triggers a sync when connectivity returns.
pub struct ConnectivityMonitor {
    config: MonitorConfig,
    state: Mutex<State>,
    subscribers: Arc<Mutex<Subscribers>>,
    auto_sync: AtomicBool,
    watch_tx: watch::Sender<ConnectionInfo>,
    trigger_tx: mpsc::UnboundedSender<()>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    shutdown: CancellationToken,
    probe: Arc<dyn LivenessProbe>,
    target: Arc<dyn SyncTarget>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("config", &self.config)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor. The initial status is `online`.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        target: Arc<dyn SyncTarget>,
        probe: Arc<dyn LivenessProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let link = LinkQuality::default();
        let (watch_tx, _) = watch::channel(ConnectionInfo::new(ConnectionStatus::Online, &link));
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        Self {
            auto_sync: AtomicBool::new(config.auto_sync),
            config,
            state: Mutex::new(State {
                platform_reachable: true,
                probe_ok: true,
                link,
                status: ConnectionStatus::Online,
                disposed: false,
            }),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            watch_tx,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            shutdown: CancellationToken::new(),
            probe,
            target,
            notifier,
        }
    }

    /// Seed the initial status from the platform's reachability signal.
    #[must_use]
    pub fn with_platform_reachable(self, reachable: bool) -> Self {
        {
            let mut state = self.lock_state();
            state.platform_reachable = reachable;
            state.status = self.classify(&state);
            let info = ConnectionInfo::new(state.status, &state.link);
            self.watch_tx.send_replace(info);
        }
        self
    }

    /// Spawn the probe loop and the sync worker.
    ///
    /// Must be called from within a tokio runtime. Calling it again, or
    /// after [`dispose`](Self::dispose), does nothing.
    pub fn start(self: &Arc<Self>) {
        if self.lock_state().disposed {
            return;
        }
        let Some(triggers) = self
            .trigger_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::debug!("connectivity monitor already started");
            return;
        };

        tokio::spawn(Arc::clone(self).sync_worker(triggers));
        tokio::spawn(Arc::clone(self).probe_loop());

        tracing::info!(
            interval_secs = self.config.probe_interval_secs,
            auto_sync = self.auto_sync_enabled(),
            "connectivity monitor started"
        );
    }

    /// Stop background work and drop every subscriber. Idempotent.
    pub fn dispose(&self) {
        {
            let mut state = self.lock_state();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }

        self.shutdown.cancel();
        self.lock_subscribers().entries.clear();
        tracing::info!("connectivity monitor disposed");
    }

    /// Alias for [`dispose`](Self::dispose).
    pub fn stop(&self) {
        self.dispose();
    }

    /// Whether the monitor has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock_state().disposed
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.lock_state().status
    }

    /// Current status with the last known link metrics.
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        let state = self.lock_state();
        ConnectionInfo::new(state.status, &state.link)
    }

    /// Whether the status is `online`.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status() == ConnectionStatus::Online
    }

    /// Whether the status is `offline`.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.status() == ConnectionStatus::Offline
    }

    /// Whether the link is up but classified as slow.
    #[must_use]
    pub fn is_slow(&self) -> bool {
        self.status() == ConnectionStatus::Slow
    }

    /// Online or slow: a request is worth attempting.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.status().is_reachable()
    }

    /// Enable or disable sync-on-restore.
    pub fn set_auto_sync(&self, enabled: bool) {
        self.auto_sync.store(enabled, Ordering::SeqCst);
    }

    /// Whether returning connectivity triggers a sync.
    #[must_use]
    pub fn auto_sync_enabled(&self) -> bool {
        self.auto_sync.load(Ordering::SeqCst)
    }

    /// Call `callback` now with the current info and on every status change.
    ///
    /// Callbacks run on the thread that caused the change and must not
    /// block.
    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionInfo) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);

        let (id, info) = {
            let state = self.lock_state();
            let mut subscribers = self.lock_subscribers();
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            if !state.disposed {
                subscribers.entries.push((id, Arc::clone(&callback)));
            }
            (id, ConnectionInfo::new(state.status, &state.link))
        };

        callback(&info);

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Channel carrying the latest connection info.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionInfo> {
        self.watch_tx.subscribe()
    }

    /// Apply a platform event. Ignored once disposed.
    pub fn handle_event(&self, event: PlatformEvent) -> ConnectionStatus {
        tracing::debug!(?event, "platform connectivity event");

        match event {
            PlatformEvent::Reachable => self.update(|state| {
                state.platform_reachable = true;
                // A fresh link gets the benefit of the doubt until the next probe
                state.probe_ok = true;
            }),
            PlatformEvent::Unreachable => self.update(|state| state.platform_reachable = false),
            PlatformEvent::LinkChanged(link) => self.update(|state| state.link = link),
        }
    }

    /// Run the liveness probe now.
    ///
    /// Skipped while the platform reports no link.
    pub async fn check_now(&self) -> ConnectionStatus {
        {
            let state = self.lock_state();
            if state.disposed || !state.platform_reachable {
                return state.status;
            }
        }

        let alive = self.probe.probe().await;
        if !alive {
            tracing::debug!("liveness probe failed");
        }
        self.update(|state| state.probe_ok = alive)
    }

    fn classify(&self, state: &State) -> ConnectionStatus {
        if !state.platform_reachable || !state.probe_ok {
            return ConnectionStatus::Offline;
        }
        match state.link.effective_type {
            Some(effective) if effective <= self.config.slow_threshold => ConnectionStatus::Slow,
            _ => ConnectionStatus::Online,
        }
    }

    fn update(&self, mutate: impl FnOnce(&mut State)) -> ConnectionStatus {
        let (previous, info, callbacks) = {
            let mut state = self.lock_state();
            if state.disposed {
                return state.status;
            }

            mutate(&mut state);
            let previous = state.status;
            state.status = self.classify(&state);
            let info = ConnectionInfo::new(state.status, &state.link);

            self.watch_tx.send_if_modified(|current| {
                if *current == info {
                    false
                } else {
                    *current = info;
                    true
                }
            });

            if previous == state.status {
                return state.status;
            }

            let callbacks: Vec<StatusCallback> = self
                .lock_subscribers()
                .entries
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            (previous, info, callbacks)
        };

        tracing::info!(from = %previous, to = %info.status, "connectivity changed");

        for callback in callbacks {
            callback(&info);
        }

        // Only the edge into online triggers, never steady-state ticks
        if info.status == ConnectionStatus::Online
            && previous != ConnectionStatus::Online
            && self.auto_sync_enabled()
            && self.trigger_tx.send(()).is_err()
        {
            tracing::debug!("sync worker gone; trigger dropped");
        }

        info.status
    }

    async fn sync_worker(self: Arc<Self>, mut triggers: mpsc::UnboundedReceiver<()>) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                trigger = triggers.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                    // Collapse bursts into one pass
                    while triggers.try_recv().is_ok() {}
                    self.run_sync().await;
                }
            }
        }
        tracing::debug!("sync worker stopped");
    }

    async fn probe_loop(self: Arc<Self>) {
        let period = self.config.probe_interval().max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_now().await;
                }
            }
        }
        tracing::debug!("probe loop stopped");
    }

    async fn run_sync(&self) {
        let count = match self.target.pending_count() {
            Ok(0) => {
                tracing::debug!("queue empty; skipping sync");
                return;
            }
            Ok(count) => count,
            Err(e) => {
                self.notifier.sync_failed(&e.to_string());
                return;
            }
        };

        self.notifier.sync_started(count);

        match self.target.sync().await {
            // Folded into a pass that is already running; it reports itself
            Ok(report) if report.coalesced => {}
            Ok(report) => self.notifier.sync_completed(report.succeeded, report.failed),
            Err(e) => self.notifier.sync_failed(&e.to_string()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize};

    use async_trait::async_trait;
    use mockall::predicate::eq;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::ResyncError;
    use crate::features::connectivity::info::EffectiveType;
    use crate::features::connectivity::notify::{LogNotifier, MockNotifier};
    use crate::features::queue::SyncReport;

    struct ScriptedProbe {
        alive: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(alive: bool) -> Arc<Self> {
            Arc::new(Self {
                alive: AtomicBool::new(alive),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.alive.load(Ordering::SeqCst)
        }
    }

    struct CountingTarget {
        pending: AtomicU64,
        syncs: AtomicUsize,
        fail: bool,
        synced: Notify,
    }

    impl CountingTarget {
        fn new(pending: u64) -> Arc<Self> {
            Arc::new(Self {
                pending: AtomicU64::new(pending),
                syncs: AtomicUsize::new(0),
                fail: false,
                synced: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl SyncTarget for CountingTarget {
        fn pending_count(&self) -> Result<u64, ResyncError> {
            Ok(self.pending.load(Ordering::SeqCst))
        }

        async fn sync(&self) -> Result<SyncReport, ResyncError> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            self.synced.notify_one();
            if self.fail {
                return Err(ResyncError::Config("disk full".to_string()));
            }
            Ok(SyncReport {
                succeeded: 1,
                failed: 1,
                ..SyncReport::default()
            })
        }
    }

    fn monitor_with(
        target: Arc<CountingTarget>,
        probe: Arc<ScriptedProbe>,
        notifier: Arc<dyn Notifier>,
    ) -> ConnectivityMonitor {
        ConnectivityMonitor::new(MonitorConfig::default(), target, probe, notifier)
    }

    fn default_monitor() -> ConnectivityMonitor {
        monitor_with(
            CountingTarget::new(0),
            ScriptedProbe::new(true),
            Arc::new(LogNotifier),
        )
    }

    #[test]
    fn test_initial_status() {
        assert!(default_monitor().is_online());

        let seeded = default_monitor().with_platform_reachable(false);
        assert!(seeded.is_offline());
        assert_eq!(seeded.watch().borrow().status, ConnectionStatus::Offline);
    }

    #[test]
    fn test_subscribe_fires_immediately() {
        let monitor = default_monitor().with_platform_reachable(false);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _sub = monitor.on_status_change(move |info| sink.lock().unwrap().push(info.status));

        // Before any transition
        assert_eq!(*seen.lock().unwrap(), vec![ConnectionStatus::Offline]);

        monitor.handle_event(PlatformEvent::Reachable);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectionStatus::Offline, ConnectionStatus::Online]
        );
    }

    #[test]
    fn test_unsubscribe_stops_callbacks() {
        let monitor = default_monitor();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let sub = monitor.on_status_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();

        monitor.handle_event(PlatformEvent::Unreachable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_events_do_not_notify() {
        let monitor = default_monitor();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = monitor.on_status_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.handle_event(PlatformEvent::Reachable);
        monitor.handle_event(PlatformEvent::Reachable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_link_classification() {
        let monitor = default_monitor();

        let slow = LinkQuality {
            effective_type: Some(EffectiveType::TwoG),
            downlink: Some(0.2),
            rtt: Some(1800),
            save_data: false,
        };
        assert_eq!(monitor.handle_event(PlatformEvent::LinkChanged(slow)), ConnectionStatus::Slow);
        assert!(monitor.is_slow());
        assert!(monitor.is_reachable());
        assert_eq!(monitor.connection_info().rtt, Some(1800));

        let fast = LinkQuality {
            effective_type: Some(EffectiveType::FourG),
            ..LinkQuality::default()
        };
        assert_eq!(monitor.handle_event(PlatformEvent::LinkChanged(fast)), ConnectionStatus::Online);

        // A slow link without a platform link is still offline
        monitor.handle_event(PlatformEvent::Unreachable);
        monitor.handle_event(PlatformEvent::LinkChanged(slow));
        assert!(monitor.is_offline());
    }

    #[tokio::test]
    async fn test_failed_probe_forces_offline() {
        let probe = ScriptedProbe::new(false);
        let monitor = monitor_with(CountingTarget::new(0), Arc::clone(&probe), Arc::new(LogNotifier));

        // Platform says reachable, the probe disagrees
        assert_eq!(monitor.check_now().await, ConnectionStatus::Offline);

        probe.alive.store(true, Ordering::SeqCst);
        assert_eq!(monitor.check_now().await, ConnectionStatus::Online);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_probe_skipped_without_platform_link() {
        let probe = ScriptedProbe::new(true);
        let monitor = monitor_with(CountingTarget::new(0), Arc::clone(&probe), Arc::new(LogNotifier))
            .with_platform_reachable(false);

        assert_eq!(monitor.check_now().await, ConnectionStatus::Offline);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_triggers_exactly_one_sync() {
        let target = CountingTarget::new(3);
        let monitor = Arc::new(
            monitor_with(Arc::clone(&target), ScriptedProbe::new(true), Arc::new(LogNotifier))
                .with_platform_reachable(false),
        );
        monitor.start();

        monitor.handle_event(PlatformEvent::Reachable);
        monitor.handle_event(PlatformEvent::Reachable);

        tokio::time::timeout(Duration::from_secs(5), target.synced.notified())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.syncs.load(Ordering::SeqCst), 1);

        monitor.dispose();
    }

    #[tokio::test]
    async fn test_entering_slow_does_not_sync() {
        let target = CountingTarget::new(3);
        let monitor = Arc::new(
            monitor_with(Arc::clone(&target), ScriptedProbe::new(true), Arc::new(LogNotifier))
                .with_platform_reachable(false),
        );
        monitor.start();

        monitor.handle_event(PlatformEvent::LinkChanged(LinkQuality {
            effective_type: Some(EffectiveType::Slow2g),
            ..LinkQuality::default()
        }));
        monitor.handle_event(PlatformEvent::Reachable);
        assert!(monitor.is_slow());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.syncs.load(Ordering::SeqCst), 0);

        monitor.dispose();
    }

    #[tokio::test]
    async fn test_auto_sync_disabled() {
        let target = CountingTarget::new(3);
        let monitor = Arc::new(
            monitor_with(Arc::clone(&target), ScriptedProbe::new(true), Arc::new(LogNotifier))
                .with_platform_reachable(false),
        );
        monitor.set_auto_sync(false);
        assert!(!monitor.auto_sync_enabled());
        monitor.start();

        monitor.handle_event(PlatformEvent::Reachable);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.syncs.load(Ordering::SeqCst), 0);

        monitor.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_loop_restores_online() {
        let probe = ScriptedProbe::new(false);
        let target = CountingTarget::new(1);
        let monitor = Arc::new(monitor_with(
            Arc::clone(&target),
            Arc::clone(&probe),
            Arc::new(LogNotifier),
        ));
        monitor.start();

        // First tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitor.is_offline());

        probe.alive.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(monitor.is_online());
        assert!(probe.calls.load(Ordering::SeqCst) >= 2);

        tokio::time::timeout(Duration::from_secs(5), target.synced.notified())
            .await
            .unwrap();
        assert_eq!(target.syncs.load(Ordering::SeqCst), 1);

        monitor.dispose();
    }

    #[test]
    fn test_dispose_is_idempotent_and_final() {
        let monitor = default_monitor();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = monitor.on_status_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.dispose();
        monitor.dispose();
        assert!(monitor.is_disposed());

        // No more transitions and no more callbacks
        assert_eq!(
            monitor.handle_event(PlatformEvent::Unreachable),
            ConnectionStatus::Online
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_sync_notifies() {
        let mut notifier = MockNotifier::new();
        notifier.expect_sync_started().with(eq(2u64)).times(1).return_const(());
        notifier.expect_sync_completed().with(eq(1usize), eq(1usize)).times(1).return_const(());
        notifier.expect_sync_failed().never();

        let monitor = monitor_with(CountingTarget::new(2), ScriptedProbe::new(true), Arc::new(notifier));
        monitor.run_sync().await;
    }

    #[tokio::test]
    async fn test_run_sync_skips_empty_queue() {
        let mut notifier = MockNotifier::new();
        notifier.expect_sync_started().never();
        notifier.expect_sync_completed().never();
        notifier.expect_sync_failed().never();

        let target = CountingTarget::new(0);
        let monitor = monitor_with(Arc::clone(&target), ScriptedProbe::new(true), Arc::new(notifier));
        monitor.run_sync().await;
        assert_eq!(target.syncs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_sync_reports_failure() {
        let mut notifier = MockNotifier::new();
        notifier.expect_sync_started().times(1).return_const(());
        notifier.expect_sync_completed().never();
        notifier
            .expect_sync_failed()
            .withf(|message| message.contains("disk full"))
            .times(1)
            .return_const(());

        let target = Arc::new(CountingTarget {
            pending: AtomicU64::new(1),
            syncs: AtomicUsize::new(0),
            fail: true,
            synced: Notify::new(),
        });
        let monitor = monitor_with(target, ScriptedProbe::new(true), Arc::new(notifier));
        monitor.run_sync().await;
    }
}
