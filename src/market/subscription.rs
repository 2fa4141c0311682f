//! Subscription Manager
//!
//! Tracks the watchlist and the one active (symbol, interval). Only the
//! active pair holds a live listener and a refresh timer; background
//! entries keep their last buffer so switching back shows data at once
//! while the reload runs.
//!
//! All state is mutated from a single task. Snapshot fetches and refresh
//! ticks run as spawned tasks that report back through the feed queue.

use crate::api::snapshot::{Snapshot, SnapshotSource};
use crate::api::websocket::{ChannelEvent, ChannelMessage, ListenerId, ListenerRegistry};
use crate::config::MarketConfig;
use crate::data::{Interval, SeriesKey};
use crate::error::FetchError;
use crate::market::reconciler::{LiveOutcome, LoadOutcome, Reconciler};
use crate::storage::session::{ActivePair, SessionState, SessionStore};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum FeedEvent {
    SnapshotLoaded {
        key: SeriesKey,
        generation: u64,
        result: Result<Snapshot, FetchError>,
    },
    RefreshDue {
        key: SeriesKey,
    },
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub default_interval: Interval,
    pub max_watchlist: usize,
    pub max_refresh: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&MarketConfig::default())
    }
}

impl From<&MarketConfig> for ManagerSettings {
    fn from(config: &MarketConfig) -> Self {
        Self {
            default_interval: config.default_interval,
            max_watchlist: config.max_watchlist.max(1),
            max_refresh: config.max_refresh(),
        }
    }
}

pub struct WatchEntry {
    reconciler: Reconciler,
    listener: Option<ListenerId>,
    load_task: Option<JoinHandle<()>>,
}

impl WatchEntry {
    fn new(key: SeriesKey) -> Self {
        Self {
            reconciler: Reconciler::new(key),
            listener: None,
            load_task: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.reconciler.key().symbol
    }

    pub fn interval(&self) -> Interval {
        self.reconciler.key().interval
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn retire(&mut self, registry: &ListenerRegistry) {
        if let Some(id) = self.listener.take() {
            registry.unregister(id);
        }
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
    }
}

enum Incoming {
    Channel(ChannelMessage),
    Feed(FeedEvent),
}

pub struct SubscriptionManager {
    source: Arc<dyn SnapshotSource>,
    registry: ListenerRegistry,
    settings: ManagerSettings,
    channel_tx: mpsc::UnboundedSender<ChannelMessage>,
    channel_rx: mpsc::UnboundedReceiver<ChannelMessage>,
    feed_tx: mpsc::UnboundedSender<FeedEvent>,
    feed_rx: mpsc::UnboundedReceiver<FeedEvent>,
    /// Insertion order, one entry per symbol
    entries: Vec<WatchEntry>,
    active: Option<String>,
    refresh_task: Option<JoinHandle<()>>,
    auto_refresh: bool,
    /// Set by a disconnect; the next connect re-fetches the active pair.
    resync_on_connect: bool,
    store: Option<Box<dyn SessionStore>>,
    notices: VecDeque<String>,
}

impl SubscriptionManager {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        registry: ListenerRegistry,
        settings: ManagerSettings,
    ) -> Self {
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        Self {
            source,
            registry,
            settings,
            channel_tx,
            channel_rx,
            feed_tx,
            feed_rx,
            entries: Vec::new(),
            active: None,
            refresh_task: None,
            auto_refresh: true,
            resync_on_connect: false,
            store: None,
            notices: VecDeque::new(),
        }
    }

    pub fn with_store(mut self, store: Box<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn symbols(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.symbol().to_string()).collect()
    }

    pub fn active_symbol(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_entry(&self) -> Option<&WatchEntry> {
        let symbol = self.active.as_deref()?;
        self.entries.iter().find(|e| e.symbol() == symbol)
    }

    pub fn active_key(&self) -> Option<SeriesKey> {
        self.active_entry().map(|e| e.reconciler.key().clone())
    }

    /// Interval new watchlist entries start with.
    pub fn current_interval(&self) -> Interval {
        self.active_entry()
            .map(|e| e.interval())
            .unwrap_or(self.settings.default_interval)
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        self.notices.drain(..).collect()
    }

    fn position(&self, symbol: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.symbol() == symbol)
    }

    fn active_index(&self) -> Option<usize> {
        self.position(self.active.as_deref()?)
    }

    /// Makes (symbol, interval) the displayed pair. Returns false when it
    /// already is.
    pub fn select(&mut self, symbol: &str, interval: Interval) -> bool {
        let symbol = normalize(symbol);
        if symbol.is_empty() {
            return false;
        }
        let key = SeriesKey::new(&symbol, interval);
        if self.active_key().as_ref() == Some(&key) {
            return false;
        }

        self.deactivate();

        let idx = match self.position(&symbol) {
            Some(idx) => idx,
            None => self.insert_entry(&symbol, interval),
        };

        let entry = &mut self.entries[idx];
        if entry.interval() != interval {
            entry.retire(&self.registry);
            entry.reconciler = Reconciler::new(key.clone());
        }
        entry.listener = Some(self.registry.register(key.clone(), self.channel_tx.clone()));
        self.active = Some(symbol);

        self.start_load(idx);
        if self.auto_refresh {
            self.start_refresh_timer(key.clone());
        }
        self.persist();

        info!("Active series is now {}", key);
        true
    }

    pub fn set_interval(&mut self, interval: Interval) -> bool {
        match self.active.clone() {
            Some(symbol) => self.select(&symbol, interval),
            None => false,
        }
    }

    /// Adds a background entry. Returns false for a symbol already tracked.
    pub fn add_to_watchlist(&mut self, symbol: &str) -> bool {
        let symbol = normalize(symbol);
        if symbol.is_empty() || self.position(&symbol).is_some() {
            return false;
        }
        let interval = self.current_interval();
        self.insert_entry(&symbol, interval);
        self.persist();
        info!("Added {} to watchlist", symbol);
        true
    }

    pub fn remove_from_watchlist(&mut self, symbol: &str) -> bool {
        let symbol = normalize(symbol);
        let Some(idx) = self.position(&symbol) else {
            return false;
        };

        if self.active.as_deref() == Some(symbol.as_str()) {
            self.deactivate();
        }
        let mut entry = self.entries.remove(idx);
        entry.retire(&self.registry);
        self.persist();
        info!("Removed {} from watchlist", symbol);
        true
    }

    /// Re-fetches the active pair now.
    pub fn refresh(&mut self) -> bool {
        match self.active_index() {
            Some(idx) => {
                self.start_load(idx);
                true
            }
            None => false,
        }
    }

    /// Returns the new setting.
    pub fn toggle_auto_refresh(&mut self) -> bool {
        self.auto_refresh = !self.auto_refresh;
        if self.auto_refresh {
            if let Some(key) = self.active_key() {
                self.start_refresh_timer(key);
            }
        } else {
            self.stop_refresh_timer();
        }
        info!("Auto-refresh {}", if self.auto_refresh { "on" } else { "off" });
        self.auto_refresh
    }

    /// Restores the saved session, or tracks `fallback` and selects its
    /// first symbol when there is none.
    pub fn restore(&mut self, fallback: &[String]) {
        let saved = match self.store.as_ref().map(|s| s.load()) {
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                warn!("Ignoring unreadable session: {:#}", e);
                None
            }
            None => None,
        };

        match saved {
            Some(state) => {
                for symbol in &state.watchlist {
                    self.add_to_watchlist(symbol);
                }
                if let Some(active) = state.active {
                    self.select(&active.symbol, active.interval);
                }
            }
            None => {
                for symbol in fallback {
                    self.add_to_watchlist(symbol);
                }
                if let Some(first) = fallback.first() {
                    let interval = self.settings.default_interval;
                    self.select(first, interval);
                }
            }
        }
    }

    pub fn handle_channel(&mut self, msg: ChannelMessage) {
        let Some(idx) = self
            .entries
            .iter()
            .position(|e| e.listener == Some(msg.listener))
        else {
            debug!("Message for retired listener {}", msg.listener);
            return;
        };

        match msg.event {
            ChannelEvent::Connected => {
                if std::mem::take(&mut self.resync_on_connect) {
                    info!(
                        "Feed reconnected, refreshing {}",
                        self.entries[idx].reconciler.key()
                    );
                    self.start_load(idx);
                }
            }
            ChannelEvent::Disconnected => {
                warn!("Feed lost, live updates paused");
                self.resync_on_connect = true;
            }
            ChannelEvent::CandleUpdate(update) => {
                let entry = &mut self.entries[idx];
                if let LiveOutcome::Rejected(e) = entry.reconciler.apply_live(&update) {
                    self.notices
                        .push_back(format!("{}: {}", entry.reconciler.key(), e));
                }
            }
        }
    }

    pub fn handle_feed(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::SnapshotLoaded {
                key,
                generation,
                result,
            } => {
                let Some(entry) = self.entries.iter_mut().find(|e| e.reconciler.key() == &key)
                else {
                    debug!("Snapshot for untracked series {}", key);
                    return;
                };
                if generation == entry.reconciler.generation() {
                    entry.load_task = None;
                }
                if let LoadOutcome::Failed(failure) = entry.reconciler.complete_load(generation, result)
                {
                    self.notices.push_back(format!("{}: {}", key, failure));
                }
            }
            FeedEvent::RefreshDue { key } => {
                let Some(idx) = self.active_index() else {
                    return;
                };
                if self.entries[idx].reconciler.key() != &key {
                    return;
                }
                if self.entries[idx].reconciler.is_loading() {
                    debug!("{} refresh skipped, load still in flight", key);
                    return;
                }
                self.start_load(idx);
            }
        }
    }

    /// Handles everything already queued without waiting. Returns the
    /// number of messages processed.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let before = handled;
            while let Ok(msg) = self.channel_rx.try_recv() {
                self.handle_channel(msg);
                handled += 1;
            }
            while let Ok(event) = self.feed_rx.try_recv() {
                self.handle_feed(event);
                handled += 1;
            }
            if handled == before {
                return handled;
            }
        }
    }

    /// Waits for the next message and handles it.
    pub async fn step(&mut self) {
        let incoming = tokio::select! {
            Some(msg) = self.channel_rx.recv() => Incoming::Channel(msg),
            Some(event) = self.feed_rx.recv() => Incoming::Feed(event),
            else => return,
        };
        match incoming {
            Incoming::Channel(msg) => self.handle_channel(msg),
            Incoming::Feed(event) => self.handle_feed(event),
        }
    }

    fn insert_entry(&mut self, symbol: &str, interval: Interval) -> usize {
        while self.entries.len() >= self.settings.max_watchlist {
            let active = self.active.as_deref();
            let Some(victim) = self.entries.iter().position(|e| Some(e.symbol()) != active) else {
                break;
            };
            let mut evicted = self.entries.remove(victim);
            evicted.retire(&self.registry);
            info!("Watchlist full, dropped {}", evicted.symbol());
        }
        self.entries
            .push(WatchEntry::new(SeriesKey::new(symbol, interval)));
        self.entries.len() - 1
    }

    fn deactivate(&mut self) {
        self.stop_refresh_timer();
        let Some(symbol) = self.active.take() else {
            return;
        };
        if let Some(entry) = self.entries.iter_mut().find(|e| e.symbol() == symbol) {
            if let Some(id) = entry.listener.take() {
                self.registry.unregister(id);
            }
        }
    }

    fn start_load(&mut self, idx: usize) {
        let entry = &mut self.entries[idx];
        if let Some(task) = entry.load_task.take() {
            task.abort();
        }

        let generation = entry.reconciler.begin_load();
        let key = entry.reconciler.key().clone();
        let limit = key.interval.candle_limit();
        let source = Arc::clone(&self.source);
        let tx = self.feed_tx.clone();

        entry.load_task = Some(tokio::spawn(async move {
            let result = source.fetch_snapshot(&key.symbol, key.interval, limit).await;
            let _ = tx.send(FeedEvent::SnapshotLoaded {
                key,
                generation,
                result,
            });
        }));
    }

    fn start_refresh_timer(&mut self, key: SeriesKey) {
        self.stop_refresh_timer();
        let period = key.interval.refresh_period(self.settings.max_refresh);
        let tx = self.feed_tx.clone();
        debug!("{} refreshing every {:?}", key, period);

        self.refresh_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(FeedEvent::RefreshDue { key: key.clone() }).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_refresh_timer(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }

    fn persist(&mut self) {
        let state = SessionState {
            watchlist: self.symbols(),
            active: self.active_key().map(|key| ActivePair {
                symbol: key.symbol,
                interval: key.interval,
            }),
        };
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save(&state) {
                warn!("Failed to save session: {:#}", e);
            }
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.stop_refresh_timer();
        for entry in &mut self.entries {
            entry.retire(&self.registry);
        }
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::CandleUpdate;
    use crate::data::candles::tests::candle_at;
    use crate::data::{Candle, Summary};
    use crate::market::reconciler::Phase;
    use crate::storage::session::JsonFileStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        scripted: Mutex<HashMap<SeriesKey, VecDeque<Result<Snapshot, FetchError>>>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn push(&self, key: SeriesKey, result: Result<Snapshot, FetchError>) {
            self.scripted
                .lock()
                .unwrap()
                .entry(key)
                .or_default()
                .push_back(result);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for FakeSource {
        async fn fetch_snapshot(
            &self,
            symbol: &str,
            interval: Interval,
            _limit: usize,
        ) -> Result<Snapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.scripted
                .lock()
                .unwrap()
                .get_mut(&SeriesKey::new(symbol, interval))
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Err(FetchError::NotFound(symbol.to_string())))
        }
    }

    fn candle(symbol: &str, interval: Interval, n: i64, close: Decimal) -> Candle {
        let mut candle = candle_at(symbol, n, close, close);
        let width = ChronoDuration::seconds(interval.duration().as_secs() as i64);
        candle.interval = interval;
        candle.open_time = crate::data::candles::tests::base_time() + width * n as i32;
        candle.close_time = candle.open_time + width;
        candle
    }

    fn snapshot(symbol: &str, interval: Interval, closes: &[Decimal]) -> Snapshot {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, close)| candle(symbol, interval, i as i64, *close))
            .collect();
        let summary = Summary::from_candles(&candles).unwrap_or_default();
        Snapshot { candles, summary }
    }

    fn live(symbol: &str, interval: Interval, n: i64, close: Decimal) -> ChannelEvent {
        ChannelEvent::CandleUpdate(CandleUpdate {
            symbol: symbol.to_string(),
            candle: candle(symbol, interval, n, close),
        })
    }

    fn manager(source: &Arc<FakeSource>, registry: &ListenerRegistry) -> SubscriptionManager {
        SubscriptionManager::new(
            Arc::clone(source) as Arc<dyn SnapshotSource>,
            registry.clone(),
            ManagerSettings {
                default_interval: Interval::OneMinute,
                max_watchlist: 3,
                max_refresh: Duration::from_secs(3600),
            },
        )
    }

    fn active_closes(manager: &SubscriptionManager) -> Vec<Decimal> {
        manager
            .active_entry()
            .map(|e| e.reconciler().candles().iter().map(|c| c.close).collect())
            .unwrap_or_default()
    }

    const M1: Interval = Interval::OneMinute;
    const M5: Interval = Interval::FiveMinutes;

    #[tokio::test]
    async fn test_snapshot_then_live_update() {
        let source = Arc::new(FakeSource::default());
        source.push(SeriesKey::new("PETR4", M1), Ok(snapshot("PETR4", M1, &[dec!(10), dec!(12)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        assert!(manager.select("petr4", M1));
        manager.step().await;
        assert_eq!(manager.active_entry().unwrap().reconciler().phase(), Phase::Ready);

        registry.dispatch(&live("PETR4", M1, 2, dec!(13)));
        manager.drain();

        assert_eq!(active_closes(&manager), vec![dec!(10), dec!(12), dec!(13)]);
        let summary = manager.active_entry().unwrap().reconciler().summary().unwrap();
        assert_eq!(summary.current_price, dec!(13));
    }

    #[tokio::test]
    async fn test_other_interval_update_is_ignored() {
        let source = Arc::new(FakeSource::default());
        source.push(SeriesKey::new("PETR4", M1), Ok(snapshot("PETR4", M1, &[dec!(10), dec!(12)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        manager.step().await;
        registry.dispatch(&live("PETR4", M5, 1, dec!(99)));
        manager.drain();

        assert_eq!(active_closes(&manager), vec![dec!(10), dec!(12)]);
    }

    #[tokio::test]
    async fn test_updates_before_snapshot_are_replayed() {
        let source = Arc::new(FakeSource::default());
        source.push(SeriesKey::new("PETR4", M1), Ok(snapshot("PETR4", M1, &[dec!(10), dec!(12)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        registry.dispatch(&live("PETR4", M1, 2, dec!(13)));
        assert_eq!(manager.drain(), 1);
        assert_eq!(manager.active_entry().unwrap().reconciler().pending_len(), 1);

        manager.step().await;
        assert_eq!(active_closes(&manager), vec![dec!(10), dec!(12), dec!(13)]);
    }

    #[tokio::test]
    async fn test_switching_pair_retires_old_listener() {
        let source = Arc::new(FakeSource::default());
        source.push(SeriesKey::new("PETR4", M1), Ok(snapshot("PETR4", M1, &[dec!(10)])));
        source.push(SeriesKey::new("VALE3", M1), Ok(snapshot("VALE3", M1, &[dec!(60)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        manager.step().await;
        manager.select("VALE3", M1);
        manager.step().await;

        assert_eq!(registry.len(), 1);
        registry.dispatch(&live("PETR4", M1, 1, dec!(11)));
        manager.drain();

        let petr = &manager.entries()[0];
        assert_eq!(petr.symbol(), "PETR4");
        assert_eq!(petr.reconciler().candles().len(), 1);
        assert_eq!(active_closes(&manager), vec![dec!(60)]);
    }

    #[tokio::test]
    async fn test_interval_switch_discards_old_snapshot() {
        let source = Arc::new(FakeSource::default());
        source.push(SeriesKey::new("PETR4", M1), Ok(snapshot("PETR4", M1, &[dec!(1)])));
        source.push(SeriesKey::new("PETR4", M5), Ok(snapshot("PETR4", M5, &[dec!(5), dec!(6)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        assert!(manager.set_interval(M5));
        manager.step().await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
            manager.drain();
        }

        assert_eq!(manager.active_key(), Some(SeriesKey::new("PETR4", M5)));
        assert_eq!(active_closes(&manager), vec![dec!(5), dec!(6)]);
        assert!(manager
            .active_entry()
            .unwrap()
            .reconciler()
            .candles()
            .iter()
            .all(|c| c.interval == M5));
    }

    #[tokio::test]
    async fn test_interval_round_trip_keeps_fresh_snapshot() {
        let source = Arc::new(FakeSource::default());
        let key = SeriesKey::new("PETR4", M1);
        source.push(key.clone(), Ok(snapshot("PETR4", M1, &[dec!(1)])));
        source.push(key.clone(), Ok(snapshot("PETR4", M1, &[dec!(2)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        // First 1m result is queued but not yet handled
        manager.select("PETR4", M1);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.calls(), 1);

        manager.set_interval(M5);
        manager.set_interval(M1);
        for _ in 0..5 {
            tokio::task::yield_now().await;
            manager.drain();
        }

        // The 5m load is aborted before it ever runs
        assert_eq!(source.calls(), 2);
        assert_eq!(active_closes(&manager), vec![dec!(2)]);
        assert!(!manager.active_entry().unwrap().reconciler().is_loading());
    }

    #[tokio::test]
    async fn test_reconnect_refetches_active_pair() {
        let source = Arc::new(FakeSource::default());
        let key = SeriesKey::new("PETR4", M1);
        source.push(key.clone(), Ok(snapshot("PETR4", M1, &[dec!(10), dec!(12)])));
        let fresh = snapshot("PETR4", M1, &[dec!(20), dec!(21), dec!(22)]);
        source.push(key.clone(), Ok(fresh.clone()));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        manager.step().await;

        registry.dispatch(&ChannelEvent::Connected);
        manager.drain();
        assert_eq!(source.calls(), 1);

        registry.dispatch(&ChannelEvent::Disconnected);
        registry.dispatch(&ChannelEvent::Connected);
        manager.drain();
        manager.step().await;

        assert_eq!(source.calls(), 2);
        assert_eq!(
            manager.active_entry().unwrap().reconciler().candles(),
            fresh.candles.as_slice()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_is_retried_by_timer() {
        let source = Arc::new(FakeSource::default());
        let key = SeriesKey::new("PETR4", M1);
        source.push(key.clone(), Err(FetchError::Network("connection refused".into())));
        source.push(key.clone(), Ok(snapshot("PETR4", M1, &[dec!(10)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        manager.step().await;
        assert_eq!(manager.active_entry().unwrap().reconciler().phase(), Phase::Loading);
        assert_eq!(manager.take_notices(), vec!["PETR4/1m: Network: connection refused"]);

        // Refresh tick, then the snapshot it triggered
        manager.step().await;
        manager.step().await;
        assert_eq!(manager.active_entry().unwrap().reconciler().phase(), Phase::Ready);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_can_be_disabled() {
        let source = Arc::new(FakeSource::default());
        source.push(SeriesKey::new("PETR4", M1), Ok(snapshot("PETR4", M1, &[dec!(10)])));
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        manager.step().await;
        assert!(!manager.toggle_auto_refresh());

        let waited = tokio::time::timeout(Duration::from_secs(600), manager.step()).await;
        assert!(waited.is_err());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_watchlist_is_bounded_and_unique() {
        let source = Arc::new(FakeSource::default());
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        assert!(manager.add_to_watchlist("VALE3"));
        assert!(!manager.add_to_watchlist("vale3"));
        assert!(manager.add_to_watchlist("ITUB4"));
        assert!(manager.add_to_watchlist("BBDC4"));

        // The active symbol survives eviction
        assert_eq!(manager.symbols(), vec!["PETR4", "ITUB4", "BBDC4"]);
    }

    #[tokio::test]
    async fn test_removing_active_clears_selection() {
        let source = Arc::new(FakeSource::default());
        let registry = ListenerRegistry::new();
        let mut manager = manager(&source, &registry);

        manager.select("PETR4", M1);
        manager.add_to_watchlist("VALE3");
        assert!(manager.remove_from_watchlist("PETR4"));
        assert!(!manager.remove_from_watchlist("PETR4"));

        assert_eq!(manager.active_symbol(), None);
        assert!(registry.is_empty());
        assert_eq!(manager.symbols(), vec!["VALE3"]);
        assert!(!manager.refresh());
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let source = Arc::new(FakeSource::default());
        let registry = ListenerRegistry::new();

        {
            let mut manager =
                manager(&source, &registry).with_store(Box::new(JsonFileStore::new(&path)));
            manager.restore(&["PETR4".to_string(), "VALE3".to_string()]);
            assert_eq!(manager.active_key(), Some(SeriesKey::new("PETR4", M1)));
            manager.select("VALE3", M5);
        }
        assert!(registry.is_empty());

        let mut restored =
            manager(&source, &registry).with_store(Box::new(JsonFileStore::new(&path)));
        restored.restore(&[]);
        assert_eq!(restored.symbols(), vec!["PETR4", "VALE3"]);
        assert_eq!(restored.active_key(), Some(SeriesKey::new("VALE3", M5)));
    }
}
