//! Live Update Channel
//!
//! One multiplexed push connection per process. Every parsed message is
//! delivered to every registered listener; listeners declare the series
//! they care about but filtering is left to the receiving side. The
//! connection loop reconnects forever with a fixed delay.

use crate::api::models::{parse_push_message, CandleUpdate};
use crate::data::SeriesKey;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub type ListenerId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    CandleUpdate(CandleUpdate),
}

/// An event addressed to one listener registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub listener: ListenerId,
    pub event: ChannelEvent,
}

struct Listener {
    key: SeriesKey,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: ListenerId,
    listeners: HashMap<ListenerId, Listener>,
}

/// Shared set of listener registrations. Cheap to clone.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, key: SeriesKey, tx: mpsc::UnboundedSender<ChannelMessage>) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        debug!("Listener {} registered for {}", id, key);
        inner.listeners.insert(id, Listener { key, tx });
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.lock().listeners.remove(&id);
        if let Some(listener) = &removed {
            debug!("Listener {} for {} unregistered", id, listener.key);
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `event` to every listener, dropping registrations whose
    /// receiver is gone. Returns how many listeners received it.
    pub fn dispatch(&self, event: &ChannelEvent) -> usize {
        let mut inner = self.lock();
        let mut closed = Vec::new();
        let mut delivered = 0;

        for (id, listener) in &inner.listeners {
            let msg = ChannelMessage {
                listener: *id,
                event: event.clone(),
            };
            if listener.tx.send(msg).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }

        for id in closed {
            inner.listeners.remove(&id);
        }
        delivered
    }
}

pub struct LiveChannel {
    url: String,
    reconnect_delay: Duration,
    registry: ListenerRegistry,
    connected: Arc<AtomicBool>,
}

impl LiveChannel {
    pub fn new(url: &str, reconnect_delay: Duration) -> Self {
        Self {
            url: url.to_string(),
            reconnect_delay,
            registry: ListenerRegistry::new(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn registry(&self) -> ListenerRegistry {
        self.registry.clone()
    }

    /// Starts the connection loop on the current runtime.
    pub fn spawn(self) -> ChannelHandle {
        let registry = self.registry.clone();
        let connected = Arc::clone(&self.connected);
        let task = tokio::spawn(async move { self.run().await });
        ChannelHandle {
            registry,
            connected,
            task,
        }
    }

    async fn run(self) {
        loop {
            match self.connect_once().await {
                Ok(()) => info!("Market feed closed"),
                Err(e) => error!("Market feed error: {:#}", e),
            }

            if self.connected.swap(false, Ordering::SeqCst) {
                self.registry.dispatch(&ChannelEvent::Disconnected);
            }

            // The loop is the only place a reconnect is scheduled, so there is
            // never more than one pending.
            info!("Reconnecting to market feed in {:?}", self.reconnect_delay);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn connect_once(&self) -> Result<()> {
        info!("Connecting to market feed: {}", self.url);
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .context("Failed to connect to market feed")?;
        let (mut write, mut read) = ws_stream.split();

        self.connected.store(true, Ordering::SeqCst);
        self.registry.dispatch(&ChannelEvent::Connected);
        info!("Connected to market feed");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_text(text.as_str()),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Market feed closed by server");
                    break;
                }
                Err(e) => return Err(e).context("Market feed read failed"),
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_text(&self, text: &str) {
        match parse_push_message(text) {
            Ok(update) => {
                debug!(
                    "candle_update {} {} close {}",
                    update.symbol, update.candle.interval, update.candle.close
                );
                self.registry.dispatch(&ChannelEvent::CandleUpdate(update));
            }
            Err(e) => warn!("Dropping push message: {}", e),
        }
    }
}

/// Running channel. Dropping the handle stops the connection loop.
pub struct ChannelHandle {
    registry: ListenerRegistry,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn registry(&self) -> ListenerRegistry {
        self.registry.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Interval;

    fn key(symbol: &str) -> SeriesKey {
        SeriesKey::new(symbol, Interval::OneMinute)
    }

    #[test]
    fn test_dispatch_reaches_every_listener() {
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let a = registry.register(key("PETR4"), tx.clone());
        let b = registry.register(SeriesKey::new("VALE3", Interval::FiveMinutes), tx);

        assert_eq!(registry.dispatch(&ChannelEvent::Connected), 2);

        let mut seen = vec![rx.try_recv().unwrap().listener, rx.try_recv().unwrap().listener];
        seen.sort();
        assert_eq!(seen, vec![a, b]);
    }

    #[test]
    fn test_unregistered_listener_gets_nothing() {
        let registry = ListenerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(key("PETR4"), tx);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.dispatch(&ChannelEvent::Disconnected), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receivers_are_pruned() {
        let registry = ListenerRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(key("PETR4"), tx);
        drop(rx);

        assert_eq!(registry.dispatch(&ChannelEvent::Connected), 0);
        assert!(registry.is_empty());
    }
}
