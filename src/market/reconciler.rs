//! Per-series merge of snapshot loads and live updates.
//!
//! A reconciler owns the buffer and summary for exactly one (symbol,
//! interval). Loads are stamped with a generation so a snapshot that
//! arrives after a newer load was started is thrown away. Live updates
//! that arrive while a load is in flight are held back and replayed on
//! top of the snapshot once it lands.

use crate::api::models::CandleUpdate;
use crate::api::snapshot::Snapshot;
use crate::data::{AppendOutcome, Candle, CandleBuffer, SeriesKey, Summary};
use crate::error::{BufferError, FetchError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Load generations are unique across every reconciler, so a result left
/// over from a replaced reconciler of the same series can never match a
/// newer load.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The snapshot is installed; `replayed` held-back updates were applied
    /// on top of it.
    Ready { replayed: usize },
    /// Result of a load that has since been superseded.
    Stale,
    Failed(LoadFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadFailure {
    Fetch(FetchError),
    Buffer(BufferError),
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadFailure::Fetch(e) => write!(f, "{}", e),
            LoadFailure::Buffer(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveOutcome {
    Applied(AppendOutcome),
    /// Held until the in-flight snapshot lands
    Queued,
    Dropped(DropReason),
    Rejected(BufferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    OtherSymbol,
    OtherInterval,
    NotLoaded,
}

#[derive(Debug)]
pub struct Reconciler {
    key: SeriesKey,
    phase: Phase,
    buffer: Option<CandleBuffer>,
    summary: Option<Summary>,
    generation: u64,
    in_flight: bool,
    pending: VecDeque<Candle>,
    last_error: Option<String>,
}

impl Reconciler {
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            phase: Phase::Empty,
            buffer: None,
            summary: None,
            generation: 0,
            in_flight: false,
            pending: VecDeque::new(),
            last_error: None,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn buffer(&self) -> Option<&CandleBuffer> {
        self.buffer.as_ref()
    }

    pub fn candles(&self) -> &[Candle] {
        self.buffer.as_ref().map(|b| b.candles()).unwrap_or(&[])
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True between `begin_load` and the matching `complete_load`.
    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Starts a new load and returns its generation. Any load already in
    /// flight becomes stale.
    pub fn begin_load(&mut self) -> u64 {
        self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        self.in_flight = true;
        self.phase = Phase::Loading;
        debug!("{} load #{} started", self.key, self.generation);
        self.generation
    }

    pub fn complete_load(
        &mut self,
        generation: u64,
        result: Result<Snapshot, FetchError>,
    ) -> LoadOutcome {
        if generation != self.generation || !self.in_flight {
            debug!(
                "{} discarding stale snapshot #{} (current #{})",
                self.key, generation, self.generation
            );
            return LoadOutcome::Stale;
        }
        self.in_flight = false;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail(LoadFailure::Fetch(e)),
        };

        let count = snapshot.candles.len();
        let installed = match &mut self.buffer {
            Some(buffer) => buffer.snapshot_replace(snapshot.candles),
            None => {
                let mut buffer = CandleBuffer::new(&self.key.symbol, self.key.interval);
                let result = buffer.snapshot_replace(snapshot.candles);
                if result.is_ok() {
                    self.buffer = Some(buffer);
                }
                result
            }
        };
        if let Err(e) = installed {
            return self.fail(LoadFailure::Buffer(e));
        }

        self.summary = Some(snapshot.summary);
        self.phase = Phase::Ready;
        self.last_error = None;

        let replayed = self.replay_pending();
        info!(
            "{} snapshot installed: {} candles, {} live updates replayed",
            self.key, count, replayed
        );
        LoadOutcome::Ready { replayed }
    }

    fn fail(&mut self, failure: LoadFailure) -> LoadOutcome {
        warn!("{} snapshot load failed: {}", self.key, failure);
        self.last_error = Some(failure.to_string());
        // A failed refresh keeps serving the previous data; a failed first
        // load has nothing to serve and waits for the next attempt.
        if self.buffer.is_some() {
            self.phase = Phase::Ready;
            self.replay_pending();
        } else {
            self.pending.clear();
        }
        LoadOutcome::Failed(failure)
    }

    fn replay_pending(&mut self) -> usize {
        let mut replayed = 0;
        while let Some(candle) = self.pending.pop_front() {
            if let Some(buffer) = &mut self.buffer {
                match buffer.append(candle.clone()) {
                    Ok(_) => {
                        replayed += 1;
                        track_latest_close(&mut self.summary, buffer, &candle);
                    }
                    Err(e) => warn!("{} dropping held-back update: {}", self.key, e),
                }
            }
        }
        replayed
    }

    pub fn apply_live(&mut self, update: &CandleUpdate) -> LiveOutcome {
        if update.symbol != self.key.symbol {
            return LiveOutcome::Dropped(DropReason::OtherSymbol);
        }
        if update.candle.interval != self.key.interval {
            debug!(
                "{} ignoring {} update for {}",
                self.key, update.candle.interval, update.symbol
            );
            return LiveOutcome::Dropped(DropReason::OtherInterval);
        }

        if self.in_flight && self.phase == Phase::Loading {
            let capacity = self.key.interval.candle_limit();
            if self.pending.len() >= capacity {
                self.pending.pop_front();
            }
            self.pending.push_back(update.candle.clone());
            return LiveOutcome::Queued;
        }

        let Some(buffer) = &mut self.buffer else {
            return LiveOutcome::Dropped(DropReason::NotLoaded);
        };

        match buffer.append(update.candle.clone()) {
            Ok(outcome) => {
                track_latest_close(&mut self.summary, buffer, &update.candle);
                LiveOutcome::Applied(outcome)
            }
            Err(e) => {
                warn!("{} rejected live update: {}", self.key, e);
                LiveOutcome::Rejected(e)
            }
        }
    }
}

/// Moves the summary price to `candle`'s close when it is the buffer's
/// newest candle. Re-delivered older candles and inserts evicted on arrival
/// leave the price alone.
fn track_latest_close(summary: &mut Option<Summary>, buffer: &CandleBuffer, candle: &Candle) {
    let is_latest = buffer
        .latest()
        .is_some_and(|latest| latest.close_time == candle.close_time);
    if let (true, Some(summary)) = (is_latest, summary.as_mut()) {
        summary.apply_live_close(candle.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::candles::tests::candle_at;
    use crate::data::Interval;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn key() -> SeriesKey {
        SeriesKey::new("PETR4", Interval::OneMinute)
    }

    fn update(candle: Candle) -> CandleUpdate {
        CandleUpdate {
            symbol: candle.symbol.clone(),
            candle,
        }
    }

    fn snapshot(closes: &[Decimal]) -> Snapshot {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, close)| candle_at("PETR4", i as i64, *close, *close))
            .collect();
        let summary = Summary::from_candles(&candles).unwrap_or_default();
        Snapshot { candles, summary }
    }

    fn closes(reconciler: &Reconciler) -> Vec<Decimal> {
        reconciler.candles().iter().map(|c| c.close).collect()
    }

    #[test]
    fn test_live_update_extends_snapshot() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        assert_eq!(
            r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)]))),
            LoadOutcome::Ready { replayed: 0 }
        );

        let outcome = r.apply_live(&update(candle_at("PETR4", 2, dec!(12), dec!(13))));
        assert_eq!(outcome, LiveOutcome::Applied(AppendOutcome::Inserted));
        assert_eq!(closes(&r), vec![dec!(10), dec!(12), dec!(13)]);
        assert_eq!(r.summary().unwrap().current_price, dec!(13));
    }

    #[test]
    fn test_redelivered_older_candle_keeps_latest_price() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)])));

        r.apply_live(&update(candle_at("PETR4", 2, dec!(12), dec!(13))));
        let outcome = r.apply_live(&update(candle_at("PETR4", 1, dec!(12), dec!(12))));

        assert!(matches!(outcome, LiveOutcome::Applied(_)));
        assert_eq!(r.buffer().unwrap().latest().unwrap().close, dec!(13));
        assert_eq!(r.summary().unwrap().current_price, dec!(13));
    }

    #[test]
    fn test_replayed_older_candle_keeps_latest_price() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.apply_live(&update(candle_at("PETR4", 2, dec!(12), dec!(14))));
        r.apply_live(&update(candle_at("PETR4", 0, dec!(10), dec!(9))));

        r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)])));

        assert_eq!(closes(&r), vec![dec!(9), dec!(12), dec!(14)]);
        assert_eq!(r.summary().unwrap().current_price, dec!(14));
    }

    #[test]
    fn test_generations_differ_across_reconcilers() {
        let mut old = Reconciler::new(key());
        let stale = old.begin_load();

        let mut fresh = Reconciler::new(key());
        let generation = fresh.begin_load();
        assert_ne!(stale, generation);

        assert_eq!(
            fresh.complete_load(stale, Ok(snapshot(&[dec!(1)]))),
            LoadOutcome::Stale
        );
        assert_eq!(
            fresh.complete_load(generation, Ok(snapshot(&[dec!(2)]))),
            LoadOutcome::Ready { replayed: 0 }
        );
        assert_eq!(closes(&fresh), vec![dec!(2)]);
    }

    #[test]
    fn test_other_interval_is_dropped() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(generation, Ok(snapshot(&[dec!(10)])));
        let version = r.buffer().unwrap().version();

        let mut five = candle_at("PETR4", 5, dec!(10), dec!(50));
        five.interval = Interval::FiveMinutes;
        five.close_time = five.open_time + Duration::minutes(5);

        assert_eq!(
            r.apply_live(&update(five)),
            LiveOutcome::Dropped(DropReason::OtherInterval)
        );
        assert_eq!(r.buffer().unwrap().version(), version);
        assert_eq!(r.summary().unwrap().current_price, dec!(10));
    }

    #[test]
    fn test_other_symbol_is_dropped() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(generation, Ok(snapshot(&[dec!(10)])));

        assert_eq!(
            r.apply_live(&update(candle_at("VALE3", 1, dec!(60), dec!(61)))),
            LiveOutcome::Dropped(DropReason::OtherSymbol)
        );
        assert_eq!(r.candles().len(), 1);
    }

    #[test]
    fn test_stale_snapshot_is_discarded() {
        let mut r = Reconciler::new(key());
        let first = r.begin_load();
        let second = r.begin_load();

        assert_eq!(
            r.complete_load(first, Ok(snapshot(&[dec!(1)]))),
            LoadOutcome::Stale
        );
        assert_eq!(r.phase(), Phase::Loading);

        r.complete_load(second, Ok(snapshot(&[dec!(2), dec!(3)])));
        assert_eq!(closes(&r), vec![dec!(2), dec!(3)]);

        // The same generation cannot land twice
        assert_eq!(
            r.complete_load(second, Ok(snapshot(&[dec!(9)]))),
            LoadOutcome::Stale
        );
    }

    #[test]
    fn test_updates_during_load_are_replayed() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();

        assert_eq!(
            r.apply_live(&update(candle_at("PETR4", 2, dec!(12), dec!(14)))),
            LiveOutcome::Queued
        );
        // Replaces the snapshot's last candle once replayed
        assert_eq!(
            r.apply_live(&update(candle_at("PETR4", 1, dec!(11), dec!(13)))),
            LiveOutcome::Queued
        );
        assert_eq!(r.pending_len(), 2);

        let outcome = r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)])));
        assert_eq!(outcome, LoadOutcome::Ready { replayed: 2 });
        assert_eq!(closes(&r), vec![dec!(10), dec!(13), dec!(14)]);
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn test_refresh_replaces_exactly() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)])));
        r.apply_live(&update(candle_at("PETR4", 2, dec!(12), dec!(13))));

        let fresh = snapshot(&[dec!(20), dec!(21), dec!(22), dec!(23)]);
        let expected = fresh.candles.clone();
        let generation = r.begin_load();
        r.complete_load(generation, Ok(fresh));

        assert_eq!(r.candles(), expected.as_slice());
        assert_eq!(r.summary().unwrap().current_price, dec!(23));
    }

    #[test]
    fn test_failed_first_load_stays_loading() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        let outcome = r.complete_load(generation, Err(FetchError::Network("timeout".into())));

        assert!(matches!(outcome, LoadOutcome::Failed(LoadFailure::Fetch(_))));
        assert_eq!(r.phase(), Phase::Loading);
        assert!(!r.is_loading());
        assert!(r.buffer().is_none());
        assert_eq!(r.last_error(), Some("Network: timeout"));

        // Nothing to append to until a load succeeds
        assert_eq!(
            r.apply_live(&update(candle_at("PETR4", 0, dec!(1), dec!(2)))),
            LiveOutcome::Dropped(DropReason::NotLoaded)
        );
    }

    #[test]
    fn test_failed_refresh_keeps_previous_data() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)])));

        let generation = r.begin_load();
        r.complete_load(generation, Err(FetchError::NotFound("PETR4".into())));

        assert_eq!(r.phase(), Phase::Ready);
        assert_eq!(closes(&r), vec![dec!(10), dec!(12)]);
        assert!(r.last_error().is_some());
    }

    #[test]
    fn test_unordered_snapshot_leaves_buffer_untouched() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(generation, Ok(snapshot(&[dec!(10), dec!(12)])));

        let mut bad = snapshot(&[dec!(1), dec!(2)]);
        bad.candles.reverse();
        let generation = r.begin_load();
        let outcome = r.complete_load(generation, Ok(bad));

        assert_eq!(
            outcome,
            LoadOutcome::Failed(LoadFailure::Buffer(BufferError::UnorderedSnapshot { index: 1 }))
        );
        assert_eq!(closes(&r), vec![dec!(10), dec!(12)]);
    }

    #[test]
    fn test_empty_snapshot_is_ready_and_empty() {
        let mut r = Reconciler::new(key());
        let generation = r.begin_load();
        r.complete_load(
            generation,
            Ok(Snapshot {
                candles: Vec::new(),
                summary: Summary::default(),
            }),
        );
        assert_eq!(r.phase(), Phase::Ready);
        assert!(r.candles().is_empty());
    }
}
