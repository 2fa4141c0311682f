use crate::data::Interval;
use crate::error::BufferError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Versions are drawn from one process-wide counter so two buffers never
/// report the same version.
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: Option<u64>,
}

impl Candle {
    /// Checks the OHLCV invariants: non-negative values, `high` above and
    /// `low` below every other price, and a non-empty time span.
    pub fn validate(&self) -> Result<(), BufferError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| *v < Decimal::ZERO) {
            return Err(BufferError::InvalidCandle(format!("{} is negative ({})", name, value)));
        }

        if self.high < self.open || self.high < self.close || self.high < self.low {
            return Err(BufferError::InvalidCandle(format!(
                "high {} below open/close/low ({}/{}/{})",
                self.high, self.open, self.close, self.low
            )));
        }

        if self.low > self.open || self.low > self.close {
            return Err(BufferError::InvalidCandle(format!(
                "low {} above open/close ({}/{})",
                self.low, self.open, self.close
            )));
        }

        if self.close_time <= self.open_time {
            return Err(BufferError::InvalidCandle(format!(
                "close_time {} not after open_time {}",
                self.close_time, self.open_time
            )));
        }

        Ok(())
    }

    /// Close at or above open counts as an up candle.
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A candle with the same `close_time` was already present.
    Replaced,
}

/// Bounded, `close_time`-ordered candle sequence for one (symbol, interval).
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    symbol: String,
    interval: Interval,
    /// Oldest first
    candles: Vec<Candle>,
    capacity: usize,
    version: u64,
}

impl CandleBuffer {
    /// Buffer sized from the interval's snapshot limit.
    pub fn new(symbol: &str, interval: Interval) -> Self {
        Self::with_capacity(symbol, interval, interval.candle_limit())
    }

    pub fn with_capacity(symbol: &str, interval: Interval, capacity: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            candles: Vec::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            version: next_version(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes on every successful mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn append(&mut self, candle: Candle) -> Result<AppendOutcome, BufferError> {
        self.check(&candle)?;

        let outcome = match self
            .candles
            .binary_search_by(|c| c.close_time.cmp(&candle.close_time))
        {
            Ok(idx) => {
                self.candles[idx] = candle;
                AppendOutcome::Replaced
            }
            Err(idx) => {
                self.candles.insert(idx, candle);
                AppendOutcome::Inserted
            }
        };

        if self.candles.len() > self.capacity {
            let excess = self.candles.len() - self.capacity;
            self.candles.drain(..excess);
        }

        self.version = next_version();
        Ok(outcome)
    }

    /// Replaces the whole content. Input must be strictly increasing in
    /// `close_time`; only the newest `capacity` candles are kept.
    pub fn snapshot_replace(&mut self, candles: Vec<Candle>) -> Result<(), BufferError> {
        for (idx, candle) in candles.iter().enumerate() {
            self.check(candle)?;
            if idx > 0 && candle.close_time <= candles[idx - 1].close_time {
                return Err(BufferError::UnorderedSnapshot { index: idx });
            }
        }

        let skip = candles.len().saturating_sub(self.capacity);
        self.candles = candles.into_iter().skip(skip).collect();
        self.version = next_version();
        Ok(())
    }

    fn check(&self, candle: &Candle) -> Result<(), BufferError> {
        if candle.symbol != self.symbol || candle.interval != self.interval {
            return Err(BufferError::InvalidCandle(format!(
                "candle for {}/{} offered to buffer {}/{}",
                candle.symbol, candle.interval, self.symbol, self.interval
            )));
        }
        candle.validate()
    }
}
