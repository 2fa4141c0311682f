use crate::data::Candle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of trailing candles the backend aggregates into a summary.
pub const SUMMARY_WINDOW: usize = 24;

/// Derived price statistics for the active series. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub current_price: Decimal,
    pub high_24: Decimal,
    pub low_24: Decimal,
    pub avg_volume: Decimal,
    /// Percentage change from the window's first open to its last close.
    pub price_change_24h: Decimal,
}

impl Summary {
    /// Same aggregation the backend applies to its last 24 candles.
    /// Returns `None` for an empty series.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let window = &candles[candles.len().saturating_sub(SUMMARY_WINDOW)..];
        let first = window.first()?;
        let last = window.last()?;

        let high_24 = window.iter().map(|c| c.high).max()?;
        let low_24 = window.iter().map(|c| c.low).min()?;
        let total_volume: Decimal = window.iter().map(|c| c.volume).sum();
        let avg_volume = total_volume / Decimal::from(window.len());

        let price_change_24h = if first.open.is_zero() {
            Decimal::ZERO
        } else {
            (last.close - first.open) / first.open * Decimal::from(100)
        };

        Some(Self {
            current_price: last.close,
            high_24,
            low_24,
            avg_volume,
            price_change_24h,
        })
    }

    /// Live updates only move the current price; the other fields wait for
    /// the next snapshot.
    pub fn apply_live_close(&mut self, close: Decimal) {
        self.current_price = close;
    }

    pub fn is_rising(&self) -> bool {
        self.price_change_24h >= Decimal::ZERO
    }
}
