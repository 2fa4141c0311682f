//! Snapshot Fetcher port.
//!
//! A snapshot is a bounded, oldest-first batch of historical candles plus
//! the summary for one (symbol, interval). Fetching is a pure read and is
//! never retried here; the caller decides when to try again.

use crate::data::{Candle, Interval, Summary};
use crate::error::FetchError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub candles: Vec<Candle>,
    pub summary: Summary,
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Snapshot, FetchError>;
}
