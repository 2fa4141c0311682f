pub mod candles;
pub mod interval;
pub mod summary;

pub use candles::{AppendOutcome, Candle, CandleBuffer};
pub use interval::{Interval, IntervalProfile, INTERVAL_PROFILES};
pub use summary::Summary;

/// Identifies one candle series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub symbol: String,
    pub interval: Interval,
}

impl SeriesKey {
    pub fn new(symbol: &str, interval: Interval) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.symbol, self.interval)
    }
}
