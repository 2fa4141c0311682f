use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Candle bucket width accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "5s")]
    FiveSeconds,
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

/// Snapshot size and refresh cadence for one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalProfile {
    pub interval: Interval,
    /// Candles requested per snapshot; also the buffer capacity.
    pub limit: usize,
    pub refresh_period: Duration,
}

const fn profile(interval: Interval, limit: usize, refresh_secs: u64) -> IntervalProfile {
    IntervalProfile {
        interval,
        limit,
        refresh_period: Duration::from_secs(refresh_secs),
    }
}

/// Shorter intervals request more candles so every chart covers a
/// comparable wall-clock span.
pub const INTERVAL_PROFILES: [IntervalProfile; 10] = [
    profile(Interval::OneSecond, 60, 1),
    profile(Interval::FiveSeconds, 60, 5),
    profile(Interval::TenSeconds, 60, 10),
    profile(Interval::ThirtySeconds, 60, 30),
    profile(Interval::OneMinute, 60, 60),
    profile(Interval::FiveMinutes, 60, 300),
    profile(Interval::FifteenMinutes, 48, 900),
    profile(Interval::OneHour, 24, 3_600),
    profile(Interval::FourHours, 24, 14_400),
    profile(Interval::OneDay, 30, 86_400),
];

impl Interval {
    pub const ALL: [Interval; 10] = [
        Interval::OneSecond,
        Interval::FiveSeconds,
        Interval::TenSeconds,
        Interval::ThirtySeconds,
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneSecond => "1s",
            Interval::FiveSeconds => "5s",
            Interval::TenSeconds => "10s",
            Interval::ThirtySeconds => "30s",
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    pub fn profile(&self) -> IntervalProfile {
        // INTERVAL_PROFILES is indexed in the same order as Interval::ALL
        INTERVAL_PROFILES[*self as usize]
    }

    pub fn candle_limit(&self) -> usize {
        self.profile().limit
    }

    /// Refresh period from the profile table, capped at `max`.
    pub fn refresh_period(&self, max: Duration) -> Duration {
        self.profile().refresh_period.min(max)
    }

    pub fn duration(&self) -> Duration {
        match self {
            Interval::OneSecond => Duration::from_secs(1),
            Interval::FiveSeconds => Duration::from_secs(5),
            Interval::TenSeconds => Duration::from_secs(10),
            Interval::ThirtySeconds => Duration::from_secs(30),
            Interval::OneMinute => Duration::from_secs(60),
            Interval::FiveMinutes => Duration::from_secs(300),
            Interval::FifteenMinutes => Duration::from_secs(900),
            Interval::OneHour => Duration::from_secs(3_600),
            Interval::FourHours => Duration::from_secs(14_400),
            Interval::OneDay => Duration::from_secs(86_400),
        }
    }

    pub fn next(self) -> Self {
        let idx = self as usize;
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = self as usize;
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == lower)
            .ok_or_else(|| format!("unknown interval '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_table_order_matches_enum() {
        for interval in Interval::ALL {
            assert_eq!(interval.profile().interval, interval);
        }
    }

    #[test]
    fn test_limits() {
        assert_eq!(Interval::OneSecond.candle_limit(), 60);
        assert_eq!(Interval::FiveMinutes.candle_limit(), 60);
        assert_eq!(Interval::FifteenMinutes.candle_limit(), 48);
        assert_eq!(Interval::OneHour.candle_limit(), 24);
        assert_eq!(Interval::FourHours.candle_limit(), 24);
        assert_eq!(Interval::OneDay.candle_limit(), 30);
    }

    #[test]
    fn test_refresh_period_matches_interval_below_cap() {
        let cap = Duration::from_secs(86_400);
        for interval in Interval::ALL {
            assert_eq!(interval.refresh_period(cap), interval.duration());
        }
    }

    #[test]
    fn test_refresh_period_is_capped() {
        let cap = Duration::from_secs(3_600);
        assert_eq!(Interval::OneDay.refresh_period(cap), cap);
        assert_eq!(Interval::FourHours.refresh_period(cap), cap);
        assert_eq!(Interval::OneMinute.refresh_period(cap), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_round_trip() {
        assert_eq!("15m".parse::<Interval>(), Ok(Interval::FifteenMinutes));
        assert_eq!("1D".parse::<Interval>(), Ok(Interval::OneDay));
        assert!("2m".parse::<Interval>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Interval::ThirtySeconds).unwrap();
        assert_eq!(json, "\"30s\"");
        let parsed: Interval = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(parsed, Interval::FourHours);
    }

    #[test]
    fn test_cycle_wraps() {
        assert_eq!(Interval::OneDay.next(), Interval::OneSecond);
        assert_eq!(Interval::OneSecond.prev(), Interval::OneDay);
    }
}
