use crate::data::{Candle, Interval, Summary};
use crate::error::PushError;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Backend timestamps are ISO-8601, usually without an offset (UTC implied).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

/// Candle as returned by the snapshot endpoint (no symbol, no interval).
#[derive(Debug, Clone, Deserialize)]
pub struct CandleData {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub trades: Option<u64>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub open_time: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub close_time: DateTime<Utc>,
}

impl CandleData {
    pub fn into_candle(self, symbol: &str, interval: Interval) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            interval,
            open_time: self.open_time,
            close_time: self.close_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            trade_count: self.trades,
        }
    }
}

/// `GET /api/v1/investments/candles/{asset_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct CandlesResponse {
    pub asset_id: u64,
    pub symbol: String,
    pub interval: Interval,
    pub candles: Vec<CandleData>,
    #[serde(default)]
    pub total: usize,
}

/// `GET /api/v1/investments/candles/{asset_id}/summary`. When the backend has
/// no candles it answers with only `message`.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub asset_id: u64,
    pub symbol: String,
    pub current_price: Option<Decimal>,
    pub high_24: Option<Decimal>,
    pub low_24: Option<Decimal>,
    pub avg_volume: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SummaryResponse {
    pub fn into_summary(self) -> Option<Summary> {
        Some(Summary {
            current_price: self.current_price?,
            high_24: self.high_24?,
            low_24: self.low_24?,
            avg_volume: self.avg_volume?,
            price_change_24h: self.price_change_24h?,
        })
    }
}

/// Entry of `GET /api/v1/investments/assets`
#[derive(Debug, Clone, Deserialize)]
pub struct AssetInfo {
    pub id: u64,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub current_price: Option<Decimal>,
}

/// Entry of `GET /api/v1/accounts`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub id: u64,
    pub account_type: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeRequest {
    pub account_id: u64,
    pub asset_id: u64,
    pub quantity: i64,
}

/// Buy and sell responses share their shape apart from field names.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeReceipt {
    pub transaction_id: u64,
    pub symbol: String,
    #[serde(alias = "quantity_purchased", alias = "quantity_sold")]
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    #[serde(alias = "total_cost", alias = "total_value")]
    pub total: Decimal,
}

/// FastAPI error body; `detail` is a string or a list of validation errors.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.get("msg")
                        .and_then(|m| m.as_str())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| item.to_string())
                })
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        }
    }
}

/// Candle inside a `candle_update` push message.
#[derive(Debug, Clone, Deserialize)]
pub struct PushCandleData {
    pub interval: Interval,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub trades: Option<u64>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub open_time: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub close_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
struct PushEnvelope {
    symbol: String,
    candle: PushCandleData,
}

/// Typed `candle_update` event.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleUpdate {
    pub symbol: String,
    pub candle: Candle,
}

/// Parses one push frame. Only `candle_update` is understood.
pub fn parse_push_message(text: &str) -> Result<CandleUpdate, PushError> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| PushError::Malformed(e.to_string()))?;

    match json.get("type").and_then(|t| t.as_str()) {
        Some("candle_update") => {}
        Some(other) => return Err(PushError::UnknownType(other.to_string())),
        None => return Err(PushError::Malformed("missing 'type'".to_string())),
    }

    let envelope: PushEnvelope =
        serde_json::from_value(json).map_err(|e| PushError::Malformed(e.to_string()))?;
    let PushCandleData {
        interval,
        open,
        high,
        low,
        close,
        volume,
        trades,
        open_time,
        close_time,
    } = envelope.candle;

    Ok(CandleUpdate {
        candle: Candle {
            symbol: envelope.symbol.clone(),
            interval,
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            trade_count: trades,
        },
        symbol: envelope.symbol,
    })
}
