//! Domain errors surfaced by the buffer, the fetcher, the push channel and
//! order execution. Application plumbing uses `anyhow` instead.

use thiserror::Error;

/// Rejections from [`CandleBuffer`](crate::data::CandleBuffer) mutations.
/// The buffer is left in its last valid state when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Invalid candle: {0}")]
    InvalidCandle(String),
    #[error("Unordered snapshot: close_time at index {index} does not increase")]
    UnorderedSnapshot { index: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network: {0}")]
    Network(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Decode: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Order execution failures. Messages coming from the backend are kept
/// verbatim so they can be shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("{0}")]
    InsufficientFunds(String),
    #[error("{0}")]
    InsufficientHoldings(String),
    #[error("Invalid quantity")]
    InvalidQuantity,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
    #[error("Network: {0}")]
    Network(String),
}

impl From<reqwest::Error> for OrderError {
    fn from(err: reqwest::Error) -> Self {
        OrderError::Network(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PushError {
    #[error("Malformed push message: {0}")]
    Malformed(String),
    #[error("Unknown push message type: {0}")]
    UnknownType(String),
}
