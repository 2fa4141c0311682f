use crate::api::models::TradeReceipt;
use crate::error::OrderError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn toggle(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A market order against the backend's current price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTicket {
    pub account_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
}

impl OrderTicket {
    pub fn new(account_id: u64, symbol: &str, side: OrderSide, quantity: i64) -> Result<Self, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity);
        }
        Ok(Self {
            account_id,
            symbol: symbol.to_string(),
            side,
            quantity,
        })
    }
}

/// The investment account buy/sell orders are executed against.
#[derive(Debug, Clone, PartialEq)]
pub struct InvestmentAccount {
    pub id: u64,
    pub balance: Decimal,
}

/// Order execution and balance lookup. Implementations must not retry a
/// failed execution.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn investment_account(&self) -> Result<Option<InvestmentAccount>, OrderError>;

    async fn execute(&self, ticket: &OrderTicket) -> Result<TradeReceipt, OrderError>;
}

/// Maps a backend rejection message onto the matching error kind. The
/// message itself is kept for display.
pub fn classify_rejection(detail: &str) -> OrderError {
    let lower = detail.to_lowercase();
    if lower.contains("saldo insuficiente") || lower.contains("insufficient funds") {
        OrderError::InsufficientFunds(detail.to_string())
    } else if lower.contains("quantidade insuficiente")
        || lower.contains("não possui")
        || lower.contains("insufficient holdings")
    {
        OrderError::InsufficientHoldings(detail.to_string())
    } else if lower.contains("quantidade deve ser positiva") || lower.contains("invalid quantity") {
        OrderError::InvalidQuantity
    } else if lower.contains("não encontrad") || lower.contains("not found") {
        OrderError::NotFound(detail.to_string())
    } else {
        OrderError::Rejected(detail.to_string())
    }
}
