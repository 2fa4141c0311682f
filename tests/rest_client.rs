//! BackendRestClient against an in-process fake of the backend API.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use candlewatch::api::{BackendRestClient, SnapshotSource};
use candlewatch::config::BackendConfig;
use candlewatch::data::{Interval, Summary};
use candlewatch::error::{FetchError, OrderError};
use candlewatch::trading::{OrderGateway, OrderSide, OrderTicket};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;

fn candle_json(minute: u32, close: f64) -> Value {
    json!({
        "open": close - 0.5,
        "high": close + 1.0,
        "low": close - 1.0,
        "close": close,
        "volume": 1000,
        "trades": 12,
        "open_time": format!("2024-01-15T10:{:02}:00", minute),
        "close_time": format!("2024-01-15T10:{:02}:59.999", minute),
    })
}

async fn assets() -> Json<Value> {
    Json(json!([
        { "id": 1, "symbol": "PETR4", "name": "Petrobras PN", "asset_type": "STOCK" },
        { "id": 2, "symbol": "VALE3", "name": "Vale ON" },
    ]))
}

async fn candles(Path(asset_id): Path<u64>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let interval = query.get("interval").cloned().unwrap_or_else(|| "1m".to_string());
    let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(100);

    let all: Vec<Value> = (0..5).map(|m| candle_json(m, 30.0 + m as f64)).collect();
    let candles: Vec<Value> = all[all.len().saturating_sub(limit)..].to_vec();
    let symbol = if asset_id == 1 { "PETR4" } else { "VALE3" };

    Json(json!({
        "asset_id": asset_id,
        "symbol": symbol,
        "interval": interval,
        "candles": candles,
        "total": candles.len(),
    }))
}

async fn summary(Path(asset_id): Path<u64>) -> Json<Value> {
    if asset_id == 1 {
        Json(json!({
            "asset_id": 1,
            "symbol": "PETR4",
            "current_price": 34.0,
            "high_24": 35.0,
            "low_24": 29.0,
            "avg_volume": 1000,
            "price_change_24h": 3.5,
        }))
    } else {
        Json(json!({
            "asset_id": 2,
            "symbol": "VALE3",
            "message": "No candles available",
        }))
    }
}

async fn accounts() -> Json<Value> {
    Json(json!([
        { "id": 7, "account_type": "CORRENTE", "balance": 10.0 },
        { "id": 9, "account_type": "INVESTIMENTO", "balance": "1500.50" },
    ]))
}

async fn buy(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let quantity = body["quantity"].as_i64().unwrap_or(0);
    if quantity > 100 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Saldo insuficiente. Necessário: R$ 3400.0" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "transaction_id": 42,
            "symbol": "PETR4",
            "quantity_purchased": quantity,
            "price_per_unit": "34.00",
            "total_cost": 34.0 * quantity as f64,
        })),
    )
}

async fn spawn_backend() -> BackendConfig {
    let router = Router::new()
        .route("/api/v1/investments/assets", get(assets))
        .route("/api/v1/investments/candles/:asset_id", get(candles))
        .route("/api/v1/investments/candles/:asset_id/summary", get(summary))
        .route("/api/v1/investments/buy", post(buy))
        .route("/api/v1/accounts", get(accounts));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    BackendConfig {
        rest_url: format!("http://{}", addr),
        request_timeout_secs: 5,
        ..BackendConfig::default()
    }
}

#[tokio::test]
async fn test_snapshot_with_backend_summary() {
    let client = BackendRestClient::new(&spawn_backend().await).unwrap();

    let snapshot = client
        .fetch_snapshot("PETR4", Interval::OneMinute, 3)
        .await
        .unwrap();

    assert_eq!(snapshot.candles.len(), 3);
    assert!(snapshot.candles.iter().all(|c| c.symbol == "PETR4"));
    assert!(snapshot
        .candles
        .iter()
        .all(|c| c.interval == Interval::OneMinute));
    assert_eq!(snapshot.candles[0].close, dec!(32));
    assert_eq!(snapshot.candles[2].close, dec!(34));
    assert_eq!(snapshot.candles[2].trade_count, Some(12));
    assert!(snapshot
        .candles
        .windows(2)
        .all(|w| w[0].close_time < w[1].close_time));

    assert_eq!(snapshot.summary.current_price, dec!(34));
    assert_eq!(snapshot.summary.high_24, dec!(35));
}

#[tokio::test]
async fn test_summary_message_falls_back_to_local_summary() {
    let client = BackendRestClient::new(&spawn_backend().await).unwrap();

    let snapshot = client
        .fetch_snapshot("VALE3", Interval::FiveMinutes, 100)
        .await
        .unwrap();

    assert_eq!(snapshot.candles.len(), 5);
    assert_eq!(
        Some(snapshot.summary),
        Summary::from_candles(&snapshot.candles)
    );
}

#[tokio::test]
async fn test_unknown_symbol_is_not_found() {
    let client = BackendRestClient::new(&spawn_backend().await).unwrap();

    let result = client.fetch_snapshot("XPTO3", Interval::OneMinute, 10).await;
    assert!(matches!(result, Err(FetchError::NotFound(_))));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let config = BackendConfig {
        rest_url: "http://127.0.0.1:1".to_string(),
        request_timeout_secs: 2,
        ..BackendConfig::default()
    };
    let client = BackendRestClient::new(&config).unwrap();

    let result = client.fetch_snapshot("PETR4", Interval::OneMinute, 10).await;
    assert!(matches!(result, Err(FetchError::Network(_))));
}

#[tokio::test]
async fn test_investment_account_lookup() {
    let client = BackendRestClient::new(&spawn_backend().await).unwrap();

    let account = client.investment_account().await.unwrap().unwrap();
    assert_eq!(account.id, 9);
    assert_eq!(account.balance, dec!(1500.50));
}

#[tokio::test]
async fn test_buy_order_executes() {
    let client = BackendRestClient::new(&spawn_backend().await).unwrap();

    let ticket = OrderTicket::new(9, "PETR4", OrderSide::Buy, 10).unwrap();
    let receipt = client.execute(&ticket).await.unwrap();

    assert_eq!(receipt.transaction_id, 42);
    assert_eq!(receipt.quantity, dec!(10));
    assert_eq!(receipt.price_per_unit, dec!(34));
    assert_eq!(receipt.total, dec!(340));
}

#[tokio::test]
async fn test_buy_rejection_keeps_backend_message() {
    let client = BackendRestClient::new(&spawn_backend().await).unwrap();

    let ticket = OrderTicket::new(9, "PETR4", OrderSide::Buy, 500).unwrap();
    let err = client.execute(&ticket).await.unwrap_err();

    assert_eq!(
        err,
        OrderError::InsufficientFunds("Saldo insuficiente. Necessário: R$ 3400.0".to_string())
    );
    assert_eq!(err.to_string(), "Saldo insuficiente. Necessário: R$ 3400.0");
}
