//! Backend REST client
//!
//! Serves the Snapshot Fetcher (candles + summary per asset) and the order
//! execution collaborator (investment account, buy, sell).

use crate::api::models::{
    AccountInfo, AssetInfo, CandlesResponse, ErrorBody, SummaryResponse, TradeReceipt,
    TradeRequest,
};
use crate::api::snapshot::{Snapshot, SnapshotSource};
use crate::config::BackendConfig;
use crate::data::{Candle, Interval, Summary};
use crate::error::{FetchError, OrderError};
use crate::trading::order::{classify_rejection, InvestmentAccount, OrderGateway, OrderSide, OrderTicket};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const INVESTMENTS_PREFIX: &str = "/api/v1/investments";
const INVESTMENT_ACCOUNT_TYPE: &str = "INVESTIMENTO";

pub struct BackendRestClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    /// symbol -> asset id, filled from the asset listing on first use
    assets: Mutex<HashMap<String, u64>>,
}

impl BackendRestClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            assets: Mutex::new(HashMap::new()),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .authorize(self.client.get(&url).query(query))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.message())
                .unwrap_or_else(|_| path.to_string());
            return Err(FetchError::NotFound(detail));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(FetchError::Network(format!(
                "GET {} failed with status {}: {}",
                path, status, excerpt
            )));
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn list_assets(&self) -> Result<Vec<AssetInfo>, FetchError> {
        let assets: Vec<AssetInfo> = self
            .get_json(&format!("{}/assets", INVESTMENTS_PREFIX), &[])
            .await?;
        info!("Fetched {} assets", assets.len());
        Ok(assets)
    }

    /// Resolves a symbol to the backend's asset id, refreshing the cached
    /// listing once on a miss.
    pub async fn resolve_asset(&self, symbol: &str) -> Result<u64, FetchError> {
        let key = symbol.to_uppercase();
        if let Some(id) = self.assets.lock().await.get(&key) {
            return Ok(*id);
        }

        let listing = self.list_assets().await?;
        let mut assets = self.assets.lock().await;
        for asset in listing {
            assets.insert(asset.symbol.to_uppercase(), asset.id);
        }
        assets
            .get(&key)
            .copied()
            .ok_or_else(|| FetchError::NotFound(format!("unknown symbol {}", symbol)))
    }

    pub async fn fetch_candles(
        &self,
        asset_id: u64,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let response: CandlesResponse = self
            .get_json(
                &format!("{}/candles/{}", INVESTMENTS_PREFIX, asset_id),
                &[
                    ("interval", interval.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        if response.interval != interval {
            return Err(FetchError::Decode(format!(
                "asked for {} candles, got {}",
                interval, response.interval
            )));
        }

        Ok(response
            .candles
            .into_iter()
            .map(|c| c.into_candle(symbol, interval))
            .collect())
    }

    pub async fn fetch_summary(
        &self,
        asset_id: u64,
        interval: Interval,
    ) -> Result<Option<Summary>, FetchError> {
        let response: SummaryResponse = self
            .get_json(
                &format!("{}/candles/{}/summary", INVESTMENTS_PREFIX, asset_id),
                &[("interval", interval.as_str().to_string())],
            )
            .await?;

        if let Some(message) = &response.message {
            debug!("Summary for asset {}: {}", asset_id, message);
        }
        Ok(response.into_summary())
    }

    async fn post_trade(&self, path: &str, request: &TradeRequest) -> Result<TradeReceipt, OrderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .authorize(self.client.post(&url).json(request))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<TradeReceipt>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message())
            .unwrap_or(body);

        if status == StatusCode::NOT_FOUND {
            return Err(OrderError::NotFound(detail));
        }
        if status.is_server_error() {
            return Err(OrderError::Network(format!("{}: {}", status, detail)));
        }
        Err(classify_rejection(&detail))
    }
}

#[async_trait]
impl SnapshotSource for BackendRestClient {
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Snapshot, FetchError> {
        let asset_id = self.resolve_asset(symbol).await?;
        let candles = self.fetch_candles(asset_id, symbol, interval, limit).await?;

        // An empty summary is derived from the candles the same way the
        // backend computes it.
        let summary = match self.fetch_summary(asset_id, interval).await? {
            Some(summary) => summary,
            None => Summary::from_candles(&candles).unwrap_or_default(),
        };

        Ok(Snapshot { candles, summary })
    }
}

#[async_trait]
impl OrderGateway for BackendRestClient {
    async fn investment_account(&self) -> Result<Option<InvestmentAccount>, OrderError> {
        let accounts: Vec<AccountInfo> = self
            .get_json("/api/v1/accounts", &[])
            .await
            .map_err(|e| OrderError::Network(e.to_string()))?;

        Ok(accounts
            .into_iter()
            .find(|a| a.account_type == INVESTMENT_ACCOUNT_TYPE)
            .map(|a| InvestmentAccount {
                id: a.id,
                balance: a.balance,
            }))
    }

    async fn execute(&self, ticket: &OrderTicket) -> Result<TradeReceipt, OrderError> {
        if ticket.quantity <= 0 {
            return Err(OrderError::InvalidQuantity);
        }

        let asset_id = self.resolve_asset(&ticket.symbol).await.map_err(|e| match e {
            FetchError::NotFound(msg) => OrderError::NotFound(msg),
            other => OrderError::Network(other.to_string()),
        })?;

        let request = TradeRequest {
            account_id: ticket.account_id,
            asset_id,
            quantity: ticket.quantity,
        };
        let path = match ticket.side {
            OrderSide::Buy => format!("{}/buy", INVESTMENTS_PREFIX),
            OrderSide::Sell => format!("{}/sell", INVESTMENTS_PREFIX),
        };

        info!(
            "Placing {} {} x{} on account {}",
            ticket.side, ticket.symbol, ticket.quantity, ticket.account_id
        );

        let result = self.post_trade(&path, &request).await;
        match &result {
            Ok(receipt) => info!(
                "{} {} x{} filled @ {} (total {})",
                ticket.side, receipt.symbol, receipt.quantity, receipt.price_per_unit, receipt.total
            ),
            Err(e) => warn!("{} {} rejected: {}", ticket.side, ticket.symbol, e),
        }
        result
    }
}
