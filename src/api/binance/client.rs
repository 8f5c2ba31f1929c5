use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::api::{
    client::{ExchangeClient, FetchTradesRequest, FetchTradesResponse, RateLimitConfig, RawTrade},
    error::ApiError,
    rate_limiter::RateLimiter,
};
use crate::models::MarketType;

use super::{
    generate_signature,
    mapper::{futures_symbols, map_futures_trade, map_spot_trade, spot_symbols_from_balances, QUOTE_ASSET},
    normalize_symbol,
    types::{BinanceErrorResponse, FuturesBalance, FuturesTrade, IncomeRecord, PositionRisk, SpotAccount, SpotTrade},
    FUTURES_BASE_URL, RECV_WINDOW, SPOT_BASE_URL,
};

const SPOT_ACCOUNT_ENDPOINT: &str = "/api/v3/account";
const SPOT_TRADES_ENDPOINT: &str = "/api/v3/myTrades";
const FUTURES_BALANCE_ENDPOINT: &str = "/fapi/v2/balance";
const FUTURES_POSITIONS_ENDPOINT: &str = "/fapi/v2/positionRisk";
const FUTURES_INCOME_ENDPOINT: &str = "/fapi/v1/income";
const FUTURES_TRADES_ENDPOINT: &str = "/fapi/v1/userTrades";

const MAX_PAGE_SIZE: u32 = 1000;
/// Longest startTime..endTime range each trade-history endpoint accepts
const SPOT_HISTORY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
const FUTURES_HISTORY_WINDOW_MS: i64 = 7 * SPOT_HISTORY_WINDOW_MS;
const RATE_LIMIT: RateLimitConfig = RateLimitConfig {
    requests_per_second: 10,
    burst_size: 10,
};

pub struct BinanceClient {
    api_key: String,
    api_secret: String,
    spot_base_url: String,
    futures_base_url: String,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self::with_base_urls(api_key, api_secret, SPOT_BASE_URL, FUTURES_BASE_URL)
    }

    /// Points the client at other hosts, e.g. the Binance testnet.
    pub fn with_base_urls(api_key: String, api_secret: String, spot_base_url: &str, futures_base_url: &str) -> Self {
        Self {
            api_key,
            api_secret,
            spot_base_url: spot_base_url.trim_end_matches('/').to_string(),
            futures_base_url: futures_base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            rate_limiter: RateLimiter::new("binance", &RATE_LIMIT),
        }
    }

    fn base_url(&self, market_type: MarketType) -> &str {
        match market_type {
            MarketType::Spot => &self.spot_base_url,
            MarketType::Futures => &self.futures_base_url,
        }
    }

    /// Appends timestamp, recvWindow and the signature to `params`.
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        query.push(format!("recvWindow={}", RECV_WINDOW));
        query.push(format!("timestamp={}", chrono::Utc::now().timestamp_millis()));
        let query_string = query.join("&");
        let signature = generate_signature(&query_string, &self.api_secret);
        format!("{}&signature={}", query_string, signature)
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        market_type: MarketType,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}?{}", self.base_url(market_type), endpoint, self.signed_query(params));
        let response = self
            .http_client
            .get(&url)
            .header("X-MBX-APIKEY", self.api_key.as_str())
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status == 429 || status == 418 {
            return Err(ApiError::RateLimited(
                "Rate limit exceeded. Please wait before retrying.".to_string(),
            ));
        }

        if !status.is_success() {
            let error = serde_json::from_str::<BinanceErrorResponse>(&response_text).ok();
            if status == 401 || error.as_ref().is_some_and(|e| matches!(e.code, -2014 | -2015 | -1022)) {
                return Err(ApiError::InvalidCredentials(
                    error.map(|e| e.msg).unwrap_or_else(|| "Invalid API credentials or permissions".to_string()),
                ));
            }
            return Err(match error {
                Some(e) => ApiError::Exchange {
                    code: e.code.to_string(),
                    message: e.msg,
                },
                None => ApiError::Exchange {
                    code: status.as_u16().to_string(),
                    message: response_text.chars().take(200).collect(),
                },
            });
        }

        serde_json::from_str(&response_text).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse response: {} - Body: {}",
                e,
                response_text.chars().take(200).collect::<String>()
            ))
        })
    }

    fn page_params(request: &FetchTradesRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", normalize_symbol(&request.symbol)),
            ("limit", request.limit.clamp(1, MAX_PAGE_SIZE).to_string()),
        ];
        // Binance rejects a time range combined with fromId
        match (&request.cursor, request.start_time) {
            (Some(from_id), _) => params.push(("fromId", from_id.clone())),
            (None, Some(start_time)) => {
                params.push(("startTime", start_time.to_string()));
                if let Some(end_time) = request.end_time {
                    params.push(("endTime", end_time.to_string()));
                }
            }
            (None, None) => params.push(("fromId", "0".to_string())),
        }
        params
    }
}

/// Fills come back oldest first; the next page starts after the last id.
/// `ids` are the raw fill ids, including fills that failed to map.
fn next_cursor(ids: &[i64], limit: u32) -> Option<String> {
    if ids.len() < limit.clamp(1, MAX_PAGE_SIZE) as usize {
        return None;
    }
    ids.iter().max().map(|id| (id + 1).to_string())
}

fn map_all<T>(items: &[T], map: fn(&T) -> Result<RawTrade, String>) -> Vec<RawTrade> {
    items
        .iter()
        .filter_map(|item| match map(item) {
            Ok(trade) => Some(trade),
            Err(e) => {
                log::warn!("Failed to map Binance fill: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn exchange_name(&self) -> &str {
        "binance"
    }

    async fn fetch_trades(&self, request: FetchTradesRequest) -> Result<FetchTradesResponse, ApiError> {
        let params = Self::page_params(&request);
        let (ids, trades): (Vec<i64>, Vec<RawTrade>) = match request.market_type {
            MarketType::Spot => {
                let fills: Vec<SpotTrade> = self.signed_get(MarketType::Spot, SPOT_TRADES_ENDPOINT, &params).await?;
                (fills.iter().map(|f| f.id).collect(), map_all(&fills, map_spot_trade))
            }
            MarketType::Futures => {
                let fills: Vec<FuturesTrade> = self
                    .signed_get(MarketType::Futures, FUTURES_TRADES_ENDPOINT, &params)
                    .await?;
                (fills.iter().map(|f| f.id).collect(), map_all(&fills, map_futures_trade))
            }
        };

        Ok(FetchTradesResponse {
            next_cursor: next_cursor(&ids, request.limit),
            trades,
        })
    }

    async fn fetch_balance(&self, market_type: MarketType) -> Result<f64, ApiError> {
        match market_type {
            MarketType::Spot => {
                let account: SpotAccount = self.signed_get(MarketType::Spot, SPOT_ACCOUNT_ENDPOINT, &[]).await?;
                Ok(account
                    .balances
                    .iter()
                    .find(|b| b.asset == QUOTE_ASSET)
                    .map(|b| b.free.parse::<f64>().unwrap_or(0.0) + b.locked.parse::<f64>().unwrap_or(0.0))
                    .unwrap_or(0.0))
            }
            MarketType::Futures => {
                let balances: Vec<FuturesBalance> = self
                    .signed_get(MarketType::Futures, FUTURES_BALANCE_ENDPOINT, &[])
                    .await?;
                Ok(balances
                    .iter()
                    .find(|b| b.asset == QUOTE_ASSET)
                    .and_then(|b| b.balance.parse::<f64>().ok())
                    .unwrap_or(0.0))
            }
        }
    }

    async fn discover_symbols(&self, market_type: MarketType, since: Option<i64>) -> Result<Vec<String>, ApiError> {
        match market_type {
            MarketType::Spot => {
                let account: SpotAccount = self.signed_get(MarketType::Spot, SPOT_ACCOUNT_ENDPOINT, &[]).await?;
                Ok(spot_symbols_from_balances(&account.balances))
            }
            MarketType::Futures => {
                let mut income_params = vec![("limit", MAX_PAGE_SIZE.to_string())];
                if let Some(since) = since {
                    income_params.push(("startTime", since.to_string()));
                }
                let income: Vec<IncomeRecord> = self
                    .signed_get(MarketType::Futures, FUTURES_INCOME_ENDPOINT, &income_params)
                    .await?;
                let positions: Vec<PositionRisk> = self
                    .signed_get(MarketType::Futures, FUTURES_POSITIONS_ENDPOINT, &[])
                    .await?;
                Ok(futures_symbols(&income, &positions))
            }
        }
    }

    async fn test_credentials(&self) -> Result<bool, ApiError> {
        match self.signed_get::<SpotAccount>(MarketType::Spot, SPOT_ACCOUNT_ENDPOINT, &[]).await {
            Ok(_) => Ok(true),
            Err(ApiError::InvalidCredentials(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn rate_limit(&self) -> RateLimitConfig {
        RATE_LIMIT
    }

    fn history_window(&self, market_type: MarketType) -> Option<i64> {
        Some(match market_type {
            MarketType::Spot => SPOT_HISTORY_WINDOW_MS,
            MarketType::Futures => FUTURES_HISTORY_WINDOW_MS,
        })
    }
}
