use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::binance::BinanceClient;
use super::error::ApiError;
use crate::models::MarketType;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// One page of trade history for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchTradesRequest {
    pub market_type: MarketType,
    /// Exchange symbol, e.g. "BTCUSDT"
    pub symbol: String,
    /// Unix milliseconds, inclusive; only used for the first page
    pub start_time: Option<i64>,
    /// Unix milliseconds, inclusive; only sent together with `start_time`
    pub end_time: Option<i64>,
    /// Pagination cursor returned by the previous page
    pub cursor: Option<String>,
    pub limit: u32,
}

/// A single fill as reported by the exchange, before it becomes a journal Trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    pub exchange_trade_id: String,
    pub exchange_order_id: String,
    pub symbol: String,
    /// "BUY" or "SELL"
    pub side: String,
    pub price: f64,
    pub quantity: f64,
    /// Realized PnL; always 0 for spot fills
    pub pnl: f64,
    pub fee: f64,
    pub is_maker: bool,
    /// Unix milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchTradesResponse {
    pub trades: Vec<RawTrade>,
    /// Continues after the last fill of this page and ignores the requested
    /// time range. None on a short page: the range is exhausted for a first
    /// page, the whole history is for a cursor page.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn exchange_name(&self) -> &str;

    async fn fetch_trades(&self, request: FetchTradesRequest) -> Result<FetchTradesResponse, ApiError>;

    /// Total USDT held in the wallet for `market_type`.
    async fn fetch_balance(&self, market_type: MarketType) -> Result<f64, ApiError>;

    /// Symbols worth asking trade history for.
    async fn discover_symbols(&self, market_type: MarketType, since: Option<i64>) -> Result<Vec<String>, ApiError>;

    /// Makes a lightweight signed call; Ok(false) means the exchange rejected the keys.
    async fn test_credentials(&self) -> Result<bool, ApiError>;

    fn rate_limit(&self) -> RateLimitConfig;

    /// Longest `start_time..end_time` range, in milliseconds, a single history
    /// query may cover. None when the range is unbounded.
    fn history_window(&self, _market_type: MarketType) -> Option<i64> {
        None
    }
}

/// Builds authenticated clients from decrypted credentials.
pub trait ExchangeConnector: Send + Sync {
    fn connect(&self, exchange: &str, api_key: &str, api_secret: &str) -> Result<Box<dyn ExchangeClient>, ApiError>;
}

/// Connects to the live exchange APIs.
#[derive(Debug, Default, Clone)]
pub struct LiveConnector;

impl ExchangeConnector for LiveConnector {
    fn connect(&self, exchange: &str, api_key: &str, api_secret: &str) -> Result<Box<dyn ExchangeClient>, ApiError> {
        match exchange {
            "binance" => Ok(Box::new(BinanceClient::new(api_key.to_string(), api_secret.to_string()))),
            other => Err(ApiError::UnsupportedExchange(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_connector_rejects_unknown_exchange() {
        let connector = LiveConnector;
        assert!(connector.connect("binance", "k", "s").is_ok());
        match connector.connect("kraken", "k", "s") {
            Err(ApiError::UnsupportedExchange(name)) => assert_eq!(name, "kraken"),
            _ => panic!("expected unsupported exchange"),
        }
    }
}
