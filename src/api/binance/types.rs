use serde::{Deserialize, Serialize};

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceErrorResponse {
    pub code: i64,
    pub msg: String,
}

/// GET /api/v3/myTrades
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotTrade {
    pub symbol: String,
    pub id: i64,
    pub order_id: i64,
    pub price: String,
    pub qty: String,
    pub commission: String,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
    pub is_maker: bool,
}

/// GET /fapi/v1/userTrades
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesTrade {
    pub symbol: String,
    pub id: i64,
    pub order_id: i64,
    /// "BUY" or "SELL"
    pub side: String,
    pub price: String,
    pub qty: String,
    pub realized_pnl: String,
    pub commission: String,
    pub commission_asset: String,
    pub time: i64,
    pub maker: bool,
    #[serde(default)]
    pub position_side: Option<String>,
}

/// GET /api/v3/account
#[derive(Debug, Clone, Deserialize)]
pub struct SpotAccount {
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

/// GET /fapi/v2/balance
#[derive(Debug, Clone, Deserialize)]
pub struct FuturesBalance {
    pub asset: String,
    pub balance: String,
}

/// GET /fapi/v2/positionRisk
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: String,
}

/// GET /fapi/v1/income
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeRecord {
    #[serde(default)]
    pub symbol: String,
    pub income_type: String,
}
