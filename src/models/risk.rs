use serde::{Deserialize, Serialize};

use super::MarketType;

pub const DEFAULT_MAX_DAILY_LOSS: f64 = 100.0;
pub const DEFAULT_MAX_DAILY_TRADES: i64 = 5;
pub const DEFAULT_MAX_RISK_PER_TRADE_PERCENT: f64 = 1.0;

/// Daily limits for one user and market. A `max_daily_profit` of 0 means no target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSettings {
    pub user_id: i64,
    pub market_type: MarketType,
    pub max_daily_loss: f64,
    pub max_daily_profit: f64,
    pub max_daily_trades: i64,
    pub max_risk_per_trade_percent: f64,
    pub starting_balance: f64,
    pub updated_at: i64,
}

impl RiskSettings {
    pub fn defaults(user_id: i64, market_type: MarketType) -> Self {
        Self {
            user_id,
            market_type,
            max_daily_loss: DEFAULT_MAX_DAILY_LOSS,
            max_daily_profit: 0.0,
            max_daily_trades: DEFAULT_MAX_DAILY_TRADES,
            max_risk_per_trade_percent: DEFAULT_MAX_RISK_PER_TRADE_PERCENT,
            starting_balance: 0.0,
            updated_at: 0,
        }
    }

    pub fn apply(&mut self, input: &UpdateRiskSettingsInput) {
        if let Some(v) = input.max_daily_loss {
            self.max_daily_loss = v;
        }
        if let Some(v) = input.max_daily_profit {
            self.max_daily_profit = v;
        }
        if let Some(v) = input.max_daily_trades {
            self.max_daily_trades = v;
        }
        if let Some(v) = input.max_risk_per_trade_percent {
            self.max_risk_per_trade_percent = v;
        }
        if let Some(v) = input.starting_balance {
            self.starting_balance = v;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("maxDailyLoss", self.max_daily_loss),
            ("maxDailyProfit", self.max_daily_profit),
            ("maxRiskPerTradePercent", self.max_risk_per_trade_percent),
            ("startingBalance", self.starting_balance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must not be negative", name));
            }
        }
        if self.max_risk_per_trade_percent > 100.0 {
            return Err("maxRiskPerTradePercent must be at most 100".to_string());
        }
        if self.max_daily_trades < 1 {
            return Err("maxDailyTrades must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRiskSettingsInput {
    pub user_id: i64,
    #[serde(default)]
    pub market_type: MarketType,
    pub max_daily_loss: Option<f64>,
    pub max_daily_profit: Option<f64>,
    pub max_daily_trades: Option<i64>,
    pub max_risk_per_trade_percent: Option<f64>,
    pub starting_balance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatus {
    pub market_type: MarketType,
    pub date: chrono::NaiveDate,
    pub today_pnl: f64,
    pub today_trades: i64,
    pub max_daily_loss: f64,
    pub max_daily_trades: i64,
    /// Loss that can still be taken today before the lock
    pub remaining_loss_budget: f64,
    pub trades_left: i64,
    pub loss_limit_breached: bool,
    pub trade_limit_breached: bool,
    pub profit_target_reached: bool,
    pub locked: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSizeInput {
    pub balance: f64,
    pub risk_percent: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSizeResult {
    pub position_size_units: f64,
    pub position_size_money: f64,
    pub risk_amount: f64,
    pub potential_reward: f64,
    pub risk_reward_ratio: f64,
}
