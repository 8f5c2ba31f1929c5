use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{sql_text_enum, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Exchange fills report BUY/SELL; a buy is booked as a long.
    pub fn from_side(side: &str) -> Self {
        if side.eq_ignore_ascii_case("buy") {
            Direction::Long
        } else {
            Direction::Short
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Direction::Long),
            "SHORT" | "SELL" => Ok(Direction::Short),
            _ => Err(ParseEnumError {
                kind: "direction",
                value: s.to_string(),
            }),
        }
    }
}

sql_text_enum!(Direction);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketType {
    #[serde(alias = "spot")]
    Spot,
    #[default]
    #[serde(alias = "FUTURE", alias = "future", alias = "futures")]
    Futures,
}

impl MarketType {
    pub const ALL: [MarketType; 2] = [MarketType::Spot, MarketType::Futures];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "SPOT",
            MarketType::Futures => "FUTURES",
        }
    }
}

impl FromStr for MarketType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SPOT" => Ok(MarketType::Spot),
            "FUTURES" | "FUTURE" => Ok(MarketType::Futures),
            _ => Err(ParseEnumError {
                kind: "market type",
                value: s.to_string(),
            }),
        }
    }
}

sql_text_enum!(MarketType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSource {
    Manual,
    ApiSync,
}

impl TradeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSource::Manual => "MANUAL",
            TradeSource::ApiSync => "API_SYNC",
        }
    }
}

impl FromStr for TradeSource {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(TradeSource::Manual),
            "API_SYNC" => Ok(TradeSource::ApiSync),
            _ => Err(ParseEnumError {
                kind: "trade source",
                value: s.to_string(),
            }),
        }
    }
}

sql_text_enum!(TradeSource);

/// A journal entry as stored in the `trades` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: i64,
    pub exchange: String,
    /// Exchange trade id, used for de-duplication of synced fills
    pub external_id: Option<String>,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub fees: f64,
    pub market_type: MarketType,
    pub order_type: Option<String>,
    pub notes: String,
    pub source: TradeSource,
    /// Unix milliseconds
    pub traded_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Trade {
    pub fn new_id() -> String {
        format!("TRADE-{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4())
    }

    /// The id shown to clients: the exchange id when the trade was synced.
    pub fn display_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.id)
    }

    pub fn traded_at_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.traded_at).unwrap_or_default()
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Response shape for journal listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub id: String,
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub direction: Direction,
    pub date: DateTime<Utc>,
    pub pnl: f64,
    pub fees: f64,
    pub order_type: Option<String>,
    pub market_type: MarketType,
    pub notes: String,
    pub exchange: String,
    pub source: TradeSource,
}

impl From<&Trade> for TradeView {
    fn from(trade: &Trade) -> Self {
        TradeView {
            id: trade.display_id().to_string(),
            symbol: trade.symbol.clone(),
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            size: trade.size,
            direction: trade.direction,
            date: trade.traded_at_utc(),
            pnl: trade.pnl,
            fees: trade.fees,
            order_type: trade.order_type.clone(),
            market_type: trade.market_type,
            notes: trade.notes.clone(),
            exchange: trade.exchange.clone(),
            source: trade.source,
        }
    }
}

/// Loosely-typed trade details a client may send for AI analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TradeSnapshot {
    pub symbol: String,
    #[serde(alias = "side")]
    pub direction: Option<String>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub size: Option<f64>,
    pub pnl: Option<f64>,
    pub fees: Option<f64>,
    pub date: Option<String>,
    pub notes: Option<String>,
}

impl From<&TradeView> for TradeSnapshot {
    fn from(view: &TradeView) -> Self {
        TradeSnapshot {
            symbol: view.symbol.clone(),
            direction: Some(view.direction.to_string()),
            entry_price: Some(view.entry_price),
            exit_price: Some(view.exit_price),
            size: Some(view.size),
            pnl: Some(view.pnl),
            fees: Some(view.fees),
            date: Some(view.date.to_rfc3339()),
            notes: Some(view.notes.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeInput {
    pub user_id: i64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    /// Computed from prices when omitted
    pub pnl: Option<f64>,
    pub fees: Option<f64>,
    #[serde(default)]
    pub market_type: MarketType,
    pub order_type: Option<String>,
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

impl CreateTradeInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol is required".to_string());
        }
        for (name, value) in [
            ("entryPrice", self.entry_price),
            ("exitPrice", self.exit_price),
            ("size", self.size),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be a positive number", name));
            }
        }
        if let Some(fees) = self.fees {
            if !fees.is_finite() || fees < 0.0 {
                return Err("fees must not be negative".to_string());
            }
        }
        Ok(())
    }

    pub fn resolved_pnl(&self) -> f64 {
        self.pnl.unwrap_or_else(|| {
            let fees = self.fees.unwrap_or(0.0);
            let gross = match self.direction {
                Direction::Long => (self.exit_price - self.entry_price) * self.size,
                Direction::Short => (self.entry_price - self.exit_price) * self.size,
            };
            gross - fees
        })
    }

    pub fn into_trade(self) -> Trade {
        let now = Utc::now();
        let pnl = self.resolved_pnl();
        Trade {
            id: Trade::new_id(),
            user_id: self.user_id,
            exchange: "manual".to_string(),
            external_id: None,
            symbol: self.symbol.trim().to_uppercase(),
            direction: self.direction,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            size: self.size,
            pnl,
            fees: self.fees.unwrap_or(0.0),
            market_type: self.market_type,
            order_type: self.order_type,
            notes: self.notes,
            source: TradeSource::Manual,
            traded_at: self.date.unwrap_or(now).timestamp_millis(),
            created_at: now.timestamp(),
            updated_at: now.timestamp(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TradeFilters {
    pub market_type: Option<MarketType>,
    /// Only trades at or after this instant (Unix milliseconds)
    pub since: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(direction: Direction, entry: f64, exit: f64) -> CreateTradeInput {
        CreateTradeInput {
            user_id: 1,
            symbol: " btcusdt ".to_string(),
            direction,
            entry_price: entry,
            exit_price: exit,
            size: 2.0,
            pnl: None,
            fees: Some(1.5),
            market_type: MarketType::Futures,
            order_type: None,
            date: None,
            notes: String::new(),
        }
    }

    #[test]
    fn test_pnl_computed_from_direction() {
        assert_eq!(input(Direction::Long, 100.0, 110.0).resolved_pnl(), 18.5);
        assert_eq!(input(Direction::Short, 100.0, 110.0).resolved_pnl(), -21.5);
    }

    #[test]
    fn test_explicit_pnl_wins() {
        let mut i = input(Direction::Long, 100.0, 110.0);
        i.pnl = Some(-3.0);
        assert_eq!(i.resolved_pnl(), -3.0);
    }

    #[test]
    fn test_validate_rejects_non_positive_values() {
        let mut i = input(Direction::Long, 100.0, 110.0);
        assert!(i.validate().is_ok());
        i.size = 0.0;
        assert_eq!(i.validate().unwrap_err(), "size must be a positive number");
        i.size = 1.0;
        i.entry_price = f64::NAN;
        assert!(i.validate().is_err());
    }

    #[test]
    fn test_into_trade_normalizes_symbol() {
        let trade = input(Direction::Long, 100.0, 110.0).into_trade();
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.source, TradeSource::Manual);
        assert_eq!(trade.display_id(), trade.id);
        assert!(trade.id.starts_with("TRADE-"));
    }

    #[test]
    fn test_market_type_parsing() {
        assert_eq!("futures".parse::<MarketType>().unwrap(), MarketType::Futures);
        assert_eq!("FUTURE".parse::<MarketType>().unwrap(), MarketType::Futures);
        assert_eq!("Spot".parse::<MarketType>().unwrap(), MarketType::Spot);
        assert!("margin".parse::<MarketType>().is_err());
    }

    #[test]
    fn test_view_uses_external_id() {
        let mut trade = input(Direction::Short, 10.0, 9.0).into_trade();
        trade.external_id = Some("884123".to_string());
        let view = TradeView::from(&trade);
        assert_eq!(view.id, "884123");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["direction"], "SHORT");
        assert!(json.get("entryPrice").is_some());
    }
}
