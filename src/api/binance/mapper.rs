use std::collections::BTreeSet;

use super::types::{FuturesTrade, IncomeRecord, PositionRisk, SpotBalance, SpotTrade};
use crate::api::client::RawTrade;

pub const QUOTE_ASSET: &str = "USDT";

fn parse_number(field: &str, value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|e| format!("Invalid {} '{}': {}", field, value, e))
}

pub fn map_spot_trade(trade: &SpotTrade) -> Result<RawTrade, String> {
    Ok(RawTrade {
        exchange_trade_id: trade.id.to_string(),
        exchange_order_id: trade.order_id.to_string(),
        symbol: trade.symbol.clone(),
        side: if trade.is_buyer { "BUY" } else { "SELL" }.to_string(),
        price: parse_number("price", &trade.price)?,
        quantity: parse_number("qty", &trade.qty)?,
        pnl: 0.0,
        fee: parse_number("commission", &trade.commission)?.abs(),
        is_maker: trade.is_maker,
        timestamp: trade.time,
    })
}

pub fn map_futures_trade(trade: &FuturesTrade) -> Result<RawTrade, String> {
    Ok(RawTrade {
        exchange_trade_id: trade.id.to_string(),
        exchange_order_id: trade.order_id.to_string(),
        symbol: trade.symbol.clone(),
        side: trade.side.to_uppercase(),
        price: parse_number("price", &trade.price)?,
        quantity: parse_number("qty", &trade.qty)?,
        pnl: parse_number("realizedPnl", &trade.realized_pnl)?,
        fee: parse_number("commission", &trade.commission)?.abs(),
        is_maker: trade.maker,
        timestamp: trade.time,
    })
}

/// Assets with a non-zero balance, paired with the USDT quote.
pub fn spot_symbols_from_balances(balances: &[SpotBalance]) -> Vec<String> {
    balances
        .iter()
        .filter(|b| b.asset != QUOTE_ASSET)
        .filter(|b| {
            let free = b.free.parse::<f64>().unwrap_or(0.0);
            let locked = b.locked.parse::<f64>().unwrap_or(0.0);
            free + locked > 0.0
        })
        .map(|b| format!("{}{}", b.asset, QUOTE_ASSET))
        .collect()
}

/// Union of symbols with income history and symbols with an open position, sorted.
pub fn futures_symbols(income: &[IncomeRecord], positions: &[PositionRisk]) -> Vec<String> {
    let mut symbols = BTreeSet::new();
    for record in income {
        if !record.symbol.is_empty() {
            symbols.insert(record.symbol.clone());
        }
    }
    for position in positions {
        if position.position_amt.parse::<f64>().unwrap_or(0.0) != 0.0 {
            symbols.insert(position.symbol.clone());
        }
    }
    symbols.into_iter().collect()
}
