use chrono::NaiveDate;

use crate::models::{PositionSizeInput, PositionSizeResult, RiskSettings, RiskStatus, Trade};

/// Evaluates today's trading against the daily limits.
///
/// Only trades of `settings.market_type` whose UTC calendar date is `today`
/// count. The lock engages when today's PnL is at or below the negative loss
/// limit, or when the trade count has reached the maximum. A reached profit
/// target is reported but does not lock.
pub fn evaluate(settings: &RiskSettings, trades: &[Trade], today: NaiveDate) -> RiskStatus {
    let (today_pnl, today_trades) = trades
        .iter()
        .filter(|t| t.market_type == settings.market_type && t.traded_at_utc().date_naive() == today)
        .fold((0.0, 0_i64), |(pnl, count), t| (pnl + t.pnl, count + 1));

    let loss_limit = settings.max_daily_loss.abs();
    let loss_limit_breached = today_pnl <= -loss_limit;
    let trade_limit_breached = today_trades >= settings.max_daily_trades;
    let profit_target_reached = settings.max_daily_profit > 0.0 && today_pnl >= settings.max_daily_profit;

    let reason = if loss_limit_breached {
        Some(format!(
            "Daily loss limit reached: {:.2} of -{:.2}",
            today_pnl, loss_limit
        ))
    } else if trade_limit_breached {
        Some(format!(
            "Daily trade limit reached: {} of {}",
            today_trades, settings.max_daily_trades
        ))
    } else {
        None
    };

    RiskStatus {
        market_type: settings.market_type,
        date: today,
        today_pnl,
        today_trades,
        max_daily_loss: loss_limit,
        max_daily_trades: settings.max_daily_trades,
        remaining_loss_budget: (loss_limit + today_pnl).max(0.0),
        trades_left: (settings.max_daily_trades - today_trades).max(0),
        loss_limit_breached,
        trade_limit_breached,
        profit_target_reached,
        locked: loss_limit_breached || trade_limit_breached,
        reason,
    }
}

/// Sizes a position so that hitting the stop loses `risk_percent` of `balance`.
pub fn position_size(input: &PositionSizeInput) -> Result<PositionSizeResult, String> {
    if !input.balance.is_finite() || input.balance <= 0.0 {
        return Err("balance must be positive".to_string());
    }
    if !input.risk_percent.is_finite() || input.risk_percent <= 0.0 || input.risk_percent > 100.0 {
        return Err("riskPercent must be between 0 and 100".to_string());
    }
    if input.entry_price <= 0.0 || input.stop_loss <= 0.0 {
        return Err("entryPrice and stopLoss must be positive".to_string());
    }

    let risk_per_unit = (input.entry_price - input.stop_loss).abs();
    if risk_per_unit == 0.0 {
        return Err("entryPrice and stopLoss must differ".to_string());
    }

    let risk_amount = input.balance * input.risk_percent / 100.0;
    let units = risk_amount / risk_per_unit;
    let reward_per_unit = input
        .take_profit
        .map(|tp| (tp - input.entry_price).abs())
        .unwrap_or(0.0);

    Ok(PositionSizeResult {
        position_size_units: units,
        position_size_money: units * input.entry_price,
        risk_amount,
        potential_reward: reward_per_unit * units,
        risk_reward_ratio: reward_per_unit / risk_per_unit,
    })
}
