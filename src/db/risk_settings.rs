use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{MarketType, RiskSettings};

/// Stored settings, or the defaults when the user never saved any.
pub fn get_risk_settings(conn: &Connection, user_id: i64, market_type: MarketType) -> rusqlite::Result<RiskSettings> {
    let stored = conn
        .query_row(
            "SELECT user_id, market_type, max_daily_loss, max_daily_profit, max_daily_trades,
                    max_risk_per_trade_percent, starting_balance, updated_at
             FROM risk_settings WHERE user_id = ?1 AND market_type = ?2",
            params![user_id, market_type],
            |row| {
                Ok(RiskSettings {
                    user_id: row.get("user_id")?,
                    market_type: row.get("market_type")?,
                    max_daily_loss: row.get("max_daily_loss")?,
                    max_daily_profit: row.get("max_daily_profit")?,
                    max_daily_trades: row.get("max_daily_trades")?,
                    max_risk_per_trade_percent: row.get("max_risk_per_trade_percent")?,
                    starting_balance: row.get("starting_balance")?,
                    updated_at: row.get("updated_at")?,
                })
            },
        )
        .optional()?;

    Ok(stored.unwrap_or_else(|| RiskSettings::defaults(user_id, market_type)))
}

pub fn save_risk_settings(conn: &Connection, settings: &RiskSettings) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO risk_settings (user_id, market_type, max_daily_loss, max_daily_profit, max_daily_trades,
                                    max_risk_per_trade_percent, starting_balance, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (user_id, market_type) DO UPDATE SET
            max_daily_loss = excluded.max_daily_loss,
            max_daily_profit = excluded.max_daily_profit,
            max_daily_trades = excluded.max_daily_trades,
            max_risk_per_trade_percent = excluded.max_risk_per_trade_percent,
            starting_balance = excluded.starting_balance,
            updated_at = excluded.updated_at",
        params![
            settings.user_id,
            settings.market_type,
            settings.max_daily_loss,
            settings.max_daily_profit,
            settings.max_daily_trades,
            settings.max_risk_per_trade_percent,
            settings.starting_balance,
            settings.updated_at,
        ],
    )?;
    Ok(())
}
