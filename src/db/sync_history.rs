use rusqlite::{params, Connection};

use crate::models::{MarketType, SyncHistory, SyncResult};

const HISTORY_LIMIT: i64 = 50;

pub fn record_sync(
    conn: &Connection,
    user_id: i64,
    exchange: &str,
    market_type: MarketType,
    result: &SyncResult,
    error_message: Option<&str>,
) -> rusqlite::Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let status = match (error_message, result.failed_symbols.is_empty()) {
        (Some(_), _) => "failed",
        (None, false) => "partial",
        (None, true) => "success",
    };
    let failed_symbols = serde_json::to_string(&result.failed_symbols)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT INTO sync_history (id, user_id, exchange, market_type, trades_fetched, trades_imported,
                                   trades_duplicated, failed_symbols, status, error_message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            user_id,
            exchange,
            market_type,
            result.fetched,
            result.imported,
            result.duplicates,
            failed_symbols,
            status,
            error_message,
            chrono::Utc::now().timestamp(),
        ],
    )?;
    Ok(id)
}

/// Most recent runs first.
pub fn list_history(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<SyncHistory>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, exchange, market_type, trades_fetched, trades_imported, trades_duplicated,
                failed_symbols, status, error_message, created_at
         FROM sync_history WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
    )?;
    let history = stmt
        .query_map(params![user_id, HISTORY_LIMIT], |row| {
            let failed: String = row.get("failed_symbols")?;
            Ok(SyncHistory {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                exchange: row.get("exchange")?,
                market_type: row.get("market_type")?,
                trades_fetched: row.get("trades_fetched")?,
                trades_imported: row.get("trades_imported")?,
                trades_duplicated: row.get("trades_duplicated")?,
                failed_symbols: serde_json::from_str(&failed).unwrap_or_default(),
                status: row.get("status")?,
                error_message: row.get("error_message")?,
                created_at: row.get("created_at")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(history)
}
