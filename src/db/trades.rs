use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Trade, TradeFilters};

const TRADE_COLUMNS: &str = "id, user_id, exchange, external_id, symbol, direction, entry_price, exit_price, \
     size, pnl, fees, market_type, order_type, notes, source, traded_at, created_at, updated_at";

/// Maps a row selected with `TRADE_COLUMNS` to a Trade.
fn map_row_to_trade(row: &Row) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        exchange: row.get("exchange")?,
        external_id: row.get("external_id")?,
        symbol: row.get("symbol")?,
        direction: row.get("direction")?,
        entry_price: row.get("entry_price")?,
        exit_price: row.get("exit_price")?,
        size: row.get("size")?,
        pnl: row.get("pnl")?,
        fees: row.get("fees")?,
        market_type: row.get("market_type")?,
        order_type: row.get("order_type")?,
        notes: row.get("notes")?,
        source: row.get("source")?,
        traded_at: row.get("traded_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Newest first.
pub fn list_trades(conn: &Connection, user_id: i64, filters: &TradeFilters) -> rusqlite::Result<Vec<Trade>> {
    let mut query = format!("SELECT {} FROM trades WHERE user_id = ?", TRADE_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];

    if let Some(market_type) = filters.market_type {
        query.push_str(" AND market_type = ?");
        params.push(Box::new(market_type));
    }
    if let Some(since) = filters.since {
        query.push_str(" AND traded_at >= ?");
        params.push(Box::new(since));
    }
    query.push_str(" ORDER BY traded_at DESC, created_at DESC");

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query)?;
    let trades = stmt
        .query_map(param_refs.as_slice(), map_row_to_trade)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(trades)
}

/// Internal ids of the user's trades that `id` addresses.
///
/// An internal id matches at most one row. Exchange ids only repeat within a
/// symbol and market, so one can match several trades.
pub fn find_trade_ids(conn: &Connection, user_id: i64, id: &str) -> rusqlite::Result<Vec<String>> {
    let internal: Option<String> = conn
        .query_row(
            "SELECT id FROM trades WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(internal) = internal {
        return Ok(vec![internal]);
    }

    let mut stmt =
        conn.prepare("SELECT id FROM trades WHERE user_id = ?1 AND external_id = ?2 ORDER BY traded_at, id")?;
    let ids = stmt
        .query_map(params![user_id, id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

pub fn get_trade(conn: &Connection, user_id: i64, id: &str) -> rusqlite::Result<Option<Trade>> {
    conn.query_row(
        &format!("SELECT {} FROM trades WHERE user_id = ?1 AND id = ?2", TRADE_COLUMNS),
        params![user_id, id],
        map_row_to_trade,
    )
    .optional()
}

pub fn insert_trade(conn: &Connection, trade: &Trade) -> rusqlite::Result<()> {
    insert(conn, trade, "")?;
    Ok(())
}

/// Inserts a synced trade; returns false when the user already holds this exchange fill.
pub fn insert_trade_if_new(conn: &Connection, trade: &Trade) -> rusqlite::Result<bool> {
    let inserted = insert(
        conn,
        trade,
        " ON CONFLICT (user_id, exchange, market_type, symbol, external_id) DO NOTHING",
    )?;
    Ok(inserted == 1)
}

fn insert(conn: &Connection, trade: &Trade, conflict_clause: &str) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO trades ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18){}",
            TRADE_COLUMNS, conflict_clause
        ),
        params![
            trade.id,
            trade.user_id,
            trade.exchange,
            trade.external_id,
            trade.symbol,
            trade.direction,
            trade.entry_price,
            trade.exit_price,
            trade.size,
            trade.pnl,
            trade.fees,
            trade.market_type,
            trade.order_type,
            trade.notes,
            trade.source,
            trade.traded_at,
            trade.created_at,
            trade.updated_at,
        ],
    )
}

pub fn update_notes(conn: &Connection, user_id: i64, id: &str, notes: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE trades SET notes = ?1, updated_at = ?2 WHERE user_id = ?3 AND id = ?4",
        params![notes, chrono::Utc::now().timestamp(), user_id, id],
    )
}

pub fn delete_trade(conn: &Connection, user_id: i64, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM trades WHERE user_id = ?1 AND id = ?2",
        params![user_id, id],
    )
}
