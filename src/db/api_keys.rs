use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{ApiKeyRecord, MarketType};

const KEY_COLUMNS: &str = "id, user_id, exchange, label, api_key_enc, api_secret_enc, is_active, \
     last_sync_timestamp, created_at, updated_at";

fn map_row_to_key(row: &Row) -> rusqlite::Result<ApiKeyRecord> {
    Ok(ApiKeyRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        exchange: row.get("exchange")?,
        label: row.get("label")?,
        api_key_enc: row.get("api_key_enc")?,
        api_secret_enc: row.get("api_secret_enc")?,
        is_active: row.get("is_active")?,
        last_sync_timestamp: row.get("last_sync_timestamp")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// One row per (user, exchange): saving again replaces the stored pair and reactivates it.
///
/// The new pair may belong to another exchange account, so its sync state
/// starts over and the next sync reads the whole history again.
pub fn upsert_keys(
    conn: &Connection,
    user_id: i64,
    exchange: &str,
    label: &str,
    api_key_enc: &str,
    api_secret_enc: &str,
) -> rusqlite::Result<ApiKeyRecord> {
    let now = chrono::Utc::now().timestamp();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO api_keys (id, user_id, exchange, label, api_key_enc, api_secret_enc, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
         ON CONFLICT (user_id, exchange) DO UPDATE SET
            label = excluded.label,
            api_key_enc = excluded.api_key_enc,
            api_secret_enc = excluded.api_secret_enc,
            is_active = 1,
            last_sync_timestamp = NULL,
            updated_at = excluded.updated_at",
        params![
            uuid::Uuid::new_v4().to_string(),
            user_id,
            exchange,
            label,
            api_key_enc,
            api_secret_enc,
            now
        ],
    )?;
    tx.execute(
        "DELETE FROM sync_cursors WHERE key_id IN (SELECT id FROM api_keys WHERE user_id = ?1 AND exchange = ?2)",
        params![user_id, exchange],
    )?;
    tx.commit()?;

    get_keys(conn, user_id, exchange)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_keys(conn: &Connection, user_id: i64, exchange: &str) -> rusqlite::Result<Option<ApiKeyRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM api_keys WHERE user_id = ?1 AND exchange = ?2", KEY_COLUMNS),
        params![user_id, exchange],
        map_row_to_key,
    )
    .optional()
}

pub fn list_keys(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<ApiKeyRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM api_keys WHERE user_id = ?1 ORDER BY exchange",
        KEY_COLUMNS
    ))?;
    let keys = stmt
        .query_map([user_id], map_row_to_key)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
}

/// Every active key across users, for background sync.
pub fn list_active_keys(conn: &Connection) -> rusqlite::Result<Vec<ApiKeyRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM api_keys WHERE is_active = 1 ORDER BY user_id, exchange",
        KEY_COLUMNS
    ))?;
    let keys = stmt
        .query_map([], map_row_to_key)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
}

pub fn delete_keys(conn: &Connection, user_id: i64, exchange: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM api_keys WHERE user_id = ?1 AND exchange = ?2",
        params![user_id, exchange],
    )
}

/// Records when the key last finished a sync without failed symbols, in Unix milliseconds.
pub fn update_last_sync(conn: &Connection, id: &str, timestamp: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE api_keys SET last_sync_timestamp = ?1, updated_at = ?2 WHERE id = ?3",
        params![timestamp, chrono::Utc::now().timestamp(), id],
    )?;
    Ok(())
}

/// Where the next sync of `market_type` starts, in Unix milliseconds.
pub fn get_sync_cursor(conn: &Connection, key_id: &str, market_type: MarketType) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT last_fill_timestamp FROM sync_cursors WHERE key_id = ?1 AND market_type = ?2",
        params![key_id, market_type],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_sync_cursor(conn: &Connection, key_id: &str, market_type: MarketType, timestamp: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sync_cursors (key_id, market_type, last_fill_timestamp, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (key_id, market_type) DO UPDATE SET
            last_fill_timestamp = excluded.last_fill_timestamp,
            updated_at = excluded.updated_at",
        params![key_id, market_type, timestamp, chrono::Utc::now().timestamp()],
    )?;
    Ok(())
}
