use chrono::Utc;
use thiserror::Error;

use crate::api::{ApiError, CredentialCipher, ExchangeClient, ExchangeConnector, FetchTradesRequest, RawTrade};
use crate::db::{api_keys, sync_history, trades, Database};
use crate::models::{ApiKeyRecord, Direction, MarketType, SyncResult, Trade, TradeSource};

const PAGE_SIZE: u32 = 1000;
/// Stops a cursor chain that never runs out
const MAX_PAGES_PER_SYMBOL: usize = 100;
/// Fills this close to the start of a run may not be queryable yet
const SETTLE_MARGIN_MS: i64 = 60_000;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No API keys saved for {0}")]
    KeysNotFound(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub market_type: MarketType,
    /// Explicit symbols; discovered from the account when None
    pub symbols: Option<Vec<String>>,
    /// Unix milliseconds; the stored cursor for this key and market when None
    pub since: Option<i64>,
}

/// How far one symbol's history was read.
#[derive(Debug, Default)]
struct SymbolProgress {
    /// Newest fill time seen, whether newly stored or already present
    newest_fill: Option<i64>,
    /// False when a cursor chain stopped at `MAX_PAGES_PER_SYMBOL`
    complete: bool,
}

#[derive(Debug)]
struct ImportOutcome {
    result: SyncResult,
    /// Where the next run may start; None when it must repeat this one
    cursor: Option<i64>,
}

/// Builds a journal entry from an exchange fill. A fill has one price, so entry and exit match.
pub fn map_raw_trade(user_id: i64, exchange: &str, market_type: MarketType, raw: &RawTrade) -> Trade {
    let now = Utc::now().timestamp();
    Trade {
        id: Trade::new_id(),
        user_id,
        exchange: exchange.to_string(),
        external_id: Some(raw.exchange_trade_id.clone()),
        symbol: raw.symbol.clone(),
        direction: Direction::from_side(&raw.side),
        entry_price: raw.price,
        exit_price: raw.price,
        size: raw.quantity,
        pnl: raw.pnl,
        fees: raw.fee,
        market_type,
        order_type: Some(if raw.is_maker { "LIMIT" } else { "MARKET" }.to_string()),
        notes: String::new(),
        source: TradeSource::ApiSync,
        traded_at: raw.timestamp,
        created_at: now,
        updated_at: now,
    }
}

/// Loads the user's keys for `exchange`, connects, and imports new fills.
pub async fn sync_trades(
    db: &Database,
    cipher: &CredentialCipher,
    connector: &dyn ExchangeConnector,
    user_id: i64,
    exchange: &str,
    options: SyncOptions,
) -> Result<SyncResult, SyncError> {
    let key = {
        let conn = db.conn.lock().map_err(|e| SyncError::Database(e.to_string()))?;
        api_keys::get_keys(&conn, user_id, exchange)?
    }
    .ok_or_else(|| SyncError::KeysNotFound(exchange.to_string()))?;

    let api_key = cipher.decrypt(&key.api_key_enc)?;
    let api_secret = cipher.decrypt(&key.api_secret_enc)?;
    let client = connector.connect(exchange, &api_key, &api_secret)?;

    sync_with_client(db, client.as_ref(), &key, options).await
}

/// Runs one sync against an already connected client and records it in the history.
///
/// A symbol whose history cannot be fetched is skipped and reported in
/// `failed_symbols`; the run only fails as a whole when symbol discovery or
/// the database does.
pub async fn sync_with_client(
    db: &Database,
    client: &dyn ExchangeClient,
    key: &ApiKeyRecord,
    options: SyncOptions,
) -> Result<SyncResult, SyncError> {
    let started_at = Utc::now().timestamp_millis();
    let market_type = options.market_type;
    let stored_cursor = {
        let conn = db.conn.lock().map_err(|e| SyncError::Database(e.to_string()))?;
        api_keys::get_sync_cursor(&conn, &key.id, market_type)?
    };
    let since = options.since.or(stored_cursor);
    // A start later than the cursor leaves fills unread, so the cursor stays put
    let reads_from_cursor = match (options.since, stored_cursor) {
        (None, _) => true,
        (Some(since), Some(cursor)) => since <= cursor,
        (Some(_), None) => false,
    };
    let limit = client.rate_limit();
    log::debug!(
        "Starting {} {} sync for user {} from {:?} ({} req/s, burst {})",
        client.exchange_name(),
        market_type,
        key.user_id,
        since,
        limit.requests_per_second,
        limit.burst_size
    );

    let outcome = import_all(db, client, key, market_type, options.symbols, since, started_at).await;

    let conn = db.conn.lock().map_err(|e| SyncError::Database(e.to_string()))?;
    match outcome {
        Ok(ImportOutcome { result, cursor }) => {
            sync_history::record_sync(&conn, key.user_id, &key.exchange, market_type, &result, None)?;
            if let Some(cursor) = cursor.filter(|c| reads_from_cursor && Some(*c) > stored_cursor) {
                api_keys::set_sync_cursor(&conn, &key.id, market_type, cursor)?;
            }
            if result.failed_symbols.is_empty() {
                api_keys::update_last_sync(&conn, &key.id, started_at)?;
            }
            log::info!(
                "Synced {} {} for user {}: fetched {}, imported {}, duplicates {}, failed symbols {:?}",
                key.exchange,
                market_type,
                key.user_id,
                result.fetched,
                result.imported,
                result.duplicates,
                result.failed_symbols
            );
            Ok(result)
        }
        Err(e) => {
            log::error!("Sync of {} {} for user {} failed: {}", key.exchange, market_type, key.user_id, e);
            let message = e.to_string();
            sync_history::record_sync(
                &conn,
                key.user_id,
                &key.exchange,
                market_type,
                &SyncResult::default(),
                Some(&message),
            )?;
            Err(e)
        }
    }
}

async fn import_all(
    db: &Database,
    client: &dyn ExchangeClient,
    key: &ApiKeyRecord,
    market_type: MarketType,
    symbols: Option<Vec<String>>,
    since: Option<i64>,
    until: i64,
) -> Result<ImportOutcome, SyncError> {
    let symbols = match symbols {
        Some(list) if !list.is_empty() => list,
        _ => client.discover_symbols(market_type, since).await?,
    };
    log::debug!("Syncing {} symbols: {:?}", symbols.len(), symbols);

    let mut result = SyncResult::default();
    let mut newest_fill: Option<i64> = None;
    let mut unfinished: Option<i64> = None;
    let mut hold_cursor = false;
    for symbol in symbols {
        match import_symbol(db, client, key, market_type, &symbol, since, until, &mut result).await {
            Ok(progress) => {
                newest_fill = newest_fill.max(progress.newest_fill);
                if !progress.complete {
                    match progress.newest_fill.or(since) {
                        Some(reached) => unfinished = Some(unfinished.map_or(reached, |u| u.min(reached))),
                        None => hold_cursor = true,
                    }
                }
            }
            Err(SyncError::Database(message)) => return Err(SyncError::Database(message)),
            Err(e) => {
                let transient = matches!(&e, SyncError::Api(api) if api.is_transient());
                log::warn!(
                    "Skipping {} after {} error: {}",
                    symbol,
                    if transient { "transient" } else { "permanent" },
                    e
                );
                result.errors.push(format!("{}: {}", symbol, e));
                result.failed_symbols.push(symbol);
            }
        }
    }

    // Failed symbols are retried from the old cursor next time
    let cursor = if hold_cursor || !result.failed_symbols.is_empty() {
        None
    } else if let Some(reached) = unfinished {
        Some(reached)
    } else {
        Some(newest_fill.unwrap_or(i64::MIN).max(until - SETTLE_MARGIN_MS))
    };
    Ok(ImportOutcome { result, cursor })
}

/// Reads one symbol from `since` up to `until`.
///
/// Exchanges that bound a time-range query are walked one window at a time.
/// A full page switches to cursor paging, which runs to the newest fill.
#[allow(clippy::too_many_arguments)]
async fn import_symbol(
    db: &Database,
    client: &dyn ExchangeClient,
    key: &ApiKeyRecord,
    market_type: MarketType,
    symbol: &str,
    since: Option<i64>,
    until: i64,
    result: &mut SyncResult,
) -> Result<SymbolProgress, SyncError> {
    let window = client.history_window(market_type);
    let mut progress = SymbolProgress::default();
    let mut window_start = since;

    loop {
        let window_end = match (window_start, window) {
            (Some(start), _) if start > until => {
                progress.complete = true;
                return Ok(progress);
            }
            (Some(start), Some(window)) => Some(start.saturating_add(window - 1).min(until)),
            _ => None,
        };

        let mut cursor: Option<String> = None;
        let mut pages = 0;
        loop {
            let followed_cursor = cursor.is_some();
            let page = client
                .fetch_trades(FetchTradesRequest {
                    market_type,
                    symbol: symbol.to_string(),
                    start_time: window_start,
                    end_time: window_end,
                    cursor: cursor.take(),
                    limit: PAGE_SIZE,
                })
                .await?;
            pages += 1;
            store_page(db, client, key, market_type, &page.trades, result, &mut progress)?;

            match page.next_cursor {
                Some(next) if pages < MAX_PAGES_PER_SYMBOL => cursor = Some(next),
                Some(_) => {
                    log::warn!("Stopped paging {} after {} pages", symbol, MAX_PAGES_PER_SYMBOL);
                    return Ok(progress);
                }
                // Cursor pages ignore the window, so the chain ended at the newest fill
                None if followed_cursor => {
                    progress.complete = true;
                    return Ok(progress);
                }
                None => break,
            }
        }

        match window_end {
            Some(end) if end < until => window_start = Some(end + 1),
            _ => {
                progress.complete = true;
                return Ok(progress);
            }
        }
    }
}

fn store_page(
    db: &Database,
    client: &dyn ExchangeClient,
    key: &ApiKeyRecord,
    market_type: MarketType,
    fills: &[RawTrade],
    result: &mut SyncResult,
    progress: &mut SymbolProgress,
) -> Result<(), SyncError> {
    let conn = db.conn.lock().map_err(|e| SyncError::Database(e.to_string()))?;
    for raw in fills {
        result.fetched += 1;
        let trade = map_raw_trade(key.user_id, client.exchange_name(), market_type, raw);
        if trades::insert_trade_if_new(&conn, &trade)? {
            result.imported += 1;
        } else {
            result.duplicates += 1;
        }
        progress.newest_fill = progress.newest_fill.max(Some(raw.timestamp));
    }
    Ok(())
}
