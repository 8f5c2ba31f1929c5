use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{JsonBody, QueryParams};
use crate::api::binance::normalize_symbol;
use crate::db::sync_history;
use crate::error::AppResult;
use crate::models::{SyncRequest, SyncResult, DEFAULT_EXCHANGE};
use crate::server::AppState;
use crate::sync::{sync_trades, SyncOptions};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync", post(sync))
        .route("/api/sync/history", get(history))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: i64,
}

async fn sync(State(state): State<AppState>, JsonBody(request): JsonBody<SyncRequest>) -> AppResult<Json<SyncResult>> {
    let exchange = request
        .exchange
        .as_deref()
        .unwrap_or(DEFAULT_EXCHANGE)
        .to_lowercase();
    let symbols = request.symbols.map(|symbols| {
        symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    });

    log::info!(
        "Manual {} sync requested by user {} for {}",
        request.market_type,
        request.user_id,
        exchange
    );
    let result = sync_trades(
        &state.db,
        &state.cipher,
        state.connector.as_ref(),
        request.user_id,
        &exchange,
        SyncOptions {
            market_type: request.market_type,
            symbols,
            since: request.since,
        },
    )
    .await?;
    Ok(Json(result))
}

async fn history(State(state): State<AppState>, QueryParams(query): QueryParams<UserQuery>) -> AppResult<Json<Value>> {
    let conn = state.db.conn.lock()?;
    let history = sync_history::list_history(&conn, query.user_id)?;
    Ok(Json(json!({ "history": history })))
}
