use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_user, JsonBody, QueryParams};
use crate::api::ExchangeClient;
use crate::db::api_keys;
use crate::error::{AppError, AppResult};
use crate::models::{ApiKeySafe, MarketType, SaveKeysInput, DEFAULT_EXCHANGE};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/keys", get(list_keys).post(save_keys))
        .route("/api/keys/:exchange", delete(delete_keys))
        .route("/api/keys/:exchange/test", post(test_keys))
        .route("/api/balance", get(balance))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceQuery {
    user_id: i64,
    #[serde(default)]
    market_type: MarketType,
    exchange: Option<String>,
}

/// Decrypts the user's stored keys for `exchange` and builds a client.
pub(crate) fn connect_client(state: &AppState, user_id: i64, exchange: &str) -> AppResult<Box<dyn ExchangeClient>> {
    let record = {
        let conn = state.db.conn.lock()?;
        api_keys::get_keys(&conn, user_id, exchange)?
    }
    .ok_or_else(|| AppError::NotFound(format!("No API keys saved for {}", exchange)))?;

    let api_key = state.cipher.decrypt(&record.api_key_enc)?;
    let api_secret = state.cipher.decrypt(&record.api_secret_enc)?;
    Ok(state.connector.connect(exchange, &api_key, &api_secret)?)
}

async fn save_keys(State(state): State<AppState>, JsonBody(input): JsonBody<SaveKeysInput>) -> AppResult<Json<Value>> {
    let user_id = input.validate().map_err(AppError::BadRequest)?;
    let exchange = input.exchange();
    let api_key = input.api_key.trim();
    let label = input
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(&exchange)
        .to_string();

    let key_enc = state.cipher.encrypt(api_key)?;
    let secret_enc = state.cipher.encrypt(input.api_secret.trim())?;

    let record = {
        let conn = state.db.conn.lock()?;
        require_user(&conn, user_id)?;
        api_keys::upsert_keys(&conn, user_id, &exchange, &label, &key_enc, &secret_enc)?
    };

    log::info!("Saved {} API keys for user {}", exchange, user_id);
    Ok(Json(json!({
        "message": "API keys saved",
        "key": record.to_safe(api_key),
    })))
}

async fn list_keys(State(state): State<AppState>, QueryParams(query): QueryParams<UserQuery>) -> AppResult<Json<Value>> {
    let records = {
        let conn = state.db.conn.lock()?;
        api_keys::list_keys(&conn, query.user_id)?
    };

    let keys: Vec<ApiKeySafe> = records
        .iter()
        .map(|record| match state.cipher.decrypt(&record.api_key_enc) {
            Ok(plain) => record.to_safe(&plain),
            Err(e) => {
                log::warn!("Could not decrypt {} key {}: {}", record.exchange, record.id, e);
                let mut safe = record.to_safe("");
                safe.api_key_preview = "****".to_string();
                safe
            }
        })
        .collect();
    Ok(Json(json!({ "keys": keys })))
}

async fn delete_keys(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    QueryParams(query): QueryParams<UserQuery>,
) -> AppResult<Json<Value>> {
    let exchange = exchange.to_lowercase();
    let conn = state.db.conn.lock()?;
    if api_keys::delete_keys(&conn, query.user_id, &exchange)? == 0 {
        return Err(AppError::NotFound(format!("No API keys saved for {}", exchange)));
    }
    log::info!("Deleted {} API keys for user {}", exchange, query.user_id);
    Ok(Json(json!({ "message": "API keys deleted" })))
}

async fn test_keys(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    JsonBody(query): JsonBody<UserQuery>,
) -> AppResult<Json<Value>> {
    let client = connect_client(&state, query.user_id, &exchange.to_lowercase())?;
    let valid = client.test_credentials().await?;
    Ok(Json(json!({ "valid": valid })))
}

async fn balance(State(state): State<AppState>, QueryParams(query): QueryParams<BalanceQuery>) -> AppResult<Json<Value>> {
    let exchange = query
        .exchange
        .as_deref()
        .unwrap_or(DEFAULT_EXCHANGE)
        .to_lowercase();
    let client = connect_client(&state, query.user_id, &exchange)?;
    let balance = client.fetch_balance(query.market_type).await?;
    Ok(Json(json!({ "balance": balance, "marketType": query.market_type })))
}
