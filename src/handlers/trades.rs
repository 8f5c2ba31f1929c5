use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_user, JsonBody, QueryParams};
use crate::analytics::DateRange;
use crate::db::trades;
use crate::error::{AppError, AppResult};
use crate::models::{CreateTradeInput, MarketType, TradeFilters, TradeView};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/trades", get(list_trades).post(create_trade))
        .route("/api/trades/export", get(export_trades))
        .route("/api/trades/:id", patch(update_notes).delete(delete_trade))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesQuery {
    pub user_id: i64,
    pub market_type: Option<MarketType>,
    pub date_range: Option<String>,
}

impl TradesQuery {
    pub fn filters(&self) -> AppResult<TradeFilters> {
        let range: DateRange = self
            .date_range
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|e: crate::models::ParseEnumError| AppError::BadRequest(e.to_string()))?;
        Ok(TradeFilters {
            market_type: self.market_type,
            since: range.threshold(Utc::now()),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateNotesInput {
    user_id: i64,
    #[serde(default)]
    notes: String,
}

async fn list_trades(State(state): State<AppState>, QueryParams(query): QueryParams<TradesQuery>) -> AppResult<Json<Value>> {
    let filters = query.filters()?;
    let conn = state.db.conn.lock()?;
    let trades = trades::list_trades(&conn, query.user_id, &filters)?;
    let views: Vec<TradeView> = trades.iter().map(TradeView::from).collect();
    Ok(Json(json!({ "trades": views })))
}

async fn create_trade(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateTradeInput>,
) -> AppResult<(StatusCode, Json<TradeView>)> {
    input.validate().map_err(AppError::BadRequest)?;

    let conn = state.db.conn.lock()?;
    require_user(&conn, input.user_id)?;
    let trade = input.into_trade();
    trades::insert_trade(&conn, &trade)?;

    log::info!("Recorded manual {} trade {} for user {}", trade.symbol, trade.id, trade.user_id);
    Ok((StatusCode::CREATED, Json(TradeView::from(&trade))))
}

/// Maps a client-visible trade id to exactly one stored trade.
pub(crate) fn resolve_trade_id(conn: &Connection, user_id: i64, id: &str) -> AppResult<String> {
    let mut ids = trades::find_trade_ids(conn, user_id, id)?;
    match ids.len() {
        0 => Err(AppError::NotFound(format!("Trade {} not found", id))),
        1 => Ok(ids.remove(0)),
        n => Err(AppError::Conflict(format!(
            "Trade id {} matches {} trades; use one of: {}",
            id,
            n,
            ids.join(", ")
        ))),
    }
}

async fn update_notes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<UpdateNotesInput>,
) -> AppResult<Json<TradeView>> {
    let conn = state.db.conn.lock()?;
    let trade_id = resolve_trade_id(&conn, input.user_id, &id)?;
    trades::update_notes(&conn, input.user_id, &trade_id, &input.notes)?;
    let trade = trades::get_trade(&conn, input.user_id, &trade_id)?
        .ok_or_else(|| AppError::NotFound(format!("Trade {} not found", id)))?;
    Ok(Json(TradeView::from(&trade)))
}

async fn delete_trade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    QueryParams(query): QueryParams<UserQuery>,
) -> AppResult<Json<Value>> {
    let conn = state.db.conn.lock()?;
    let trade_id = resolve_trade_id(&conn, query.user_id, &id)?;
    trades::delete_trade(&conn, query.user_id, &trade_id)?;
    log::info!("Deleted trade {} for user {}", trade_id, query.user_id);
    Ok(Json(json!({ "message": "Trade deleted" })))
}

fn trades_to_csv(views: &[TradeView]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for view in views {
        writer
            .serialize(view)
            .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finish CSV: {}", e)))
}

async fn export_trades(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<TradesQuery>,
) -> AppResult<impl IntoResponse> {
    let filters = query.filters()?;
    let views: Vec<TradeView> = {
        let conn = state.db.conn.lock()?;
        trades::list_trades(&conn, query.user_id, &filters)?
            .iter()
            .map(TradeView::from)
            .collect()
    };
    let body = trades_to_csv(&views)?;
    let filename = format!("trades_{}.csv", Utc::now().format("%Y%m%d"));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        body,
    ))
}
