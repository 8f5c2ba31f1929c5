use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_user, JsonBody, QueryParams};
use crate::analytics::{evaluate, position_size};
use crate::db::{risk_settings, trades};
use crate::error::{AppError, AppResult};
use crate::models::{
    MarketType, PositionSizeInput, PositionSizeResult, RiskSettings, RiskStatus, TradeFilters, UpdateRiskSettingsInput,
};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/risk/settings", get(get_settings).put(update_settings))
        .route("/api/risk/status", get(status))
        .route("/api/risk/check", post(pre_trade_check))
        .route("/api/risk/position-size", post(calculate_position_size))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketQuery {
    user_id: i64,
    #[serde(default)]
    market_type: MarketType,
}

/// Evaluates the limits against trades booked since UTC midnight.
fn current_status(conn: &Connection, user_id: i64, market_type: MarketType) -> AppResult<RiskStatus> {
    let now = Utc::now();
    let today = now.date_naive();
    let midnight = today
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc().timestamp_millis())
        .ok_or_else(|| AppError::Internal("Could not compute start of day".to_string()))?;

    let settings = risk_settings::get_risk_settings(conn, user_id, market_type)?;
    let todays_trades = trades::list_trades(
        conn,
        user_id,
        &TradeFilters {
            market_type: Some(market_type),
            since: Some(midnight),
        },
    )?;
    Ok(evaluate(&settings, &todays_trades, today))
}

async fn get_settings(State(state): State<AppState>, QueryParams(query): QueryParams<MarketQuery>) -> AppResult<Json<RiskSettings>> {
    let conn = state.db.conn.lock()?;
    Ok(Json(risk_settings::get_risk_settings(&conn, query.user_id, query.market_type)?))
}

async fn update_settings(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<UpdateRiskSettingsInput>,
) -> AppResult<Json<RiskSettings>> {
    let conn = state.db.conn.lock()?;
    require_user(&conn, input.user_id)?;

    let mut settings = risk_settings::get_risk_settings(&conn, input.user_id, input.market_type)?;
    settings.apply(&input);
    settings.validate().map_err(AppError::BadRequest)?;
    settings.updated_at = Utc::now().timestamp();
    risk_settings::save_risk_settings(&conn, &settings)?;

    log::info!("Updated {} risk settings for user {}", settings.market_type, settings.user_id);
    Ok(Json(settings))
}

async fn status(State(state): State<AppState>, QueryParams(query): QueryParams<MarketQuery>) -> AppResult<Json<RiskStatus>> {
    let conn = state.db.conn.lock()?;
    Ok(Json(current_status(&conn, query.user_id, query.market_type)?))
}

async fn pre_trade_check(State(state): State<AppState>, JsonBody(query): JsonBody<MarketQuery>) -> AppResult<Json<Value>> {
    let status = {
        let conn = state.db.conn.lock()?;
        current_status(&conn, query.user_id, query.market_type)?
    };

    if status.locked {
        let reason = status
            .reason
            .unwrap_or_else(|| "Trading is locked by the daily risk limits".to_string());
        log::warn!("Blocked {} trade for user {}: {}", query.market_type, query.user_id, reason);
        return Err(AppError::Forbidden(reason));
    }
    Ok(Json(json!({ "allowed": true, "status": status })))
}

async fn calculate_position_size(JsonBody(input): JsonBody<PositionSizeInput>) -> AppResult<Json<PositionSizeResult>> {
    position_size(&input).map(Json).map_err(AppError::BadRequest)
}
