use axum::{extract::State, routing::get, Json, Router};
use rusqlite::Connection;
use serde_json::{json, Value};

use super::trades::TradesQuery;
use super::QueryParams;
use crate::analytics::{compute_dashboard, equity_curve, DashboardStats};
use crate::db::{risk_settings, trades};
use crate::error::AppResult;
use crate::models::MarketType;
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/api/dashboard/equity", get(equity))
}

/// Starting balance of one market, or of both when no market is selected.
fn starting_balance(conn: &Connection, user_id: i64, market_type: Option<MarketType>) -> rusqlite::Result<f64> {
    let markets = match market_type {
        Some(market) => vec![market],
        None => MarketType::ALL.to_vec(),
    };
    let mut total = 0.0;
    for market in markets {
        total += risk_settings::get_risk_settings(conn, user_id, market)?.starting_balance;
    }
    Ok(total)
}

async fn dashboard(State(state): State<AppState>, QueryParams(query): QueryParams<TradesQuery>) -> AppResult<Json<DashboardStats>> {
    let filters = query.filters()?;
    let conn = state.db.conn.lock()?;
    let trades = trades::list_trades(&conn, query.user_id, &filters)?;
    let balance = starting_balance(&conn, query.user_id, query.market_type)?;
    Ok(Json(compute_dashboard(&trades, balance)))
}

async fn equity(State(state): State<AppState>, QueryParams(query): QueryParams<TradesQuery>) -> AppResult<Json<Value>> {
    let filters = query.filters()?;
    let trades = {
        let conn = state.db.conn.lock()?;
        trades::list_trades(&conn, query.user_id, &filters)?
    };
    Ok(Json(json!({ "equityCurve": equity_curve(&trades) })))
}
