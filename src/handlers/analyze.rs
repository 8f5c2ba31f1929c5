use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::trades::resolve_trade_id;
use super::JsonBody;
use crate::api::llm::{question_prompt, trade_analysis_prompt};
use crate::api::Llm;
use crate::db::trades;
use crate::error::{AppError, AppResult};
use crate::models::{TradeSnapshot, TradeView};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/ask", post(ask))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeInput {
    user_id: Option<i64>,
    trade_id: Option<String>,
    trade_data: Option<TradeSnapshot>,
}

#[derive(Debug, Deserialize)]
struct AskInput {
    #[serde(default)]
    question: String,
}

fn llm(state: &AppState) -> AppResult<Arc<dyn Llm>> {
    state
        .llm
        .clone()
        .ok_or_else(|| AppError::NotConfigured("AI analysis is not configured".to_string()))
}

async fn complete(llm: &dyn Llm, prompt: &str) -> AppResult<String> {
    llm.complete(prompt).await.map_err(|e| {
        log::error!("{} request failed: {}", llm.name(), e);
        AppError::Upstream(format!("AI provider error: {}", e))
    })
}

/// Resolves the trade to analyze: a stored trade by id, or the details sent inline.
fn resolve_snapshot(state: &AppState, input: AnalyzeInput) -> AppResult<TradeSnapshot> {
    if let (Some(user_id), Some(trade_id)) = (input.user_id, input.trade_id.as_deref()) {
        let conn = state.db.conn.lock()?;
        let resolved = resolve_trade_id(&conn, user_id, trade_id)?;
        let trade = trades::get_trade(&conn, user_id, &resolved)?
            .ok_or_else(|| AppError::NotFound(format!("Trade {} not found", trade_id)))?;
        return Ok(TradeSnapshot::from(&TradeView::from(&trade)));
    }
    match input.trade_data {
        Some(snapshot) if !snapshot.symbol.trim().is_empty() => Ok(snapshot),
        _ => Err(AppError::BadRequest("tradeId with userId, or tradeData with a symbol, is required".to_string())),
    }
}

async fn analyze(State(state): State<AppState>, JsonBody(input): JsonBody<AnalyzeInput>) -> AppResult<Json<Value>> {
    let llm = llm(&state)?;
    let snapshot = resolve_snapshot(&state, input)?;

    log::info!("Requesting {} analysis of a {} trade", llm.name(), snapshot.symbol);
    let analysis = complete(llm.as_ref(), &trade_analysis_prompt(&snapshot)).await?;
    Ok(Json(json!({ "analysis": analysis })))
}

async fn ask(State(state): State<AppState>, JsonBody(input): JsonBody<AskInput>) -> AppResult<Json<Value>> {
    let llm = llm(&state)?;
    if input.question.trim().is_empty() {
        return Err(AppError::BadRequest("question is required".to_string()));
    }
    let answer = complete(llm.as_ref(), &question_prompt(&input.question)).await?;
    Ok(Json(json!({ "answer": answer })))
}
