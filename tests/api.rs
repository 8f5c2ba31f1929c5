use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use trading_journal::api::{
    ApiError, CredentialCipher, ExchangeClient, ExchangeConnector, FetchTradesRequest, FetchTradesResponse, Llm,
    RateLimitConfig, RawTrade,
};
use trading_journal::db::Database;
use trading_journal::models::MarketType;
use trading_journal::server::{build_router, AppState};

const API_KEY: &str = "test-api-key-wxyz";
const API_SECRET: &str = "super-secret-value";

struct FixedExchange {
    fills: Vec<RawTrade>,
}

#[async_trait]
impl ExchangeClient for FixedExchange {
    fn exchange_name(&self) -> &str {
        "binance"
    }

    async fn fetch_trades(&self, request: FetchTradesRequest) -> Result<FetchTradesResponse, ApiError> {
        let trades = self
            .fills
            .iter()
            .filter(|f| f.symbol == request.symbol)
            .cloned()
            .collect();
        Ok(FetchTradesResponse {
            trades,
            next_cursor: None,
        })
    }

    async fn fetch_balance(&self, market_type: MarketType) -> Result<f64, ApiError> {
        Ok(match market_type {
            MarketType::Spot => 42.0,
            MarketType::Futures => 1000.0,
        })
    }

    async fn discover_symbols(&self, _market_type: MarketType, _since: Option<i64>) -> Result<Vec<String>, ApiError> {
        Ok(vec!["BTCUSDT".to_string()])
    }

    async fn test_credentials(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: 100,
            burst_size: 100,
        }
    }
}

struct FixedConnector;

impl ExchangeConnector for FixedConnector {
    fn connect(&self, exchange: &str, api_key: &str, api_secret: &str) -> Result<Box<dyn ExchangeClient>, ApiError> {
        assert_eq!(exchange, "binance");
        assert_eq!(api_key, API_KEY);
        assert_eq!(api_secret, API_SECRET);
        let fills = (1..=3)
            .map(|id| RawTrade {
                exchange_trade_id: id.to_string(),
                exchange_order_id: format!("order-{}", id),
                symbol: "BTCUSDT".to_string(),
                side: "BUY".to_string(),
                price: 30_000.0,
                quantity: 0.01,
                pnl: 2.5,
                fee: 0.01,
                is_maker: false,
                timestamp: 1_700_000_000_000 + id,
            })
            .collect();
        Ok(Box::new(FixedExchange { fills }))
    }
}

struct CannedLlm;

#[async_trait]
impl Llm for CannedLlm {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        Ok(format!("Reviewed {} chars", prompt.len()))
    }
}

fn app(llm: Option<Arc<dyn Llm>>) -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cipher = Arc::new(CredentialCipher::from_database(&db, "integration-passphrase").unwrap());
    build_router(AppState {
        db,
        cipher,
        connector: Arc::new(FixedConnector),
        llm,
    })
}

async fn send_raw(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, text) = send_raw(app, method, uri, body).await;
    let json = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, email: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/register",
        Some(json!({ "email": email, "password": "pa55word", "name": "Trader" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["user"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn register_and_login() {
    let app = app(None);
    register(&app, "trader@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/register",
        Some(json!({ "email": "Trader@Example.com", "password": "x", "name": "Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/register",
        Some(json!({ "email": "", "password": "x", "name": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/login",
        Some(json!({ "email": "trader@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/login",
        Some(json!({ "email": "trader@example.com", "password": "pa55word" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "trader@example.com");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = app(None);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn trade_lifecycle_and_dashboard() {
    let app = app(None);
    let user_id = register(&app, "journal@example.com").await;

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/trades",
        Some(json!({
            "userId": user_id,
            "symbol": "btcusdt",
            "direction": "LONG",
            "entryPrice": 100.0,
            "exitPrice": 110.0,
            "size": 1.0,
            "marketType": "FUTURES",
            "notes": "breakout"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["symbol"], "BTCUSDT");
    assert_eq!(created["pnl"], 10.0);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/trades",
        Some(json!({
            "userId": user_id,
            "symbol": "ETHUSDT",
            "direction": "SHORT",
            "entryPrice": 100.0,
            "exitPrice": 105.0,
            "size": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/trades",
        Some(json!({
            "userId": user_id,
            "symbol": "ETHUSDT",
            "direction": "SHORT",
            "entryPrice": 100.0,
            "exitPrice": 105.0,
            "size": 0.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, list) = send(&app, Method::GET, &format!("/api/trades?userId={}", user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["trades"].as_array().unwrap().len(), 2);

    let (status, stats) = send(
        &app,
        Method::GET,
        &format!("/api/dashboard?userId={}&marketType=FUTURES&dateRange=all", user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalTrades"], 2);
    assert_eq!(stats["winRate"], 50.0);
    assert_eq!(stats["profitFactor"], 2.0);
    assert_eq!(stats["totalPnl"], 5.0);

    let (status, curve) = send(&app, Method::GET, &format!("/api/dashboard/equity?userId={}", user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(curve["equityCurve"][0]["tradeCount"], 2);

    let (status, updated) = send(
        &app,
        Method::PATCH,
        &format!("/api/trades/{}", id),
        Some(json!({ "userId": user_id, "notes": "moved stop too early" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["notes"], "moved stop too early");

    let (status, csv) = send_raw(&app, Method::GET, &format!("/api/trades/export?userId={}", user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(csv.starts_with("id,symbol,entryPrice"));
    assert!(csv.contains("moved stop too early"));

    let uri = format!("/api/trades/{}?userId={}", id, user_id);
    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn risk_limits_lock_trading() {
    let app = app(None);
    let user_id = register(&app, "risk@example.com").await;

    let (status, settings) = send(
        &app,
        Method::PUT,
        "/api/risk/settings",
        Some(json!({ "userId": user_id, "marketType": "FUTURES", "maxDailyTrades": 1, "maxDailyLoss": 50.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["maxDailyTrades"], 1);

    let check = json!({ "userId": user_id, "marketType": "FUTURES" });
    let (status, body) = send(&app, Method::POST, "/api/risk/check", Some(check.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/trades",
        Some(json!({
            "userId": user_id,
            "symbol": "SOLUSDT",
            "direction": "LONG",
            "entryPrice": 20.0,
            "exitPrice": 21.0,
            "size": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::POST, "/api/risk/check", Some(check)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("trade limit"));

    let (status, status_body) = send(
        &app,
        Method::GET,
        &format!("/api/risk/status?userId={}&marketType=FUTURES", user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["locked"], true);
    assert_eq!(status_body["tradesLeft"], 0);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/risk/settings",
        Some(json!({ "userId": user_id, "maxDailyLoss": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn position_size_calculator() {
    let app = app(None);
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/risk/position-size",
        Some(json!({ "balance": 10000.0, "riskPercent": 1.0, "entryPrice": 100.0, "stopLoss": 95.0, "takeProfit": 110.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["riskAmount"], 100.0);
    assert_eq!(body["positionSizeUnits"], 20.0);
    assert_eq!(body["riskRewardRatio"], 2.0);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/risk/position-size",
        Some(json!({ "balance": 10000.0, "riskPercent": 1.0, "entryPrice": 100.0, "stopLoss": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn keys_sync_and_balance() {
    let app = app(None);
    let user_id = register(&app, "sync@example.com").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/sync",
        Some(json!({ "userId": user_id, "marketType": "FUTURES" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, saved) = send_raw(
        &app,
        Method::POST,
        "/api/keys",
        Some(json!({ "userId": user_id, "apiKey": API_KEY, "apiSecret": API_SECRET })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!saved.contains(API_SECRET));

    let (status, listed) = send_raw(&app, Method::GET, &format!("/api/keys?userId={}", user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!listed.contains(API_SECRET));
    assert!(!listed.contains(API_KEY));
    let listed: Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(listed["keys"][0]["apiKeyPreview"], "****...wxyz");
    assert_eq!(listed["keys"][0]["exchange"], "binance");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/keys/binance/test",
        Some(json!({ "userId": user_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/balance?userId={}&marketType=SPOT", user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 42.0);

    let sync = json!({ "userId": user_id, "marketType": "FUTURES", "since": 0 });
    let (status, first) = send(&app, Method::POST, "/api/sync", Some(sync.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["fetched"], 3);
    assert_eq!(first["imported"], 3);

    let (_, second) = send(&app, Method::POST, "/api/sync", Some(sync)).await;
    assert_eq!(second["imported"], 0);
    assert_eq!(second["duplicates"], 3);

    let (_, list) = send(&app, Method::GET, &format!("/api/trades?userId={}", user_id), None).await;
    let trades = list["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 3);
    assert_eq!(trades[0]["id"], "3");
    assert_eq!(trades[0]["source"], "API_SYNC");

    let (_, history) = send(&app, Method::GET, &format!("/api/sync/history?userId={}", user_id), None).await;
    assert_eq!(history["history"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/keys/binance?userId={}", user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/balance?userId={}", user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analysis_requires_a_provider() {
    let unconfigured = app(None);
    let (status, _) = send(
        &unconfigured,
        Method::POST,
        "/api/analyze",
        Some(json!({ "tradeData": { "symbol": "BTCUSDT", "pnl": 5.0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let app = app(Some(Arc::new(CannedLlm)));
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/analyze",
        Some(json!({ "tradeData": { "symbol": "BTCUSDT", "side": "BUY", "pnl": 5.0, "notes": "patient entry" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["analysis"].as_str().unwrap().starts_with("Reviewed"));

    let (status, _) = send(&app, Method::POST, "/api/analyze", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/analyze",
        Some(json!({ "userId": 99, "tradeId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::POST, "/api/ask", Some(json!({ "question": "How do I size a position?" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["answer"].is_string());
}
