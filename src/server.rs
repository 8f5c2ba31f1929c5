use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::api::{CredentialCipher, ExchangeConnector, Llm};
use crate::db::Database;
use crate::handlers;

/// Shared by every handler. `llm` is None when no provider key is configured.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub cipher: Arc<CredentialCipher>,
    pub connector: Arc<dyn ExchangeConnector>,
    pub llm: Option<Arc<dyn Llm>>,
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(handlers::auth::routes())
        .merge(handlers::trades::routes())
        .merge(handlers::stats::routes())
        .merge(handlers::risk::routes())
        .merge(handlers::keys::routes())
        .merge(handlers::sync::routes())
        .merge(handlers::analyze::routes())
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    log::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LiveConnector;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cipher = Arc::new(CredentialCipher::new("test-passphrase", b"0123456789abcdef").unwrap());
        let state = AppState {
            db,
            cipher,
            connector: Arc::new(LiveConnector),
            llm: None,
        };

        let response = build_router(state)
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
