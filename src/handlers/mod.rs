//! HTTP handlers, one module per API area. Each module exposes `routes()`
//! which the server merges into the main router.

pub mod analyze;
pub mod auth;
pub mod keys;
pub mod risk;
pub mod stats;
pub mod sync;
pub mod trades;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use rusqlite::Connection;

use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::models::User;

/// `axum::Json` whose rejection renders as a 400 `{"error": ...}` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Query` with the same error shape as `JsonBody`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub(crate) fn require_user(conn: &Connection, user_id: i64) -> AppResult<User> {
    users::find_by_id(conn, user_id)?.ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}
