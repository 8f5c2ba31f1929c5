use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};

use super::JsonBody;
use crate::db::{is_unique_violation, users};
use crate::error::{AppError, AppResult};
use crate::models::{LoginInput, RegisterInput};
use crate::server::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            log::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

async fn register(State(state): State<AppState>, JsonBody(input): JsonBody<RegisterInput>) -> AppResult<Json<Value>> {
    input.validate().map_err(AppError::BadRequest)?;
    let email = input.email.trim().to_lowercase();
    let password_hash = hash_password(&input.password)?;

    let conn = state.db.conn.lock()?;
    if users::find_by_email(&conn, &email)?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }
    let id = users::create_user(&conn, &email, input.name.trim(), &password_hash).map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("User already exists".to_string())
        } else {
            AppError::Database(e)
        }
    })?;
    let user = super::require_user(&conn, id)?;

    log::info!("Registered user {} ({})", user.id, user.email);
    Ok(Json(json!({ "message": "User registered successfully", "user": user.view() })))
}

async fn login(State(state): State<AppState>, JsonBody(input): JsonBody<LoginInput>) -> AppResult<Json<Value>> {
    if input.email.trim().is_empty() || input.password.is_empty() {
        return Err(AppError::BadRequest("email and password are required".to_string()));
    }

    let user = {
        let conn = state.db.conn.lock()?;
        users::find_by_email(&conn, &input.email.trim().to_lowercase())?
    }
    .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&input.password, &user.password_hash) {
        log::warn!("Failed login for user {}", user.id);
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    Ok(Json(json!({ "message": "Login successful", "user": user.view() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }
}
