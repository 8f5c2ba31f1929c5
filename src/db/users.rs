use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::User;

fn map_row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        name: row.get("name")?,
        password_hash: row.get("password_hash")?,
        created_at: row.get("created_at")?,
    })
}

/// Returns the new user's id. Fails with a constraint violation when the email exists.
pub fn create_user(conn: &Connection, email: &str, name: &str, password_hash: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (email, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, password_hash, chrono::Utc::now().timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Emails compare case-insensitively.
pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?1",
        [email],
        map_row_to_user,
    )
    .optional()
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
        [id],
        map_row_to_user,
    )
    .optional()
}
