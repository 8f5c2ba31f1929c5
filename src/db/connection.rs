use rusqlite::Connection;
use std::sync::Mutex;

use super::{DbError, MigrationRunner};

/// Shared SQLite handle. Handlers lock `conn` for the duration of their
/// queries and never hold the guard across an `.await`.
pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self, DbError> {
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(db_path)?
        };
        Self::initialize(conn, db_path)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::new(":memory:")
    }

    fn initialize(conn: Connection, db_path: &str) -> Result<Self, DbError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        if db_path != ":memory:" {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        let runner = MigrationRunner::new();
        log::info!(
            "Opening database at {} (schema version {:?})",
            db_path,
            runner.get_current_version(&conn)?
        );

        let applied = runner.run_pending_migrations(&conn, db_path)?;
        if applied > 0 {
            log::info!("Applied {} migrations", applied);
        } else {
            log::info!("Database schema is up to date");
        }
        runner.verify_migrations(&conn)?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reopening_file_database_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::new(path).unwrap();
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO users (email, name, password_hash, created_at) VALUES ('a@b.c', 'A', 'x', 0)",
                [],
            )
            .unwrap();
        }

        let db = Database::new(path).unwrap();
        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO api_keys (id, user_id, exchange, api_key_enc, api_secret_enc, created_at, updated_at)
             VALUES ('k', 42, 'binance', 'x', 'y', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
