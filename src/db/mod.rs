pub mod api_keys;
pub mod connection;
pub mod meta;
pub mod migration_runner;
pub mod risk_settings;
pub mod sync_history;
pub mod trades;
pub mod users;

pub use connection::Database;
pub use migration_runner::MigrationRunner;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch for migration {version} ({name}): the embedded SQL changed after it was applied")]
    ChecksumMismatch { version: u32, name: String },

    #[error("Database records migration {0}, which this build does not know about")]
    UnknownMigration(u32),

    #[error("Backup failed: {0}")]
    Backup(String),
}

/// True when `err` is a UNIQUE or PRIMARY KEY constraint failure.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
