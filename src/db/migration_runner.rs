use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use super::DbError;

const BACKUPS_TO_KEEP: usize = 5;
const BACKUP_PREFIX: &str = "pre_migration_";

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: u32, name: &'static str, sql: &'static str) -> Self {
        Self { version, name, sql }
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Applies the embedded schema migrations in version order.
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self {
            migrations: vec![
                Migration::new(0, "bootstrap", include_str!("migrations/000_bootstrap.sql")),
                Migration::new(
                    1,
                    "users_and_keys",
                    include_str!("migrations/001_users_and_keys.sql"),
                ),
                Migration::new(2, "trades", include_str!("migrations/002_trades.sql")),
                Migration::new(
                    3,
                    "risk_and_sync_history",
                    include_str!("migrations/003_risk_and_sync_history.sql"),
                ),
                Migration::new(
                    4,
                    "sync_cursors_and_trade_owner",
                    include_str!("migrations/004_sync_cursors_and_trade_owner.sql"),
                ),
            ],
        }
    }

    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// Runs every migration newer than the recorded schema version.
    ///
    /// `db_path` is used to place a backup next to file databases before
    /// anything is applied; in-memory databases are never backed up.
    pub fn run_pending_migrations(&self, conn: &Connection, db_path: &str) -> Result<usize, DbError> {
        let current = self.get_current_version(conn)?;
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| current.map_or(true, |v| m.version > v))
            .collect();

        let Some(target) = pending.last().map(|m| m.version) else {
            return Ok(0);
        };

        log::info!(
            "Found {} pending migrations (current: {:?}, target: {})",
            pending.len(),
            current,
            target
        );

        if current.is_some() && is_file_database(db_path) {
            let backup = self.create_backup(conn, db_path, target)?;
            log::info!("Backup created: {}", backup.display());
        }

        for migration in &pending {
            if let Err(e) = self.apply_migration(conn, migration) {
                log::error!("Migration {} ({}) failed: {}", migration.version, migration.name, e);
                return Err(e);
            }
        }

        Ok(pending.len())
    }

    fn apply_migration(&self, conn: &Connection, migration: &Migration) -> Result<(), DbError> {
        let started = Instant::now();
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at, checksum, execution_time_ms)
             VALUES (?, ?, ?, ?, ?)",
            params![
                migration.version,
                migration.name,
                chrono::Utc::now().timestamp(),
                migration.checksum(),
                started.elapsed().as_millis() as i64
            ],
        )?;
        tx.commit()?;

        log::info!("Applied migration {}: {}", migration.version, migration.name);
        Ok(())
    }

    /// Fails if a recorded migration no longer matches the embedded SQL.
    pub fn verify_migrations(&self, conn: &Connection) -> Result<(), DbError> {
        let mut stmt = conn.prepare(
            "SELECT version, checksum FROM schema_migrations WHERE checksum IS NOT NULL ORDER BY version",
        )?;
        let applied = stmt
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (version, stored) in applied {
            let Some(migration) = self.migrations.iter().find(|m| m.version == version) else {
                return Err(DbError::UnknownMigration(version));
            };
            if migration.checksum() != stored {
                return Err(DbError::ChecksumMismatch {
                    version,
                    name: migration.name.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn get_current_version(&self, conn: &Connection) -> Result<Option<u32>, DbError> {
        let has_table: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )?;
        if !has_table {
            return Ok(None);
        }

        let version = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get::<_, Option<u32>>(0)
            })
            .optional()?
            .flatten();
        Ok(version)
    }

    fn create_backup(&self, conn: &Connection, db_path: &str, target_version: u32) -> Result<PathBuf, DbError> {
        let backup_dir = Path::new(db_path)
            .parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"));
        fs::create_dir_all(&backup_dir)?;

        let backup_path = backup_dir.join(format!(
            "{}v{}_{}.db",
            BACKUP_PREFIX,
            target_version,
            chrono::Utc::now().timestamp_millis()
        ));

        let mut dst = Connection::open(&backup_path)?;
        {
            let backup = rusqlite::backup::Backup::new(conn, &mut dst)?;
            backup.run_to_completion(64, std::time::Duration::from_millis(50), None)?;
        }

        let integrity: String = dst.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
        if integrity != "ok" {
            return Err(DbError::Backup(format!("integrity check failed: {}", integrity)));
        }

        prune_backups(&backup_dir)?;
        Ok(backup_path)
    }
}

fn is_file_database(db_path: &str) -> bool {
    !db_path.is_empty() && db_path != ":memory:" && !db_path.starts_with("file::memory:")
}

fn prune_backups(backup_dir: &Path) -> Result<(), DbError> {
    let mut backups: Vec<_> = fs::read_dir(backup_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(BACKUP_PREFIX) && name.ends_with(".db"))
        })
        .collect();

    backups.sort_by_key(|entry| {
        entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    });

    if backups.len() > BACKUPS_TO_KEEP {
        for entry in &backups[..backups.len() - BACKUPS_TO_KEEP] {
            if let Err(e) = fs::remove_file(entry.path()) {
                log::warn!("Failed to delete old backup {}: {}", entry.path().display(), e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations_are_sequential() {
        let runner = MigrationRunner::new();
        for (i, m) in runner.migrations.iter().enumerate() {
            assert_eq!(m.version as usize, i, "Migration versions must be sequential");
        }
    }

    #[test]
    fn test_fresh_install_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new();

        let applied = runner.run_pending_migrations(&conn, ":memory:").unwrap();
        assert_eq!(applied, runner.migrations.len());

        for table in ["schema_migrations", "app_meta", "users", "api_keys", "trades", "risk_settings", "sync_history"] {
            assert!(table_exists(&conn, table), "Table {} should exist", table);
        }
        assert_eq!(runner.get_current_version(&conn).unwrap(), Some(runner.latest_version()));
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new();

        assert!(runner.run_pending_migrations(&conn, ":memory:").unwrap() > 0);
        assert_eq!(runner.run_pending_migrations(&conn, ":memory:").unwrap(), 0);
    }

    #[test]
    fn test_checksums_verify_and_detect_tampering() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new();
        runner.run_pending_migrations(&conn, ":memory:").unwrap();
        assert!(runner.verify_migrations(&conn).is_ok());

        conn.execute("UPDATE schema_migrations SET checksum = 'bogus' WHERE version = 2", [])
            .unwrap();
        match runner.verify_migrations(&conn) {
            Err(DbError::ChecksumMismatch { version, .. }) => assert_eq!(version, 2),
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = MigrationRunner::new();
        runner.run_pending_migrations(&conn, ":memory:").unwrap();

        let bad = Migration::new(99, "bad_migration", "CREATE TABLE half_done (id INTEGER); INVALID SQL");
        assert!(runner.apply_migration(&conn, &bad).is_err());

        assert!(!table_exists(&conn, "half_done"));
        assert!(table_exists(&conn, "sync_cursors"));
        assert_eq!(runner.get_current_version(&conn).unwrap(), Some(runner.latest_version()));
    }

    #[test]
    fn test_upgrade_of_file_database_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("journal.db");
        let db_path = db_path.to_str().unwrap();

        let conn = Connection::open(db_path).unwrap();
        let runner = MigrationRunner::new();
        // Simulate an older install that stopped at version 1
        runner.apply_migration(&conn, &runner.migrations[0]).unwrap();
        runner.apply_migration(&conn, &runner.migrations[1]).unwrap();

        let applied = runner.run_pending_migrations(&conn, db_path).unwrap();
        assert_eq!(applied, runner.migrations.len() - 2);

        let backups: Vec<_> = fs::read_dir(dir.path().join("backups")).unwrap().collect();
        assert_eq!(backups.len(), 1);
    }
}
