use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

const MIGRATION_BOOKS_SQL: &str = include_str!("../migrations/0000_books.sql");
const MIGRATION_UPDATE_JOBS_SQL: &str = include_str!("../migrations/0001_update_jobs.sql");

/// How long a connection waits on a lock held by another writer.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite catalog and job store.
///
/// Every repository call opens its own short-lived connection, so the handle
/// can be shared across threads and SQLite serialises concurrent writers.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Self { path };
        let conn = db.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
              id TEXT PRIMARY KEY NOT NULL,
              applied_at INTEGER NOT NULL
            );",
        )?;
        apply_migration(&conn, "0000_books", MIGRATION_BOOKS_SQL)?;
        apply_migration(&conn, "0001_update_jobs", MIGRATION_UPDATE_JOBS_SQL)?;
        log::debug!("database ready at {}", db.path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

fn apply_migration(conn: &Connection, id: &str, sql: &str) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM schema_migrations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(());
    }
    conn.execute_batch(sql)?;
    conn.execute(
        "INSERT INTO schema_migrations (id, applied_at) VALUES (?1, ?2)",
        params![id, Utc::now().timestamp_millis()],
    )?;
    log::info!("applied migration {}", id);
    Ok(())
}

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_millis(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::Database;
    use rusqlite::params;

    #[test]
    fn migrations_apply_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("books.db");

        Database::open(&path).expect("first open");
        let db = Database::open(&path).expect("second open");

        let conn = db.connection().expect("connection");
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", params![], |row| {
                row.get(0)
            })
            .expect("count migrations");
        assert_eq!(applied, 2);
    }

    #[test]
    fn empty_titles_are_rejected_by_the_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::open(dir.path().join("books.db")).expect("open");
        let conn = db.connection().expect("connection");
        let result = conn.execute(
            "INSERT INTO books (title, purchase_date, created_at) VALUES ('  ', 0, 0)",
            params![],
        );
        assert!(result.is_err());
    }
}
