//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas from `StorageConfig`.
//!
//! # Invariants
//! - Returned connections have the configured `foreign_keys` mode and busy
//!   timeout applied.
//! - Opening never touches application tables.

use super::{DbError, DbResult, SqliteConnection};
use crate::config::StorageConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file with default configuration.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<SqliteConnection> {
    open_db_with_config(path, &StorageConfig::default())
}

/// Opens a SQLite database file configured by `config`.
///
/// # Errors
/// - `Config` when `config` fails validation.
/// - `Sqlite` when the file cannot be opened or configured.
pub fn open_db_with_config(
    path: impl AsRef<Path>,
    config: &StorageConfig,
) -> DbResult<SqliteConnection> {
    config.validate().map_err(DbError::Config)?;
    open_with("file", config, || Connection::open(path))
}

/// Opens an in-memory SQLite database with default configuration.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<SqliteConnection> {
    open_with("memory", &StorageConfig::default(), Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    config: &StorageConfig,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<SqliteConnection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={} dialect={}",
                started_at.elapsed().as_millis(),
                config.dialect
            );
            Ok(SqliteConnection::from_rusqlite(conn))
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &Connection, config: &StorageConfig) -> DbResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}
