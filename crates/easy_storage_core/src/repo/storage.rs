//! Owner of one connection, one descriptor cache and one dialect.
//!
//! Repositories handed out by the same `Storage` share its cache, so each
//! record type is compiled once per dialect no matter how many
//! repositories are created.

use crate::config::StorageConfig;
use crate::db::{open_db_in_memory, open_db_with_config, Connection, DbError, SqliteConnection};
use crate::model::dialect::Dialect;
use crate::model::meta::Model;
use crate::repo::{RepoResult, Repository};
use crate::table::cache::TableCache;
use std::path::Path;
use std::sync::Arc;

pub struct Storage<C: Connection> {
    conn: Arc<C>,
    cache: Arc<TableCache>,
    dialect: Dialect,
}

impl<C: Connection> Clone for Storage<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            cache: Arc::clone(&self.cache),
            dialect: self.dialect,
        }
    }
}

impl<C: Connection> Storage<C> {
    /// Wraps `conn` with a fresh cache.
    pub fn new(conn: C, dialect: Dialect) -> Self {
        Self::with_cache(conn, Arc::new(TableCache::new()), dialect)
    }

    /// Wraps `conn` with a cache shared with other owners.
    pub fn with_cache(conn: C, cache: Arc<TableCache>, dialect: Dialect) -> Self {
        Self {
            conn: Arc::new(conn),
            cache,
            dialect,
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn cache(&self) -> &Arc<TableCache> {
        &self.cache
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Repository for `T` over this storage's connection.
    ///
    /// # Errors
    /// - `Mapping` when `T`'s descriptor cannot be built.
    pub fn repository<T: Model>(&self) -> RepoResult<Repository<T, C>> {
        Repository::new(Arc::clone(&self.conn), &self.cache, self.dialect)
    }
}

impl Storage<SqliteConnection> {
    /// Opens a SQLite file and starts logging when `config` asks for it.
    ///
    /// # Errors
    /// - `Db(Config)` for invalid configuration or a logging start failure.
    /// - `Db(Sqlite)` when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, config: &StorageConfig) -> RepoResult<Self> {
        config.validate().map_err(DbError::Config)?;
        config.init_logging().map_err(DbError::Config)?;
        let conn = open_db_with_config(path, config)?;
        Ok(Self::new(conn, config.dialect))
    }

    /// Opens a private in-memory SQLite database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?, Dialect::Sqlite))
    }
}
