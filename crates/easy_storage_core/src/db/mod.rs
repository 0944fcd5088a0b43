//! Driver boundary and the SQLite implementation behind it.
//!
//! # Responsibility
//! - Define the async connection contract the repository executes through.
//! - Provide a `rusqlite`-backed connection, transactions and introspection.
//!
//! # Invariants
//! - Execution failures surface unchanged to the caller; nothing is retried.
//! - The connection never begins or ends a transaction on its own; callers
//!   own transaction scope.

use crate::model::value::{Params, Row, Value};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod introspect;
mod open;
mod sqlite;

pub use open::{open_db, open_db_in_memory, open_db_with_config};
pub use sqlite::{SqliteConnection, SqliteTransaction};

pub type DbResult<T> = Result<T, DbError>;

/// Rows produced by a query; buffered queries have already read every row.
pub type RowStream = BoxStream<'static, DbResult<Row>>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("Table: {0} does not exist.")]
    TableNotFound(String),
    #[error("column `{column}` declares unsupported type `{declared}`")]
    UnsupportedColumnType { column: String, declared: String },
    #[error("statement did not produce a scalar result")]
    NoScalarResult,
    #[error("transaction belongs to a different connection")]
    ForeignTransaction,
    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },
    #[error("database worker failed: {0}")]
    Worker(String),
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

/// Async execution surface consumed by the repository.
///
/// Parameter names in `Params` carry no prefix; statements reference them
/// with the dialect prefix (`@Name`). A `Value::List` parameter is expanded
/// for `IN @Name`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Opaque transaction scope, passed through unchanged.
    type Transaction: Send + Sync;

    /// Runs a row-returning statement.
    ///
    /// With `buffered` every row is read before the call completes; without
    /// it rows are produced as the stream is polled, and the connection is
    /// not held while the caller consumes them.
    async fn query(
        &self,
        sql: &str,
        params: Params,
        transaction: Option<&Self::Transaction>,
        buffered: bool,
    ) -> DbResult<RowStream>;

    /// Runs a statement once per parameter set and returns the summed
    /// affected-row count. An empty `params` list runs it once unbound.
    async fn execute(
        &self,
        sql: &str,
        params: Vec<Params>,
        transaction: Option<&Self::Transaction>,
    ) -> DbResult<u64>;

    /// Runs a statement and returns the first column of its first row.
    async fn execute_scalar(
        &self,
        sql: &str,
        params: Params,
        transaction: Option<&Self::Transaction>,
    ) -> DbResult<Value>;
}
