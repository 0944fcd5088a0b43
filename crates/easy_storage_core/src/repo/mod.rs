//! Repository facade over the mapping engine and a connection.
//!
//! # Responsibility
//! - Bind a record type's compiled templates to a live connection.
//! - Expose CRUD and aggregate operations that delegate execution.
//!
//! # Invariants
//! - Repositories never begin, commit or roll back transactions; a caller's
//!   handle is passed to the connection unchanged.
//! - Execution errors are returned as-is; nothing is retried.

use crate::db::DbError;
use crate::model::value::RowError;
use crate::table::MappingError;
use thiserror::Error;

pub mod repository;
pub mod storage;

pub use repository::{RecordStream, Repository};
pub use storage::Storage;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Row(#[from] RowError),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
