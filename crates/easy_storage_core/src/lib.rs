//! Mapping engine and repository layer for relational record storage.
//! Record types describe themselves once; SQL is compiled per type and
//! dialect, cached, and executed through an async connection.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod table;

pub use config::StorageConfig;
pub use db::introspect::{table_columns, table_exists, table_info, ColumnInfo, SqliteType, TableInfo};
pub use db::{
    open_db, open_db_in_memory, open_db_with_config, Connection, DbError, DbResult,
    SqliteConnection, SqliteTransaction,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::dialect::Dialect;
pub use model::meta::{FieldInfo, Model, ModelInfo};
pub use model::value::{FromValue, Params, Row, RowError, RowResult, Value};
pub use repo::{RecordStream, RepoError, RepoResult, Repository, Storage};
pub use table::cache::TableCache;
pub use table::clause::{Aggregate, CompiledFilterQuery};
pub use table::filter::{QueryFilter, QueryFilterBuilder, QueryOperator};
pub use table::{MappingError, MappingResult, Table, Template};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
