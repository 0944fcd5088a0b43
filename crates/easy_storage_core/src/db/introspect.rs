//! Table introspection through `PRAGMA table_info` and `sqlite_master`.
//!
//! # Responsibility
//! - Report whether a table exists.
//! - List a table's columns with their declared storage type.
//!
//! # Invariants
//! - A missing table is reported as `TableNotFound`, not as an empty list.
//! - Declared types outside the fixed storage classes fail instead of being
//!   coerced.

use super::{DbError, DbResult, SqliteConnection};
use rusqlite::OptionalExtension;

/// Storage class a column is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqliteType {
    Integer,
    Real,
    Text,
    Blob,
    Null,
}

impl SqliteType {
    /// Classifies a declared column type, ignoring case and surrounding
    /// whitespace. Only `INTEGER`, `REAL`, `TEXT`, `BLOB` and `NULL` are
    /// recognised.
    pub fn classify(declared: &str) -> Option<Self> {
        let declared = declared.trim();
        [
            ("INTEGER", Self::Integer),
            ("REAL", Self::Real),
            ("TEXT", Self::Text),
            ("BLOB", Self::Blob),
            ("NULL", Self::Null),
        ]
        .into_iter()
        .find(|(name, _)| declared.eq_ignore_ascii_case(name))
        .map(|(_, kind)| kind)
    }
}

/// One column reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub kind: SqliteType,
    pub not_null: bool,
    /// Default expression as written in the schema.
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub primary_key_position: u32,
}

/// A table's `CREATE` statement and its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub sql: String,
    pub columns: Vec<ColumnInfo>,
}

/// Whether `table` exists.
pub async fn table_exists(conn: &SqliteConnection, table: &str) -> DbResult<bool> {
    let table = table.to_string();
    conn.run(move |conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [table.as_str()],
            |row| row.get(0),
        )?;
        Ok(count != 0)
    })
    .await
}

/// Lists the columns of `table` in declaration order.
///
/// # Errors
/// - `TableNotFound` ("Table: X does not exist.") when the table is absent.
/// - `UnsupportedColumnType` when a declared type is not a storage class.
pub async fn table_columns(conn: &SqliteConnection, table: &str) -> DbResult<Vec<ColumnInfo>> {
    let table = table.to_string();
    conn.run(move |conn| read_columns(conn, &table)).await
}

/// Columns plus the `CREATE` statement of `table`.
///
/// # Errors
/// - Same as [`table_columns`].
pub async fn table_info(conn: &SqliteConnection, table: &str) -> DbResult<TableInfo> {
    let table = table.to_string();
    conn.run(move |conn| {
        let columns = read_columns(conn, &table)?;
        let sql = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
        Ok(TableInfo {
            name: table,
            sql,
            columns,
        })
    })
    .await
}

fn read_columns(conn: &rusqlite::Connection, table: &str) -> DbResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1);",
    )?;
    let raw = stmt
        .query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, u32>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if raw.is_empty() {
        return Err(DbError::TableNotFound(table.to_string()));
    }

    raw.into_iter()
        .map(
            |(name, declared_type, not_null, default_value, primary_key_position)| {
                let kind = SqliteType::classify(&declared_type).ok_or_else(|| {
                    DbError::UnsupportedColumnType {
                        column: name.clone(),
                        declared: declared_type.clone(),
                    }
                })?;
                Ok(ColumnInfo {
                    name,
                    declared_type,
                    kind,
                    not_null: not_null != 0,
                    default_value,
                    primary_key_position,
                })
            },
        )
        .collect()
}
