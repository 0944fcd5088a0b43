//! `rusqlite`-backed implementation of the connection contract.
//!
//! # Responsibility
//! - Run statements on a blocking worker and surface rows as `Row` values.
//! - Bind `@Name` parameters by name and expand list parameters for `IN`.
//! - Scope statements to caller-owned transactions.
//!
//! # Invariants
//! - The inner mutex is only locked inside blocking workers, never across an
//!   `.await`; lazy queries take it once per page.
//! - Multi-statement text runs statement by statement in order.
//! - Parameters not referenced by a statement are ignored; referenced ones
//!   without a binding fail with `InvalidParameter`.

use crate::db::{Connection, DbError, DbResult, RowStream};
use crate::model::value::{Params, Row, Value};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, error, warn};
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Batch, Statement};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

const LAZY_PAGE_SIZE: usize = 128;
const PARAMETER_PREFIXES: [char; 3] = ['@', ':', '$'];

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type Shared = Arc<Mutex<rusqlite::Connection>>;

/// Shared handle to one SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    id: u64,
    inner: Shared,
}

/// Caller-owned transaction scope on a [`SqliteConnection`].
///
/// Dropping an unfinished handle rolls the transaction back.
#[derive(Debug)]
pub struct SqliteTransaction {
    connection_id: u64,
    inner: Shared,
    finished: bool,
}

impl SqliteConnection {
    pub(crate) fn from_rusqlite(conn: rusqlite::Connection) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `work` against the raw connection on a blocking worker.
    pub async fn run<R, F>(&self, work: F) -> DbResult<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> DbResult<R> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(Arc::clone(&self.inner), work).await
    }

    /// Executes a script without parameters, e.g. schema setup.
    pub async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.run(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    /// Opens a transaction scope. The caller must commit or roll it back.
    pub async fn begin(&self) -> DbResult<SqliteTransaction> {
        self.execute_batch("BEGIN;").await?;
        Ok(SqliteTransaction {
            connection_id: self.id,
            inner: Arc::clone(&self.inner),
            finished: false,
        })
    }

    fn check_scope(&self, transaction: Option<&SqliteTransaction>) -> DbResult<()> {
        match transaction {
            Some(transaction) if transaction.connection_id != self.id => {
                Err(DbError::ForeignTransaction)
            }
            _ => Ok(()),
        }
    }
}

impl SqliteTransaction {
    pub async fn commit(mut self) -> DbResult<()> {
        self.finish("COMMIT;").await
    }

    pub async fn rollback(mut self) -> DbResult<()> {
        self.finish("ROLLBACK;").await
    }

    async fn finish(&mut self, sql: &'static str) -> DbResult<()> {
        run_blocking(Arc::clone(&self.inner), move |conn| {
            Ok(conn.execute_batch(sql)?)
        })
        .await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.inner.try_lock() {
            Ok(conn) => rollback_open(&conn),
            Err(TryLockError::Poisoned(poisoned)) => rollback_open(&poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                // A cancelled call still owns the worker; roll back once it lets go.
                let inner = Arc::clone(&self.inner);
                let rollback = move || {
                    let conn = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    rollback_open(&conn);
                };
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => drop(handle.spawn_blocking(rollback)),
                    Err(_) => rollback(),
                }
            }
        }
    }
}

fn rollback_open(conn: &rusqlite::Connection) {
    if conn.is_autocommit() {
        return;
    }
    match conn.execute_batch("ROLLBACK;") {
        Ok(()) => warn!("event=tx_drop module=db status=ok action=rollback"),
        Err(err) => error!("event=tx_drop module=db status=error action=rollback error={err}"),
    }
}

/// Lazy query state: the statement is re-run per page and already delivered
/// rows are skipped, so the connection is free between pages.
struct Cursor {
    conn: SqliteConnection,
    sql: Arc<str>,
    params: Arc<Params>,
    delivered: usize,
    page: std::vec::IntoIter<Row>,
    exhausted: bool,
}

impl Cursor {
    async fn next_row(&mut self) -> Option<DbResult<Row>> {
        if let Some(row) = self.page.next() {
            return Some(Ok(row));
        }
        if self.exhausted {
            return None;
        }
        if let Err(err) = self.fetch_page().await {
            self.exhausted = true;
            return Some(Err(err));
        }
        self.page.next().map(Ok)
    }

    async fn fetch_page(&mut self) -> DbResult<()> {
        let sql = Arc::clone(&self.sql);
        let params = Arc::clone(&self.params);
        let skip = self.delivered;
        let rows = self
            .conn
            .run(move |conn| {
                let mut rows = Vec::with_capacity(LAZY_PAGE_SIZE);
                query_rows(conn, &sql, &params, skip, &mut |row| {
                    rows.push(row);
                    rows.len() < LAZY_PAGE_SIZE
                })?;
                Ok(rows)
            })
            .await?;

        debug!(
            "event=lazy_page module=db status=ok skipped={} rows={}",
            skip,
            rows.len()
        );
        self.exhausted = rows.len() < LAZY_PAGE_SIZE;
        self.delivered += rows.len();
        self.page = rows.into_iter();
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    type Transaction = SqliteTransaction;

    async fn query(
        &self,
        sql: &str,
        params: Params,
        transaction: Option<&SqliteTransaction>,
        buffered: bool,
    ) -> DbResult<RowStream> {
        self.check_scope(transaction)?;
        let (sql, params) = expand_lists(sql, params)?;

        if buffered {
            let rows = self
                .run(move |conn| {
                    let mut rows = Vec::new();
                    query_rows(conn, &sql, &params, 0, &mut |row| {
                        rows.push(row);
                        true
                    })?;
                    Ok(rows)
                })
                .await?;
            return Ok(stream::iter(rows.into_iter().map(Ok)).boxed());
        }

        let mut cursor = Cursor {
            conn: self.clone(),
            sql: Arc::from(sql),
            params: Arc::new(params),
            delivered: 0,
            page: Vec::new().into_iter(),
            exhausted: false,
        };
        // The first page runs eagerly so statement errors surface from `query`.
        cursor.fetch_page().await?;

        Ok(stream::unfold(cursor, |mut cursor| async move {
            cursor.next_row().await.map(|row| (row, cursor))
        })
        .boxed())
    }

    async fn execute(
        &self,
        sql: &str,
        params: Vec<Params>,
        transaction: Option<&SqliteTransaction>,
    ) -> DbResult<u64> {
        self.check_scope(transaction)?;
        let sets = if params.is_empty() {
            vec![Params::new()]
        } else {
            params
        };
        let statements = sets
            .into_iter()
            .map(|set| expand_lists(sql, set))
            .collect::<DbResult<Vec<_>>>()?;

        self.run(move |conn| {
            let mut changed = 0;
            for (sql, params) in &statements {
                changed += execute_all(conn, sql, params)?;
            }
            Ok(changed)
        })
        .await
    }

    async fn execute_scalar(
        &self,
        sql: &str,
        params: Params,
        transaction: Option<&SqliteTransaction>,
    ) -> DbResult<Value> {
        self.check_scope(transaction)?;
        let (sql, params) = expand_lists(sql, params)?;
        self.run(move |conn| scalar(conn, &sql, &params)).await
    }
}

async fn run_blocking<R, F>(inner: Shared, work: F) -> DbResult<R>
where
    F: FnOnce(&mut rusqlite::Connection) -> DbResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = inner.lock().unwrap_or_else(PoisonError::into_inner);
        work(&mut *conn)
    })
    .await
    .map_err(|err| {
        error!("event=db_worker module=db status=error error={err}");
        DbError::Worker(err.to_string())
    })?
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(number) => ToSqlOutput::Owned(SqlValue::Integer(*number)),
            Value::Real(number) => ToSqlOutput::Owned(SqlValue::Real(*number)),
            Value::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Value::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
            Value::List(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    "list parameters can only be bound through `IN @Name`".into(),
                ))
            }
        })
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::Integer(number),
        ValueRef::Real(number) => Value::Real(number),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Rewrites every `@Name` bound to a list into `(@Name0, @Name1, ...)` and
/// binds the items individually. An empty list becomes `(NULL)`.
fn expand_lists(sql: &str, params: Params) -> DbResult<(String, Params)> {
    let mut sql = sql.to_string();
    let mut expanded = Params::new();

    for (name, value) in params.iter() {
        let Value::List(items) = value else {
            expanded.set(name, value.clone());
            continue;
        };

        let pattern = Regex::new(&format!(r"([@:$]){}\b", regex::escape(name))).map_err(
            |err| DbError::InvalidParameter {
                name: name.to_string(),
                message: err.to_string(),
            },
        )?;
        let markers = |prefix: &str| {
            if items.is_empty() {
                return "(NULL)".to_string();
            }
            let names = (0..items.len())
                .map(|index| format!("{prefix}{name}{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({names})")
        };
        sql = pattern
            .replace_all(&sql, |captures: &regex::Captures<'_>| markers(&captures[1]))
            .into_owned();

        for (index, item) in items.iter().enumerate() {
            if matches!(item, Value::List(_)) {
                return Err(DbError::InvalidParameter {
                    name: name.to_string(),
                    message: "nested lists cannot be bound".to_string(),
                });
            }
            expanded.set(&format!("{name}{index}"), item.clone());
        }
    }

    Ok((sql, expanded))
}

fn bind_named(stmt: &mut Statement<'_>, params: &Params) -> DbResult<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(name) = stmt.parameter_name(index).map(str::to_string) else {
            continue;
        };
        let name = name.trim_start_matches(PARAMETER_PREFIXES);
        let value = params.get(name).ok_or_else(|| DbError::InvalidParameter {
            name: name.to_string(),
            message: "referenced by the statement but not bound".to_string(),
        })?;
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}

fn execute_all(conn: &rusqlite::Connection, sql: &str, params: &Params) -> DbResult<u64> {
    let mut batch = Batch::new(conn, sql);
    let mut changed = 0;
    while let Some(mut stmt) = batch.next()? {
        bind_named(&mut stmt, params)?;
        if stmt.column_count() == 0 {
            changed += stmt.raw_execute()? as u64;
        } else {
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
        }
    }
    Ok(changed)
}

fn scalar(conn: &rusqlite::Connection, sql: &str, params: &Params) -> DbResult<Value> {
    let mut batch = Batch::new(conn, sql);
    let mut result = None;
    while let Some(mut stmt) = batch.next()? {
        bind_named(&mut stmt, params)?;
        if stmt.column_count() == 0 {
            stmt.raw_execute()?;
            continue;
        }
        let mut rows = stmt.raw_query();
        result = match rows.next()? {
            Some(row) => Some(read_value(row.get_ref(0)?)),
            None => None,
        };
    }
    result.ok_or(DbError::NoScalarResult)
}

/// Feeds every row of every row-producing statement to `sink` until it
/// returns `false`, after dropping the first `skip` rows.
///
/// Statements that produce no rows only run when `skip` is zero, so a
/// resumed lazy query does not repeat its writes.
fn query_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
    mut skip: usize,
    sink: &mut dyn FnMut(Row) -> bool,
) -> DbResult<()> {
    let resumed = skip > 0;
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        if stmt.column_count() == 0 {
            if !resumed {
                bind_named(&mut stmt, params)?;
                stmt.raw_execute()?;
            }
            continue;
        }
        bind_named(&mut stmt, params)?;

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            if skip > 0 {
                skip -= 1;
                continue;
            }
            let values = (0..columns.len())
                .map(|index| row.get_ref(index).map(read_value))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if !sink(Row::new(columns.clone(), values)) {
                return Ok(());
            }
        }
    }
    Ok(())
}
