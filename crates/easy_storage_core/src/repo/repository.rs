//! Generic repository for one record type.
//!
//! # Responsibility
//! - Execute cached templates as-is or through a per-call filter.
//! - Map result rows back into records.
//!
//! # Invariants
//! - Filtered statements are derived per call and dropped afterwards.
//! - Every operation takes an optional transaction handle and forwards it.

use crate::db::Connection;
use crate::model::dialect::Dialect;
use crate::model::meta::Model;
use crate::model::value::{FromValue, Params, Row, RowError, Value};
use crate::repo::RepoResult;
use crate::table::cache::TableCache;
use crate::table::clause::{Aggregate, CompiledFilterQuery};
use crate::table::filter::{QueryFilter, QueryFilterBuilder};
use crate::table::{Table, Template};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use log::debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Records produced lazily by [`Repository::get_lazy`].
pub type RecordStream<T> = BoxStream<'static, RepoResult<T>>;

const IDENTITY_COLUMN: &str = "last_insert_rowid()";

/// CRUD and aggregate operations for records of `T` over connection `C`.
pub struct Repository<T, C: Connection> {
    conn: Arc<C>,
    table: Arc<Table>,
    _model: PhantomData<fn() -> T>,
}

impl<T, C: Connection> Clone for Repository<T, C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            table: Arc::clone(&self.table),
            _model: PhantomData,
        }
    }
}

impl<T: Model, C: Connection> Repository<T, C> {
    /// Resolves `T`'s descriptor through `cache` and binds it to `conn`.
    ///
    /// # Errors
    /// - `Mapping` when `T` cannot be mapped (e.g. no key property).
    pub fn new(conn: Arc<C>, cache: &TableCache, dialect: Dialect) -> RepoResult<Self> {
        Ok(Self {
            conn,
            table: cache.get::<T>(dialect)?,
            _model: PhantomData,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// All records, read before returning.
    pub async fn get(&self, transaction: Option<&C::Transaction>) -> RepoResult<Vec<T>> {
        let sql = self.table.select().as_str();
        self.fetch(sql, Params::new(), transaction).await
    }

    /// All records, read as the stream is polled.
    ///
    /// The connection stays usable while the stream is open, so records can
    /// be updated as they arrive.
    pub async fn get_lazy(&self, transaction: Option<&C::Transaction>) -> RepoResult<RecordStream<T>> {
        let rows = self
            .conn
            .query(self.table.select().as_str(), Params::new(), transaction, false)
            .await?;
        debug!(
            "event=repo_query module=repo status=ok table={} kind=select mode=lazy",
            self.table.name()
        );
        Ok(rows
            .map(|row| -> RepoResult<T> { Ok(T::from_row(&row?)?) })
            .boxed())
    }

    /// Records whose `property` equals `value`.
    pub async fn get_by(
        &self,
        property: &str,
        value: impl Into<Value>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<Vec<T>> {
        let value = value.into();
        let query = self.filtered(self.table.select(), property, true)?;
        let params = Params::new().with_value(query.parameter_name, value);
        self.fetch(&query.sql, params, transaction).await
    }

    /// Records whose `property` is any of `values`.
    pub async fn get_by_any<V: Into<Value>>(
        &self,
        property: &str,
        values: impl IntoIterator<Item = V>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<Vec<T>> {
        let values: Value = values.into_iter().collect();
        let query = self.filtered(self.table.select(), property, false)?;
        let params = Params::new().with_value(query.parameter_name, values);
        self.fetch(&query.sql, params, transaction).await
    }

    /// Starts a multi-condition filter over this repository's table.
    pub fn query_filter(&self) -> QueryFilterBuilder<'_, T> {
        QueryFilter::builder(&self.table)
    }

    /// Records selected by a caller-supplied filter.
    pub async fn get_filtered(
        &self,
        filter: &QueryFilter<T>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<Vec<T>> {
        self.fetch(filter.sql(), filter.params().clone(), transaction)
            .await
    }

    /// Inserts `item` and returns the identifier the statement yields.
    ///
    /// With `identity` the identity column is left to the database;
    /// otherwise every column, key included, is written.
    pub async fn insert(
        &self,
        item: &T,
        identity: bool,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<i64> {
        let started_at = Instant::now();
        let sql = self.insert_template(identity).as_str();
        let value = self
            .conn
            .execute_scalar(sql, item.to_params(), transaction)
            .await?;
        debug!(
            "event=repo_scalar module=repo status=ok table={} kind=insert identity={} duration_ms={}",
            self.table.name(),
            identity,
            started_at.elapsed().as_millis()
        );
        Ok(i64::from_value(IDENTITY_COLUMN, &value)?)
    }

    /// Inserts every item and returns the number of inserted rows.
    pub async fn insert_many(
        &self,
        items: &[T],
        identity: bool,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let sql = self.insert_template(identity).as_str();
        let params = items.iter().map(T::to_params).collect();
        self.execute("insert", sql, params, transaction).await
    }

    /// Updates the row whose key matches `item`'s key.
    pub async fn update(&self, item: &T, transaction: Option<&C::Transaction>) -> RepoResult<u64> {
        let sql = self.table.update_default().as_str();
        self.execute("update", sql, vec![item.to_params()], transaction)
            .await
    }

    /// Updates each item by its key.
    pub async fn update_many(
        &self,
        items: &[T],
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let sql = self.table.update_default().as_str();
        let params = items.iter().map(T::to_params).collect();
        self.execute("update", sql, params, transaction).await
    }

    /// Writes `item`'s non-key columns to every row whose `property` equals `value`.
    pub async fn update_by(
        &self,
        item: &T,
        property: &str,
        value: impl Into<Value>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        let value = value.into();
        let query = self.filtered(self.table.update_custom(), property, true)?;
        let params = item.to_params().with_value(query.parameter_name, value);
        self.execute("update", &query.sql, vec![params], transaction)
            .await
    }

    /// Writes `item`'s non-key columns to every row whose `property` is any of `values`.
    pub async fn update_by_any<V: Into<Value>>(
        &self,
        item: &T,
        property: &str,
        values: impl IntoIterator<Item = V>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        let values: Value = values.into_iter().collect();
        let query = self.filtered(self.table.update_custom(), property, false)?;
        let params = item.to_params().with_value(query.parameter_name, values);
        self.execute("update", &query.sql, vec![params], transaction)
            .await
    }

    /// Deletes rows whose `property` equals `value`.
    pub async fn delete_by(
        &self,
        property: &str,
        value: impl Into<Value>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        let value = value.into();
        let query = self.filtered(self.table.delete(), property, true)?;
        let params = Params::new().with_value(query.parameter_name, value);
        self.execute("delete", &query.sql, vec![params], transaction)
            .await
    }

    /// Deletes rows whose `property` is any of `values`.
    pub async fn delete_by_any<V: Into<Value>>(
        &self,
        property: &str,
        values: impl IntoIterator<Item = V>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        let values: Value = values.into_iter().collect();
        let query = self.filtered(self.table.delete(), property, false)?;
        let params = Params::new().with_value(query.parameter_name, values);
        self.execute("delete", &query.sql, vec![params], transaction)
            .await
    }

    /// Deletes every row.
    pub async fn delete_all(&self, transaction: Option<&C::Transaction>) -> RepoResult<u64> {
        let sql = self.table.delete().as_str();
        self.execute("delete", sql, Vec::new(), transaction).await
    }

    pub async fn count(
        &self,
        property: &str,
        distinct: bool,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        self.aggregate(Aggregate::Count, property, distinct, transaction)
            .await
    }

    /// Sum of `property` as a whole number; `0` when there are no non-null
    /// values. Real sums round to the nearest integer, ties to even.
    pub async fn sum(
        &self,
        property: &str,
        distinct: bool,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<i64> {
        let sum: Value = self
            .aggregate(Aggregate::Sum, property, distinct, transaction)
            .await?;
        Ok(whole_number(Aggregate::Sum.as_str(), &sum)?)
    }

    /// Average of `property`; `0.0` when there are no non-null values.
    pub async fn avg(
        &self,
        property: &str,
        distinct: bool,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<f64> {
        let avg: Option<f64> = self
            .aggregate(Aggregate::Avg, property, distinct, transaction)
            .await?;
        Ok(avg.unwrap_or_default())
    }

    /// Smallest value of `property`; use an `Option` target for empty tables.
    pub async fn min<V: FromValue>(
        &self,
        property: &str,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<V> {
        self.aggregate(Aggregate::Min, property, false, transaction)
            .await
    }

    /// Largest value of `property`; use an `Option` target for empty tables.
    pub async fn max<V: FromValue>(
        &self,
        property: &str,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<V> {
        self.aggregate(Aggregate::Max, property, false, transaction)
            .await
    }

    fn insert_template(&self, identity: bool) -> &Template {
        if identity {
            self.table.insert_identity()
        } else {
            self.table.insert_all()
        }
    }

    fn filtered(
        &self,
        template: &Template,
        property: &str,
        single: bool,
    ) -> RepoResult<CompiledFilterQuery> {
        Ok(self.table.with_clause(template, property, single)?)
    }

    async fn fetch(
        &self,
        sql: &str,
        params: Params,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<Vec<T>> {
        let started_at = Instant::now();
        let rows: Vec<Row> = self
            .conn
            .query(sql, params, transaction, true)
            .await?
            .try_collect()
            .await?;
        let records = rows
            .iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "event=repo_query module=repo status=ok table={} kind=select rows={} duration_ms={}",
            self.table.name(),
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    async fn execute(
        &self,
        kind: &str,
        sql: &str,
        params: Vec<Params>,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<u64> {
        let started_at = Instant::now();
        let affected = self.conn.execute(sql, params, transaction).await?;
        debug!(
            "event=repo_execute module=repo status=ok table={} kind={} affected={} duration_ms={}",
            self.table.name(),
            kind,
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    async fn aggregate<V: FromValue>(
        &self,
        function: Aggregate,
        property: &str,
        distinct: bool,
        transaction: Option<&C::Transaction>,
    ) -> RepoResult<V> {
        let sql = self.table.aggregate(function, property, distinct)?;
        let value = self
            .conn
            .execute_scalar(&sql, Params::new(), transaction)
            .await?;
        debug!(
            "event=repo_scalar module=repo status=ok table={} kind={}",
            self.table.name(),
            function.as_str()
        );
        Ok(V::from_value(function.as_str(), &value)?)
    }
}

fn whole_number(column: &str, value: &Value) -> Result<i64, RowError> {
    match value {
        Value::Null => Ok(0),
        Value::Real(number) => {
            let rounded = number.round_ties_even();
            if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
                Ok(rounded as i64)
            } else {
                Err(RowError::InvalidValue {
                    column: column.to_string(),
                    message: format!("{number} does not fit in i64"),
                })
            }
        }
        other => i64::from_value(column, other),
    }
}

#[cfg(test)]
mod tests {
    use super::whole_number;
    use crate::model::value::{RowError, Value};

    #[test]
    fn whole_number_rounds_reals_to_even() {
        assert_eq!(whole_number("SUM", &Value::Real(4.0)), Ok(4));
        assert_eq!(whole_number("SUM", &Value::Real(3.75)), Ok(4));
        assert_eq!(whole_number("SUM", &Value::Real(2.5)), Ok(2));
        assert_eq!(whole_number("SUM", &Value::Real(-1.5)), Ok(-2));
        assert_eq!(whole_number("SUM", &Value::Integer(9)), Ok(9));
        assert_eq!(whole_number("SUM", &Value::Null), Ok(0));
    }

    #[test]
    fn whole_number_rejects_out_of_range_reals() {
        let error = whole_number("SUM", &Value::Real(1e300)).unwrap_err();
        assert!(matches!(error, RowError::InvalidValue { .. }));
        assert!(whole_number("SUM", &Value::Text("1".to_string())).is_err());
    }
}
