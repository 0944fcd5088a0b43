//! Caller-composed filters over a table's select template.
//!
//! # Responsibility
//! - Combine several property conditions with `AND` into one ad-hoc query.
//! - Bind each condition value to its own generated parameter.
//!
//! # Invariants
//! - Property names resolve through the table mapping or the build fails.
//! - The select template is copied, never modified.

use crate::model::value::{Params, Value};
use crate::table::{MappingResult, Table};
use std::marker::PhantomData;

/// Comparison applied to one property.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

impl QueryOperator {
    fn into_parts(self) -> (&'static str, Value) {
        match self {
            Self::Equal(value) => ("=", value),
            Self::NotEqual(value) => ("<>", value),
            Self::GreaterThan(value) => (">", value),
            Self::GreaterThanOrEqual(value) => (">=", value),
            Self::LessThan(value) => ("<", value),
            Self::LessThanOrEqual(value) => ("<=", value),
            Self::Like(pattern) => ("LIKE", Value::Text(pattern)),
            Self::In(values) => ("IN", Value::List(values)),
        }
    }
}

/// A finished ad-hoc query returning records of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter<T> {
    sql: String,
    params: Params,
    _model: PhantomData<fn() -> T>,
}

impl<T> QueryFilter<T> {
    /// Wraps caller-written SQL; the statement must select columns labelled
    /// with `T`'s property names.
    pub fn raw(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
            _model: PhantomData,
        }
    }

    pub fn builder(table: &Table) -> QueryFilterBuilder<'_, T> {
        QueryFilterBuilder {
            table,
            conditions: Vec::new(),
            params: Params::new(),
            _model: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// Accumulates `AND`-joined conditions for a [`QueryFilter`].
#[derive(Debug)]
pub struct QueryFilterBuilder<'t, T> {
    table: &'t Table,
    conditions: Vec<String>,
    params: Params,
    _model: PhantomData<fn() -> T>,
}

impl<T> QueryFilterBuilder<'_, T> {
    /// Adds `property <op> @pN`.
    ///
    /// # Errors
    /// - `PropertyNotFound` when `property` is not mapped.
    pub fn and(mut self, property: &str, operator: QueryOperator) -> MappingResult<Self> {
        let column = self.table.column(property)?;
        let parameter = format!("p{}", self.conditions.len());
        let (symbol, value) = operator.into_parts();

        self.conditions.push(format!(
            "{column} {symbol} {}",
            self.table.dialect().parameter(&parameter)
        ));
        self.params.set(&parameter, value);
        Ok(self)
    }

    /// Renders the conditions into the select template; with no conditions
    /// the always-true predicate stays in place.
    pub fn build(self) -> MappingResult<QueryFilter<T>> {
        let select = self.table.select();
        let sql = if self.conditions.is_empty() {
            select.as_str().to_string()
        } else {
            select.with_condition(&self.conditions.join("\n    AND "))?
        };

        Ok(QueryFilter {
            sql,
            params: self.params,
            _model: PhantomData,
        })
    }
}
