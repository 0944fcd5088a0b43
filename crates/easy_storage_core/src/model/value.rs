//! Dynamic values exchanged with the driver.
//!
//! # Responsibility
//! - Represent parameter and column values as a closed tagged variant.
//! - Convert stored values into typed record fields with explicit failures.
//!
//! # Invariants
//! - `Value::List` is only valid as a parameter (IN expansion), never as a column value.
//! - Conversions never coerce silently between text and numbers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub type RowResult<T> = Result<T, RowError>;

/// Failure while materialising a record from a result row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("column `{0}` is not present in the result row")]
    MissingColumn(String),
    #[error("column `{column}` holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("column `{column}` holds an invalid value: {message}")]
    InvalidValue { column: String, message: String },
}

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Multi-value parameter, expanded by the driver for `IN @Values`.
    List(Vec<Value>),
}

impl Value {
    /// Short type label used in conversion errors.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Real(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(column: &str, value: &Value) -> RowResult<Self>;
}

fn mismatch(column: &str, expected: &'static str, value: &Value) -> RowError {
    RowError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: value.kind(),
    }
}

impl FromValue for Value {
    fn from_value(_column: &str, value: &Value) -> RowResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        match value {
            Value::Integer(number) => Ok(*number),
            other => Err(mismatch(column, "integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        let wide = i64::from_value(column, value)?;
        i32::try_from(wide).map_err(|_| RowError::InvalidValue {
            column: column.to_string(),
            message: format!("{wide} does not fit in i32"),
        })
    }
}

impl FromValue for u32 {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        let wide = i64::from_value(column, value)?;
        u32::try_from(wide).map_err(|_| RowError::InvalidValue {
            column: column.to_string(),
            message: format!("{wide} does not fit in u32"),
        })
    }
}

impl FromValue for u64 {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        let wide = i64::from_value(column, value)?;
        u64::try_from(wide).map_err(|_| RowError::InvalidValue {
            column: column.to_string(),
            message: format!("{wide} is negative"),
        })
    }
}

impl FromValue for f64 {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        match value {
            Value::Real(number) => Ok(*number),
            // Integer storage (untyped columns, integer expressions) widens to f64.
            Value::Integer(number) => Ok(*number as f64),
            other => Err(mismatch(column, "real", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        match value {
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(other) => Err(RowError::InvalidValue {
                column: column.to_string(),
                message: format!("{other} is not a boolean flag"),
            }),
            other => Err(mismatch(column, "integer", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        match value {
            Value::Text(text) => Ok(text.clone()),
            other => Err(mismatch(column, "text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        match value {
            Value::Blob(bytes) => Ok(bytes.clone()),
            other => Err(mismatch(column, "blob", other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        let text = String::from_value(column, value)?;
        Uuid::parse_str(&text).map_err(|_| RowError::InvalidValue {
            column: column.to_string(),
            message: format!("invalid uuid value `{text}`"),
        })
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(column: &str, value: &Value) -> RowResult<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(column, value).map(Some)
    }
}

/// Named parameter bindings; names are given without the dialect prefix.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    values: HashMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a named value.
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Adds every binding from `other`, replacing same-named values.
    pub fn extend(&mut self, other: Params) {
        self.values.extend(other.values);
    }
}

/// One result row: column labels in select order with their values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value by column label.
    pub fn value(&self, column: &str) -> RowResult<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|index| &self.values[index])
            .ok_or_else(|| RowError::MissingColumn(column.to_string()))
    }

    /// Raw value by position.
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed value by column label.
    pub fn get<V: FromValue>(&self, column: &str) -> RowResult<V> {
        V::from_value(column, self.value(column)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{Params, Row, RowError, Value};
    use uuid::Uuid;

    fn sample_row() -> Row {
        Row::new(
            vec!["Id".to_string(), "Name".to_string(), "Nick".to_string()],
            vec![
                Value::Integer(7),
                Value::Text("Ann".to_string()),
                Value::Null,
            ],
        )
    }

    #[test]
    fn typed_get_reads_by_label() {
        let row = sample_row();
        assert_eq!(row.get::<i64>("Id").unwrap(), 7);
        assert_eq!(row.get::<String>("Name").unwrap(), "Ann");
        assert_eq!(row.get::<Option<String>>("Nick").unwrap(), None);
    }

    #[test]
    fn integers_widen_to_real() {
        let row = Row::new(vec!["Total".to_string()], vec![Value::Integer(3)]);
        assert_eq!(row.get::<f64>("Total").unwrap(), 3.0);
        assert!(row.get::<String>("Total").is_err());
    }

    #[test]
    fn missing_column_is_reported() {
        let error = sample_row().get::<i64>("Age").unwrap_err();
        assert_eq!(error, RowError::MissingColumn("Age".to_string()));
    }

    #[test]
    fn text_is_not_coerced_to_integer() {
        let error = sample_row().get::<i64>("Name").unwrap_err();
        assert!(matches!(
            error,
            RowError::TypeMismatch {
                expected: "integer",
                found: "text",
                ..
            }
        ));
    }

    #[test]
    fn uuid_round_trips_through_text() {
        let id = Uuid::new_v4();
        let row = Row::new(vec!["Guid".to_string()], vec![Value::from(id)]);
        assert_eq!(row.get::<Uuid>("Guid").unwrap(), id);
    }

    #[test]
    fn params_collect_lists_for_in_clauses() {
        let params = Params::new().with_value("Values", [1_i64, 2, 3].into_iter().collect::<Value>());
        assert_eq!(
            params.get("Values"),
            Some(&Value::List(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3)
            ]))
        );
    }
}
