//! Record metadata: the reflection facility consumed by table mapping.
//!
//! # Responsibility
//! - Let a record type describe its persisted properties and markers.
//! - Move records in and out of driver values by property name.
//!
//! # Invariants
//! - `ModelInfo::fields` keeps declaration order; column order follows it.
//! - Markers are plain data; interpretation belongs to `table`.

use crate::model::value::{Params, Row, RowResult};

/// One declared property of a record type and its mapping markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// Explicit column name; the property name is used when absent.
    pub column: Option<String>,
    pub primary_key: bool,
    /// Value is assigned by the database on insert.
    pub identity: bool,
    /// Computed or transient; excluded from every statement.
    pub ignored: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            primary_key: false,
            identity: false,
            ignored: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Declared shape of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Bare type name; the default table name.
    pub type_name: String,
    /// Explicit table name override.
    pub table: Option<String>,
    pub fields: Vec<FieldInfo>,
}

impl ModelInfo {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Shorthand for an unmarked property.
    pub fn property(self, name: impl Into<String>) -> Self {
        self.field(FieldInfo::new(name))
    }
}

/// A record type that can be mapped to a table.
///
/// Implementations describe their properties once through [`Model::describe`];
/// the result is cached per dialect, so it must be a pure function.
pub trait Model: Sized + Send + 'static {
    fn describe() -> ModelInfo;

    /// Binds every persisted property by property name.
    fn to_params(&self) -> Params;

    /// Builds a record from a row whose labels are property names.
    fn from_row(row: &Row) -> RowResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::{FieldInfo, ModelInfo};

    #[test]
    fn builder_keeps_declaration_order() {
        let info = ModelInfo::new("Person")
            .field(FieldInfo::new("Id").identity())
            .property("Name")
            .property("Age");

        let names: Vec<&str> = info.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Name", "Age"]);
        assert!(info.fields[0].identity);
        assert!(info.table.is_none());
    }

    #[test]
    fn markers_are_independent() {
        let field = FieldInfo::new("Guid").column("Key").primary_key();
        assert_eq!(field.column.as_deref(), Some("Key"));
        assert!(field.primary_key);
        assert!(!field.identity);
        assert!(!field.ignored);
    }
}
