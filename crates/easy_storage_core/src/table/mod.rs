//! Table descriptors: record metadata mapped onto one table for one dialect.
//!
//! # Responsibility
//! - Derive table name, property -> column mapping and key/identity properties.
//! - Hold the compiled statement templates for the mapping.
//!
//! # Invariants
//! - Mapping order is declaration order and drives column order everywhere.
//! - The key property is always part of the mapping.
//! - A descriptor is immutable once built.
//!
//! # See also
//! - `table::sql` for rendering, `table::cache` for memoization.

pub mod cache;
pub mod clause;
pub mod filter;
pub mod sql;

use crate::model::dialect::Dialect;
use crate::model::meta::{FieldInfo, ModelInfo};
use log::debug;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub use sql::Template;

/// Name of the property used as key when nothing is marked.
pub const DEFAULT_KEY_PROPERTY: &str = "Id";

pub type MappingResult<T> = Result<T, MappingError>;

/// Mapping configuration failures and unknown property references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error(
        "The model does not have a default 'Id' property specified or any of its members marked as Identity."
    )]
    MissingKey,
    #[error("The model `{0}` does not have any persistable properties.")]
    NoPersistableProperties(String),
    #[error("The model `{model}` declares the property `{property}` more than once.")]
    DuplicateProperty { model: String, property: String },
    #[error("The model `{model}` marks both `{first}` and `{second}` as identity.")]
    MultipleIdentityProperties {
        model: String,
        first: String,
        second: String,
    },
    #[error("The given key `{property}` was not present in the mapping of `{table}`.")]
    PropertyNotFound { table: String, property: String },
    #[error("The statement has no filter placeholder to rewrite.")]
    NoFilterPlaceholder,
}

/// A persisted property and the identifier it renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub property: String,
    /// Quoted column identifier.
    pub column: String,
}

/// Immutable mapping of one record type onto one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    dialect: Dialect,
    name: String,
    quoted_name: String,
    columns: Vec<ColumnMapping>,
    column_index: HashMap<String, usize>,
    key_property: String,
    identity_property: Option<String>,
    ignored_properties: Vec<String>,
    select: Template,
    insert_identity: Template,
    insert_all: Template,
    update_default: Template,
    update_custom: Template,
    delete: Template,
}

impl Table {
    /// Builds the descriptor for `info` under `dialect`.
    ///
    /// # Errors
    /// - `NoPersistableProperties` when every property is ignored or none exist.
    /// - `DuplicateProperty` when a property name repeats.
    /// - `MissingKey` when no single property is marked primary key and none
    ///   is named `Id`.
    /// - `MultipleIdentityProperties` when more than one property is identity.
    pub fn from_info(info: &ModelInfo, dialect: Dialect) -> MappingResult<Self> {
        let name = info.table.clone().unwrap_or_else(|| info.type_name.clone());
        let quoted_name = dialect.quote(&name);

        let (persisted, ignored): (Vec<&FieldInfo>, Vec<&FieldInfo>) =
            info.fields.iter().partition(|field| !field.ignored);
        if persisted.is_empty() {
            return Err(MappingError::NoPersistableProperties(
                info.type_name.clone(),
            ));
        }

        let mut columns = Vec::with_capacity(persisted.len());
        let mut column_index = HashMap::with_capacity(persisted.len());
        for field in &persisted {
            if column_index
                .insert(field.name.clone(), columns.len())
                .is_some()
            {
                return Err(MappingError::DuplicateProperty {
                    model: info.type_name.clone(),
                    property: field.name.clone(),
                });
            }
            let column = field.column.as_deref().unwrap_or(&field.name);
            columns.push(ColumnMapping {
                property: field.name.clone(),
                column: dialect.quote(column),
            });
        }

        let key_property = resolve_key(&persisted)?;
        let identity_property = resolve_identity(&info.type_name, &persisted)?;
        let generated = identity_property.as_deref().unwrap_or(&key_property);

        let templates = sql::compile(&sql::Skeleton {
            dialect,
            table: &quoted_name,
            columns: &columns,
            key_property: &key_property,
            generated_property: generated,
        });

        debug!(
            "event=table_compile module=table status=ok table={} dialect={} columns={}",
            name,
            dialect,
            columns.len()
        );

        Ok(Self {
            dialect,
            name,
            quoted_name,
            columns,
            column_index,
            key_property,
            identity_property,
            ignored_properties: ignored.iter().map(|field| field.name.clone()).collect(),
            select: templates.select,
            insert_identity: templates.insert_identity,
            insert_all: templates.insert_all,
            update_default: templates.update_default,
            update_custom: templates.update_custom,
            delete: templates.delete,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Unquoted table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name quoted for the dialect.
    pub fn quoted_name(&self) -> &str {
        &self.quoted_name
    }

    /// Persisted properties in declaration order.
    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    /// Resolves a property to its quoted column.
    ///
    /// # Errors
    /// - `PropertyNotFound` for ignored, nested or unknown properties.
    pub fn column(&self, property: &str) -> MappingResult<&str> {
        self.column_index
            .get(property)
            .map(|index| self.columns[*index].column.as_str())
            .ok_or_else(|| MappingError::PropertyNotFound {
                table: self.name.clone(),
                property: property.to_string(),
            })
    }

    pub fn key_property(&self) -> &str {
        &self.key_property
    }

    pub fn identity_property(&self) -> Option<&str> {
        self.identity_property.as_deref()
    }

    pub fn ignored_properties(&self) -> &[String] {
        &self.ignored_properties
    }

    pub fn select(&self) -> &Template {
        &self.select
    }

    pub fn insert_identity(&self) -> &Template {
        &self.insert_identity
    }

    pub fn insert_all(&self) -> &Template {
        &self.insert_all
    }

    pub fn update_default(&self) -> &Template {
        &self.update_default
    }

    pub fn update_custom(&self) -> &Template {
        &self.update_custom
    }

    pub fn delete(&self) -> &Template {
        &self.delete
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.quoted_name, self.dialect)
    }
}

fn resolve_key(persisted: &[&FieldInfo]) -> MappingResult<String> {
    let mut marked = persisted.iter().filter(|field| field.primary_key);
    if let (Some(field), None) = (marked.next(), marked.next()) {
        return Ok(field.name.clone());
    }

    persisted
        .iter()
        .find(|field| field.name == DEFAULT_KEY_PROPERTY)
        .map(|field| field.name.clone())
        .ok_or(MappingError::MissingKey)
}

fn resolve_identity(type_name: &str, persisted: &[&FieldInfo]) -> MappingResult<Option<String>> {
    let mut marked = persisted.iter().filter(|field| field.identity);
    match (marked.next(), marked.next()) {
        (None, _) => Ok(None),
        (Some(field), None) => Ok(Some(field.name.clone())),
        (Some(first), Some(second)) => Err(MappingError::MultipleIdentityProperties {
            model: type_name.to_string(),
            first: first.name.clone(),
            second: second.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{MappingError, Table};
    use crate::model::dialect::Dialect;
    use crate::model::meta::{FieldInfo, ModelInfo};

    fn person() -> ModelInfo {
        ModelInfo::new("Person")
            .property("Id")
            .property("Name")
            .property("Age")
    }

    #[test]
    fn id_property_is_the_default_key() {
        let table = Table::from_info(&person(), Dialect::Generic).unwrap();
        assert_eq!(table.name(), "Person");
        assert_eq!(table.quoted_name(), "[Person]");
        assert_eq!(table.key_property(), "Id");
        assert_eq!(table.identity_property(), None);
    }

    #[test]
    fn marked_primary_key_wins_over_id() {
        let info = ModelInfo::new("Order")
            .property("Id")
            .field(FieldInfo::new("Number").primary_key());
        let table = Table::from_info(&info, Dialect::Generic).unwrap();
        assert_eq!(table.key_property(), "Number");
    }

    #[test]
    fn id_lookup_is_case_sensitive() {
        let info = ModelInfo::new("Thing").property("id").property("Name");
        let error = Table::from_info(&info, Dialect::Generic).unwrap_err();
        assert_eq!(error, MappingError::MissingKey);
    }

    #[test]
    fn missing_key_uses_the_fixed_message() {
        let info = ModelInfo::new("Thing").property("Name");
        let error = Table::from_info(&info, Dialect::Generic).unwrap_err();
        assert_eq!(
            error.to_string(),
            "The model does not have a default 'Id' property specified or any of its members marked as Identity."
        );
    }

    #[test]
    fn ignored_properties_are_not_mapped() {
        let info = person().field(FieldInfo::new("Display").ignored());
        let table = Table::from_info(&info, Dialect::Generic).unwrap();
        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.ignored_properties(), ["Display".to_string()]);
        assert!(matches!(
            table.column("Display"),
            Err(MappingError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn ignored_id_cannot_act_as_key() {
        let info = ModelInfo::new("Thing")
            .field(FieldInfo::new("Id").ignored())
            .property("Name");
        assert_eq!(
            Table::from_info(&info, Dialect::Generic).unwrap_err(),
            MappingError::MissingKey
        );
    }

    #[test]
    fn model_without_properties_fails() {
        let info = ModelInfo::new("Empty").field(FieldInfo::new("Cache").ignored());
        assert_eq!(
            Table::from_info(&info, Dialect::Generic).unwrap_err(),
            MappingError::NoPersistableProperties("Empty".to_string())
        );
    }

    #[test]
    fn duplicate_properties_fail() {
        let info = person().property("Name");
        assert!(matches!(
            Table::from_info(&info, Dialect::Generic),
            Err(MappingError::DuplicateProperty { .. })
        ));
    }

    #[test]
    fn two_identity_markers_fail() {
        let info = ModelInfo::new("Thing")
            .field(FieldInfo::new("Id").identity())
            .field(FieldInfo::new("Seq").identity());
        assert!(matches!(
            Table::from_info(&info, Dialect::Generic),
            Err(MappingError::MultipleIdentityProperties { .. })
        ));
    }

    #[test]
    fn table_override_and_column_override_are_applied() {
        let info = ModelInfo::new("SampleModel")
            .table("Samples")
            .property("Id")
            .field(FieldInfo::new("Guid").column("Key"));
        let table = Table::from_info(&info, Dialect::Sqlite).unwrap();
        assert_eq!(table.name(), "Samples");
        assert_eq!(table.column("Guid").unwrap(), "[Key]");
        assert!(table.column("Key").is_err());
    }
}
