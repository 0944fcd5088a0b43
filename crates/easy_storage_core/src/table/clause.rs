//! Dynamic WHERE injection and ad-hoc aggregate statements.
//!
//! # Invariants
//! - Derived statements are built per call and never cached.
//! - Only the template's recorded filter slot is rewritten.

use crate::table::{MappingResult, Table, Template};

/// Parameter bound by single-value filters.
pub const VALUE_PARAMETER: &str = "Value";
/// Parameter bound by multi-value (IN) filters.
pub const VALUES_PARAMETER: &str = "Values";

/// An ad-hoc statement derived from a template plus one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilterQuery {
    pub sql: String,
    /// Parameter name the caller must bind, without prefix.
    pub parameter_name: &'static str,
    pub is_multi_value: bool,
}

/// Scalar aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

impl Table {
    /// Rewrites the filter slot of `template` into `Column = @Value` when
    /// `single`, otherwise `Column IN @Values`.
    ///
    /// # Errors
    /// - `PropertyNotFound` when `property` is not mapped.
    /// - `NoFilterPlaceholder` when `template` has no filter slot.
    pub fn with_clause(
        &self,
        template: &Template,
        property: &str,
        single: bool,
    ) -> MappingResult<CompiledFilterQuery> {
        let column = self.column(property)?;
        let (operator, parameter_name) = if single {
            ("=", VALUE_PARAMETER)
        } else {
            ("IN", VALUES_PARAMETER)
        };
        let condition = format!(
            "{column} {operator} {}",
            self.dialect().parameter(parameter_name)
        );

        Ok(CompiledFilterQuery {
            sql: template.with_condition(&condition)?,
            parameter_name,
            is_multi_value: !single,
        })
    }

    /// Renders `SELECT <FUNC>([DISTINCT] Column) FROM Table`.
    ///
    /// # Errors
    /// - `PropertyNotFound` when `property` is not mapped.
    pub fn aggregate(
        &self,
        function: Aggregate,
        property: &str,
        distinct: bool,
    ) -> MappingResult<String> {
        let column = self.column(property)?;
        let distinct = if distinct { "DISTINCT " } else { "" };
        Ok(format!(
            "SELECT {}({distinct}{column}) FROM {}",
            function.as_str(),
            self.quoted_name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{Aggregate, VALUES_PARAMETER, VALUE_PARAMETER};
    use crate::model::dialect::Dialect;
    use crate::model::meta::{FieldInfo, ModelInfo};
    use crate::table::{MappingError, Table};

    fn person() -> Table {
        let info = ModelInfo::new("Person")
            .property("Id")
            .property("Name")
            .property("Age")
            .field(FieldInfo::new("Address").ignored());
        Table::from_info(&info, Dialect::Generic).unwrap()
    }

    #[test]
    fn single_value_filter_uses_equality() {
        let table = person();
        let query = table.with_clause(table.select(), "Name", true).unwrap();

        assert_eq!(
            query.sql,
            "SELECT\n    [Person].[Id] AS 'Id',\n    [Person].[Name] AS 'Name',\n    [Person].[Age] AS 'Age'\nFROM [Person]\nWHERE\n    [Name] = @Value;"
        );
        assert_eq!(query.parameter_name, VALUE_PARAMETER);
        assert!(!query.is_multi_value);
    }

    #[test]
    fn multi_value_filter_uses_in() {
        let table = person();
        let query = table.with_clause(table.delete(), "Age", false).unwrap();

        assert_eq!(query.sql, "DELETE FROM [Person]\nWHERE\n    [Age] IN @Values;");
        assert_eq!(query.parameter_name, VALUES_PARAMETER);
        assert!(query.is_multi_value);
    }

    #[test]
    fn update_custom_keeps_the_set_list() {
        let table = person();
        let query = table.with_clause(table.update_custom(), "Name", true).unwrap();
        assert_eq!(
            query.sql,
            "UPDATE [Person] SET\n    [Name] = @Name,\n    [Age] = @Age\nWHERE\n    [Name] = @Value;"
        );
    }

    #[test]
    fn cached_template_is_not_mutated() {
        let table = person();
        let before = table.select().clone();
        table.with_clause(table.select(), "Age", true).unwrap();
        assert_eq!(table.select(), &before);
    }

    #[test]
    fn marker_text_elsewhere_is_left_alone() {
        let info = ModelInfo::new("Rule")
            .table("Rule 1 = 1")
            .property("Id")
            .field(FieldInfo::new("Expr").column("1 = 1"));
        let table = Table::from_info(&info, Dialect::Generic).unwrap();
        let query = table.with_clause(table.select(), "Id", true).unwrap();

        assert_eq!(
            query.sql,
            "SELECT\n    [Rule 1 = 1].[Id] AS 'Id',\n    [Rule 1 = 1].[1 = 1] AS 'Expr'\nFROM [Rule 1 = 1]\nWHERE\n    [Id] = @Value;"
        );
        let delete = table.with_clause(table.delete(), "Expr", false).unwrap();
        assert_eq!(delete.sql, "DELETE FROM [Rule 1 = 1]\nWHERE\n    [1 = 1] IN @Values;");
    }

    #[test]
    fn unknown_or_ignored_property_is_not_found() {
        let table = person();
        for property in ["Address", "Address.Street", "name"] {
            let error = table.with_clause(table.select(), property, true).unwrap_err();
            assert_eq!(
                error,
                MappingError::PropertyNotFound {
                    table: "Person".to_string(),
                    property: property.to_string(),
                }
            );
        }
    }

    #[test]
    fn aggregates_render_with_optional_distinct() {
        let table = person();
        assert_eq!(
            table.aggregate(Aggregate::Count, "Age", false).unwrap(),
            "SELECT COUNT([Age]) FROM [Person]"
        );
        assert_eq!(
            table.aggregate(Aggregate::Sum, "Age", true).unwrap(),
            "SELECT SUM(DISTINCT [Age]) FROM [Person]"
        );
        assert_eq!(
            table.aggregate(Aggregate::Max, "Name", false).unwrap(),
            "SELECT MAX([Name]) FROM [Person]"
        );
        assert!(table.aggregate(Aggregate::Avg, "Address", false).is_err());
    }
}
