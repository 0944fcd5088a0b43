//! Statement template rendering.
//!
//! Output is compared byte-for-byte by callers, so the layout below
//! (four-space indentation, `\n` line breaks, trailing `;`) is part of the
//! contract.

use crate::model::dialect::Dialect;
use crate::table::{ColumnMapping, MappingError, MappingResult};
use std::fmt::{Display, Formatter};

const INDENT: &str = "    ";
const ALWAYS_TRUE: &str = "1 = 1";

/// A rendered statement, optionally carrying the position of its
/// always-true WHERE slot.
///
/// The slot is recorded as a byte offset while rendering, so filter
/// injection never searches the text for the `1 = 1` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    sql: String,
    filter_slot: Option<usize>,
}

impl Template {
    fn fixed(sql: String) -> Self {
        Self {
            sql,
            filter_slot: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Whether the statement ends in the always-true WHERE slot.
    pub fn is_filterable(&self) -> bool {
        self.filter_slot.is_some()
    }

    /// Returns a copy of the statement with the always-true slot replaced by
    /// `condition`. The template itself is left untouched.
    ///
    /// # Errors
    /// - `NoFilterPlaceholder` when the template has no slot.
    pub fn with_condition(&self, condition: &str) -> MappingResult<String> {
        let start = self.filter_slot.ok_or(MappingError::NoFilterPlaceholder)?;
        let end = start + ALWAYS_TRUE.len();

        let mut sql = String::with_capacity(self.sql.len() + condition.len());
        sql.push_str(&self.sql[..start]);
        sql.push_str(condition);
        sql.push_str(&self.sql[end..]);
        Ok(sql)
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

impl AsRef<str> for Template {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

impl PartialEq<str> for Template {
    fn eq(&self, other: &str) -> bool {
        self.sql == other
    }
}

impl PartialEq<&str> for Template {
    fn eq(&self, other: &&str) -> bool {
        self.sql == *other
    }
}

/// Inputs the compiler needs from a descriptor under construction.
pub(crate) struct Skeleton<'a> {
    pub dialect: Dialect,
    /// Quoted table name.
    pub table: &'a str,
    pub columns: &'a [ColumnMapping],
    pub key_property: &'a str,
    /// Property left out of identity inserts.
    pub generated_property: &'a str,
}

pub(crate) struct Templates {
    pub select: Template,
    pub insert_identity: Template,
    pub insert_all: Template,
    pub update_default: Template,
    pub update_custom: Template,
    pub delete: Template,
}

pub(crate) fn compile(skeleton: &Skeleton<'_>) -> Templates {
    let all: Vec<&ColumnMapping> = skeleton.columns.iter().collect();
    let without_generated: Vec<&ColumnMapping> = skeleton
        .columns
        .iter()
        .filter(|mapping| mapping.property != skeleton.generated_property)
        .collect();
    let without_key: Vec<&ColumnMapping> = skeleton
        .columns
        .iter()
        .filter(|mapping| mapping.property != skeleton.key_property)
        .collect();
    let key = skeleton
        .columns
        .iter()
        .find(|mapping| mapping.property == skeleton.key_property);

    Templates {
        select: render_select(skeleton, &all),
        insert_identity: render_insert(skeleton, &without_generated),
        insert_all: render_insert(skeleton, &all),
        update_default: render_update(skeleton, &without_key, key),
        update_custom: render_update(skeleton, &without_key, None),
        delete: with_filter_slot(format!("DELETE FROM {}\n", skeleton.table)),
    }
}

fn render_select(skeleton: &Skeleton<'_>, columns: &[&ColumnMapping]) -> Template {
    let list = columns
        .iter()
        .map(|mapping| {
            format!(
                "{INDENT}{}.{} AS '{}'",
                skeleton.table, mapping.column, mapping.property
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    with_filter_slot(format!("SELECT\n{list}\nFROM {}\n", skeleton.table))
}

fn render_insert(skeleton: &Skeleton<'_>, columns: &[&ColumnMapping]) -> Template {
    let names = columns
        .iter()
        .map(|mapping| format!("{INDENT}{}", mapping.column))
        .collect::<Vec<_>>()
        .join(",\n");
    let values = columns
        .iter()
        .map(|mapping| format!("{INDENT}{}", skeleton.dialect.parameter(&mapping.property)))
        .collect::<Vec<_>>()
        .join(",\n");

    let mut sql = format!(
        "INSERT INTO {}\n(\n{names}\n)\nVALUES\n(\n{values}\n);",
        skeleton.table
    );
    if let Some(suffix) = skeleton.dialect.identity_suffix() {
        sql.push('\n');
        sql.push_str(suffix);
    }
    Template::fixed(sql)
}

fn render_update(
    skeleton: &Skeleton<'_>,
    columns: &[&ColumnMapping],
    key: Option<&ColumnMapping>,
) -> Template {
    let assignments = columns
        .iter()
        .map(|mapping| {
            format!(
                "{INDENT}{} = {}",
                mapping.column,
                skeleton.dialect.parameter(&mapping.property)
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");
    let head = format!("UPDATE {} SET\n{assignments}\n", skeleton.table);

    match key {
        Some(key) => Template::fixed(format!(
            "{head}WHERE\n{INDENT}{} = {};",
            key.column,
            skeleton.dialect.parameter(&key.property)
        )),
        None => with_filter_slot(head),
    }
}

/// Appends `WHERE 1 = 1;` and records where the condition starts.
fn with_filter_slot(mut sql: String) -> Template {
    sql.push_str("WHERE\n");
    sql.push_str(INDENT);
    let slot = sql.len();
    sql.push_str(ALWAYS_TRUE);
    sql.push(';');
    Template {
        sql,
        filter_slot: Some(slot),
    }
}
