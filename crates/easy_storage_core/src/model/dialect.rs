//! SQL dialect profiles.
//!
//! # Responsibility
//! - Describe the syntax differences between supported database flavours.
//! - Stay pure data: no connection or driver knowledge lives here.
//!
//! # Invariants
//! - A dialect value is `Copy` and usable as part of a cache key.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Database flavour used when rendering statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// ANSI-ish rendering with bracket quoting and `@` parameters.
    Generic,
    /// SQLite; identity inserts also select `last_insert_rowid()`.
    #[default]
    Sqlite,
}

impl Dialect {
    /// Opening identifier quote.
    pub const fn quote_open(self) -> char {
        match self {
            Self::Generic | Self::Sqlite => '[',
        }
    }

    /// Closing identifier quote.
    pub const fn quote_close(self) -> char {
        match self {
            Self::Generic | Self::Sqlite => ']',
        }
    }

    /// Prefix for named parameter markers.
    pub const fn parameter_prefix(self) -> char {
        match self {
            Self::Generic | Self::Sqlite => '@',
        }
    }

    /// Trailing statement appended to identity inserts so they yield the new row id.
    pub const fn identity_suffix(self) -> Option<&'static str> {
        match self {
            Self::Generic => None,
            Self::Sqlite => Some("SELECT last_insert_rowid();"),
        }
    }

    /// Quotes an identifier, e.g. `Person` -> `[Person]`.
    pub fn quote(self, identifier: &str) -> String {
        let mut quoted = String::with_capacity(identifier.len() + 2);
        quoted.push(self.quote_open());
        quoted.push_str(identifier);
        quoted.push(self.quote_close());
        quoted
    }

    /// Renders a parameter marker, e.g. `Name` -> `@Name`.
    pub fn parameter(self, name: &str) -> String {
        format!("{}{name}", self.parameter_prefix())
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Sqlite => "sqlite",
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Dialect;

    #[test]
    fn quotes_identifiers_with_brackets() {
        assert_eq!(Dialect::Generic.quote("Person"), "[Person]");
        assert_eq!(Dialect::Sqlite.quote("Key"), "[Key]");
    }

    #[test]
    fn renders_named_parameters() {
        assert_eq!(Dialect::Generic.parameter("Name"), "@Name");
    }

    #[test]
    fn only_sqlite_selects_the_new_identity() {
        assert!(Dialect::Generic.identity_suffix().is_none());
        assert_eq!(
            Dialect::Sqlite.identity_suffix(),
            Some("SELECT last_insert_rowid();")
        );
    }
}
