//! Storage configuration.
//!
//! # Responsibility
//! - Describe how connections are opened and which dialect renders SQL.
//! - Parse configuration from JSON with defaults for omitted fields.
//!
//! # Invariants
//! - Unknown fields are rejected instead of ignored.
//! - `log_level` and `log_dir` are set together or not at all.

use crate::model::dialect::Dialect;
use serde::{Deserialize, Serialize};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_foreign_keys() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    /// Passed to `init_logging` together with `log_dir`.
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: default_foreign_keys(),
            log_level: None,
            log_dir: None,
        }
    }
}

impl StorageConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    /// - Returns a human-readable message for malformed JSON, unknown fields
    ///   or failed validation.
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| format!("invalid storage config: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.busy_timeout_ms == 0 {
            return Err("busy_timeout_ms must be greater than zero".to_string());
        }
        match (&self.log_level, &self.log_dir) {
            (Some(_), None) => Err("log_level requires log_dir".to_string()),
            (None, Some(_)) => Err("log_dir requires log_level".to_string()),
            _ => Ok(()),
        }
    }

    /// Starts file logging when both logging fields are set.
    pub fn init_logging(&self) -> Result<bool, String> {
        match (&self.log_level, &self.log_dir) {
            (Some(level), Some(dir)) => crate::logging::init_logging(level, dir).map(|()| true),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StorageConfig;
    use crate::model::dialect::Dialect;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StorageConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.foreign_keys);
    }

    #[test]
    fn dialect_is_lowercase() {
        let config =
            StorageConfig::from_json_str(r#"{"dialect": "generic", "busy_timeout_ms": 250}"#)
                .unwrap();
        assert_eq!(config.dialect, Dialect::Generic);
        assert_eq!(config.busy_timeout_ms, 250);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = StorageConfig::from_json_str(r#"{"pool_size": 4}"#).unwrap_err();
        assert!(error.contains("pool_size"));
    }

    #[test]
    fn logging_fields_must_be_paired() {
        let error = StorageConfig::from_json_str(r#"{"log_level": "info"}"#).unwrap_err();
        assert_eq!(error, "log_level requires log_dir");
    }

    #[test]
    fn logging_is_skipped_when_unset() {
        assert_eq!(StorageConfig::default().init_logging(), Ok(false));
    }
}
