//! Engine configuration.
//!
//! # Responsibility
//! - Carry the schema-creation flag and store tuning knobs.
//! - Load configuration from JSON with every field optional.
//!
//! # Invariants
//! - Missing fields fall back to documented defaults.
//! - Malformed input surfaces as `InvalidConfiguration`, never a panic.

use crate::error::{PersistenceError, PersistenceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Whether the registry may create missing tables, indexes and sequences.
    pub create_tables: bool,
    pub sqlite: SqliteConfig,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            create_tables: true,
            sqlite: SqliteConfig::default(),
        }
    }
}

impl PersistenceConfig {
    pub fn from_json_str(raw: &str) -> PersistenceResult<Self> {
        serde_json::from_str(raw).map_err(|err| {
            PersistenceError::InvalidConfiguration(format!("malformed configuration: {err}"))
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PersistenceError::InvalidConfiguration(format!(
                "failed to read configuration `{}`: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub busy_timeout_ms: u64,
    /// Declare unconditioned foreign constraints natively instead of
    /// enforcing them in the engine.
    pub native_foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            native_foreign_keys: false,
        }
    }
}

impl SqliteConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::PersistenceConfig;
    use crate::error::ErrorKind;

    #[test]
    fn empty_object_yields_defaults() {
        let config = PersistenceConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PersistenceConfig::default());
        assert!(config.create_tables);
        assert_eq!(config.sqlite.busy_timeout_ms, 5_000);
    }

    #[test]
    fn nested_fields_override_defaults() {
        let config =
            PersistenceConfig::from_json_str(r#"{"sqlite":{"native_foreign_keys":true}}"#).unwrap();
        assert!(config.sqlite.native_foreign_keys);
        assert_eq!(config.sqlite.busy_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_json_is_invalid_configuration() {
        let err = PersistenceConfig::from_json_str("{create_tables:").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }
}
