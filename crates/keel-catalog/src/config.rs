//! Catalog configuration.
//!
//! Values come from defaults overridden by `KEEL_*` environment variables.
//! Per-table settings are not configured here; they come from table
//! properties (see [`crate::properties`]).

use keel_core::error::{Error, Result};

use crate::properties::IcebergCatalogKind;

/// Catalog service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Number of pooled metastore clients.
    pub metastore_pool_size: usize,
    /// Whether creation-event reconciliation runs during loads.
    pub event_processing_enabled: bool,
    /// Catalog kind assumed for tables without an `iceberg.catalog` property.
    pub default_iceberg_catalog: IcebergCatalogKind,
    /// Maximum number of table loads in flight during a bulk load.
    pub load_concurrency: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            metastore_pool_size: 8,
            event_processing_enabled: true,
            default_iceberg_catalog: IcebergCatalogKind::HadoopTables,
            load_concurrency: 16,
        }
    }
}

impl CatalogConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KEEL_METASTORE_POOL_SIZE`: pooled metastore clients (default 8)
    /// - `KEEL_EVENT_PROCESSING_ENABLED`: `true`/`false` (default true)
    /// - `KEEL_DEFAULT_ICEBERG_CATALOG`: `hadoop.tables`, `hadoop.catalog`
    ///   or `hive.catalog` (default `hadoop.tables`)
    /// - `KEEL_LOAD_CONCURRENCY`: concurrent loads in a bulk load (default 16)
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(size) = env_usize("KEEL_METASTORE_POOL_SIZE")? {
            config.metastore_pool_size = size;
        }
        if let Some(enabled) = env_bool("KEEL_EVENT_PROCESSING_ENABLED")? {
            config.event_processing_enabled = enabled;
        }
        if let Some(kind) = env_string("KEEL_DEFAULT_ICEBERG_CATALOG") {
            config.default_iceberg_catalog = kind.parse().map_err(|e| {
                Error::InvalidInput(format!("KEEL_DEFAULT_ICEBERG_CATALOG: {e}"))
            })?;
        }
        if let Some(concurrency) = env_usize("KEEL_LOAD_CONCURRENCY")? {
            config.load_concurrency = concurrency;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if a size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.metastore_pool_size == 0 {
            return Err(Error::InvalidInput(
                "metastore_pool_size must be at least 1".into(),
            ));
        }
        if self.load_concurrency == 0 {
            return Err(Error::InvalidInput(
                "load_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<usize>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CatalogConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.event_processing_enabled);
        assert_eq!(config.default_iceberg_catalog, IcebergCatalogKind::HadoopTables);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = CatalogConfig {
            metastore_pool_size: 0,
            ..CatalogConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CatalogConfig {
            load_concurrency: 0,
            ..CatalogConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("X", "YES").expect("bool"));
        assert!(!parse_bool("X", " 0 ").expect("bool"));
        let err = parse_bool("KEEL_EVENT_PROCESSING_ENABLED", "maybe").expect_err("invalid");
        assert!(err.to_string().contains("KEEL_EVENT_PROCESSING_ENABLED"));
    }
}
