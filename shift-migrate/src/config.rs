//! Migrator configuration.
//!
//! Configuration can be assembled in code or read from TOML:
//!
//! ```toml
//! driver = "postgres"
//! table_name = "schema_log"
//! use_transaction = true
//! isolation = "serializable"
//! ```
//!
//! Every field except `driver` has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shift_sql::{Dialect, IsolationLevel, ValidationErrors};

use crate::error::{MigrateResult, MigrationError};
use crate::log::DEFAULT_TABLE_NAME;

/// Configuration for a [`Migrator`](crate::Migrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Database driver name (`postgres`, `pgx`, `mysql`, `sqlite`, `sqlite3`, `ydb`).
    pub driver: String,
    /// Name of the bookkeeping table.
    pub table_name: String,
    /// Whether to wrap each step in a transaction on engines with
    /// transactional DDL.
    pub use_transaction: bool,
    /// Isolation level of step transactions.
    pub isolation: IsolationLevel,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            use_transaction: true,
            isolation: IsolationLevel::default(),
        }
    }
}

impl MigratorConfig {
    /// Create a configuration for a driver.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Default::default()
        }
    }

    /// Set the driver name.
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Set the bookkeeping table name.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    /// Enable or disable step transactions.
    pub fn use_transaction(mut self, enabled: bool) -> Self {
        self.use_transaction = enabled;
        self
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// The dialect for the configured driver.
    pub fn dialect(&self) -> MigrateResult<Dialect> {
        Dialect::from_driver_name(&self.driver)
            .ok_or_else(|| MigrationError::UnsupportedDriver(self.driver.clone()))
    }

    /// Report every problem with the configuration.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.driver.is_empty() {
            errors.push("driver is not set");
        }
        if self.table_name.is_empty() {
            errors.push("table name is empty");
        } else if let Err(e) = Dialect::Postgres.ident(&self.table_name) {
            errors.push(format!("table name: {}", e));
        }
        errors.into_result()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> MigrateResult<Self> {
        toml::from_str(content)
            .map_err(|e| MigrationError::config(format!("Failed to parse configuration: {}", e)))
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> MigrateResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MigrationError::config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Load a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrationError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Write a TOML file, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_toml_string()?).await?;
        Ok(())
    }
}
