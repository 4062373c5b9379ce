//! Error types for the migration engine.

use shift_sql::{TemplateError, ValidationErrors};
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Rendering a statement failed.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// A step, statement, column or configuration is invalid.
    #[error("Invalid migration definition: {0}")]
    Validation(#[from] ValidationErrors),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// No dialect is known for the configured driver.
    #[error("No dialect for driver '{0}'")]
    UnsupportedDriver(String),

    /// `next` at the last version or `prev` at version 0.
    #[error("No more migration steps in this direction")]
    EndOfSequence,

    /// The latest log entry is dirty; an operator has to recover first.
    #[error("Database is dirty at version {version}; manual recovery required")]
    Dirty {
        /// Version recorded with the dirty flag.
        version: usize,
    },

    /// A recovery operation that needs a dirty state found a clean one.
    #[error("Database is not dirty; nothing to recover")]
    NotDirty,

    /// A version outside `0..=max`.
    #[error("Invalid version {version}: must be between 0 and {max}")]
    InvalidVersion {
        /// Requested version.
        version: usize,
        /// Number of known steps.
        max: usize,
    },

    /// The migration log cannot be trusted. Fatal for the migrator instance.
    #[error("Migration log is corrupted: {0}")]
    Corrupted(String),

    /// A step stopped part-way.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        /// Step name.
        step: String,
        /// SQL of the statements that ran before the failure.
        executed_sql: String,
        /// The failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// `up`/`down` stopped before reaching the end of the sequence.
    #[error("Migration stopped after {completed} step(s): {source}")]
    Incomplete {
        /// Steps that succeeded first.
        completed: usize,
        /// The failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this is the end-of-sequence signal rather than a failure.
    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, Self::EndOfSequence)
    }

    /// Whether the log failed a consistency check.
    pub fn is_consistency_error(&self) -> bool {
        match self {
            Self::Corrupted(_) => true,
            Self::StepFailed { source, .. } | Self::Incomplete { source, .. } => {
                source.is_consistency_error()
            }
            _ => false,
        }
    }

    /// SQL that ran before a step failed, if this is a step failure.
    pub fn executed_sql(&self) -> Option<&str> {
        match self {
            Self::StepFailed { executed_sql, .. } => Some(executed_sql),
            Self::Incomplete { source, .. } => source.executed_sql(),
            _ => None,
        }
    }
}
