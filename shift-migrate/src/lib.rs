//! # shift-migrate
//!
//! Reversible schema migrations for schemashift.
//!
//! This crate provides:
//! - Statement builders for common DDL (create table, add column, create index)
//!   plus raw statements backed by caller-registered templates
//! - Steps: ordered groups of statements applied as one version transition
//! - A migrator that tracks `(version, dirty)` in an append-only log table
//! - Operator recovery for databases left half-migrated
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Statements   │────▶│ Template       │────▶│ Rendered    │
//! │ (builders)   │     │ Registry       │     │ SQL + args  │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!        │                                           │
//!        ▼                                           ▼
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Steps        │────▶│ Migrator       │────▶│ Database    │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                              │
//!                              ▼
//!                      ┌────────────────┐
//!                      │ migrations_log │
//!                      └────────────────┘
//! ```
//!
//! Step 0 is built in: it creates the log table. The version after `up` is
//! therefore the number of caller steps plus one.
//!
//! ## Example
//!
//! ```rust,ignore
//! use shift_migrate::prelude::*;
//!
//! async fn migrate(db: impl Database) -> MigrateResult<()> {
//!     let migrator = Migrator::builder(db)
//!         .driver("postgres")
//!         .step(Step::new(
//!             "widgets",
//!             [
//!                 Statement::create_table(
//!                     "widgets",
//!                     [
//!                         Column::new("id", ColumnType::BigInt),
//!                         Column::new("name", ColumnType::Text),
//!                     ],
//!                 ),
//!                 Statement::create_index(true, "name", "widgets", ["name"]),
//!             ],
//!         ))
//!         .build()?;
//!
//!     let applied = migrator.up().await?;
//!     let (version, dirty) = migrator.current().await?;
//!     println!("applied {applied} steps, now at {version} (dirty: {dirty})");
//!     Ok(())
//! }
//! ```
//!
//! ## Recovery
//!
//! On engines without transactional DDL a failed step leaves the database
//! dirty and the migrator refuses to move. After repairing the schema by
//! hand, record the outcome:
//!
//! ```rust,ignore
//! // The interrupted step is now fully applied.
//! migrator.set_recovered_to_next().await?;
//! // Or: it is fully undone.
//! migrator.set_recovered_to_prev().await?;
//! // Or: force any state.
//! migrator.set(3, false).await?;
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod executor;
pub mod log;
pub mod migrator;
pub mod statement;
pub mod step;
pub mod templates;

// Re-exports
pub use column::Column;
pub use config::MigratorConfig;
pub use error::{MigrateResult, MigrationError};
pub use executor::{Database, Executor, Transaction};
pub use log::{BOOKKEEPING_STEP, DEFAULT_TABLE_NAME, LogEntry};
pub use migrator::{Migrator, MigratorBuilder, PlannedStep};
pub use statement::{AddColumn, CreateIndex, CreateTable, Direction, RawStatement, Statement};
pub use step::{PartialExecution, Step};

/// Commonly used types.
pub mod prelude {
    pub use crate::column::Column;
    pub use crate::config::MigratorConfig;
    pub use crate::error::{MigrateResult, MigrationError};
    pub use crate::executor::{Database, Executor, Transaction};
    pub use crate::migrator::Migrator;
    pub use crate::statement::{Direction, Statement};
    pub use crate::step::Step;
    pub use shift_sql::{ColumnType, Dialect, IsolationLevel, SqlValue};
}
