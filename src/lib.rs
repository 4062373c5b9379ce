//! # schemashift
//!
//! Portable, reversible schema migrations.
//!
//! schemashift provides:
//! - Per-dialect SQL templates with bound arguments and result binding
//! - Builders for common DDL that render for MySQL, PostgreSQL, SQLite and YDB
//! - An append-only migration log tracking `(version, dirty)`
//! - Transactional steps on engines with transactional DDL, and explicit
//!   recovery where a failure leaves the database half-migrated
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use schemashift::prelude::*;
//! use schemashift::sqlite::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::open_url("sqlite://./app.db").await?;
//!
//!     let migrator = db
//!         .migrator()
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
//!     migrator.up().await?;
//!     assert_eq!(migrator.current().await?, (2, false));
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Dialects, argument collection, result binding and template rendering.
pub mod sql {
    pub use shift_sql::*;
}

/// Statements, steps and the migrator.
pub mod migrate {
    pub use shift_migrate::*;
}

/// The SQLite driver.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use shift_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use shift_migrate::prelude::*;
    pub use shift_sql::{SqlTemplate, TemplateData, TemplateRegistry};
}

// Re-export key types at the crate root
pub use shift_migrate::{
    Column, Database, Direction, Executor, LogEntry, MigrateResult, MigrationError, Migrator,
    MigratorBuilder, MigratorConfig, PlannedStep, Statement, Step, Transaction,
};
pub use shift_sql::{
    ColumnType, Dialect, IsolationLevel, SqlTemplate, SqlValue, TemplateData, TemplateError,
    TemplateRegistry, TemplateValue, ValidationErrors,
};
