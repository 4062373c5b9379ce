//! SQLite driver for schemashift.
//!
//! Implements the migrator's [`Database`](shift_migrate::Database) trait on
//! top of `tokio-rusqlite`. SQLite runs DDL inside transactions, so every
//! step and its log entry commit or roll back together.
//!
//! # Example
//!
//! ```rust,ignore
//! use shift_migrate::prelude::*;
//! use shift_sqlite::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::open_url("sqlite://./app.db").await?;
//!     let migrator = db
//!         .migrator()
//!         .step(Step::new(
//!             "widgets",
//!             [Statement::create_table(
//!                 "widgets",
//!                 [Column::new("id", ColumnType::BigInt)],
//!             )],
//!         ))
//!         .build()?;
//!
//!     migrator.up().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use database::{DRIVER_NAME, SqliteDatabase, SqliteTransaction};
pub use error::{SqliteError, SqliteResult};
