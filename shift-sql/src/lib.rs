//! # shift-sql
//!
//! SQL dialects and the templated statement protocol for schemashift.
//!
//! Statements are written once as templates and rendered per engine. A
//! template never interpolates caller data directly: every identifier,
//! bind value and result column goes through the `req` object, which
//! quotes, numbers placeholders and records scan destinations for the
//! target [`Dialect`].
//!
//! ## Dialects
//!
//! ```rust
//! use shift_sql::Dialect;
//!
//! let pg = Dialect::from_driver_name("postgres").unwrap();
//! assert_eq!(pg.ident("public.users").unwrap(), "\"public\".\"users\"");
//! assert_eq!(pg.arg_placeholder(2), "$2");
//!
//! let mysql = Dialect::from_driver_name("mysql").unwrap();
//! assert_eq!(mysql.ident("users").unwrap(), "`users`");
//! assert_eq!(mysql.select_for(&["SHARE"]).unwrap(), "FOR SHARE");
//!
//! assert!(Dialect::from_driver_name("oracle").is_none());
//! ```
//!
//! ## Rendering
//!
//! ```rust
//! use shift_sql::{Dialect, SqlValue, TemplateRegistry};
//!
//! let registry = TemplateRegistry::builder()
//!     .template("touch.sql", "UPDATE {{ req.ident('t') }} SET n = {{ req.arg(1) }}")
//!     .build()
//!     .unwrap();
//!
//! let rendered = registry.render_sql("touch.sql", Dialect::Sqlite, &()).unwrap();
//! assert_eq!(rendered.sql, "UPDATE \"t\" SET n = ?");
//! assert_eq!(rendered.args, vec![SqlValue::Int(1)]);
//! ```

pub mod args;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod registry;
pub mod request;
pub mod scan;
pub mod transaction;
pub mod types;
pub mod value;

pub use args::ArgCollector;
pub use dialect::{Dialect, LockStrength, LockWait, RowLock};
pub use error::{TemplateError, TemplateResult, ValidationErrors};
pub use registry::{RenderedSql, TemplateRegistry, TemplateRegistryBuilder};
pub use request::{SqlTemplate, TemplateData};
pub use scan::{ResultBinder, ScannedRow};
pub use transaction::IsolationLevel;
pub use types::{ColumnType, MAX_CHAR_LENGTH};
pub use value::SqlValue;

// Templates build their payloads from minijinja values.
pub use minijinja::Value as TemplateValue;
