//! Built-in templates.
//!
//! The DDL builders and the migration log render from templates embedded
//! in the crate. [`builtin`] returns a registry builder that already holds
//! them; add your own raw-statement templates before building.
//!
//! ```rust
//! use shift_migrate::templates;
//!
//! let registry = templates::builtin()
//!     .template("backfill.up.sql", "UPDATE {{ req.ident(req.payload.table) }} SET n = 0")
//!     .template("backfill.down.sql", "SELECT 1")
//!     .build()
//!     .unwrap();
//! assert!(registry.contains(templates::LOG_INSERT));
//! assert!(registry.contains("backfill.up.sql"));
//! ```

use shift_sql::{TemplateRegistry, TemplateRegistryBuilder};

pub const CREATE_TABLE_UP: &str = "create_table.up.sql";
pub const CREATE_TABLE_DOWN: &str = "create_table.down.sql";
pub const ADD_COLUMN_UP: &str = "add_column.up.sql";
pub const ADD_COLUMN_DOWN: &str = "add_column.down.sql";
pub const CREATE_INDEX_UP: &str = "create_index.up.sql";
pub const CREATE_INDEX_DOWN: &str = "create_index.down.sql";
pub const LOG_COLUMNS: &str = "log_columns.sql";
pub const LOG_INSERT: &str = "log_insert.sql";
pub const LOG_LATEST: &str = "log_latest.sql";
pub const LOG_HISTORY: &str = "log_history.sql";
pub const TABLE_EXISTS: &str = "table_exists.sql";
pub const SERVER_EPOCH: &str = "server_epoch.sql";

/// Every embedded template, by name.
pub const BUILTIN: &[(&str, &str)] = &[
    (CREATE_TABLE_UP, include_str!("../templates/create_table.up.sql")),
    (CREATE_TABLE_DOWN, include_str!("../templates/create_table.down.sql")),
    (ADD_COLUMN_UP, include_str!("../templates/add_column.up.sql")),
    (ADD_COLUMN_DOWN, include_str!("../templates/add_column.down.sql")),
    (CREATE_INDEX_UP, include_str!("../templates/create_index.up.sql")),
    (CREATE_INDEX_DOWN, include_str!("../templates/create_index.down.sql")),
    (LOG_COLUMNS, include_str!("../templates/log_columns.sql")),
    (LOG_INSERT, include_str!("../templates/log_insert.sql")),
    (LOG_LATEST, include_str!("../templates/log_latest.sql")),
    (LOG_HISTORY, include_str!("../templates/log_history.sql")),
    (TABLE_EXISTS, include_str!("../templates/table_exists.sql")),
    (SERVER_EPOCH, include_str!("../templates/server_epoch.sql")),
];

/// A registry builder preloaded with the built-in templates.
pub fn builtin() -> TemplateRegistryBuilder {
    BUILTIN
        .iter()
        .fold(TemplateRegistry::builder(), |builder, &(name, source)| {
            builder.template(name, source)
        })
}

/// Built-in template names missing from `registry`.
pub fn missing_builtins(registry: &TemplateRegistry) -> Vec<&'static str> {
    BUILTIN
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !registry.contains(name))
        .collect()
}
