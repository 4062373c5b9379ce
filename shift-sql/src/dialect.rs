//! SQL dialects.
//!
//! A [`Dialect`] is the per-engine rendering policy: identifier quoting,
//! bind placeholders, row-locking clauses, the "now" expression, column
//! type names and literal syntax. Dialects are plain `Copy` values with no
//! state, so the same dialect always renders the same input the same way.
//!
//! ```rust
//! use shift_sql::Dialect;
//!
//! let pg = Dialect::from_driver_name("pgx").unwrap();
//! assert_eq!(pg, Dialect::Postgres);
//! assert_eq!(pg.ident("public.users").unwrap(), r#""public"."users""#);
//! assert_eq!(pg.arg_placeholder(2), "$2");
//!
//! assert_eq!(Dialect::MySql.ident("users").unwrap(), "`users`");
//! assert_eq!(Dialect::Sqlite.arg_placeholder(2), "?");
//! assert!(Dialect::from_driver_name("oracle").is_none());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TemplateError, TemplateResult};
use crate::types::ColumnType;
use crate::value::SqlValue;

/// Driver name to dialect table. Matching is case-insensitive.
const DRIVERS: &[(&str, Dialect)] = &[
    ("mysql", Dialect::MySql),
    ("postgres", Dialect::Postgres),
    ("pgx", Dialect::Postgres),
    ("sqlite", Dialect::Sqlite),
    ("sqlite3", Dialect::Sqlite),
    ("ydb", Dialect::Ydb),
];

/// A supported SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// MySQL and MariaDB. `?` placeholders, backtick quoting.
    MySql,
    /// PostgreSQL. `$n` placeholders, double-quote quoting.
    Postgres,
    /// SQLite. `?` placeholders, double-quote quoting, no row locks.
    Sqlite,
    /// YDB. `$n` placeholders, backtick quoting, no row locks.
    Ydb,
}

impl Dialect {
    /// Every supported dialect.
    pub const ALL: [Dialect; 4] = [Self::MySql, Self::Postgres, Self::Sqlite, Self::Ydb];

    /// Look up the dialect for a database driver name.
    pub fn from_driver_name(driver: &str) -> Option<Self> {
        DRIVERS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(driver))
            .map(|(_, dialect)| *dialect)
    }

    /// The engine name, as exposed to templates.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Ydb => "ydb",
        }
    }

    /// Quote an identifier.
    ///
    /// A single `.` separates a schema from a name; each segment is quoted
    /// on its own. Empty names, empty segments and more than two segments
    /// are rejected.
    pub fn ident(&self, name: &str) -> TemplateResult<String> {
        if name.is_empty() {
            return Err(TemplateError::EmptyIdentifier);
        }

        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() > 2 {
            return Err(TemplateError::invalid_identifier(
                name,
                "too many '.'-separated segments",
            ));
        }

        let mut quoted = Vec::with_capacity(segments.len());
        for segment in segments {
            if segment.is_empty() {
                return Err(TemplateError::EmptyIdentifier);
            }
            quoted.push(self.quote_segment(name, segment)?);
        }
        Ok(quoted.join("."))
    }

    fn quote_segment(&self, full: &str, segment: &str) -> TemplateResult<String> {
        match self {
            Self::Postgres => {
                if segment.contains('\0') {
                    return Err(TemplateError::invalid_identifier(full, "invalid character"));
                }
                Ok(format!("\"{}\"", segment.replace('"', "\"\"")))
            }
            Self::Sqlite => Ok(format!("\"{}\"", segment.replace('"', "\"\""))),
            Self::MySql | Self::Ydb => Ok(format!("`{}`", segment.replace('`', "``"))),
        }
    }

    /// The placeholder for the `n`-th bound argument (1-based).
    pub fn arg_placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres | Self::Ydb => format!("${}", n),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Translate a row-locking clause such as `["SHARE", "NOWAIT"]`.
    ///
    /// Words are case-insensitive and may also be passed as one
    /// space-separated string. Engines without row locks return an empty
    /// string for every valid clause.
    pub fn select_for(&self, words: &[&str]) -> TemplateResult<String> {
        let lock = RowLock::parse(words)?;
        match self {
            Self::Postgres => Ok(lock.to_sql()),
            Self::MySql if lock.strength.is_portable() => Ok(lock.to_sql()),
            Self::Sqlite | Self::Ydb if lock.strength.is_portable() => Ok(String::new()),
            _ => Err(TemplateError::invalid_row_lock(format!(
                "FOR {} is not supported by {}",
                lock.strength.as_sql(),
                self.name()
            ))),
        }
    }

    /// SQL expression for the current time in microseconds since the epoch.
    pub fn current_epoch(&self) -> &'static str {
        match self {
            Self::MySql => "CAST(UNIX_TIMESTAMP(NOW(6)) * 1000000 AS SIGNED)",
            Self::Postgres => "CAST(EXTRACT(EPOCH FROM CLOCK_TIMESTAMP()) * 1000000 AS BIGINT)",
            Self::Sqlite => "CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER)",
            Self::Ydb => "CAST(CurrentUtcTimestamp() AS Int64)",
        }
    }

    /// Engine-specific name of a portable column type.
    pub fn column_type(&self, ty: ColumnType) -> String {
        match (self, ty) {
            (Self::Ydb, ColumnType::SmallInt) => "Int16".to_string(),
            (Self::Ydb, ColumnType::Int) => "Int32".to_string(),
            (Self::Ydb, ColumnType::BigInt) => "Int64".to_string(),
            (Self::Ydb, ColumnType::Text | ColumnType::Char(_) | ColumnType::VarChar(_)) => {
                "Utf8".to_string()
            }
            (Self::Ydb, ColumnType::Blob) => "String".to_string(),
            (Self::Ydb, ColumnType::Boolean) => "Bool".to_string(),
            (Self::Postgres | Self::Sqlite, ColumnType::Int) => "INTEGER".to_string(),
            (Self::Postgres, ColumnType::Blob) => "BYTEA".to_string(),
            (Self::MySql, ColumnType::Blob) => "LONGBLOB".to_string(),
            (Self::MySql, ColumnType::Text) => "LONGTEXT".to_string(),
            (_, ty) => ty.to_string(),
        }
    }

    /// Render a constant as a SQL literal, for DDL positions where bind
    /// parameters are not accepted (column defaults).
    pub fn literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => {
                let literal = match (self, b) {
                    (Self::Sqlite, true) => "1",
                    (Self::Sqlite, false) => "0",
                    (_, true) => "TRUE",
                    (_, false) => "FALSE",
                };
                literal.to_string()
            }
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::String(s) => self.quote_string(s),
            SqlValue::Bytes(b) => match self {
                Self::Postgres => format!("'\\x{}'", hex::encode(b)),
                _ => format!("X'{}'", hex::encode(b)),
            },
        }
    }

    fn quote_string(&self, s: &str) -> String {
        let escaped = match self {
            Self::MySql => s.replace('\\', "\\\\").replace('\'', "''"),
            _ => s.replace('\'', "''"),
        };
        format!("'{}'", escaped)
    }

    /// Whether DDL participates in transactions on this engine.
    pub fn supports_transactional_ddl(&self) -> bool {
        matches!(self, Self::Postgres | Self::Sqlite)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lock strength of a `FOR ...` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockStrength {
    /// `FOR UPDATE`.
    Update,
    /// `FOR NO KEY UPDATE` (PostgreSQL only).
    NoKeyUpdate,
    /// `FOR SHARE`.
    Share,
    /// `FOR KEY SHARE` (PostgreSQL only).
    KeyShare,
}

impl LockStrength {
    /// Get the SQL keywords.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::NoKeyUpdate => "NO KEY UPDATE",
            Self::Share => "SHARE",
            Self::KeyShare => "KEY SHARE",
        }
    }

    /// Whether every engine with row locks understands this strength.
    pub fn is_portable(&self) -> bool {
        matches!(self, Self::Update | Self::Share)
    }
}

/// What a locking read does when a row is already locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockWait {
    /// Wait for the lock.
    #[default]
    Block,
    /// Fail immediately.
    NoWait,
    /// Skip locked rows.
    SkipLocked,
}

/// A parsed row-locking clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowLock {
    /// Lock strength.
    pub strength: LockStrength,
    /// Wait policy.
    pub wait: LockWait,
}

impl RowLock {
    /// Parse clause words, case-insensitively.
    pub fn parse(words: &[&str]) -> TemplateResult<Self> {
        let upper: Vec<String> = words
            .iter()
            .flat_map(|w| w.split_whitespace())
            .map(str::to_ascii_uppercase)
            .collect();
        let tokens: Vec<&str> = upper.iter().map(String::as_str).collect();

        let (strength, rest) = match tokens.as_slice() {
            ["UPDATE", rest @ ..] => (LockStrength::Update, rest),
            ["SHARE", rest @ ..] => (LockStrength::Share, rest),
            ["NO", "KEY", "UPDATE", rest @ ..] => (LockStrength::NoKeyUpdate, rest),
            ["KEY", "SHARE", rest @ ..] => (LockStrength::KeyShare, rest),
            _ => return Err(TemplateError::invalid_row_lock(tokens.join(" "))),
        };

        let wait = match rest {
            [] => LockWait::Block,
            ["NOWAIT"] => LockWait::NoWait,
            ["SKIP", "LOCKED"] => LockWait::SkipLocked,
            _ => return Err(TemplateError::invalid_row_lock(tokens.join(" "))),
        };

        Ok(Self { strength, wait })
    }

    /// Render as `FOR <strength>[ NOWAIT| SKIP LOCKED]`.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("FOR {}", self.strength.as_sql());
        match self.wait {
            LockWait::Block => {}
            LockWait::NoWait => sql.push_str(" NOWAIT"),
            LockWait::SkipLocked => sql.push_str(" SKIP LOCKED"),
        }
        sql
    }
}
