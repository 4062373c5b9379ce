//! The migration log.
//!
//! Every transition attempt appends one row to the bookkeeping table. The
//! latest row by timestamp is the current state; rows are never updated.
//! Timestamps are whole seconds since the epoch, taken from the client
//! clock. The `ts` column is unique, so two entries never share a second.

use chrono::{DateTime, Utc};
use minijinja::Value;
use serde::{Deserialize, Serialize};
use shift_sql::{ColumnType, Dialect, ScannedRow, SqlValue, TemplateData};
use uuid::Uuid;

use crate::column::Column;
use crate::error::{MigrateResult, MigrationError};
use crate::statement::Statement;
use crate::step::Step;

/// Default bookkeeping table name.
pub const DEFAULT_TABLE_NAME: &str = "migrations_log";

/// Name of the built-in first step.
pub const BOOKKEEPING_STEP: &str = "create migrations log";

/// One row of the migration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique row id (UUID, 36 characters).
    pub id: String,
    /// Seconds since the epoch.
    pub ts: i64,
    /// Version after the attempt.
    pub version: usize,
    /// Direction of the attempt.
    pub is_up: bool,
    /// Whether the attempt left the database half-migrated.
    pub is_dirty: bool,
    /// SQL that ran, one statement per line.
    pub statements: String,
    /// Failure message, if the attempt failed.
    pub error: Option<String>,
}

impl LogEntry {
    /// Result destinations, in the column order of the log queries.
    pub const COLUMNS: [&'static str; 7] = [
        "id",
        "ts",
        "version",
        "is_up",
        "is_dirty",
        "statements",
        "error",
    ];

    /// Create an entry with a fresh id.
    pub fn new(ts: i64, version: usize, is_up: bool, is_dirty: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts,
            version,
            is_up,
            is_dirty,
            statements: String::new(),
            error: None,
        }
    }

    /// Set the executed SQL.
    pub fn with_statements(mut self, statements: impl Into<String>) -> Self {
        self.statements = statements.into();
        self
    }

    /// Set the failure message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Column values in [`LogEntry::COLUMNS`] order.
    pub fn bind_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.id.as_str()),
            SqlValue::Int(self.ts),
            SqlValue::Int(i64::try_from(self.version).unwrap_or(i64::MAX)),
            SqlValue::Bool(self.is_up),
            SqlValue::Bool(self.is_dirty),
            SqlValue::from(self.statements.as_str()),
            SqlValue::from(self.error.clone()),
        ]
    }

    /// The timestamp as a date, if it is representable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.ts, 0)
    }

    /// Rebuild an entry from a scanned log row.
    pub fn from_row(row: &ScannedRow) -> MigrateResult<Self> {
        let missing =
            |column: &str| MigrationError::corrupted(format!("log row has no usable '{}'", column));

        let version = row.get_i64("version").ok_or_else(|| missing("version"))?;
        let version = usize::try_from(version).map_err(|_| {
            MigrationError::corrupted(format!("log row has negative version {}", version))
        })?;

        Ok(Self {
            id: row.get_str("id").ok_or_else(|| missing("id"))?.to_string(),
            ts: row.get_i64("ts").ok_or_else(|| missing("ts"))?,
            version,
            is_up: row.get_bool("is_up").ok_or_else(|| missing("is_up"))?,
            is_dirty: row.get_bool("is_dirty").ok_or_else(|| missing("is_dirty"))?,
            statements: row.get_str("statements").unwrap_or_default().to_string(),
            error: row.get_str("error").map(str::to_string),
        })
    }
}

/// Current time in seconds since the epoch, the unit of [`LogEntry::ts`].
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Current time in microseconds since the epoch, the unit of the server
/// clock query.
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// The built-in first step: the log table and its indexes.
pub fn bookkeeping_step(table: &str) -> Step {
    Step::new(
        BOOKKEEPING_STEP,
        [
            Statement::create_table(
                table,
                [
                    Column::new("id", ColumnType::Char(36)),
                    Column::new("ts", ColumnType::BigInt),
                    Column::new("version", ColumnType::Int),
                    Column::new("is_up", ColumnType::Boolean),
                    Column::new("is_dirty", ColumnType::Boolean),
                    Column::new("statements", ColumnType::Text),
                    Column::new("error", ColumnType::Text).nullable(),
                ],
            ),
            Statement::create_index(true, "id", table, ["id"]),
            Statement::create_index(true, "ts", table, ["ts"]),
            Statement::create_index(false, "version", table, ["version"]),
        ],
    )
}

/// Payload for log reads and the table-existence probe.
pub(crate) struct LogQuery<'a> {
    pub(crate) table: &'a str,
}

impl TemplateData for LogQuery<'_> {
    fn fields(&self, _dialect: Dialect) -> Vec<(&'static str, Value)> {
        let (schema, name) = match self.table.split_once('.') {
            Some((schema, name)) => (Value::from(schema), name),
            None => (Value::from(()), self.table),
        };
        vec![
            ("table", Value::from(self.table)),
            ("table_name", Value::from(name)),
            ("table_schema", schema),
        ]
    }
}

/// Payload for appending an entry.
pub(crate) struct LogInsert<'a> {
    pub(crate) table: &'a str,
    pub(crate) entry: &'a LogEntry,
}

impl TemplateData for LogInsert<'_> {
    fn fields(&self, _dialect: Dialect) -> Vec<(&'static str, Value)> {
        let entry = self.entry;
        let version = i64::try_from(entry.version).unwrap_or(i64::MAX);
        let values = vec![
            Value::from(entry.id.as_str()),
            Value::from(entry.ts),
            Value::from(version),
            Value::from(entry.is_up),
            Value::from(entry.is_dirty),
            Value::from(entry.statements.as_str()),
            entry.error.as_deref().map(Value::from).unwrap_or(Value::from(())),
        ];
        vec![
            ("table", Value::from(self.table)),
            ("values", Value::from(values)),
        ]
    }
}
