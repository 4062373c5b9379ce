//! Reversible statements.
//!
//! Portable DDL is only expressed through three builders, each with a
//! built-in pair of templates:
//!
//! - [`Statement::create_table`] never emits a primary key. Uniqueness is
//!   expressed with a separate unique index over NOT NULL columns.
//! - [`Statement::add_column`] rejects NOT NULL columns without a default.
//! - [`Statement::create_index`] names the index `idx_<table>_<suffix>`.
//!   On a schema-qualified table the index lives in the table's schema:
//!   SQLite takes the schema on the index name and an unqualified table
//!   after `ON`, and PostgreSQL and SQLite drop it by qualified name.
//!
//! [`Statement::raw`] pairs two caller-registered templates with a payload
//! the templates read as `req.payload`.
//!
//! ```rust
//! use shift_migrate::{Column, Statement};
//! use shift_sql::ColumnType;
//!
//! let stmt = Statement::add_column("widgets", Column::new("weight", ColumnType::Int));
//! let err = stmt.validate().unwrap_err();
//! assert!(err.to_string().contains("NOT NULL without a default"));
//! ```

use std::collections::HashSet;
use std::fmt;

use minijinja::Value;
use serde::{Deserialize, Serialize};
use shift_sql::{
    Dialect, RenderedSql, TemplateData, TemplateRegistry, TemplateResult, ValidationErrors,
};

use crate::column::Column;
use crate::templates;

/// Direction of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply.
    Up,
    /// Revert.
    Down,
}

impl Direction {
    /// Whether this is [`Direction::Up`].
    pub fn is_up(self) -> bool {
        self == Self::Up
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// One reversible unit: an Up template, a Down template and their payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `CREATE TABLE` / `DROP TABLE`.
    CreateTable(CreateTable),
    /// `ADD COLUMN` / `DROP COLUMN`.
    AddColumn(AddColumn),
    /// `CREATE INDEX` / `DROP INDEX`.
    CreateIndex(CreateIndex),
    /// Caller-supplied template pair.
    Raw(RawStatement),
}

impl Statement {
    /// Create a table. At least one column is required.
    pub fn create_table(
        table: impl Into<String>,
        columns: impl IntoIterator<Item = Column>,
    ) -> Self {
        Self::CreateTable(CreateTable {
            table: table.into(),
            columns: columns.into_iter().collect(),
        })
    }

    /// Add a column to an existing table.
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        Self::AddColumn(AddColumn {
            table: table.into(),
            column,
        })
    }

    /// Create an index named `idx_<table>_<suffix>`.
    pub fn create_index<I, S>(
        unique: bool,
        suffix: impl Into<String>,
        table: impl Into<String>,
        columns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CreateIndex(CreateIndex {
            unique,
            suffix: suffix.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        })
    }

    /// A statement rendered from caller-registered templates.
    pub fn raw(
        up_template: impl Into<String>,
        down_template: impl Into<String>,
        payload: impl Serialize,
    ) -> Self {
        Self::Raw(RawStatement {
            up: up_template.into(),
            down: down_template.into(),
            payload: Value::from_serialize(payload),
        })
    }

    /// Name of the Up template.
    pub fn up_template(&self) -> &str {
        self.template(Direction::Up)
    }

    /// Name of the Down template.
    pub fn down_template(&self) -> &str {
        self.template(Direction::Down)
    }

    /// Name of the template for a direction.
    pub fn template(&self, direction: Direction) -> &str {
        match (self, direction) {
            (Self::CreateTable(_), Direction::Up) => templates::CREATE_TABLE_UP,
            (Self::CreateTable(_), Direction::Down) => templates::CREATE_TABLE_DOWN,
            (Self::AddColumn(_), Direction::Up) => templates::ADD_COLUMN_UP,
            (Self::AddColumn(_), Direction::Down) => templates::ADD_COLUMN_DOWN,
            (Self::CreateIndex(_), Direction::Up) => templates::CREATE_INDEX_UP,
            (Self::CreateIndex(_), Direction::Down) => templates::CREATE_INDEX_DOWN,
            (Self::Raw(raw), Direction::Up) => &raw.up,
            (Self::Raw(raw), Direction::Down) => &raw.down,
        }
    }

    /// Report every construction problem at once.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.data().validate()
    }

    /// Render the template for `direction`.
    pub fn render(
        &self,
        registry: &TemplateRegistry,
        dialect: Dialect,
        direction: Direction,
    ) -> TemplateResult<RenderedSql> {
        registry.render_sql(self.template(direction), dialect, self.data())
    }

    fn data(&self) -> &dyn TemplateData {
        match self {
            Self::CreateTable(s) => s,
            Self::AddColumn(s) => s,
            Self::CreateIndex(s) => s,
            Self::Raw(s) => s,
        }
    }
}

/// Payload of [`Statement::create_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    table: String,
    columns: Vec<Column>,
}

impl CreateTable {
    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl TemplateData for CreateTable {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_table_name(&self.table, &mut errors);

        if self.columns.is_empty() {
            errors.push(format!("table '{}' has no columns", self.table));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if let Err(e) = column.validate() {
                errors.extend_with_context(&format!("table '{}'", self.table), e);
            }
            if !column.name().is_empty() && !seen.insert(column.name()) {
                errors.push(format!(
                    "table '{}': duplicate column '{}'",
                    self.table,
                    column.name()
                ));
            }
        }

        errors.into_result()
    }

    fn fields(&self, dialect: Dialect) -> Vec<(&'static str, Value)> {
        let columns: Vec<Value> = self
            .columns
            .iter()
            .map(|c| c.template_value(dialect))
            .collect();
        vec![
            ("table", Value::from(self.table.as_str())),
            ("columns", Value::from(columns)),
        ]
    }
}

/// Payload of [`Statement::add_column`].
#[derive(Debug, Clone, PartialEq)]
pub struct AddColumn {
    table: String,
    column: Column,
}

impl AddColumn {
    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The added column.
    pub fn column(&self) -> &Column {
        &self.column
    }
}

impl TemplateData for AddColumn {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_table_name(&self.table, &mut errors);

        if let Err(e) = self.column.validate() {
            errors.extend_with_context(&format!("table '{}'", self.table), e);
        }
        if !self.column.is_nullable() && self.column.default_value().is_none() {
            errors.push(format!(
                "table '{}': column '{}' is NOT NULL without a default",
                self.table,
                self.column.name()
            ));
        }

        errors.into_result()
    }

    fn fields(&self, dialect: Dialect) -> Vec<(&'static str, Value)> {
        vec![
            ("table", Value::from(self.table.as_str())),
            ("column", self.column.template_value(dialect)),
        ]
    }
}

/// Payload of [`Statement::create_index`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    unique: bool,
    suffix: String,
    table: String,
    columns: Vec<String>,
}

impl CreateIndex {
    /// The synthesized index name, `idx_<table>_<suffix>`. A schema
    /// qualifier's `.` becomes `_`.
    pub fn name(&self) -> String {
        format!("idx_{}_{}", self.table.replace('.', "_"), self.suffix)
    }

    /// The index name qualified with the table's schema, if it has one.
    pub fn qualified_name(&self) -> String {
        match self.schema() {
            Some(schema) => format!("{}.{}", schema, self.name()),
            None => self.name(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Schema of a qualified table name.
    pub fn schema(&self) -> Option<&str> {
        self.table.split_once('.').map(|(schema, _)| schema)
    }

    /// Table name without its schema.
    pub fn table_name(&self) -> &str {
        self.table
            .split_once('.')
            .map_or(self.table.as_str(), |(_, table)| table)
    }

    /// Whether the index is unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Indexed columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl TemplateData for CreateIndex {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_table_name(&self.table, &mut errors);

        if self.suffix.is_empty() {
            errors.push(format!("index on '{}': suffix is empty", self.table));
        } else if self.suffix.contains('.') {
            errors.push(format!(
                "index on '{}': suffix '{}' contains '.'",
                self.table, self.suffix
            ));
        }
        if self.columns.is_empty() {
            errors.push(format!("index on '{}' has no columns", self.table));
        }
        if self.columns.iter().any(String::is_empty) {
            errors.push(format!("index on '{}': column name is empty", self.table));
        }

        errors.into_result()
    }

    fn fields(&self, _dialect: Dialect) -> Vec<(&'static str, Value)> {
        vec![
            ("table", Value::from(self.table.as_str())),
            ("table_name", Value::from(self.table_name())),
            ("name", Value::from(self.name())),
            ("qualified_name", Value::from(self.qualified_name())),
            ("unique", Value::from(self.unique)),
            ("columns", Value::from(self.columns.clone())),
        ]
    }
}

/// Payload of [`Statement::raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatement {
    up: String,
    down: String,
    payload: Value,
}

impl RawStatement {
    /// The payload as the templates see it.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl TemplateData for RawStatement {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.up.is_empty() {
            errors.push("raw statement: up template name is empty");
        }
        if self.down.is_empty() {
            errors.push("raw statement: down template name is empty");
        }
        errors.into_result()
    }

    fn fields(&self, _dialect: Dialect) -> Vec<(&'static str, Value)> {
        vec![("payload", self.payload.clone())]
    }
}

// Checked against the strictest dialect so a name valid here quotes
// everywhere.
fn check_table_name(table: &str, errors: &mut ValidationErrors) {
    if table.is_empty() {
        errors.push("table name is empty");
    } else if let Err(e) = Dialect::Postgres.ident(table) {
        errors.push(format!("table name: {}", e));
    }
}
