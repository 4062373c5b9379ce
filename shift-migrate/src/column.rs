//! Portable column definitions.
//!
//! A [`Column`] is built by a consuming fluent chain and never changes
//! afterwards. Columns are NOT NULL unless marked otherwise.
//!
//! ```rust
//! use shift_migrate::Column;
//! use shift_sql::ColumnType;
//!
//! let col = Column::new("retries", ColumnType::Int).default(0);
//! assert!(!col.is_nullable());
//! assert!(col.validate().is_ok());
//!
//! let bad = Column::new("", ColumnType::VarChar(5000));
//! assert_eq!(bad.validate().unwrap_err().len(), 2);
//! ```

use minijinja::Value;
use serde::Serialize;
use shift_sql::{ColumnType, Dialect, MAX_CHAR_LENGTH, SqlValue, ValidationErrors};

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    ty: ColumnType,
    nullable: bool,
    default: Option<SqlValue>,
}

impl Column {
    /// A NOT NULL column without a default.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
        }
    }

    /// Allow NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Disallow NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default value.
    pub fn default(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Portable type.
    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    /// Whether NULL is allowed.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The default value, if any.
    pub fn default_value(&self) -> Option<&SqlValue> {
        self.default.as_ref()
    }

    /// Report every problem with this column.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.name.is_empty() {
            errors.push("column name is empty");
        } else if self.name.contains('.') || self.name.contains('\0') {
            errors.push(format!("column name '{}' contains an invalid character", self.name));
        }

        if let Some(length) = self.ty.length() {
            if length == 0 || length > MAX_CHAR_LENGTH {
                errors.push(format!(
                    "column '{}': length {} is out of range (1..={})",
                    self.name, length, MAX_CHAR_LENGTH
                ));
            }
        }

        match &self.default {
            Some(SqlValue::Null) if !self.nullable => {
                errors.push(format!(
                    "column '{}' is NOT NULL but defaults to NULL",
                    self.name
                ));
            }
            Some(value) if !value.is_null() && !default_matches(self.ty, value) => {
                errors.push(format!(
                    "column '{}': default {} does not fit type {}",
                    self.name, value, self.ty
                ));
            }
            _ => {}
        }

        errors.into_result()
    }

    /// The column as seen by DDL templates: `name`, `sql_type` and the
    /// already-rendered `constraints` suffix.
    pub(crate) fn template_value(&self, dialect: Dialect) -> Value {
        let mut constraints = String::new();
        if !self.nullable {
            constraints.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            constraints.push_str(" DEFAULT ");
            constraints.push_str(&dialect.literal(default));
        }

        Value::from_serialize(ColumnView {
            name: &self.name,
            sql_type: dialect.column_type(self.ty),
            constraints,
        })
    }
}

#[derive(Serialize)]
struct ColumnView<'a> {
    name: &'a str,
    sql_type: String,
    constraints: String,
}

fn default_matches(ty: ColumnType, value: &SqlValue) -> bool {
    match value {
        SqlValue::Int(_) => ty.is_integer(),
        SqlValue::Bool(_) => ty == ColumnType::Boolean,
        SqlValue::String(_) => ty.is_textual(),
        SqlValue::Bytes(_) => ty == ColumnType::Blob,
        SqlValue::Float(_) => false,
        SqlValue::Null => true,
    }
}
