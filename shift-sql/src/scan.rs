//! Result binding.
//!
//! A request declares the destinations it can be scanned into. Templates
//! register them with `into(destination, column)` while emitting the
//! `SELECT` list, so the binder order is the column order of the rendered
//! query. Rows are then scanned positionally.

use std::collections::BTreeMap;

use crate::error::{TemplateError, TemplateResult};
use crate::value::SqlValue;

/// One scanned row, keyed by destination name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannedRow {
    values: BTreeMap<String, SqlValue>,
}

impl ScannedRow {
    /// Get a destination's value.
    pub fn get(&self, dest: &str) -> Option<&SqlValue> {
        self.values.get(dest)
    }

    /// Get a destination as an integer.
    pub fn get_i64(&self, dest: &str) -> Option<i64> {
        self.get(dest).and_then(SqlValue::as_i64)
    }

    /// Get a destination as a boolean.
    pub fn get_bool(&self, dest: &str) -> Option<bool> {
        self.get(dest).and_then(SqlValue::as_bool)
    }

    /// Get a destination as text.
    pub fn get_str(&self, dest: &str) -> Option<&str> {
        self.get(dest).and_then(SqlValue::as_str)
    }

    /// Iterate destinations and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Registers scan destinations and collects scanned rows.
#[derive(Debug, Clone, Default)]
pub struct ResultBinder {
    declared: Vec<String>,
    bindings: Vec<(String, String)>,
    rows: Vec<ScannedRow>,
}

impl ResultBinder {
    /// Create a binder that accepts the given destinations.
    pub fn new<I, S>(destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared: destinations.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Register `dest` to receive `column` (the template-side `into`).
    /// Returns the column name so the call can sit inline in a `SELECT`
    /// list.
    pub fn bind(&mut self, dest: &str, column: &str) -> TemplateResult<String> {
        if !self.declared.iter().any(|d| d == dest) {
            return Err(TemplateError::InvalidDestination(dest.to_string()));
        }
        if column.is_empty() {
            return Err(TemplateError::EmptyIdentifier);
        }
        self.bindings.push((column.to_string(), dest.to_string()));
        Ok(column.to_string())
    }

    /// The registered `(column, destination)` pairs, in order.
    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }

    /// Scan one row positionally into the registered destinations.
    pub fn scan(&mut self, row: Vec<SqlValue>) -> TemplateResult<()> {
        if row.len() != self.bindings.len() {
            return Err(TemplateError::ScanMismatch {
                expected: self.bindings.len(),
                actual: row.len(),
            });
        }

        let values = self
            .bindings
            .iter()
            .zip(row)
            .map(|((_, dest), value)| (dest.clone(), value))
            .collect();
        self.rows.push(ScannedRow { values });
        Ok(())
    }

    /// A copy of every scanned row.
    pub fn results(&self) -> Vec<ScannedRow> {
        self.rows.clone()
    }

    /// Clear bindings and scanned rows. Declared destinations are kept.
    pub fn reset(&mut self) {
        self.bindings.clear();
        self.rows.clear();
    }
}
