//! Bind-argument collection.
//!
//! Drivers bind positionally, so the collector's only job is to keep the
//! N-th appended value paired with the N-th placeholder it hands out.

use crate::dialect::Dialect;
use crate::error::{TemplateError, TemplateResult};
use crate::value::SqlValue;

/// Accumulates values in the order a template references them.
#[derive(Debug, Clone)]
pub struct ArgCollector {
    dialect: Dialect,
    values: Vec<SqlValue>,
}

impl ArgCollector {
    /// Create an empty collector for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// The dialect placeholders are rendered for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append a value and return its placeholder.
    pub fn arg(&mut self, value: impl Into<SqlValue>) -> String {
        self.values.push(value.into());
        self.dialect.arg_placeholder(self.values.len())
    }

    /// Append every value of a sequence and return the placeholders joined
    /// by `", "`. An empty sequence appends nothing and returns `""`.
    ///
    /// Nothing is appended when any element is unbindable.
    pub fn arg_list<I, V>(&mut self, values: I) -> TemplateResult<String>
    where
        I: IntoIterator<Item = V>,
        V: TryInto<SqlValue>,
        V::Error: std::fmt::Display,
    {
        let mut converted = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            let value = value
                .try_into()
                .map_err(|e| TemplateError::invalid_arg_list(format!("element {}: {}", i, e)))?;
            converted.push(value);
        }

        let placeholders: Vec<String> = converted.into_iter().map(|v| self.arg(v)).collect();
        Ok(placeholders.join(", "))
    }

    /// The collected values, in placeholder order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of collected values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every collected value.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Switch dialect. Collected values are dropped, since placeholders
    /// already handed out belong to the previous dialect.
    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.dialect = dialect;
        self.reset();
    }

    /// Take the collected values, leaving the collector empty.
    pub fn take(&mut self) -> Vec<SqlValue> {
        std::mem::take(&mut self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_arg_order_postgres() {
        let mut args = ArgCollector::new(Dialect::Postgres);
        assert_eq!(args.arg(10), "$1");
        assert_eq!(args.arg("x"), "$2");
        assert_eq!(args.arg(true), "$3");
        assert_eq!(
            args.values(),
            &[SqlValue::Int(10), SqlValue::from("x"), SqlValue::Bool(true)]
        );
    }

    #[test]
    fn test_arg_list() {
        let mut args = ArgCollector::new(Dialect::Postgres);
        args.arg(1);
        let list = args.arg_list(vec![SqlValue::Int(2), SqlValue::Int(3)]).unwrap();
        assert_eq!(list, "$2, $3");
        assert_eq!(args.len(), 3);

        let mut args = ArgCollector::new(Dialect::MySql);
        assert_eq!(args.arg_list(vec![1i64, 2, 3]).unwrap(), "?, ?, ?");
    }

    #[test]
    fn test_arg_list_empty() {
        let mut args = ArgCollector::new(Dialect::Sqlite);
        assert_eq!(args.arg_list(Vec::<SqlValue>::new()).unwrap(), "");
        assert!(args.is_empty());
    }

    #[test]
    fn test_set_dialect_resets() {
        let mut args = ArgCollector::new(Dialect::Postgres);
        args.arg(1);
        args.set_dialect(Dialect::MySql);
        assert!(args.is_empty());
        assert_eq!(args.arg(2), "?");
        assert_eq!(args.take(), vec![SqlValue::Int(2)]);
        assert!(args.is_empty());
    }
}
