//! The templated statement request.
//!
//! [`SqlTemplate`] bundles a dialect, an [`ArgCollector`] and a
//! [`ResultBinder`]. Every rendered statement goes through one: the
//! template never sees caller data directly, only the `req` object whose
//! methods call back into the request.
//!
//! | template call | effect |
//! |---|---|
//! | `req.ident(name)` | quoted identifier |
//! | `req.arg(value)` | append a bind value, emit its placeholder |
//! | `req.arg_list(values)` | append a sequence, emit `", "`-joined placeholders |
//! | `req.into(dest, column)` | register a scan destination, emit the column |
//! | `req.select_for(words...)` | row-locking clause (or `""`) |
//! | `req.current_epoch()` | "now" in microseconds |
//! | `req.dialect` | engine name |
//!
//! Any other attribute comes from the request's [`TemplateData`].

use std::collections::BTreeMap;
use std::sync::Arc;

use minijinja::value::{Object, Value, ValueKind};
use minijinja::{Error, ErrorKind, State};
use parking_lot::Mutex;

use crate::args::ArgCollector;
use crate::dialect::Dialect;
use crate::error::{TemplateError, TemplateResult, ValidationErrors};
use crate::scan::{ResultBinder, ScannedRow};
use crate::value::SqlValue;

/// Typed fields a request exposes to its template, plus the validation
/// hook run before every render.
pub trait TemplateData {
    /// Check the payload. Implementations report every problem at once.
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }

    /// Fields visible as `req.<name>`. Receives the target dialect so
    /// engine-specific fragments (type names, literals) can be precomputed.
    fn fields(&self, dialect: Dialect) -> Vec<(&'static str, Value)>;
}

impl TemplateData for () {
    fn fields(&self, _dialect: Dialect) -> Vec<(&'static str, Value)> {
        Vec::new()
    }
}

/// Dialect, bind arguments and scan destinations for one render.
///
/// A request is single-use: render it once, execute, scan. Retargeting it
/// with [`set_dialect`](Self::set_dialect) drops everything accumulated so
/// far.
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    args: ArgCollector,
    results: ResultBinder,
}

impl SqlTemplate {
    /// Create a request without scan destinations (DDL, writes).
    pub fn new(dialect: Dialect) -> Self {
        Self {
            args: ArgCollector::new(dialect),
            results: ResultBinder::default(),
        }
    }

    /// Create a request that accepts the given scan destinations.
    pub fn with_destinations<I, S>(dialect: Dialect, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: ArgCollector::new(dialect),
            results: ResultBinder::new(destinations),
        }
    }

    /// The target dialect.
    pub fn dialect(&self) -> Dialect {
        self.args.dialect()
    }

    /// Retarget to another dialect, dropping bound values and bindings.
    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.args.set_dialect(dialect);
        self.results.reset();
    }

    /// Drop bound values, bindings and scanned rows.
    pub fn reset(&mut self) {
        self.args.reset();
        self.results.reset();
    }

    /// Quote an identifier for the target dialect.
    pub fn ident(&self, name: &str) -> TemplateResult<String> {
        self.dialect().ident(name)
    }

    /// Append a bind value and return its placeholder.
    pub fn arg(&mut self, value: impl Into<SqlValue>) -> String {
        self.args.arg(value)
    }

    /// Append a sequence of values and return their placeholders.
    pub fn arg_list<I, V>(&mut self, values: I) -> TemplateResult<String>
    where
        I: IntoIterator<Item = V>,
        V: TryInto<SqlValue>,
        V::Error: std::fmt::Display,
    {
        self.args.arg_list(values)
    }

    /// Register a scan destination for a result column.
    pub fn bind(&mut self, dest: &str, column: &str) -> TemplateResult<String> {
        self.results.bind(dest, column)
    }

    /// Translate a row-locking clause.
    pub fn select_for(&self, words: &[&str]) -> TemplateResult<String> {
        self.dialect().select_for(words)
    }

    /// "Now" in microseconds, as SQL.
    pub fn current_epoch(&self) -> &'static str {
        self.dialect().current_epoch()
    }

    /// Bound values in placeholder order.
    pub fn args(&self) -> &[SqlValue] {
        self.args.values()
    }

    /// Take the bound values.
    pub fn take_args(&mut self) -> Vec<SqlValue> {
        self.args.take()
    }

    /// Scan one result row into the registered destinations.
    pub fn scan(&mut self, row: Vec<SqlValue>) -> TemplateResult<()> {
        self.results.scan(row)
    }

    /// A copy of every scanned row.
    pub fn results(&self) -> Vec<ScannedRow> {
        self.results.results()
    }
}

/// The `req` value handed to templates.
#[derive(Debug)]
pub(crate) struct RequestObject {
    dialect: Dialect,
    request: Arc<Mutex<SqlTemplate>>,
    failure: Arc<Mutex<Option<TemplateError>>>,
    fields: BTreeMap<&'static str, Value>,
}

impl RequestObject {
    pub(crate) fn new(
        request: Arc<Mutex<SqlTemplate>>,
        failure: Arc<Mutex<Option<TemplateError>>>,
        fields: Vec<(&'static str, Value)>,
    ) -> Self {
        let dialect = request.lock().dialect();
        Self {
            dialect,
            request,
            failure,
            fields: fields.into_iter().collect(),
        }
    }

    fn dispatch(&self, method: &str, args: &[Value]) -> TemplateResult<Value> {
        match method {
            "ident" => {
                let name = string_arg(method, args, 0, 1)?;
                self.dialect.ident(name).map(Value::from)
            }
            "arg" => {
                expect_arity(method, args, 1)?;
                let value = SqlValue::from_template_value(&args[0])?;
                Ok(Value::from(self.request.lock().arg(value)))
            }
            "arg_list" => {
                expect_arity(method, args, 1)?;
                let values = sequence_values(&args[0])?;
                self.request.lock().arg_list(values).map(Value::from)
            }
            "into" => {
                let dest = string_arg(method, args, 0, 2)?;
                let column = string_arg(method, args, 1, 2)?;
                self.request.lock().bind(dest, column).map(Value::from)
            }
            "select_for" => {
                let words = args
                    .iter()
                    .map(|w| {
                        w.as_str().ok_or_else(|| {
                            TemplateError::invalid_row_lock(format!("non-string word {}", w))
                        })
                    })
                    .collect::<TemplateResult<Vec<&str>>>()?;
                self.dialect.select_for(&words).map(Value::from)
            }
            "current_epoch" => {
                expect_arity(method, args, 0)?;
                Ok(Value::from(self.dialect.current_epoch()))
            }
            _ => Err(TemplateError::render(format!(
                "request has no method '{}'",
                method
            ))),
        }
    }
}

impl Object for RequestObject {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "dialect" => Some(Value::from(self.dialect.name())),
            other => self.fields.get(other).cloned(),
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        self.dispatch(method, args).map_err(|err| {
            let message = err.to_string();
            *self.failure.lock() = Some(err);
            Error::new(ErrorKind::InvalidOperation, message)
        })
    }
}

fn expect_arity(method: &str, args: &[Value], arity: usize) -> TemplateResult<()> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(TemplateError::render(format!(
            "{}() takes {} argument(s), got {}",
            method,
            arity,
            args.len()
        )))
    }
}

fn string_arg<'a>(
    method: &str,
    args: &'a [Value],
    index: usize,
    arity: usize,
) -> TemplateResult<&'a str> {
    expect_arity(method, args, arity)?;
    args[index].as_str().ok_or_else(|| {
        TemplateError::render(format!(
            "{}() argument {} must be a string",
            method,
            index + 1
        ))
    })
}

fn sequence_values(value: &Value) -> TemplateResult<Vec<SqlValue>> {
    if !matches!(value.kind(), ValueKind::Seq | ValueKind::Iterable) {
        return Err(TemplateError::invalid_arg_list(format!(
            "expected a sequence, got {:?}",
            value.kind()
        )));
    }

    let iter = value
        .try_iter()
        .map_err(|e| TemplateError::invalid_arg_list(e.to_string()))?;
    iter.enumerate()
        .map(|(i, item)| {
            SqlValue::from_template_value(&item)
                .map_err(|e| TemplateError::invalid_arg_list(format!("element {}: {}", i, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_delegates_to_dialect() {
        let mut req = SqlTemplate::new(Dialect::Postgres);
        assert_eq!(req.ident("t").unwrap(), "\"t\"");
        assert_eq!(req.arg(1), "$1");
        assert_eq!(req.arg_list(vec![2i64, 3]).unwrap(), "$2, $3");
        assert_eq!(req.select_for(&["UPDATE"]).unwrap(), "FOR UPDATE");
        assert_eq!(req.args().len(), 3);
    }

    #[test]
    fn test_set_dialect_clears_state() {
        let mut req = SqlTemplate::with_destinations(Dialect::Postgres, ["n"]);
        req.arg(1);
        req.bind("n", "n").unwrap();
        req.scan(vec![SqlValue::Int(1)]).unwrap();

        req.set_dialect(Dialect::Sqlite);
        assert_eq!(req.dialect(), Dialect::Sqlite);
        assert!(req.args().is_empty());
        assert!(req.results().is_empty());
        assert_eq!(req.arg(1), "?");
    }

    #[test]
    fn test_sequence_values() {
        let values = sequence_values(&Value::from(vec![1, 2])).unwrap();
        assert_eq!(values, vec![SqlValue::Int(1), SqlValue::Int(2)]);

        assert!(matches!(
            sequence_values(&Value::from(5)),
            Err(TemplateError::InvalidArgList(_))
        ));
        assert!(matches!(
            sequence_values(&Value::from("abc")),
            Err(TemplateError::InvalidArgList(_))
        ));
    }
}
