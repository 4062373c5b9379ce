//! Named SQL templates.
//!
//! A [`TemplateRegistry`] is built once, validated as a whole, and then
//! shared read-only (usually behind an `Arc`). Rendering a template binds
//! the `req` object to a [`SqlTemplate`] and a [`TemplateData`] payload.
//!
//! ```rust
//! use shift_sql::{Dialect, SqlTemplate, TemplateRegistry};
//!
//! let registry = TemplateRegistry::builder()
//!     .template(
//!         "by_id.sql",
//!         "SELECT {{ req.into('name', 'name') }} FROM {{ req.ident('users') }} WHERE id = {{ req.arg(7) }}",
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut req = SqlTemplate::with_destinations(Dialect::Postgres, ["name"]);
//! let sql = registry.render("by_id.sql", &mut req, &()).unwrap();
//! assert_eq!(sql, "SELECT name FROM \"users\" WHERE id = $1");
//! assert_eq!(req.args().len(), 1);
//! ```

use std::sync::Arc;

use minijinja::value::Value;
use minijinja::{Environment, UndefinedBehavior, context};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dialect::Dialect;
use crate::error::{TemplateError, TemplateResult, ValidationErrors};
use crate::request::{RequestObject, SqlTemplate, TemplateData};
use crate::value::SqlValue;

/// A rendered statement and its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    /// The SQL text, trimmed.
    pub sql: String,
    /// Values for the placeholders in `sql`, in order.
    pub args: Vec<SqlValue>,
}

/// A validated set of named templates.
#[derive(Debug)]
pub struct TemplateRegistry {
    env: Environment<'static>,
}

impl TemplateRegistry {
    /// Start building a registry.
    pub fn builder() -> TemplateRegistryBuilder {
        TemplateRegistryBuilder::new()
    }

    /// Whether a template with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Render `name` against a request and payload.
    ///
    /// The payload's validation hook runs first. Values bound and scan
    /// destinations registered during the render stay on `req`; a failed
    /// render resets `req` so it can be reused.
    pub fn render(
        &self,
        name: &str,
        req: &mut SqlTemplate,
        data: &dyn TemplateData,
    ) -> TemplateResult<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| TemplateError::UnknownTemplate(name.to_string()))?;
        data.validate()?;

        let dialect = req.dialect();
        let shared = Arc::new(Mutex::new(std::mem::replace(req, SqlTemplate::new(dialect))));
        let failure = Arc::new(Mutex::new(None));
        let object = RequestObject::new(shared.clone(), failure.clone(), data.fields(dialect));

        let rendered = template.render(context! { req => Value::from_object(object) });

        *req = match Arc::try_unwrap(shared) {
            Ok(inner) => inner.into_inner(),
            Err(shared) => shared.lock().clone(),
        };

        match rendered {
            Ok(sql) => {
                let sql = sql.trim().to_string();
                debug!(
                    template = name,
                    dialect = %dialect,
                    args = req.args().len(),
                    "Rendered template"
                );
                trace!(sql = %sql, "Rendered SQL");
                Ok(sql)
            }
            Err(err) => {
                req.reset();
                Err(failure.lock().take().unwrap_or_else(|| err.into()))
            }
        }
    }

    /// Render `name` with a fresh request and return the SQL with its
    /// bind values.
    pub fn render_sql(
        &self,
        name: &str,
        dialect: Dialect,
        data: &dyn TemplateData,
    ) -> TemplateResult<RenderedSql> {
        let mut req = SqlTemplate::new(dialect);
        let sql = self.render(name, &mut req, data)?;
        Ok(RenderedSql {
            sql,
            args: req.take_args(),
        })
    }
}

/// Builder for [`TemplateRegistry`].
///
/// Syntax errors are collected rather than returned one by one; `build`
/// reports all of them.
#[derive(Debug)]
pub struct TemplateRegistryBuilder {
    env: Environment<'static>,
    errors: ValidationErrors,
}

impl TemplateRegistryBuilder {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        Self {
            env,
            errors: ValidationErrors::new(),
        }
    }

    /// Add a template from a static source.
    pub fn template(mut self, name: &'static str, source: &'static str) -> Self {
        if let Err(e) = self.env.add_template(name, source) {
            self.errors.push(format!("template '{}': {}", name, e));
        }
        self
    }

    /// Add a template from an owned source (loaded at runtime).
    pub fn template_owned(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        if let Err(e) = self.env.add_template_owned(name.clone(), source.into()) {
            self.errors.push(format!("template '{}': {}", name, e));
        }
        self
    }

    /// Validate and build the registry.
    pub fn build(self) -> TemplateResult<TemplateRegistry> {
        self.errors.into_result()?;
        Ok(TemplateRegistry { env: self.env })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Lookup {
        table: &'static str,
        ids: Vec<i64>,
    }

    impl TemplateData for Lookup {
        fn validate(&self) -> Result<(), ValidationErrors> {
            let mut errors = ValidationErrors::new();
            if self.table.is_empty() {
                errors.push("table name is empty");
            }
            errors.into_result()
        }

        fn fields(&self, _dialect: Dialect) -> Vec<(&'static str, Value)> {
            vec![
                ("table", Value::from(self.table)),
                ("ids", Value::from(self.ids.clone())),
            ]
        }
    }

    fn registry() -> TemplateRegistry {
        TemplateRegistry::builder()
            .template(
                "lookup.sql",
                "SELECT {{ req.into('n', 'name') }} FROM {{ req.ident(req.table) }} \
                 WHERE id IN ({{ req.arg_list(req.ids) }}) {{ req.select_for('UPDATE') }}",
            )
            .template("bad_ident.sql", "SELECT * FROM {{ req.ident('a.b.c') }}")
            .template(
                "late_failure.sql",
                "SELECT {{ req.into('n', 'name') }} FROM t WHERE id = {{ req.arg(1) }} {{ req.select_for('SOMETIMES') }}",
            )
            .template("bad_dest.sql", "SELECT {{ req.into('nope', 'x') }}")
            .template("bad_list.sql", "{{ req.arg_list(5) }}")
            .template("typo.sql", "{{ req.tabel }}")
            .build()
            .unwrap()
    }

    #[test]
    fn test_render_per_dialect() {
        let registry = registry();
        let data = Lookup {
            table: "users",
            ids: vec![1, 2],
        };

        let mut req = SqlTemplate::with_destinations(Dialect::Postgres, ["n"]);
        let sql = registry.render("lookup.sql", &mut req, &data).unwrap();
        assert_eq!(
            sql,
            "SELECT name FROM \"users\" WHERE id IN ($1, $2) FOR UPDATE"
        );
        assert_eq!(req.args(), &[SqlValue::Int(1), SqlValue::Int(2)]);

        req.set_dialect(Dialect::MySql);
        let sql = registry.render("lookup.sql", &mut req, &data).unwrap();
        assert_eq!(sql, "SELECT name FROM `users` WHERE id IN (?, ?) FOR UPDATE");

        req.set_dialect(Dialect::Sqlite);
        let sql = registry.render("lookup.sql", &mut req, &data).unwrap();
        assert_eq!(sql, "SELECT name FROM \"users\" WHERE id IN (?, ?)");
    }

    #[test]
    fn test_scan_after_render() {
        let registry = registry();
        let data = Lookup {
            table: "users",
            ids: vec![1],
        };
        let mut req = SqlTemplate::with_destinations(Dialect::Sqlite, ["n"]);
        registry.render("lookup.sql", &mut req, &data).unwrap();

        req.scan(vec![SqlValue::from("ada")]).unwrap();
        assert_eq!(req.results()[0].get_str("n"), Some("ada"));
    }

    #[test]
    fn test_typed_errors_survive_render() {
        let registry = registry();

        let mut req = SqlTemplate::new(Dialect::Postgres);
        assert!(matches!(
            registry.render("bad_ident.sql", &mut req, &()),
            Err(TemplateError::InvalidIdentifier { .. })
        ));

        let mut req = SqlTemplate::new(Dialect::Postgres);
        assert_eq!(
            registry.render("bad_dest.sql", &mut req, &()),
            Err(TemplateError::InvalidDestination("nope".to_string()))
        );

        let mut req = SqlTemplate::new(Dialect::Postgres);
        assert!(matches!(
            registry.render("bad_list.sql", &mut req, &()),
            Err(TemplateError::InvalidArgList(_))
        ));
    }

    #[test]
    fn test_failed_render_resets_request() {
        let registry = registry();
        let mut req = SqlTemplate::with_destinations(Dialect::Postgres, ["n"]);

        assert!(matches!(
            registry.render("late_failure.sql", &mut req, &()),
            Err(TemplateError::InvalidRowLock(_))
        ));
        assert!(req.args().is_empty());
        assert!(req.results().is_empty());

        // The destination is still declared, so the request renders again
        // from a clean slate.
        let data = Lookup {
            table: "users",
            ids: vec![3],
        };
        let sql = registry.render("lookup.sql", &mut req, &data).unwrap();
        assert!(sql.ends_with("IN ($1) FOR UPDATE"), "{sql}");
        assert_eq!(req.args(), &[SqlValue::Int(3)]);
    }

    #[test]
    fn test_undefined_field_fails() {
        let registry = registry();
        let data = Lookup {
            table: "users",
            ids: vec![],
        };
        let mut req = SqlTemplate::new(Dialect::Postgres);
        assert!(matches!(
            registry.render("typo.sql", &mut req, &data),
            Err(TemplateError::Render(_))
        ));
    }

    #[test]
    fn test_validation_runs_first() {
        let registry = registry();
        let data = Lookup {
            table: "",
            ids: vec![1],
        };
        let mut req = SqlTemplate::new(Dialect::Postgres);
        let err = registry.render("lookup.sql", &mut req, &data).unwrap_err();
        assert!(matches!(err, TemplateError::Validation(_)));
        assert!(req.args().is_empty());
    }

    #[test]
    fn test_unknown_template() {
        let registry = registry();
        assert_eq!(
            registry.render_sql("missing.sql", Dialect::Ydb, &()),
            Err(TemplateError::UnknownTemplate("missing.sql".to_string()))
        );
        assert!(registry.contains("lookup.sql"));
        assert!(!registry.contains("missing.sql"));
    }

    #[test]
    fn test_builder_collects_syntax_errors() {
        let err = TemplateRegistry::builder()
            .template("a.sql", "{{ unclosed")
            .template_owned("b.sql", "{% if %}")
            .build()
            .unwrap_err();
        match err {
            TemplateError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_render_sql_takes_args() {
        let registry = TemplateRegistry::builder()
            .template("ins.sql", "INSERT INTO t VALUES ({{ req.arg('x') }}, {{ req.arg(true) }})")
            .build()
            .unwrap();
        let rendered = registry.render_sql("ins.sql", Dialect::Ydb, &()).unwrap();
        assert_eq!(rendered.sql, "INSERT INTO t VALUES ($1, $2)");
        assert_eq!(
            rendered.args,
            vec![SqlValue::from("x"), SqlValue::Bool(true)]
        );
    }
}
