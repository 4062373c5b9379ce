//! Migration steps.
//!
//! A [`Step`] is one version transition: an ordered, non-empty list of
//! statements. Up runs the statements in order; Down runs their Down
//! templates in reverse order. A failure stops the step and reports the
//! SQL that already ran.

use shift_sql::{Dialect, RenderedSql, TemplateRegistry, ValidationErrors};
use tracing::{debug, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::executor::Executor;
use crate::statement::{Direction, Statement};

/// A named group of statements applied as one version transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    name: String,
    statements: Vec<Statement>,
}

/// A step that stopped part-way.
#[derive(Debug)]
pub struct PartialExecution {
    /// SQL of the statements that succeeded, each terminated by `;\n`.
    pub executed_sql: String,
    /// Why the step stopped.
    pub error: MigrationError,
}

impl Step {
    /// Create a step.
    pub fn new(name: impl Into<String>, statements: impl IntoIterator<Item = Statement>) -> Self {
        Self {
            name: name.into(),
            statements: statements.into_iter().collect(),
        }
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statements in Up order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Report every problem with the step and its statements.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let label = if self.name.is_empty() {
            errors.push("step name is empty");
            "<unnamed>".to_string()
        } else {
            format!("step '{}'", self.name)
        };

        if self.statements.is_empty() {
            errors.push(format!("{} has no statements", label));
        }
        for (i, statement) in self.statements.iter().enumerate() {
            if let Err(e) = statement.validate() {
                errors.extend_with_context(&format!("{}, statement {}", label, i + 1), e);
            }
        }

        errors.into_result()
    }

    /// Template names the step renders, Up and Down.
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.statements
            .iter()
            .flat_map(|s| [s.up_template(), s.down_template()])
    }

    /// Statements in execution order for a direction.
    fn ordered(&self, direction: Direction) -> Box<dyn Iterator<Item = &Statement> + Send + '_> {
        match direction {
            Direction::Up => Box::new(self.statements.iter()),
            Direction::Down => Box::new(self.statements.iter().rev()),
        }
    }

    /// Render every statement for a direction without executing anything.
    pub fn render(
        &self,
        registry: &TemplateRegistry,
        dialect: Dialect,
        direction: Direction,
    ) -> MigrateResult<Vec<RenderedSql>> {
        self.ordered(direction)
            .map(|s| s.render(registry, dialect, direction).map_err(MigrationError::from))
            .collect()
    }

    /// Apply the step.
    pub async fn up<E: Executor + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        dialect: Dialect,
        executor: &E,
    ) -> Result<String, PartialExecution> {
        self.run(registry, dialect, executor, Direction::Up).await
    }

    /// Revert the step.
    pub async fn down<E: Executor + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        dialect: Dialect,
        executor: &E,
    ) -> Result<String, PartialExecution> {
        self.run(registry, dialect, executor, Direction::Down).await
    }

    /// Run the step in `direction`, returning the executed SQL.
    pub async fn run<E: Executor + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        dialect: Dialect,
        executor: &E,
        direction: Direction,
    ) -> Result<String, PartialExecution> {
        let mut executed_sql = String::new();

        for statement in self.ordered(direction) {
            let result = match statement.render(registry, dialect, direction) {
                Ok(rendered) => executor
                    .execute(&rendered.sql, &rendered.args)
                    .await
                    .map(|_| rendered.sql),
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(sql) => {
                    debug!(step = %self.name, %direction, sql = %sql, "Executed statement");
                    executed_sql.push_str(&sql);
                    executed_sql.push_str(";\n");
                }
                Err(error) => {
                    warn!(step = %self.name, %direction, error = %error, "Statement failed");
                    return Err(PartialExecution {
                        executed_sql,
                        error,
                    });
                }
            }
        }

        Ok(executed_sql)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::column::Column;
    use crate::templates;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use shift_sql::{ColumnType, SqlValue};

    /// Records executed SQL and fails statements containing `fail_on`.
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub(crate) executed: Mutex<Vec<String>>,
        pub(crate) fail_on: Option<String>,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(&self, sql: &str, _args: &[SqlValue]) -> MigrateResult<u64> {
            if let Some(pattern) = &self.fail_on {
                if sql.contains(pattern.as_str()) {
                    return Err(MigrationError::database(format!("refused: {}", sql)));
                }
            }
            self.executed.lock().push(sql.to_string());
            Ok(0)
        }

        async fn query(&self, _sql: &str, _args: &[SqlValue]) -> MigrateResult<Vec<Vec<SqlValue>>> {
            Ok(Vec::new())
        }
    }

    fn widgets_step() -> Step {
        Step::new(
            "widgets",
            [
                Statement::create_table(
                    "widgets",
                    [
                        Column::new("id", ColumnType::BigInt),
                        Column::new("name", ColumnType::Text),
                    ],
                ),
                Statement::create_index(true, "id", "widgets", ["id"]),
            ],
        )
    }

    #[test]
    fn test_validate_accumulates() {
        let step = Step::new(
            "",
            [
                Statement::create_table("", Vec::new()),
                Statement::create_index(false, "x", "t", Vec::<String>::new()),
            ],
        );
        let err = step.validate().unwrap_err();
        let messages: Vec<&str> = err.iter().collect();
        assert_eq!(messages.len(), 4, "{}", err);
        assert_eq!(messages[0], "step name is empty");
        assert!(messages[1].starts_with("<unnamed>, statement 1: "));

        let empty = Step::new("noop", Vec::new());
        assert_eq!(
            empty.validate().unwrap_err().to_string(),
            "step 'noop' has no statements"
        );
    }

    #[tokio::test]
    async fn test_up_then_down_reverses() {
        let registry = templates::builtin().build().unwrap();
        let exec = RecordingExecutor::default();
        let step = widgets_step();

        let up = step.up(&registry, Dialect::Sqlite, &exec).await.unwrap();
        let down = step.down(&registry, Dialect::Sqlite, &exec).await.unwrap();

        let executed = exec.executed.lock().clone();
        assert_eq!(executed.len(), 4);
        assert!(executed[0].starts_with("CREATE TABLE"));
        assert!(executed[1].starts_with("CREATE UNIQUE INDEX"));
        assert!(executed[2].starts_with("DROP INDEX"));
        assert!(executed[3].starts_with("DROP TABLE"));

        assert_eq!(up, format!("{};\n{};\n", executed[0], executed[1]));
        assert_eq!(down, "DROP INDEX \"idx_widgets_id\";\nDROP TABLE \"widgets\";\n");
    }

    #[tokio::test]
    async fn test_failure_reports_partial_sql() {
        let registry = templates::builtin().build().unwrap();
        let exec = RecordingExecutor {
            fail_on: Some("INDEX".to_string()),
            ..Default::default()
        };

        let partial = widgets_step()
            .up(&registry, Dialect::Postgres, &exec)
            .await
            .unwrap_err();
        assert!(partial.executed_sql.starts_with("CREATE TABLE \"widgets\""));
        assert!(!partial.executed_sql.contains("INDEX"));
        assert!(matches!(partial.error, MigrationError::Database(_)));
        assert_eq!(exec.executed.lock().len(), 1);
    }

    #[test]
    fn test_render_down_order() {
        let registry = templates::builtin().build().unwrap();
        let rendered = widgets_step()
            .render(&registry, Dialect::MySql, Direction::Down)
            .unwrap();
        assert_eq!(rendered[0].sql, "DROP INDEX `idx_widgets_id` ON `widgets`");
        assert_eq!(rendered[1].sql, "DROP TABLE `widgets`");
    }
}
