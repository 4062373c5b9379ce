//! The version state machine.
//!
//! A [`Migrator`] owns an ordered list of steps. Step 0 is built in and
//! creates the bookkeeping table; caller steps follow. The state is a
//! version in `0..=N` (N = number of steps, the bookkeeping step included)
//! plus a dirty flag, and always comes from the latest log entry.
//!
//! Transitions:
//!
//! - `next` runs step `version` Up and records `version + 1`.
//! - `prev` runs step `version - 1` Down and records `version - 1`.
//! - `up` / `down` repeat until [`MigrationError::EndOfSequence`].
//!
//! On engines with transactional DDL a step and its log entry commit
//! together; a failure rolls back and records the attempt at the starting
//! version. Elsewhere a failure records the target version as dirty, and
//! the migrator refuses to move until an operator calls [`Migrator::set`],
//! [`Migrator::set_recovered_to_next`] or
//! [`Migrator::set_recovered_to_prev`].
//!
//! Runs are not serialized across processes; callers must ensure a single
//! migrator runs against a database at a time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shift_sql::{
    Dialect, IsolationLevel, RenderedSql, ScannedRow, SqlTemplate, TemplateRegistry,
    ValidationErrors,
};
use tracing::{debug, error, info, warn};

use crate::config::MigratorConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{Database, Executor, Transaction};
use crate::log::{LogEntry, LogInsert, LogQuery, bookkeeping_step, now_micros, now_secs};
use crate::statement::Direction;
use crate::step::{PartialExecution, Step};
use crate::templates;

/// The SQL one step would run, without running it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    /// Step name.
    pub name: String,
    /// Direction.
    pub direction: Direction,
    /// Version before the step.
    pub from: usize,
    /// Version after the step.
    pub to: usize,
    /// Rendered statements in execution order.
    pub statements: Vec<RenderedSql>,
}

/// Runs steps against a database and tracks the version.
pub struct Migrator<D> {
    db: D,
    dialect: Dialect,
    config: MigratorConfig,
    registry: Arc<TemplateRegistry>,
    steps: Vec<Step>,
    poisoned: Mutex<Option<String>>,
}

/// Builder for [`Migrator`].
pub struct MigratorBuilder<D> {
    db: D,
    config: MigratorConfig,
    registry: Option<Arc<TemplateRegistry>>,
    steps: Vec<Step>,
}

impl<D: Database> MigratorBuilder<D> {
    /// Replace the whole configuration.
    pub fn config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the driver name.
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.config.driver = driver.into();
        self
    }

    /// Set the bookkeeping table name.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.config.table_name = table.into();
        self
    }

    /// Enable or disable step transactions.
    pub fn use_transaction(mut self, enabled: bool) -> Self {
        self.config.use_transaction = enabled;
        self
    }

    /// Set the isolation level of step transactions.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.config.isolation = level;
        self
    }

    /// Use a registry holding raw-statement templates. It must include the
    /// built-in templates (see [`templates::builtin`]).
    pub fn registry(mut self, registry: Arc<TemplateRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Resolve the dialect and validate everything, reporting all problems
    /// together.
    pub fn build(self) -> MigrateResult<Migrator<D>> {
        let dialect = self.config.dialect()?;
        let mut errors = ValidationErrors::new();

        if let Err(e) = self.config.validate() {
            errors.extend_with_context("config", e);
        }

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(templates::builtin().build()?),
        };
        for name in templates::missing_builtins(&registry) {
            errors.push(format!("template registry lacks built-in template '{}'", name));
        }

        for (i, step) in self.steps.iter().enumerate() {
            let version = i + 1;
            if let Err(e) = step.validate() {
                errors.extend_with_context(&format!("step {}", version), e);
            }
            for name in step.template_names() {
                if !registry.contains(name) {
                    errors.push(format!(
                        "step {} ('{}'): unknown template '{}'",
                        version,
                        step.name(),
                        name
                    ));
                }
            }
        }
        errors.into_result()?;

        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.push(bookkeeping_step(&self.config.table_name));
        steps.extend(self.steps);

        info!(
            driver = %self.config.driver,
            dialect = %dialect,
            steps = steps.len(),
            table = %self.config.table_name,
            "Migrator ready"
        );

        Ok(Migrator {
            db: self.db,
            dialect,
            config: self.config,
            registry,
            steps,
            poisoned: Mutex::new(None),
        })
    }
}

enum LogState {
    Missing,
    Empty,
    Latest(LogEntry),
}

struct Transition<'a> {
    step: &'a Step,
    index: usize,
    direction: Direction,
    from: usize,
    to: usize,
    ts: i64,
}

impl Transition<'_> {
    // Reverting step 0 drops the log table itself.
    fn records_success(&self) -> bool {
        !(self.direction == Direction::Down && self.index == 0)
    }

    fn entry(&self, version: usize, dirty: bool) -> LogEntry {
        LogEntry::new(self.ts, version, self.direction.is_up(), dirty)
    }

    fn failed(&self, partial: PartialExecution) -> MigrationError {
        MigrationError::StepFailed {
            step: self.step.name().to_string(),
            executed_sql: partial.executed_sql,
            source: Box::new(partial.error),
        }
    }
}

impl<D: Database> Migrator<D> {
    /// Start building a migrator for `db`.
    pub fn builder(db: D) -> MigratorBuilder<D> {
        MigratorBuilder {
            db,
            config: MigratorConfig::default(),
            registry: None,
            steps: Vec::new(),
        }
    }

    /// Number of steps (N), the bookkeeping step included.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always `false`: the bookkeeping step is always present.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in version order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// The resolved dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The configuration.
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// The template registry.
    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    /// The database.
    pub fn database(&self) -> &D {
        &self.db
    }

    /// The current `(version, dirty)` state. A missing bookkeeping table
    /// means `(0, false)`.
    pub async fn current(&self) -> MigrateResult<(usize, bool)> {
        self.check_poisoned()?;
        Ok(match self.latest_checked().await? {
            Some(entry) => (entry.version, entry.is_dirty),
            None => (0, false),
        })
    }

    /// Apply the next step.
    pub async fn next(&self) -> MigrateResult<()> {
        self.step(Direction::Up).await
    }

    /// Revert the last applied step.
    pub async fn prev(&self) -> MigrateResult<()> {
        self.step(Direction::Down).await
    }

    /// Apply every remaining step. Returns how many were applied.
    pub async fn up(&self) -> MigrateResult<usize> {
        self.run_all(Direction::Up).await
    }

    /// Revert every applied step. Returns how many were reverted.
    pub async fn down(&self) -> MigrateResult<usize> {
        self.run_all(Direction::Down).await
    }

    /// Every log entry, oldest first. Empty when the table does not exist.
    pub async fn history(&self) -> MigrateResult<Vec<LogEntry>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        self.query_log(templates::LOG_HISTORY).await
    }

    /// Render what [`up`](Self::up) would run from the current version.
    pub async fn plan_up(&self) -> MigrateResult<Vec<PlannedStep>> {
        let version = self.clean_version().await?;
        (version..self.steps.len())
            .map(|index| self.plan_step(index, Direction::Up))
            .collect()
    }

    /// Render what [`down`](Self::down) would run from the current version.
    pub async fn plan_down(&self) -> MigrateResult<Vec<PlannedStep>> {
        let version = self.clean_version().await?;
        (0..version)
            .rev()
            .map(|index| self.plan_step(index, Direction::Down))
            .collect()
    }

    /// Override the state by appending a log entry.
    ///
    /// Works on a poisoned migrator, except when the latest entry lies in
    /// the future: a new entry could not become the latest one.
    pub async fn set(&self, version: usize, dirty: bool) -> MigrateResult<()> {
        if version > self.steps.len() {
            return Err(MigrationError::InvalidVersion {
                version,
                max: self.steps.len(),
            });
        }

        let previous = match self.read_log().await? {
            LogState::Missing if version == 0 && !dirty => return Ok(()),
            LogState::Missing => {
                return Err(MigrationError::other(format!(
                    "bookkeeping table '{}' does not exist; apply step 0 first",
                    self.config.table_name
                )));
            }
            LogState::Empty => None,
            LogState::Latest(entry) => {
                let now = now_secs();
                if entry.ts > now {
                    return Err(self.poison(future_entry(entry.ts, now)));
                }
                Some(entry.ts)
            }
        };

        let entry = LogEntry::new(next_timestamp(previous).await, version, true, dirty);
        self.insert_entry(&self.db, &entry).await?;
        *self.poisoned.lock() = None;

        warn!(version, dirty, "Migration state overridden");
        Ok(())
    }

    /// Leave a dirty state by declaring the interrupted transition
    /// finished at its higher version. Returns that version.
    pub async fn set_recovered_to_next(&self) -> MigrateResult<usize> {
        let dirty = self.dirty_entry().await?;
        let version = if dirty.is_up {
            dirty.version
        } else {
            dirty.version + 1
        };
        self.append_recovery(&dirty, version, Direction::Up).await?;
        Ok(version)
    }

    /// Leave a dirty state by declaring the interrupted transition
    /// finished at its lower version. Returns that version.
    pub async fn set_recovered_to_prev(&self) -> MigrateResult<usize> {
        let dirty = self.dirty_entry().await?;
        let version = if dirty.is_up {
            dirty.version.saturating_sub(1)
        } else {
            dirty.version
        };
        self.append_recovery(&dirty, version, Direction::Down).await?;
        Ok(version)
    }

    /// The database clock, in microseconds since the epoch.
    pub async fn server_epoch(&self) -> MigrateResult<i64> {
        let mut req = SqlTemplate::with_destinations(self.dialect, ["epoch"]);
        let sql = self.registry.render(templates::SERVER_EPOCH, &mut req, &())?;
        let rows = self.fetch(sql, req).await?;
        rows.first()
            .and_then(|row| row.get_i64("epoch"))
            .ok_or_else(|| MigrationError::database("server clock query returned no value"))
    }

    /// Database clock minus client clock. Positive when the server is
    /// ahead.
    pub async fn clock_skew(&self) -> MigrateResult<chrono::Duration> {
        let before = now_micros();
        let server = self.server_epoch().await?;
        let after = now_micros();
        let local = before + (after - before) / 2;
        Ok(chrono::Duration::microseconds(server - local))
    }

    async fn run_all(&self, direction: Direction) -> MigrateResult<usize> {
        let mut completed = 0;
        loop {
            match self.step(direction).await {
                Ok(()) => completed += 1,
                Err(e) if e.is_end_of_sequence() => {
                    info!(%direction, completed, "Migration sequence finished");
                    return Ok(completed);
                }
                Err(e) => {
                    error!(%direction, completed, error = %e, "Migration stopped");
                    return Err(MigrationError::Incomplete {
                        completed,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    async fn step(&self, direction: Direction) -> MigrateResult<()> {
        self.check_poisoned()?;
        let latest = self.latest_checked().await?;
        let (version, dirty) = latest
            .as_ref()
            .map_or((0, false), |e| (e.version, e.is_dirty));
        if dirty {
            return Err(MigrationError::Dirty { version });
        }

        let (index, to) = match direction {
            Direction::Up if version < self.steps.len() => (version, version + 1),
            Direction::Down if version > 0 => (version - 1, version - 1),
            _ => return Err(MigrationError::EndOfSequence),
        };

        let transition = Transition {
            step: &self.steps[index],
            index,
            direction,
            from: version,
            to,
            ts: next_timestamp(latest.map(|e| e.ts)).await,
        };

        info!(
            step = %transition.step.name(),
            %direction,
            from = version,
            to,
            "Running migration step"
        );

        if self.config.use_transaction && self.dialect.supports_transactional_ddl() {
            self.run_in_transaction(&transition).await
        } else {
            self.run_direct(&transition).await
        }
    }

    async fn run_in_transaction(&self, t: &Transition<'_>) -> MigrateResult<()> {
        let mut tx = self.db.begin(self.config.isolation).await?;

        match t.step.run(&self.registry, self.dialect, &*tx, t.direction).await {
            Ok(sql) => {
                if t.records_success() {
                    let entry = t.entry(t.to, false).with_statements(sql);
                    if let Err(e) = self.insert_entry(&*tx, &entry).await {
                        rollback(tx.as_mut()).await;
                        return Err(e);
                    }
                }
                tx.commit().await?;
                info!(step = %t.step.name(), version = t.to, "Migration step applied");
                Ok(())
            }
            Err(partial) => {
                rollback(tx.as_mut()).await;
                drop(tx);

                // Creating the log table was rolled back with the rest.
                if !(t.direction.is_up() && t.index == 0) {
                    let entry = t
                        .entry(t.from, false)
                        .with_statements(partial.executed_sql.clone())
                        .with_error(partial.error.to_string());
                    self.record_failure(&entry).await;
                }
                Err(t.failed(partial))
            }
        }
    }

    async fn run_direct(&self, t: &Transition<'_>) -> MigrateResult<()> {
        match t.step.run(&self.registry, self.dialect, &self.db, t.direction).await {
            Ok(sql) => {
                if t.records_success() {
                    let entry = t.entry(t.to, false).with_statements(sql);
                    self.insert_entry(&self.db, &entry).await?;
                }
                info!(step = %t.step.name(), version = t.to, "Migration step applied");
                Ok(())
            }
            Err(partial) => {
                let entry = t
                    .entry(t.to, true)
                    .with_statements(partial.executed_sql.clone())
                    .with_error(partial.error.to_string());
                self.record_failure(&entry).await;
                error!(step = %t.step.name(), version = t.to, "Step failed; database is dirty");
                Err(t.failed(partial))
            }
        }
    }

    async fn record_failure(&self, entry: &LogEntry) {
        if let Err(e) = self.insert_entry(&self.db, entry).await {
            warn!(
                version = entry.version,
                error = %e,
                "Could not record failed migration step"
            );
        }
    }

    async fn append_recovery(
        &self,
        dirty: &LogEntry,
        version: usize,
        direction: Direction,
    ) -> MigrateResult<()> {
        let entry = LogEntry::new(
            next_timestamp(Some(dirty.ts)).await,
            version,
            direction.is_up(),
            false,
        );
        self.insert_entry(&self.db, &entry).await?;
        warn!(from = dirty.version, to = version, "Recovered from dirty state");
        Ok(())
    }

    async fn dirty_entry(&self) -> MigrateResult<LogEntry> {
        self.check_poisoned()?;
        match self.latest_checked().await? {
            Some(entry) if entry.is_dirty => Ok(entry),
            _ => Err(MigrationError::NotDirty),
        }
    }

    async fn clean_version(&self) -> MigrateResult<usize> {
        match self.current().await? {
            (version, true) => Err(MigrationError::Dirty { version }),
            (version, false) => Ok(version),
        }
    }

    fn plan_step(&self, index: usize, direction: Direction) -> MigrateResult<PlannedStep> {
        let step = &self.steps[index];
        let (from, to) = match direction {
            Direction::Up => (index, index + 1),
            Direction::Down => (index + 1, index),
        };
        Ok(PlannedStep {
            name: step.name().to_string(),
            direction,
            from,
            to,
            statements: step.render(&self.registry, self.dialect, direction)?,
        })
    }

    async fn insert_entry<E: Executor + ?Sized>(
        &self,
        executor: &E,
        entry: &LogEntry,
    ) -> MigrateResult<()> {
        let rendered = self.registry.render_sql(
            templates::LOG_INSERT,
            self.dialect,
            &LogInsert {
                table: &self.config.table_name,
                entry,
            },
        )?;
        executor.execute(&rendered.sql, &rendered.args).await?;
        debug!(
            version = entry.version,
            dirty = entry.is_dirty,
            up = entry.is_up,
            "Recorded migration log entry"
        );
        Ok(())
    }

    async fn read_log(&self) -> MigrateResult<LogState> {
        if !self.table_exists().await? {
            return Ok(LogState::Missing);
        }
        let mut entries = self.query_log(templates::LOG_LATEST).await?;
        Ok(match entries.pop() {
            Some(entry) => LogState::Latest(entry),
            None => LogState::Empty,
        })
    }

    async fn latest_checked(&self) -> MigrateResult<Option<LogEntry>> {
        match self.read_log().await? {
            LogState::Missing => Ok(None),
            LogState::Empty => Err(self.poison(format!(
                "bookkeeping table '{}' exists but has no entries",
                self.config.table_name
            ))),
            LogState::Latest(entry) => {
                if entry.version > self.steps.len() {
                    return Err(self.poison(format!(
                        "recorded version {} is beyond the last step ({})",
                        entry.version,
                        self.steps.len()
                    )));
                }
                let now = now_secs();
                if entry.ts > now {
                    return Err(self.poison(future_entry(entry.ts, now)));
                }
                Ok(Some(entry))
            }
        }
    }

    async fn table_exists(&self) -> MigrateResult<bool> {
        let mut req = SqlTemplate::with_destinations(self.dialect, ["count"]);
        let sql = self
            .registry
            .render(templates::TABLE_EXISTS, &mut req, &self.log_query())?;
        let rows = self.fetch(sql, req).await?;
        Ok(rows.first().and_then(|row| row.get_i64("count")).unwrap_or(0) > 0)
    }

    async fn query_log(&self, template: &str) -> MigrateResult<Vec<LogEntry>> {
        let mut req = SqlTemplate::with_destinations(self.dialect, LogEntry::COLUMNS);
        let sql = self.registry.render(template, &mut req, &self.log_query())?;
        self.fetch(sql, req)
            .await?
            .iter()
            .map(LogEntry::from_row)
            .collect()
    }

    async fn fetch(&self, sql: String, mut req: SqlTemplate) -> MigrateResult<Vec<ScannedRow>> {
        let args = req.take_args();
        let rows = self.db.query(&sql, &args).await?;
        for row in rows {
            req.scan(row)?;
        }
        Ok(req.results())
    }

    fn log_query(&self) -> LogQuery<'_> {
        LogQuery {
            table: &self.config.table_name,
        }
    }

    fn poison(&self, reason: String) -> MigrationError {
        error!(reason = %reason, "Migration log failed a consistency check");
        *self.poisoned.lock() = Some(reason.clone());
        MigrationError::Corrupted(reason)
    }

    fn check_poisoned(&self) -> MigrateResult<()> {
        match self.poisoned.lock().as_ref() {
            Some(reason) => Err(MigrationError::Corrupted(reason.clone())),
            None => Ok(()),
        }
    }
}

async fn rollback(tx: &mut (dyn Transaction + '_)) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

fn future_entry(ts: i64, now: i64) -> String {
    format!(
        "latest entry is {} seconds in the future; check for clock skew",
        ts - now
    )
}

/// A client timestamp strictly after `previous`, waiting for the clock to
/// reach the next second when needed.
async fn next_timestamp(previous: Option<i64>) -> i64 {
    let mut now = now_secs();
    if let Some(previous) = previous {
        while now <= previous {
            let target = previous.saturating_add(1).saturating_mul(1_000_000);
            let wait = u64::try_from(target - now_micros()).unwrap_or(0).max(1_000);
            tokio::time::sleep(Duration::from_micros(wait)).await;
            now = now_secs();
        }
    }
    now
}
