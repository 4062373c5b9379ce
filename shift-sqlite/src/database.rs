//! The SQLite [`Database`] implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use shift_migrate::{Database, Executor, MigrateResult, Migrator, MigratorBuilder, Transaction};
use shift_sql::{IsolationLevel, SqlValue};
use tokio_rusqlite::Connection;
use tracing::{debug, trace, warn};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::types::{from_sqlite, to_sqlite};

/// Driver name registered for SQLite.
pub const DRIVER_NAME: &str = "sqlite3";

/// One SQLite connection driven from a background thread.
///
/// Statements run one at a time in submission order. A transaction
/// borrows the database, so nothing else can run on it until the
/// transaction ends.
pub struct SqliteDatabase {
    conn: Connection,
    config: SqliteConfig,
    // Set when a transaction is dropped unfinished; the next call rolls
    // it back before running anything.
    abandoned: AtomicBool,
}

impl SqliteDatabase {
    /// Open a database and apply the configured pragmas.
    pub async fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            DatabasePath::Memory => Connection::open_in_memory().await?,
            DatabasePath::File(path) => Connection::open(path).await?,
        };

        let init_sql = config.init_sql();
        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await?;

        debug!(path = ?config.path, "Opened SQLite database");
        Ok(Self {
            conn,
            config,
            abandoned: AtomicBool::new(false),
        })
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory()).await
    }

    /// Open a database from a URL (see [`SqliteConfig::from_url`]).
    pub async fn open_url(url: &str) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?).await
    }

    /// The configuration the database was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Start a migrator on this database with the driver already set.
    pub fn migrator(self) -> MigratorBuilder<Self> {
        Migrator::builder(self).driver(DRIVER_NAME)
    }

    /// Run several statements without bind values.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        let abandoned = self.take_abandoned();
        debug!(sql = %sql, "Executing batch");
        self.conn
            .call(move |conn| {
                if abandoned {
                    rollback_open(conn)?;
                }
                Ok(conn.execute_batch(&sql)?)
            })
            .await
            .map_err(SqliteError::from)
    }

    async fn execute_on(&self, sql: &str, args: &[SqlValue]) -> SqliteResult<u64> {
        let sql = sql.to_string();
        let params: Vec<rusqlite::types::Value> = args.iter().map(to_sqlite).collect();
        let abandoned = self.take_abandoned();
        trace!(sql = %sql, args = params.len(), "Executing statement");

        self.conn
            .call(move |conn| {
                if abandoned {
                    rollback_open(conn)?;
                }
                let params_ref: Vec<&dyn rusqlite::ToSql> =
                    params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                let changed = conn.execute(&sql, params_ref.as_slice())?;
                Ok(u64::try_from(changed).unwrap_or(u64::MAX))
            })
            .await
            .map_err(SqliteError::from)
    }

    async fn query_on(&self, sql: &str, args: &[SqlValue]) -> SqliteResult<Vec<Vec<SqlValue>>> {
        let sql = sql.to_string();
        let params: Vec<rusqlite::types::Value> = args.iter().map(to_sqlite).collect();
        let abandoned = self.take_abandoned();
        trace!(sql = %sql, args = params.len(), "Executing query");

        self.conn
            .call(move |conn| {
                if abandoned {
                    rollback_open(conn)?;
                }
                let mut stmt = conn.prepare(&sql)?;
                let width = stmt.column_count();
                let params_ref: Vec<&dyn rusqlite::ToSql> =
                    params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();

                let rows = stmt.query_map(params_ref.as_slice(), |row| {
                    (0..width)
                        .map(|i| row.get_ref(i).map(from_sqlite))
                        .collect::<Result<Vec<_>, _>>()
                })?;

                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(SqliteError::from)
    }

    fn take_abandoned(&self) -> bool {
        self.abandoned.swap(false, Ordering::AcqRel)
    }
}

fn rollback_open(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    if !conn.is_autocommit() {
        conn.execute_batch("ROLLBACK")?;
        warn!("Rolled back a transaction left open on the connection");
    }
    Ok(())
}

#[async_trait]
impl Executor for SqliteDatabase {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<u64> {
        Ok(self.execute_on(sql, args).await?)
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<Vec<Vec<SqlValue>>> {
        Ok(self.query_on(sql, args).await?)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn begin(&self, isolation: IsolationLevel) -> MigrateResult<Box<dyn Transaction + '_>> {
        // SQLite transactions are always serializable.
        debug!(requested = %isolation, "Beginning SQLite transaction");

        self.take_abandoned();
        self.conn
            .call(|conn| {
                rollback_open(conn)?;
                conn.execute_batch("BEGIN IMMEDIATE")?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)?;

        Ok(Box::new(SqliteTransaction {
            db: self,
            finished: false,
        }))
    }
}

/// An open `BEGIN IMMEDIATE` transaction.
///
/// Dropping it unfinished rolls it back before the next statement runs on
/// the database.
pub struct SqliteTransaction<'a> {
    db: &'a SqliteDatabase,
    finished: bool,
}

impl SqliteTransaction<'_> {
    async fn finish(&mut self, sql: &'static str) -> MigrateResult<()> {
        self.finished = true;
        self.db.execute_batch(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl Executor for SqliteTransaction<'_> {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<u64> {
        self.db.execute(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<Vec<Vec<SqlValue>>> {
        self.db.query(sql, args).await
    }
}

#[async_trait]
impl Transaction for SqliteTransaction<'_> {
    async fn commit(&mut self) -> MigrateResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("SQLite transaction dropped without commit or rollback");
            self.db.abandoned.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_execute_and_query() {
        let db = SqliteDatabase::open_in_memory().await.unwrap();
        db.execute("CREATE TABLE t (id INTEGER, name TEXT, ok BOOLEAN)", &[])
            .await
            .unwrap();
        let changed = db
            .execute(
                "INSERT INTO t VALUES (?, ?, ?)",
                &[SqlValue::Int(1), SqlValue::from("a"), SqlValue::Bool(true)],
            )
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let rows = db
            .query("SELECT id, name, ok FROM t WHERE id = ?", &[SqlValue::Int(1)])
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![SqlValue::Int(1), SqlValue::from("a"), SqlValue::Int(1)]]
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_ddl() {
        let db = SqliteDatabase::open_in_memory().await.unwrap();

        let mut tx = db.begin(IsolationLevel::Serializable).await.unwrap();
        tx.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        tx.rollback().await.unwrap();
        drop(tx);

        let rows = db
            .query("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'", &[])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);
    }

    #[tokio::test]
    async fn test_begin_recovers_abandoned_transaction() {
        let db = SqliteDatabase::open_in_memory().await.unwrap();

        let tx = db.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        drop(tx);

        let mut tx = db.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let rows = db
            .query("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'", &[])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back_before_next_read() {
        let db = SqliteDatabase::open_in_memory().await.unwrap();

        let tx = db.begin(IsolationLevel::Serializable).await.unwrap();
        tx.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        drop(tx);

        // No new transaction in between: the plain read must not see the
        // abandoned DDL.
        let rows = db
            .query("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'", &[])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);

        db.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        let rows = db.query("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);
    }

    #[tokio::test]
    async fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        let db = SqliteDatabase::open(SqliteConfig::file(&path)).await.unwrap();
        db.execute_batch("CREATE TABLE t (id INTEGER);").await.unwrap();
        drop(db);

        let db = SqliteDatabase::open_url(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        let rows = db.query("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);
    }
}
