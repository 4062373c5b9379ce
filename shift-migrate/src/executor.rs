//! Database access used by steps and the migrator.
//!
//! Drivers implement [`Database`]; everything else only needs the
//! [`Executor`] half, so a step runs the same way against a plain
//! connection or an open [`Transaction`].

use async_trait::async_trait;
use shift_sql::{IsolationLevel, SqlValue};

use crate::error::MigrateResult;

/// Runs rendered SQL with positional bind values.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<u64>;

    /// Run a query and return its rows, columns in `SELECT` order.
    async fn query(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<Vec<Vec<SqlValue>>>;
}

/// An open transaction. Dropping it without `commit` leaves the outcome
/// to the driver, which should roll back.
#[async_trait]
pub trait Transaction: Executor {
    /// Commit the transaction.
    async fn commit(&mut self) -> MigrateResult<()>;

    /// Roll the transaction back.
    async fn rollback(&mut self) -> MigrateResult<()>;
}

/// A database the migrator can run against.
#[async_trait]
pub trait Database: Executor {
    /// Start a transaction at the given isolation level.
    async fn begin(&self, isolation: IsolationLevel) -> MigrateResult<Box<dyn Transaction + '_>>;
}

#[async_trait]
impl<T: Executor + ?Sized> Executor for &T {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<u64> {
        (**self).execute(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[SqlValue]) -> MigrateResult<Vec<Vec<SqlValue>>> {
        (**self).query(sql, args).await
    }
}

#[async_trait]
impl<T: Database + ?Sized> Database for &T {
    async fn begin(&self, isolation: IsolationLevel) -> MigrateResult<Box<dyn Transaction + '_>> {
        (**self).begin(isolation).await
    }
}
