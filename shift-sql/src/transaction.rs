//! Transaction isolation levels.
//!
//! Migration steps run inside a transaction on engines with transactional
//! DDL. The level is configurable; read committed is the default because it
//! is the least common level every target engine supports.
//!
//! ```rust
//! use shift_sql::IsolationLevel;
//!
//! assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
//! assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted - allows dirty reads.
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    #[default]
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause for this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}
