//! Portable column types.
//!
//! Only a closed set of types is offered. Each one has a rendering on every
//! supported engine that behaves the same way for the values the engine
//! writes, and native date/time types are deliberately absent: timestamps
//! are stored as integers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest length accepted for `CHAR(n)` / `VARCHAR(n)`.
///
/// This keeps every declared width within the smallest limit that is safe
/// for indexes across the supported engines.
pub const MAX_CHAR_LENGTH: u32 = 1023;

/// A portable column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// Unbounded text.
    Text,
    /// Unbounded binary data.
    Blob,
    /// Fixed-width text of the given length.
    Char(u32),
    /// Variable-width text up to the given length.
    VarChar(u32),
    /// Boolean.
    Boolean,
}

impl ColumnType {
    /// Whether the type holds integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInt | Self::Int | Self::BigInt)
    }

    /// Whether the type holds text.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Char(_) | Self::VarChar(_))
    }

    /// The declared length for `CHAR`/`VARCHAR`.
    pub fn length(&self) -> Option<u32> {
        match self {
            Self::Char(n) | Self::VarChar(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => write!(f, "SMALLINT"),
            Self::Int => write!(f, "INT"),
            Self::BigInt => write!(f, "BIGINT"),
            Self::Text => write!(f, "TEXT"),
            Self::Blob => write!(f, "BLOB"),
            Self::Char(n) => write!(f, "CHAR({})", n),
            Self::VarChar(n) => write!(f, "VARCHAR({})", n),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ColumnType::VarChar(255).to_string(), "VARCHAR(255)");
        assert_eq!(ColumnType::BigInt.to_string(), "BIGINT");
    }

    #[test]
    fn test_classification() {
        assert!(ColumnType::SmallInt.is_integer());
        assert!(ColumnType::Char(3).is_textual());
        assert!(!ColumnType::Blob.is_textual());
        assert_eq!(ColumnType::Char(3).length(), Some(3));
        assert_eq!(ColumnType::Text.length(), None);
    }
}
