//! Values bound to statements and scanned out of result rows.

use std::fmt;

use minijinja::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};

use crate::error::{TemplateError, TemplateResult};

/// An opaque value bound positionally to a statement, or read back from a
/// result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Check whether this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Read as an integer. Booleans map to 0/1.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Read as a boolean. Engines without a native boolean hand back 0/1.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Read as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a template value into a bindable value.
    ///
    /// Sequences and maps are rejected: a placeholder binds exactly one
    /// scalar.
    pub fn from_template_value(value: &Value) -> TemplateResult<Self> {
        match value.kind() {
            ValueKind::Undefined | ValueKind::None => Ok(Self::Null),
            ValueKind::Bool => Ok(Self::Bool(value.is_true())),
            ValueKind::Number => {
                if let Ok(i) = i64::try_from(value.clone()) {
                    Ok(Self::Int(i))
                } else {
                    f64::try_from(value.clone())
                        .map(Self::Float)
                        .map_err(|e| TemplateError::render(format!("unbindable number: {}", e)))
                }
            }
            ValueKind::String => Ok(Self::String(value.as_str().unwrap_or_default().to_string())),
            ValueKind::Bytes => Ok(Self::Bytes(value.as_bytes().unwrap_or_default().to_vec())),
            other => Err(TemplateError::render(format!(
                "cannot bind a value of kind {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_template_value_scalars() {
        assert_eq!(
            SqlValue::from_template_value(&Value::from(42)).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            SqlValue::from_template_value(&Value::from(true)).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            SqlValue::from_template_value(&Value::from("x")).unwrap(),
            SqlValue::String("x".into())
        );
        assert_eq!(
            SqlValue::from_template_value(&Value::from(())).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            SqlValue::from_template_value(&Value::from(1.5)).unwrap(),
            SqlValue::Float(1.5)
        );
    }

    #[test]
    fn test_from_template_value_rejects_sequences() {
        let seq = Value::from(vec![1, 2, 3]);
        assert!(SqlValue::from_template_value(&seq).is_err());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(7).as_bool(), None);
        assert_eq!(SqlValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from("a").as_str(), Some("a"));
    }
}
