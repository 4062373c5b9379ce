//! Error types for dialects and template rendering.
//!
//! Two families live here:
//!
//! - [`TemplateError`] is raised while a single statement is rendered
//!   (identifier misuse, a bad argument list, an unknown scan destination).
//!   It aborts that render immediately.
//! - [`ValidationErrors`] collects construction-time problems. Callers keep
//!   pushing into it and only turn it into an error at the end, so every
//!   mistake in a definition is reported in one pass.
//!
//! ```rust
//! use shift_sql::ValidationErrors;
//!
//! let mut errors = ValidationErrors::new();
//! errors.push("table name is empty");
//! errors.push("column 'id': length 0 is out of range");
//!
//! let err = errors.into_result().unwrap_err();
//! assert_eq!(
//!     err.to_string(),
//!     "table name is empty; column 'id': length 0 is out of range"
//! );
//! ```

use thiserror::Error;

/// Result type for rendering operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors raised while rendering a templated statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// An identifier (or one of its dotted segments) was empty.
    #[error("empty identifier")]
    EmptyIdentifier,

    /// An identifier contained a character the dialect cannot quote, or had
    /// too many dotted segments.
    #[error("invalid identifier '{ident}': {reason}")]
    InvalidIdentifier {
        /// The offending identifier.
        ident: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A row-locking clause the dialect does not understand.
    #[error("invalid row-locking clause: {0}")]
    InvalidRowLock(String),

    /// `arg_list` was handed something that is not a sequence of values.
    #[error("invalid arglist: {0}")]
    InvalidArgList(String),

    /// `into` named a destination the request does not expose.
    #[error("invalid scan destination '{0}'")]
    InvalidDestination(String),

    /// A result row did not line up with the registered destinations.
    #[error("scan mismatch: {expected} destinations registered, row has {actual} columns")]
    ScanMismatch {
        /// Number of registered destinations.
        expected: usize,
        /// Number of columns in the row.
        actual: usize,
    },

    /// The registry has no template with this name.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    /// The request payload failed its validation hook.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// Any other failure reported by the template engine.
    #[error("render error: {0}")]
    Render(String),
}

impl TemplateError {
    /// Create an invalid identifier error.
    pub fn invalid_identifier(ident: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            ident: ident.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid row-locking clause error.
    pub fn invalid_row_lock(msg: impl Into<String>) -> Self {
        Self::InvalidRowLock(msg.into())
    }

    /// Create an invalid argument list error.
    pub fn invalid_arg_list(msg: impl Into<String>) -> Self {
        Self::InvalidArgList(msg.into())
    }

    /// Create a render error.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err.to_string())
    }
}

/// Accumulated construction-time problems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .errors.join("; "))]
pub struct ValidationErrors {
    errors: Vec<String>,
}

impl ValidationErrors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one problem.
    pub fn push(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Absorb every problem from `other`, prefixing each with `context`.
    pub fn extend_with_context(&mut self, context: &str, other: ValidationErrors) {
        self.errors
            .extend(other.errors.into_iter().map(|e| format!("{}: {}", context, e)));
    }

    /// Absorb every problem from `other` unchanged.
    pub fn extend(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    /// Whether no problem was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded problems.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterate over the recorded messages.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<String> for ValidationErrors {
    fn from(msg: String) -> Self {
        Self { errors: vec![msg] }
    }
}

impl From<&str> for ValidationErrors {
    fn from(msg: &str) -> Self {
        Self::from(msg.to_string())
    }
}
