//! Structured error types shared across DVAL crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`DvalError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (indices, lengths, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the valuation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum DvalError {
    /// Mismatched array lengths or duplicate indices.
    #[error("shape error: {0}")]
    Shape(ErrorInfo),
    /// Results that cannot be combined (different algorithms, disagreeing names).
    #[error("incompatible results: {0}")]
    Incompatible(ErrorInfo),
    /// Out-of-range positions or unknown data indices.
    #[error("index error: {0}")]
    Index(ErrorInfo),
    /// Invalid parameters supplied by the caller.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// A bounded wait on a remote value or worker expired.
    #[error("timeout: {0}")]
    Timeout(ErrorInfo),
    /// Remote task failures, panics and disconnected channels.
    #[error("backend error: {0}")]
    Backend(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl DvalError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            DvalError::Shape(info)
            | DvalError::Incompatible(info)
            | DvalError::Index(info)
            | DvalError::Config(info)
            | DvalError::Timeout(info)
            | DvalError::Backend(info)
            | DvalError::Serde(info) => info,
        }
    }

    /// Whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DvalError::Timeout(_))
    }

    /// Shorthand for a [`DvalError::Config`] without context.
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        DvalError::Config(ErrorInfo::new(code, message))
    }

    /// Shorthand for a [`DvalError::Backend`] without context.
    pub fn backend(code: &str, message: impl Into<String>) -> Self {
        DvalError::Backend(ErrorInfo::new(code, message))
    }
}
