//! Core error taxonomy.
//!
//! # Responsibility
//! - Give every service operation one error type with a stable kind.
//! - Keep transport mapping (status codes) outside of core.
//!
//! # Invariants
//! - Store failures are surfaced as `StoreUnavailable`, never as success.
//! - Only `StoreUnavailable` is retryable.

use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Stable failure category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    StoreUnavailable,
}

impl ErrorKind {
    /// Snake-case identifier used in response envelopes and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every core service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Missing or malformed input. Never retried.
    Validation(String),
    /// Referenced entity does not exist.
    NotFound { entity: &'static str, id: String },
    /// Write-once or state-machine invariant would be violated.
    Conflict(String),
    /// Underlying store failed; callers may retry with backoff.
    StoreUnavailable(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::StoreUnavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for CoreError {}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Unavailable(message) => Self::StoreUnavailable(message),
            RepoError::Duplicate(id) => Self::Conflict(format!("record already exists: {id}")),
        }
    }
}
