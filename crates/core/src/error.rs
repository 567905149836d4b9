//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested state change is not legal from the current status.
    #[error("invalid transition: cannot {action} from '{from}'")]
    InvalidTransition { from: String, action: String },

    /// A decrement would make a quantity negative.
    #[error("insufficient stock for item {item}: available {available}, requested {requested}")]
    InsufficientStock {
        item: String,
        available: i64,
        requested: i64,
    },

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_transition(from: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            action: action.into(),
        }
    }

    pub fn insufficient_stock(item: impl Into<String>, available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            item: item.into(),
            available,
            requested,
        }
    }

    /// Public error category for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_)
            | DomainError::InvariantViolation(_)
            | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DomainError::Conflict(_) => ErrorKind::ConcurrentModification,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }
}

/// Stable error categories surfaced to callers.
///
/// A UI discriminates "try again" (`ConcurrentModification`) from "not allowed"
/// (`Unauthorized`, `InvalidTransition`) from "out of stock" (`InsufficientStock`)
/// using these, so codes and messages must not change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    Unauthorized,
    InsufficientStock,
    ConcurrentModification,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "The requested record does not exist.",
            ErrorKind::InvalidTransition => "This action is not allowed in the record's current status.",
            ErrorKind::Unauthorized => "You are not allowed to perform this action.",
            ErrorKind::InsufficientStock => "Not enough stock is available for this item.",
            ErrorKind::ConcurrentModification => {
                "The record was changed by someone else. Please try again."
            }
            ErrorKind::Validation => "The request contains invalid data.",
            ErrorKind::Internal => "An internal error occurred.",
        }
    }

    /// Only concurrency conflicts are worth retrying unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ConcurrentModification)
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}
