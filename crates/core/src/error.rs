//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Stable error classification shared by every layer.
///
/// Callers branch on the kind, never on message text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-correctable input problem.
    Validation,
    /// A referenced item, product or recipe line does not exist.
    NotFound,
    /// Concurrent mutation detected at commit time; retry or re-plan.
    Conflict,
    /// The persistence collaborator failed or timed out.
    Unavailable,
}

/// How loudly a failure should be surfaced.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl ErrorKind {
    /// Whether the same request may succeed when submitted again.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::Unavailable)
    }

    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::Validation | ErrorKind::NotFound => Severity::Warning,
            ErrorKind::Conflict | ErrorKind::Unavailable => Severity::Error,
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). `Unavailable` is the one infrastructure-facing variant,
/// used when a collaborator failure has to cross the domain boundary.
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

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator (storage, remote API) could not serve the request.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
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

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_)
            | DomainError::InvariantViolation(_)
            | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_warning_level_and_not_retryable() {
        let err = DomainError::validation("quantity must be a multiple of batch size");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.kind().severity(), Severity::Warning);
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn conflict_and_unavailable_are_retryable() {
        assert!(DomainError::conflict("stale").kind().is_retryable());
        assert!(DomainError::unavailable("store down").kind().is_retryable());
        assert_eq!(DomainError::unavailable("x").kind().severity(), Severity::Error);
    }

    #[test]
    fn invariant_and_invalid_id_classify_as_validation() {
        assert_eq!(DomainError::invariant("x").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::invalid_id("x").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::not_found("item").kind(), ErrorKind::NotFound);
    }
}
