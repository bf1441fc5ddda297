//! Error taxonomy shared by the engine and its storage adapters.

use thiserror::Error;

/// Result type used across the engine and repository contracts.
pub type DomainResult<T> = Result<T, DomainError>;

/// Engine-level error.
///
/// Storage adapters translate backend failures into this taxonomy. Unique
/// constraint violations must surface as `AlreadyExists`, never as `Storage`,
/// so callers can tell a duplicate apart from an unreachable database.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty organization name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An expected record is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The evaluated privilege set does not contain the requested action.
    ///
    /// This is a normal outcome. Whether to present it as "not found" is the
    /// caller's decision.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Storage unreachable, decode failure and similar structural faults.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_their_variant_only() {
        let dup = DomainError::already_exists("organization 'ORG1'");
        assert!(dup.is_already_exists());
        assert!(!dup.is_not_found());

        let io = DomainError::storage("connection refused");
        assert!(!io.is_already_exists());
        assert!(!io.is_permission_denied());
    }

    #[test]
    fn display_includes_context() {
        let err = DomainError::not_found("space default/default");
        assert_eq!(err.to_string(), "not found: space default/default");
    }
}
