//! Trellis Error - Unified Error Types
//!
//! Error taxonomy shared by the schema engine and the query engine. Every
//! validation point maps onto one of these variants and propagates it; no
//! failure is swallowed.
//!
//! Key Features:
//! - One variant per schema/query contract violation
//! - Collaborator failures surfaced as storage errors
//! - User vs system error classification
//! - Seamless integration with std::io::Error for config loading
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all Trellis operations.
#[derive(Error, Debug)]
pub enum TrellisError {
    // Schema naming errors
    #[error("invalid class name: {0}")]
    InvalidClassName(String),

    #[error("invalid key name: {0}")]
    InvalidKeyName(String),

    // Field lifecycle errors
    #[error("class not empty: {0}")]
    ClassNotEmpty(String),

    #[error("changed immutable field: {0}")]
    ChangedImmutableFieldError(String),

    #[error("incorrect type: {0}")]
    IncorrectType(String),

    #[error("missing required field: {0}")]
    MissingRequiredFieldError(String),

    // Request shape errors
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    // Access control errors
    #[error("invalid session token: {0}")]
    InvalidSessionToken(String),

    #[error("operation forbidden: {0}")]
    OperationForbidden(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    // Collaborator errors
    #[error("storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for Trellis operations.
pub type Result<T> = std::result::Result<T, TrellisError>;

// =============================================================================
// Error Classification
// =============================================================================

impl TrellisError {
    /// Returns true if the error was caused by the caller's request.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            TrellisError::Storage(_) | TrellisError::Configuration(_) | TrellisError::Io(_)
        )
    }

    /// Returns true if the error is a schema lifecycle violation.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            TrellisError::InvalidClassName(_)
                | TrellisError::InvalidKeyName(_)
                | TrellisError::ClassNotEmpty(_)
                | TrellisError::ChangedImmutableFieldError(_)
                | TrellisError::IncorrectType(_)
                | TrellisError::MissingRequiredFieldError(_)
        )
    }

    /// Returns true if the error is an access control decision.
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            TrellisError::InvalidSessionToken(_)
                | TrellisError::OperationForbidden(_)
                | TrellisError::PermissionDenied(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = TrellisError::IncorrectType("two geopoints".to_string());
        assert!(err.is_user_error());
        assert!(err.is_schema_error());
        assert!(!err.is_access_error());

        let err = TrellisError::Storage("connection reset".to_string());
        assert!(!err.is_user_error());
        assert!(!err.is_schema_error());

        let err = TrellisError::PermissionDenied("find on Book".to_string());
        assert!(err.is_access_error());
    }

    #[test]
    fn test_display() {
        let err = TrellisError::InvalidClassName("Class Book already exists.".to_string());
        assert_eq!(err.to_string(), "invalid class name: Class Book already exists.");
    }
}
