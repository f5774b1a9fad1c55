//! # Storage Errors
//!
//! Error types returned by [`DocumentStore`](super::DocumentStore)
//! implementations.

use thiserror::Error;

use crate::schema::ValidationIssue;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The collection validator rejected the write
    #[error("Document failed validation in '{collection}': {issue}")]
    DocumentFailedValidation { collection: String, issue: ValidationIssue },

    /// A document with the same `_id` already exists
    #[error("Duplicate key in '{collection}': _id '{id}'")]
    DuplicateKey { collection: String, id: String },

    /// The modifier cannot be applied to the stored document
    #[error("Cannot apply modifier: {0}")]
    Modifier(String),

    /// The selector is malformed
    #[error("Invalid selector: {0}")]
    Selector(String),

    /// Internal failure (poisoned lock, corrupt state)
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Whether the collection validator rejected the write
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, StorageError::DocumentFailedValidation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_display() {
        let err = StorageError::DocumentFailedValidation {
            collection: "users".into(),
            issue: ValidationIssue::missing_field("name"),
        };
        assert!(err.is_validation_failure());
        assert!(err.to_string().contains("users"));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_other_errors_are_not_validation() {
        let err = StorageError::DuplicateKey {
            collection: "users".into(),
            id: "1".into(),
        };
        assert!(!err.is_validation_failure());
    }
}
