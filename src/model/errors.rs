//! # Model Errors
//!
//! Error types for the model façade.

use thiserror::Error;

use crate::schema::{SchemaError, ValidationIssue};
use crate::store::StorageError;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Model errors
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Schema definition or application-layer validation failure
    #[error("{0}")]
    Validation(#[from] SchemaError),

    /// Storage rejected data the application layer accepted; the two schema
    /// projections disagree
    #[error("Schema layers disagree in '{collection}': storage rejected an application-validated document: {issue}")]
    Consistency { collection: String, issue: ValidationIssue },

    /// Storage rejected a write made with `bypass_schema`
    #[error("Storage rejected unvalidated write to '{collection}': {issue}")]
    StorageRejected { collection: String, issue: ValidationIssue },

    /// Any other storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// No document matched
    #[error("No document in '{collection}' matches the selector")]
    NotFound { collection: String },
}

impl ModelError {
    /// Validation details when the error carries any
    pub fn issue(&self) -> Option<&ValidationIssue> {
        match self {
            ModelError::Validation(err) => err.details(),
            ModelError::Consistency { issue, .. } | ModelError::StorageRejected { issue, .. } => Some(issue),
            ModelError::Storage(StorageError::DocumentFailedValidation { issue, .. }) => Some(issue),
            _ => None,
        }
    }

    /// Whether this error is a defect rather than a rejected request
    pub fn is_consistency_failure(&self) -> bool {
        matches!(self, ModelError::Consistency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_access() {
        let issue = ValidationIssue::missing_field("name");
        let err = ModelError::Validation(SchemaError::validation_failed(issue.clone()));
        assert_eq!(err.issue(), Some(&issue));

        let err = ModelError::Consistency {
            collection: "users".into(),
            issue: issue.clone(),
        };
        assert!(err.is_consistency_failure());
        assert!(err.to_string().contains("users"));
        assert_eq!(err.issue(), Some(&issue));
    }

    #[test]
    fn test_storage_conversion() {
        let err: ModelError = StorageError::Internal("poisoned".into()).into();
        assert!(matches!(err, ModelError::Storage(_)));
        assert!(err.issue().is_none());
    }
}
