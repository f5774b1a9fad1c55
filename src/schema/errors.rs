//! Schema error types following the AERO_* error-code convention
//!
//! Error codes:
//! - AERO_SCHEMA_UNSUPPORTED (FATAL)
//! - AERO_SCHEMA_LINT_VIOLATION (FATAL)
//! - AERO_SCHEMA_INVALID (FATAL)
//! - AERO_SCHEMA_VALIDATION_FAILED (REJECT)
//! - AERO_MODIFIER_INVALID (REJECT)
//!
//! FATAL errors are raised once, while a model is being defined. They are
//! programmer errors and must not be caught and degraded. REJECT errors are
//! raised per request and reported to the caller.

use std::fmt;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Client request rejected
    Reject,
    /// Model definition is unusable
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Construct has no validator representation
    AeroSchemaUnsupported,
    /// House rule violated at definition time
    AeroSchemaLintViolation,
    /// Structurally invalid schema (bad discriminator, bad bound, ...)
    AeroSchemaInvalid,
    /// Document or modifier value violates the schema
    AeroSchemaValidationFailed,
    /// Modifier has an illegal shape
    AeroModifierInvalid,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::AeroSchemaUnsupported => "AERO_SCHEMA_UNSUPPORTED",
            SchemaErrorCode::AeroSchemaLintViolation => "AERO_SCHEMA_LINT_VIOLATION",
            SchemaErrorCode::AeroSchemaInvalid => "AERO_SCHEMA_INVALID",
            SchemaErrorCode::AeroSchemaValidationFailed => "AERO_SCHEMA_VALIDATION_FAILED",
            SchemaErrorCode::AeroModifierInvalid => "AERO_MODIFIER_INVALID",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::AeroSchemaUnsupported
            | SchemaErrorCode::AeroSchemaLintViolation
            | SchemaErrorCode::AeroSchemaInvalid => Severity::Fatal,
            SchemaErrorCode::AeroSchemaValidationFailed | SchemaErrorCode::AeroModifierInvalid => {
                Severity::Reject
            }
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Field path (e.g., "profile.tags[2]")
    pub path: String,
    /// Expected type or condition
    pub expected: String,
    /// Actual value or type found
    pub actual: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: display_path(path.into()),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(path: impl Into<String>) -> Self {
        Self::new(path, "field to be present", "missing")
    }

    pub fn extra_field(path: impl Into<String>) -> Self {
        Self::new(path, "no undeclared fields", "extra field present")
    }

    pub fn type_mismatch(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(path, expected, actual)
    }

    pub fn constraint(path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(path, expected, actual)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field '{}': expected {}, got {}", self.path, self.expected, self.actual)
    }
}

fn display_path(path: String) -> String {
    if path.is_empty() {
        "$root".to_string()
    } else {
        path
    }
}

/// Schema error type with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    /// Error code
    code: SchemaErrorCode,
    /// Human-readable message
    message: String,
    /// Offending schema or document path, if any
    path: Option<String>,
    /// Collection the error was raised for, if known
    collection: Option<String>,
    /// Validation details if applicable
    details: Option<ValidationIssue>,
}

impl SchemaError {
    /// A construct with no validator representation
    pub fn unsupported(path: impl Into<String>, construct: impl Into<String>) -> Self {
        let path = display_path(path.into());
        Self {
            code: SchemaErrorCode::AeroSchemaUnsupported,
            message: format!("Unsupported construct at '{}': {}", path, construct.into()),
            path: Some(path),
            collection: None,
            details: None,
        }
    }

    /// A house-rule violation found by the linter
    pub fn lint_violation(path: impl Into<String>, rule: impl Into<String>) -> Self {
        let path = display_path(path.into());
        Self {
            code: SchemaErrorCode::AeroSchemaLintViolation,
            message: format!("Schema rule violated at '{}': {}", path, rule.into()),
            path: Some(path),
            collection: None,
            details: None,
        }
    }

    /// A structurally invalid schema
    pub fn invalid_schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = display_path(path.into());
        Self {
            code: SchemaErrorCode::AeroSchemaInvalid,
            message: format!("Invalid schema at '{}': {}", path, reason.into()),
            path: Some(path),
            collection: None,
            details: None,
        }
    }

    /// A document or modifier value failed validation
    pub fn validation_failed(details: ValidationIssue) -> Self {
        Self {
            code: SchemaErrorCode::AeroSchemaValidationFailed,
            message: format!("Document validation failed: {}", details),
            path: Some(details.path.clone()),
            collection: None,
            details: Some(details),
        }
    }

    /// A modifier with an illegal shape
    pub fn modifier_invalid(reason: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::AeroModifierInvalid,
            message: format!("Invalid modifier: {}", reason.into()),
            path: None,
            collection: None,
            details: None,
        }
    }

    /// Attaches the collection name
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending path if applicable
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns the collection if known
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Returns validation details if applicable
    pub fn details(&self) -> Option<&ValidationIssue> {
        self.details.as_ref()
    }

    /// Returns whether this is a definition-time error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<ValidationIssue> for SchemaError {
    fn from(issue: ValidationIssue) -> Self {
        SchemaError::validation_failed(issue)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)?;
        if let Some(collection) = &self.collection {
            write!(f, " (collection '{}')", collection)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
