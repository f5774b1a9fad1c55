//! Schema subsystem
//!
//! A schema is declared once as a [`SchemaNode`] tree and projected two ways:
//! the parser validates and transforms documents in process, and the
//! compiler emits the [`ValidatorDocument`] the storage engine enforces.
//!
//! # Design Principles
//!
//! - One declaration, two enforcement layers that agree
//! - Definition-time errors are FATAL and carry the offending path
//! - Constraints are never silently dropped
//! - Validation is deterministic

pub mod custom;
mod compiler;
mod errors;
mod linter;
mod merge;
mod parser;
mod types;
mod validator;
mod value;

pub use compiler::SchemaCompiler;
pub use errors::{SchemaError, SchemaErrorCode, SchemaResult, Severity, ValidationIssue};
pub use linter::SchemaLinter;
pub use merge::intersect;
pub use parser::{parse_document, parse_field};
pub use types::{
    Constraints, DefaultFn, NumberCheck, ObjectNode, SchemaNode, StringCheck, StringNode, TransformFn,
};
pub use validator::ValidatorDocument;
pub use value::{as_date, bson_type, date_value, DATE_KEY, EMAIL_PATTERN, UUID_PATTERN};

pub(crate) use validator::values_equal;
pub(crate) use value::make_path;
