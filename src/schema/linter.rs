//! Schema linter
//!
//! House rules checked once when a model is defined:
//! - a string leaf that accepts `""` must be marked allow-empty
//! - field names are non-empty, contain no `.`, and do not start with `$`
//! - enums declare at least one value and no duplicates
//! - unions and discriminated unions have at least one option; the options
//!   of a discriminated union are objects
//!
//! Violations are AERO_SCHEMA_LINT_VIOLATION (FATAL) and carry the path.

use super::errors::{SchemaError, SchemaResult};
use super::parser::check_string;
use super::types::{Constraints, SchemaNode, StringCheck};
use super::value::make_path;

/// Checks schema trees against the house rules.
pub struct SchemaLinter;

impl SchemaLinter {
    /// Walks the whole tree and fails on the first violation.
    pub fn lint(root: &SchemaNode) -> SchemaResult<()> {
        lint_node(root, "", &[])
    }
}

/// `inherited` carries string checks from enclosing transform facets; they
/// constrain the same value as the leaf's own checks.
fn lint_node(node: &SchemaNode, path: &str, inherited: &[StringCheck]) -> SchemaResult<()> {
    match node {
        SchemaNode::Object(obj) => {
            for (name, field) in &obj.fields {
                check_field_name(name, path)?;
                lint_node(field, &make_path(path, name), &[])?;
            }
            if let Some(catchall) = &obj.catchall {
                lint_node(catchall, &format!("{}.*", path), &[])?;
            }
            Ok(())
        }
        SchemaNode::Array(item) => lint_node(item, &format!("{}[]", path), &[]),
        SchemaNode::Tuple(items) => {
            for (i, item) in items.iter().enumerate() {
                lint_node(item, &format!("{}[{}]", path, i), &[])?;
            }
            Ok(())
        }
        SchemaNode::Union(options) => {
            if options.is_empty() {
                return Err(SchemaError::lint_violation(path, "union must have at least one option"));
            }
            for option in options {
                lint_node(option, path, inherited)?;
            }
            Ok(())
        }
        SchemaNode::DiscriminatedUnion { options, .. } => {
            if options.is_empty() {
                return Err(SchemaError::lint_violation(
                    path,
                    "discriminated union must have at least one option",
                ));
            }
            for (i, option) in options.iter().enumerate() {
                if !matches!(option, SchemaNode::Object(_)) {
                    return Err(SchemaError::lint_violation(
                        format!("{}<{}>", path, i),
                        format!("discriminated union option must be an object, got {}", option.kind_name()),
                    ));
                }
                lint_node(option, path, &[])?;
            }
            Ok(())
        }
        SchemaNode::Intersection(left, right) => {
            lint_node(left, path, inherited)?;
            lint_node(right, path, inherited)
        }
        SchemaNode::Record(value_type) => lint_node(value_type, &format!("{}.*", path), &[]),
        SchemaNode::Optional(inner) | SchemaNode::Nullable(inner) | SchemaNode::WithDefault { inner, .. } => {
            lint_node(inner, path, inherited)
        }
        SchemaNode::Transform { inner, validate, .. } => match validate {
            Some(Constraints::String(checks)) => {
                let combined: Vec<StringCheck> = inherited.iter().chain(checks.iter()).cloned().collect();
                lint_node(inner, path, &combined)
            }
            _ => lint_node(inner, path, inherited),
        },
        SchemaNode::Enum(values) => {
            if values.is_empty() {
                return Err(SchemaError::lint_violation(path, "enum must declare at least one value"));
            }
            for (i, value) in values.iter().enumerate() {
                if values[..i].contains(value) {
                    return Err(SchemaError::lint_violation(
                        path,
                        format!("enum value '{}' is declared twice", value),
                    ));
                }
            }
            Ok(())
        }
        SchemaNode::String(s) => {
            if s.allow_empty {
                return Ok(());
            }
            let accepts_empty = check_string(&s.checks, "", path).is_ok()
                && check_string(inherited, "", path).is_ok();
            if accepts_empty {
                return Err(SchemaError::lint_violation(
                    path,
                    "string accepts \"\"; require minLength(1) or mark it allow-empty",
                ));
            }
            Ok(())
        }
        SchemaNode::Literal(_)
        | SchemaNode::Number(_)
        | SchemaNode::Boolean
        | SchemaNode::Date
        | SchemaNode::Null
        | SchemaNode::Any
        | SchemaNode::Never => Ok(()),
    }
}

fn check_field_name(name: &str, parent: &str) -> SchemaResult<()> {
    let path = make_path(parent, name);
    if name.is_empty() {
        return Err(SchemaError::lint_violation(path, "field name must not be empty"));
    }
    if name.contains('.') {
        return Err(SchemaError::lint_violation(path, "field name must not contain '.'"));
    }
    if name.starts_with('$') {
        return Err(SchemaError::lint_violation(path, "field name must not start with '$'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::errors::SchemaErrorCode;
    use regex::Regex;

    fn lint_field(node: SchemaNode) -> SchemaResult<()> {
        SchemaLinter::lint(&SchemaNode::object([("f", node)]))
    }

    #[test]
    fn test_bare_string_rejected() {
        let err = lint_field(SchemaNode::string()).unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::AeroSchemaLintViolation);
        assert_eq!(err.path(), Some("f"));
    }

    #[test]
    fn test_non_empty_strings_pass() {
        assert!(lint_field(SchemaNode::string().min_length(1)).is_ok());
        assert!(lint_field(SchemaNode::string().length(3)).is_ok());
        assert!(lint_field(SchemaNode::string().email()).is_ok());
        assert!(lint_field(SchemaNode::string().pattern(Regex::new("^a").unwrap())).is_ok());
        assert!(lint_field(SchemaNode::string().allow_empty()).is_ok());
    }

    #[test]
    fn test_pattern_accepting_empty_rejected() {
        assert!(lint_field(SchemaNode::string().pattern(Regex::new("^a*$").unwrap())).is_err());
    }

    #[test]
    fn test_transform_facet_counts() {
        let node = SchemaNode::string()
            .map_value(|v| v)
            .validated(Constraints::String(vec![StringCheck::MinLength(1)]));
        assert!(lint_field(node).is_ok());
    }

    #[test]
    fn test_nested_paths() {
        let node = SchemaNode::object([("tags", SchemaNode::string().array().optional())]);
        let err = lint_field(node).unwrap_err();
        assert_eq!(err.path(), Some("f.tags[]"));
    }

    #[test]
    fn test_field_names() {
        assert!(lint_field_named("a.b").is_err());
        assert!(lint_field_named("$set").is_err());
        assert!(lint_field_named("").is_err());
        assert!(lint_field_named("ok_name").is_ok());
    }

    fn lint_field_named(name: &str) -> SchemaResult<()> {
        SchemaLinter::lint(&SchemaNode::object([(name, SchemaNode::Boolean)]))
    }

    #[test]
    fn test_enum_rules() {
        assert!(lint_field(SchemaNode::Enum(vec![])).is_err());
        assert!(lint_field(SchemaNode::enumeration(["a", "a"])).is_err());
        assert!(lint_field(SchemaNode::enumeration(["a", "b"])).is_ok());
    }

    #[test]
    fn test_union_rules() {
        assert!(lint_field(SchemaNode::Union(vec![])).is_err());
        let err = lint_field(SchemaNode::discriminated_union("k", [SchemaNode::Boolean])).unwrap_err();
        assert!(err.message().contains("object"));
    }
}
