//! Document parser
//!
//! Validates a value against a [`SchemaNode`] tree and produces the value to
//! store: defaults filled in, transforms applied, undeclared keys rejected.
//! This is the application-layer projection of the tree. The compiled
//! validator is the storage-layer projection; both accept the same documents.
//!
//! Parsing is pure apart from the clock and actor reads made through the
//! [`OperationContext`], and stops at the first issue.

use serde_json::{Map, Value};

use crate::context::OperationContext;

use super::compiler::discriminator_literal;
use super::errors::ValidationIssue;
use super::merge::intersect;
use super::types::{Constraints, NumberCheck, SchemaNode, StringCheck};
use super::validator::{describe, values_equal};
use super::value::{bson_type, email_regex, is_multiple_of, make_path, url_regex, uuid_regex};

/// Parses a whole document.
///
/// # Errors
///
/// Returns the first [`ValidationIssue`] found.
pub fn parse_document(schema: &SchemaNode, document: &Value, ctx: &OperationContext) -> Result<Value, ValidationIssue> {
    parse_field(schema, Some(document), ctx, "")?.ok_or_else(|| ValidationIssue::missing_field(""))
}

/// Parses one field. `None` in means the field is absent; `None` out means
/// it stays absent.
pub fn parse_field(
    node: &SchemaNode,
    value: Option<&Value>,
    ctx: &OperationContext,
    path: &str,
) -> Result<Option<Value>, ValidationIssue> {
    match node {
        SchemaNode::Optional(inner) => match value {
            None => Ok(None),
            Some(v) => parse_field(inner, Some(v), ctx, path),
        },
        SchemaNode::WithDefault { inner, default } => match value {
            Some(v) => parse_field(inner, Some(v), ctx, path),
            None => match default.resolve(ctx) {
                Some(resolved) => parse_field(inner, Some(&resolved), ctx, path),
                None => parse_field(inner, None, ctx, path),
            },
        },
        SchemaNode::Nullable(inner) => match value {
            Some(Value::Null) => Ok(Some(Value::Null)),
            other => parse_field(inner, other, ctx, path),
        },
        SchemaNode::Transform { inner, validate, apply } => {
            let parsed = parse_field(inner, value, ctx, path)?;
            if let (Some(constraints), Some(v)) = (validate, parsed.as_ref()) {
                check_constraints(constraints, v, path)?;
            }
            apply
                .apply(parsed, ctx)
                .map_err(|reason| ValidationIssue::constraint(path, reason, "rejected by transform"))
        }
        SchemaNode::Union(options) => parse_union(options, value, ctx, path),
        SchemaNode::Intersection(left, right) => {
            let merged = intersect(left, right, path)
                .map_err(|e| ValidationIssue::constraint(path, "a mergeable intersection", e.message()))?;
            parse_field(&merged, value, ctx, path)
        }
        SchemaNode::Any => Ok(value.cloned()),
        _ => match value {
            None => Err(ValidationIssue::missing_field(path)),
            Some(v) => parse_leaf(node, v, ctx, path).map(Some),
        },
    }
}

fn parse_union(
    options: &[SchemaNode],
    value: Option<&Value>,
    ctx: &OperationContext,
    path: &str,
) -> Result<Option<Value>, ValidationIssue> {
    let mut last_issue = None;
    for option in options {
        match parse_field(option, value, ctx, path) {
            Ok(parsed) => return Ok(parsed),
            Err(issue) => last_issue = Some(issue),
        }
    }

    match (options.len(), last_issue) {
        (1, Some(issue)) => Err(issue),
        _ => Err(ValidationIssue::constraint(
            path,
            format!("a match for any of {} alternatives", options.len()),
            value.map_or_else(|| "missing".to_string(), describe),
        )),
    }
}

fn parse_leaf(node: &SchemaNode, value: &Value, ctx: &OperationContext, path: &str) -> Result<Value, ValidationIssue> {
    match node {
        SchemaNode::Object(obj) => {
            let input = expect_object(value, path)?;
            let mut out = Map::new();

            for (key, field_value) in input {
                if obj.has_field(key) {
                    continue;
                }
                let field_path = make_path(path, key);
                let Some(catchall) = &obj.catchall else {
                    return Err(ValidationIssue::extra_field(field_path));
                };
                if let Some(parsed) = parse_field(catchall, Some(field_value), ctx, &field_path)? {
                    out.insert(key.clone(), parsed);
                }
            }

            for (name, field) in &obj.fields {
                let field_path = make_path(path, name);
                if let Some(parsed) = parse_field(field, input.get(name), ctx, &field_path)? {
                    out.insert(name.clone(), parsed);
                }
            }
            Ok(Value::Object(out))
        }
        SchemaNode::Array(item) => {
            let items = expect_array(value, path)?;
            items
                .iter()
                .enumerate()
                .map(|(i, elem)| parse_element(item, elem, ctx, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        SchemaNode::Tuple(items) => {
            let elems = expect_array(value, path)?;
            if elems.len() != items.len() {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("exactly {} items", items.len()),
                    format!("{} items", elems.len()),
                ));
            }
            items
                .iter()
                .zip(elems)
                .enumerate()
                .map(|(i, (item, elem))| parse_element(item, elem, ctx, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        SchemaNode::Record(value_type) => {
            let input = expect_object(value, path)?;
            let mut out = Map::new();
            for (key, field_value) in input {
                let field_path = make_path(path, key);
                if let Some(parsed) = parse_field(value_type, Some(field_value), ctx, &field_path)? {
                    out.insert(key.clone(), parsed);
                }
            }
            Ok(Value::Object(out))
        }
        SchemaNode::DiscriminatedUnion { key, options } => {
            let input = expect_object(value, path)?;
            let key_path = make_path(path, key);
            let tag = input.get(key).ok_or_else(|| ValidationIssue::missing_field(&key_path))?;

            let chosen = options.iter().find(|option| match option {
                SchemaNode::Object(obj) => discriminator_literal(obj, key).map_or(false, |lit| values_equal(lit, tag)),
                _ => false,
            });
            match chosen {
                Some(option) => parse_leaf(option, value, ctx, path),
                None => Err(ValidationIssue::constraint(key_path, "a known discriminator value", describe(tag))),
            }
        }
        SchemaNode::Enum(values) => match value {
            Value::String(s) if values.contains(s) => Ok(value.clone()),
            _ => Err(ValidationIssue::constraint(
                path,
                format!("one of [{}]", values.join(", ")),
                describe(value),
            )),
        },
        SchemaNode::Literal(expected) => {
            if values_equal(expected, value) {
                Ok(value.clone())
            } else {
                Err(ValidationIssue::constraint(path, format!("literal {}", expected), describe(value)))
            }
        }
        SchemaNode::String(s) => match value {
            Value::String(text) => {
                check_string(&s.checks, text, path)?;
                Ok(value.clone())
            }
            _ => Err(ValidationIssue::type_mismatch(path, "string", bson_type(value))),
        },
        SchemaNode::Number(checks) => match value {
            Value::Number(n) => {
                check_number(checks, value, n.as_f64().unwrap_or(f64::NAN), path)?;
                Ok(value.clone())
            }
            _ => Err(ValidationIssue::type_mismatch(path, "number", bson_type(value))),
        },
        SchemaNode::Boolean => expect_type(value, "bool", path),
        SchemaNode::Date => expect_type(value, "date", path),
        SchemaNode::Null => expect_type(value, "null", path),
        SchemaNode::Never => Err(ValidationIssue::constraint(path, "nothing", describe(value))),
        SchemaNode::Optional(_)
        | SchemaNode::Nullable(_)
        | SchemaNode::WithDefault { .. }
        | SchemaNode::Transform { .. }
        | SchemaNode::Union(_)
        | SchemaNode::Intersection(_, _)
        | SchemaNode::Any => parse_element(node, value, ctx, path),
    }
}

/// Parses a value that has no "absent" form (array elements, tuple slots)
fn parse_element(node: &SchemaNode, value: &Value, ctx: &OperationContext, path: &str) -> Result<Value, ValidationIssue> {
    parse_field(node, Some(value), ctx, path)?
        .ok_or_else(|| ValidationIssue::constraint(path, "a value", "absent after transform"))
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationIssue> {
    match value {
        Value::Object(obj) if bson_type(value) == "object" => Ok(obj),
        _ => Err(ValidationIssue::type_mismatch(path, "object", bson_type(value))),
    }
}

fn expect_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ValidationIssue> {
    value
        .as_array()
        .ok_or_else(|| ValidationIssue::type_mismatch(path, "array", bson_type(value)))
}

fn expect_type(value: &Value, expected: &str, path: &str) -> Result<Value, ValidationIssue> {
    if bson_type(value) == expected {
        Ok(value.clone())
    } else {
        Err(ValidationIssue::type_mismatch(path, expected, bson_type(value)))
    }
}

/// Checks the constraint facet of a transform. Constraints only apply to
/// values of their own type.
fn check_constraints(constraints: &Constraints, value: &Value, path: &str) -> Result<(), ValidationIssue> {
    match (constraints, value) {
        (Constraints::String(checks), Value::String(text)) => check_string(checks, text, path),
        (Constraints::Number(checks), Value::Number(n)) => {
            check_number(checks, value, n.as_f64().unwrap_or(f64::NAN), path)
        }
        _ => Ok(()),
    }
}

pub(crate) fn check_string(checks: &[StringCheck], text: &str, path: &str) -> Result<(), ValidationIssue> {
    let len = text.chars().count();
    for check in checks {
        let ok = match check {
            StringCheck::MinLength(n) => len >= *n,
            StringCheck::MaxLength(n) => len <= *n,
            StringCheck::Length(n) => len == *n,
            StringCheck::Pattern(re) => re.is_match(text),
            StringCheck::Email => email_regex().is_match(text),
            StringCheck::Uuid => uuid_regex().is_match(text),
            StringCheck::Url => url_regex().is_match(text),
            StringCheck::StartsWith(prefix) => text.starts_with(prefix.as_str()),
            StringCheck::EndsWith(suffix) => text.ends_with(suffix.as_str()),
            StringCheck::Includes(part) => text.contains(part.as_str()),
        };
        if !ok {
            return Err(ValidationIssue::constraint(
                path,
                string_expectation(check),
                format!("\"{}\"", text),
            ));
        }
    }
    Ok(())
}

fn string_expectation(check: &StringCheck) -> String {
    match check {
        StringCheck::MinLength(n) => format!("length >= {}", n),
        StringCheck::MaxLength(n) => format!("length <= {}", n),
        StringCheck::Length(n) => format!("length == {}", n),
        StringCheck::Pattern(re) => format!("match for /{}/", re.as_str()),
        StringCheck::StartsWith(prefix) => format!("string starting with \"{}\"", prefix),
        StringCheck::EndsWith(suffix) => format!("string ending with \"{}\"", suffix),
        StringCheck::Includes(part) => format!("string containing \"{}\"", part),
        StringCheck::Email | StringCheck::Uuid | StringCheck::Url => format!("valid {}", check.name()),
    }
}

fn check_number(checks: &[NumberCheck], raw: &Value, n: f64, path: &str) -> Result<(), ValidationIssue> {
    for check in checks {
        let (ok, expected) = match check {
            NumberCheck::Min { value, inclusive: true } => (n >= *value, format!(">= {}", value)),
            NumberCheck::Min { value, inclusive: false } => (n > *value, format!("> {}", value)),
            NumberCheck::Max { value, inclusive: true } => (n <= *value, format!("<= {}", value)),
            NumberCheck::Max { value, inclusive: false } => (n < *value, format!("< {}", value)),
            NumberCheck::Integer => (raw.as_i64().is_some(), "integer".to_string()),
            NumberCheck::MultipleOf(divisor) => (is_multiple_of(n, *divisor), format!("multiple of {}", divisor)),
        };
        if !ok {
            return Err(ValidationIssue::constraint(path, expected, raw.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FixedActor, ManualClock, OperationKind};
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> OperationContext {
        OperationContext::for_kind(Some(OperationKind::Insert))
    }

    #[test]
    fn test_defaults_fill_absent_fields() {
        let schema = SchemaNode::object([
            ("name", SchemaNode::string().default_value("foo")),
            ("tags", SchemaNode::string().array().default_value(json!(["foo"]))),
            ("nick", SchemaNode::string().optional()),
        ]);
        let parsed = parse_document(&schema, &json!({}), &ctx()).unwrap();
        assert_eq!(parsed, json!({"name": "foo", "tags": ["foo"]}));
    }

    #[test]
    fn test_given_value_wins_over_default() {
        let schema = SchemaNode::object([("name", SchemaNode::string().default_value("foo"))]);
        let parsed = parse_document(&schema, &json!({"name": "bar"}), &ctx()).unwrap();
        assert_eq!(parsed, json!({"name": "bar"}));
    }

    #[test]
    fn test_declined_default_leaves_field_absent() {
        let schema = SchemaNode::object([(
            "by",
            SchemaNode::string().optional().default_when(|ctx| ctx.current_actor().map(Value::String)),
        )]);
        assert_eq!(parse_document(&schema, &json!({}), &ctx()).unwrap(), json!({}));

        let with_actor = OperationContext::new(
            OperationKind::Insert,
            Arc::new(ManualClock::at_millis(0)),
            Arc::new(FixedActor::new("u1")),
        );
        assert_eq!(parse_document(&schema, &json!({}), &with_actor).unwrap(), json!({"by": "u1"}));
    }

    #[test]
    fn test_missing_and_extra_fields() {
        let schema = SchemaNode::object([("name", SchemaNode::string())]);
        let issue = parse_document(&schema, &json!({}), &ctx()).unwrap_err();
        assert_eq!(issue.path, "name");

        let issue = parse_document(&schema, &json!({"name": "a", "x": 1}), &ctx()).unwrap_err();
        assert_eq!(issue.path, "x");
    }

    #[test]
    fn test_catchall_parses_extra_keys() {
        let schema = SchemaNode::object([("name", SchemaNode::string())]).catchall(SchemaNode::number());
        assert!(parse_document(&schema, &json!({"name": "a", "x": 1}), &ctx()).is_ok());
        assert!(parse_document(&schema, &json!({"name": "a", "x": "1"}), &ctx()).is_err());
    }

    #[test]
    fn test_transform_applies_after_validation() {
        let schema = SchemaNode::object([(
            "code",
            SchemaNode::string()
                .map_value(|v| Value::String(v.as_str().unwrap_or_default().to_uppercase()))
                .validated(Constraints::String(vec![StringCheck::MaxLength(3)])),
        )]);
        let parsed = parse_document(&schema, &json!({"code": "abc"}), &ctx()).unwrap();
        assert_eq!(parsed, json!({"code": "ABC"}));
        assert!(parse_document(&schema, &json!({"code": "abcd"}), &ctx()).is_err());
    }

    #[test]
    fn test_transform_failure_is_issue() {
        let schema = SchemaNode::object([(
            "n",
            SchemaNode::number().try_transform(|_, _| Err("even number".to_string())),
        )]);
        let issue = parse_document(&schema, &json!({"n": 1}), &ctx()).unwrap_err();
        assert_eq!(issue.path, "n");
        assert_eq!(issue.expected, "even number");
    }

    #[test]
    fn test_nullable_and_union() {
        let schema = SchemaNode::object([
            ("a", SchemaNode::string().nullable()),
            ("b", SchemaNode::union([SchemaNode::number(), SchemaNode::Boolean])),
        ]);
        assert!(parse_document(&schema, &json!({"a": null, "b": true}), &ctx()).is_ok());
        let issue = parse_document(&schema, &json!({"a": "x", "b": "y"}), &ctx()).unwrap_err();
        assert_eq!(issue.path, "b");
    }

    #[test]
    fn test_number_checks() {
        let node = SchemaNode::integer().min(1.0).lt(10.0);
        let schema = SchemaNode::object([("n", node)]);
        assert!(parse_document(&schema, &json!({"n": 1}), &ctx()).is_ok());
        assert!(parse_document(&schema, &json!({"n": 0}), &ctx()).is_err());
        assert!(parse_document(&schema, &json!({"n": 10}), &ctx()).is_err());
        assert!(parse_document(&schema, &json!({"n": 2.5}), &ctx()).is_err());
    }

    #[test]
    fn test_string_checks_count_chars() {
        let schema = SchemaNode::object([("s", SchemaNode::string().length(2))]);
        assert!(parse_document(&schema, &json!({"s": "éé"}), &ctx()).is_ok());
        assert!(parse_document(&schema, &json!({"s": "é"}), &ctx()).is_err());
    }

    #[test]
    fn test_tuple_arity() {
        let schema = SchemaNode::object([("t", SchemaNode::tuple([SchemaNode::string(), SchemaNode::number()]))]);
        assert!(parse_document(&schema, &json!({"t": ["a", 1]}), &ctx()).is_ok());
        let issue = parse_document(&schema, &json!({"t": ["a"]}), &ctx()).unwrap_err();
        assert_eq!(issue.expected, "exactly 2 items");
    }

    #[test]
    fn test_discriminated_union() {
        let schema = SchemaNode::object([(
            "shape",
            SchemaNode::discriminated_union(
                "kind",
                [
                    SchemaNode::object([("kind", SchemaNode::literal("circle")), ("r", SchemaNode::number())]),
                    SchemaNode::object([("kind", SchemaNode::literal("square")), ("side", SchemaNode::number())]),
                ],
            ),
        )]);
        assert!(parse_document(&schema, &json!({"shape": {"kind": "circle", "r": 1}}), &ctx()).is_ok());
        assert!(parse_document(&schema, &json!({"shape": {"kind": "circle", "side": 1}}), &ctx()).is_err());
        let issue = parse_document(&schema, &json!({"shape": {"kind": "blob"}}), &ctx()).unwrap_err();
        assert_eq!(issue.path, "shape.kind");
    }

    #[test]
    fn test_dates_are_not_objects() {
        let schema = SchemaNode::object([("at", SchemaNode::Date)]);
        assert!(parse_document(&schema, &json!({"at": {"$date": "2024-01-01T00:00:00.000Z"}}), &ctx()).is_ok());
        assert!(parse_document(&schema, &json!({"at": "2024-01-01"}), &ctx()).is_err());

        let obj = SchemaNode::object([("o", SchemaNode::record(SchemaNode::Any))]);
        assert!(parse_document(&obj, &json!({"o": {"$date": "2024-01-01T00:00:00.000Z"}}), &ctx()).is_err());
    }

    #[test]
    fn test_intersection_parses_merged_shape() {
        let schema = SchemaNode::intersection(
            SchemaNode::object([("a", SchemaNode::string())]),
            SchemaNode::object([("b", SchemaNode::number())]),
        );
        assert!(parse_document(&schema, &json!({"a": "x", "b": 1}), &ctx()).is_ok());
        assert!(parse_document(&schema, &json!({"a": "x"}), &ctx()).is_err());
    }
}
