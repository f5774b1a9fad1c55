//! Validator documents and their evaluator
//!
//! A [`ValidatorDocument`] is the `$jsonSchema` body the compiler emits and
//! the storage engine enforces. The evaluator here interprets that document
//! directly, independent of the schema tree it came from, so the store sees
//! exactly what was installed.
//!
//! Evaluation semantics:
//! - `bsonType` is checked first; type-specific keywords only apply to
//!   values of the matching type
//! - `enum` compares numbers by value (`3` equals `3.0`)
//! - `anyOf` needs one match, `oneOf` exactly one
//! - `required` and `additionalProperties` are checked before `properties`
//!
//! Evaluation is deterministic and never mutates the document.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value};

use super::errors::{SchemaError, SchemaResult, ValidationIssue};
use super::value::{bson_type, is_multiple_of, make_path, type_matches};

/// Compiled `$jsonSchema` validator
#[derive(Debug, Clone)]
pub struct ValidatorDocument {
    schema: Value,
    /// Every `pattern` keyword in the document, compiled once
    patterns: HashMap<String, Regex>,
}

impl ValidatorDocument {
    /// Wraps a `$jsonSchema` body.
    ///
    /// # Errors
    ///
    /// Returns AERO_SCHEMA_INVALID if the body is not an object or holds a
    /// pattern that does not compile.
    pub fn new(schema: Value) -> SchemaResult<Self> {
        if !schema.is_object() {
            return Err(SchemaError::invalid_schema("", "validator must be an object"));
        }
        let mut patterns = HashMap::new();
        collect_patterns(&schema, "", &mut patterns)?;
        Ok(Self { schema, patterns })
    }

    /// The `$jsonSchema` body
    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    pub fn into_value(self) -> Value {
        self.schema
    }

    /// The body wrapped as `{"$jsonSchema": ...}`, as handed to a collection
    pub fn to_collection_validator(&self) -> Value {
        let mut wrapper = Map::new();
        wrapper.insert("$jsonSchema".into(), self.schema.clone());
        Value::Object(wrapper)
    }

    /// Validates a document, returning the first failure found.
    pub fn validate(&self, document: &Value) -> Result<(), ValidationIssue> {
        self.check(&self.schema, document, "")
    }

    pub fn is_valid(&self, document: &Value) -> bool {
        self.validate(document).is_ok()
    }

    fn check(&self, schema: &Value, value: &Value, path: &str) -> Result<(), ValidationIssue> {
        let rules = match schema {
            Value::Object(rules) => rules,
            Value::Bool(true) => return Ok(()),
            _ => return Err(ValidationIssue::constraint(path, "nothing", describe(value))),
        };

        if let Some(expected) = rules.get("bsonType") {
            check_type(expected, value, path)?;
        }

        if let Some(Value::Array(allowed)) = rules.get("enum") {
            if !allowed.iter().any(|candidate| values_equal(candidate, value)) {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("one of {}", Value::Array(allowed.clone())),
                    describe(value),
                ));
            }
        }

        if let Some(Value::Array(options)) = rules.get("anyOf") {
            if !options.iter().any(|option| self.check(option, value, path).is_ok()) {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("a match for any of {} alternatives", options.len()),
                    "no alternative matched",
                ));
            }
        }

        if let Some(Value::Array(options)) = rules.get("oneOf") {
            let matched = options
                .iter()
                .filter(|option| self.check(option, value, path).is_ok())
                .count();
            if matched != 1 {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("a match for exactly one of {} alternatives", options.len()),
                    format!("{} matched", matched),
                ));
            }
        }

        match (bson_type(value), value) {
            ("string", Value::String(s)) => self.check_string(rules, s, path),
            ("int" | "long" | "double", Value::Number(n)) => {
                check_number(rules, n.as_f64().unwrap_or(f64::NAN), path)
            }
            ("array", Value::Array(items)) => self.check_array(rules, items, path),
            ("object", Value::Object(obj)) => self.check_object(rules, obj, path),
            _ => Ok(()),
        }
    }

    fn check_string(&self, rules: &Map<String, Value>, s: &str, path: &str) -> Result<(), ValidationIssue> {
        let len = s.chars().count() as u64;
        if let Some(min) = rules.get("minLength").and_then(Value::as_u64) {
            if len < min {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("length >= {}", min),
                    format!("length {}", len),
                ));
            }
        }
        if let Some(max) = rules.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("length <= {}", max),
                    format!("length {}", len),
                ));
            }
        }
        if let Some(pattern) = rules.get("pattern").and_then(Value::as_str) {
            let matched = self.patterns.get(pattern).map_or(false, |re| re.is_match(s));
            if !matched {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("match for /{}/", pattern),
                    format!("\"{}\"", s),
                ));
            }
        }
        Ok(())
    }

    fn check_array(&self, rules: &Map<String, Value>, items: &[Value], path: &str) -> Result<(), ValidationIssue> {
        let len = items.len() as u64;
        if let Some(min) = rules.get("minItems").and_then(Value::as_u64) {
            if len < min {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("at least {} items", min),
                    format!("{} items", len),
                ));
            }
        }
        if let Some(max) = rules.get("maxItems").and_then(Value::as_u64) {
            if len > max {
                return Err(ValidationIssue::constraint(
                    path,
                    format!("at most {} items", max),
                    format!("{} items", len),
                ));
            }
        }

        match rules.get("items") {
            Some(Value::Array(positional)) => {
                for (i, (item, item_schema)) in items.iter().zip(positional).enumerate() {
                    self.check(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
            Some(item_schema) => {
                for (i, item) in items.iter().enumerate() {
                    self.check(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
            None => {}
        }
        Ok(())
    }

    fn check_object(&self, rules: &Map<String, Value>, obj: &Map<String, Value>, path: &str) -> Result<(), ValidationIssue> {
        if let Some(Value::Array(required)) = rules.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(name) {
                    return Err(ValidationIssue::missing_field(make_path(path, name)));
                }
            }
        }

        let empty = Map::new();
        let properties = match rules.get("properties") {
            Some(Value::Object(properties)) => properties,
            _ => &empty,
        };

        for (name, field_value) in obj {
            let field_path = make_path(path, name);
            match properties.get(name) {
                Some(field_schema) => self.check(field_schema, field_value, &field_path)?,
                None => match rules.get("additionalProperties") {
                    Some(Value::Bool(false)) => return Err(ValidationIssue::extra_field(field_path)),
                    Some(extra @ Value::Object(_)) => self.check(extra, field_value, &field_path)?,
                    _ => {}
                },
            }
        }
        Ok(())
    }
}

impl PartialEq for ValidatorDocument {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
    }
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), ValidationIssue> {
    let matched = match expected {
        Value::String(t) => type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| type_matches(t, value)),
        _ => true,
    };
    if matched {
        return Ok(());
    }

    let expected_name = match expected {
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        other => other.as_str().unwrap_or_default().to_string(),
    };
    Err(ValidationIssue::type_mismatch(path, expected_name, bson_type(value)))
}

fn check_number(rules: &Map<String, Value>, n: f64, path: &str) -> Result<(), ValidationIssue> {
    if let Some(min) = rules.get("minimum").and_then(Value::as_f64) {
        let exclusive = rules.get("exclusiveMinimum") == Some(&Value::Bool(true));
        if n < min || (exclusive && n == min) {
            let op = if exclusive { ">" } else { ">=" };
            return Err(ValidationIssue::constraint(path, format!("{} {}", op, min), n.to_string()));
        }
    }
    if let Some(max) = rules.get("maximum").and_then(Value::as_f64) {
        let exclusive = rules.get("exclusiveMaximum") == Some(&Value::Bool(true));
        if n > max || (exclusive && n == max) {
            let op = if exclusive { "<" } else { "<=" };
            return Err(ValidationIssue::constraint(path, format!("{} {}", op, max), n.to_string()));
        }
    }
    if let Some(divisor) = rules.get("multipleOf").and_then(Value::as_f64) {
        if !is_multiple_of(n, divisor) {
            return Err(ValidationIssue::constraint(
                path,
                format!("multiple of {}", divisor),
                n.to_string(),
            ));
        }
    }
    Ok(())
}

/// Equality with numbers compared by value
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Short description of a value for issue messages
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => bson_type(value).to_string(),
        scalar => scalar.to_string(),
    }
}

fn collect_patterns(schema: &Value, path: &str, out: &mut HashMap<String, Regex>) -> SchemaResult<()> {
    match schema {
        Value::Object(rules) => {
            if let Some(Value::String(pattern)) = rules.get("pattern") {
                if !out.contains_key(pattern) {
                    let re = Regex::new(pattern).map_err(|e| {
                        SchemaError::invalid_schema(path, format!("pattern does not compile: {}", e))
                    })?;
                    out.insert(pattern.clone(), re);
                }
            }
            for (key, nested) in rules {
                collect_patterns(nested, &make_path(path, key), out)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_patterns(item, path, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}
