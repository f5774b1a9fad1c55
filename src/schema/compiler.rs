//! Schema compiler
//!
//! Walks a [`SchemaNode`] tree and emits the `$jsonSchema` validator document
//! the storage engine enforces at write time.
//!
//! Translation rules:
//! - object: `bsonType`, `properties`, `required`, `additionalProperties`
//! - array: `items`; tuple: positional `items` plus `minItems`/`maxItems`
//! - union: `anyOf`; discriminated union: `oneOf`; intersection: merged node
//! - record: `additionalProperties` with the value schema
//! - optional / default / transform: compile the inner node
//! - nullable: `null` added to `bsonType` (or an `anyOf` with null)
//! - enum / literal: `enum`
//! - scalars: `bsonType` plus constraint keywords
//!
//! Anything without a faithful representation is a named, path-carrying
//! error. Constraints are never dropped.

use serde_json::{json, Map, Value};

use super::errors::{SchemaError, SchemaResult};
use super::merge::intersect;
use super::types::{Constraints, NumberCheck, ObjectNode, SchemaNode, StringCheck};
use super::validator::ValidatorDocument;
use super::value::{make_path, number_value, EMAIL_PATTERN, UUID_PATTERN};

/// Compiles schema trees into validator documents.
pub struct SchemaCompiler;

impl SchemaCompiler {
    /// Compiles a schema rooted at an object.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` (FATAL) if:
    /// - the root is not an object (AERO_SCHEMA_INVALID)
    /// - a node has no validator representation (AERO_SCHEMA_UNSUPPORTED)
    /// - a node is structurally invalid (AERO_SCHEMA_INVALID)
    pub fn compile(root: &SchemaNode) -> SchemaResult<ValidatorDocument> {
        let root = match root {
            SchemaNode::Intersection(left, right) => intersect(left, right, "")?,
            other => other.clone(),
        };
        if !matches!(root, SchemaNode::Object(_)) {
            return Err(SchemaError::invalid_schema(
                "",
                format!("root must be an object, got {}", root.kind_name()),
            ));
        }

        let compiled = compile_node(&root, "")?;
        ValidatorDocument::new(Value::Object(compiled))
    }
}

/// Compiles one node. `path` names the node for error messages.
fn compile_node(node: &SchemaNode, path: &str) -> SchemaResult<Map<String, Value>> {
    match node {
        SchemaNode::Object(obj) => compile_object(obj, path),
        SchemaNode::Array(item) => {
            let mut out = typed("array");
            out.insert("items".into(), Value::Object(compile_node(item, &format!("{}[]", path))?));
            Ok(out)
        }
        SchemaNode::Tuple(items) => {
            if items.is_empty() {
                return Err(SchemaError::unsupported(path, "mismatched tuple arity (empty tuple)"));
            }
            let compiled = items
                .iter()
                .enumerate()
                .map(|(i, item)| compile_node(item, &format!("{}[{}]", path, i)).map(Value::Object))
                .collect::<SchemaResult<Vec<_>>>()?;
            let mut out = typed("array");
            out.insert("items".into(), Value::Array(compiled));
            out.insert("minItems".into(), json!(items.len()));
            out.insert("maxItems".into(), json!(items.len()));
            Ok(out)
        }
        SchemaNode::Union(options) => {
            if options.is_empty() {
                return Err(SchemaError::invalid_schema(path, "union without options"));
            }
            let compiled = options
                .iter()
                .map(|option| compile_node(option, path).map(Value::Object))
                .collect::<SchemaResult<Vec<_>>>()?;
            let mut out = Map::new();
            out.insert("anyOf".into(), Value::Array(compiled));
            Ok(out)
        }
        SchemaNode::DiscriminatedUnion { key, options } => compile_discriminated(key, options, path),
        SchemaNode::Intersection(left, right) => compile_node(&intersect(left, right, path)?, path),
        SchemaNode::Record(value_type) => {
            let mut out = typed("object");
            out.insert(
                "additionalProperties".into(),
                Value::Object(compile_node(value_type, &format!("{}.*", path))?),
            );
            Ok(out)
        }
        SchemaNode::Optional(inner) | SchemaNode::WithDefault { inner, .. } => compile_node(inner, path),
        SchemaNode::Nullable(inner) => Ok(admit_null(compile_node(inner, path)?)),
        SchemaNode::Transform { inner, validate, .. } => {
            let mut out = compile_node(inner, path)?;
            match validate {
                Some(Constraints::String(checks)) => apply_string_checks(&mut out, checks, path)?,
                Some(Constraints::Number(checks)) => apply_number_checks(&mut out, checks, path)?,
                None => {}
            }
            Ok(out)
        }
        SchemaNode::Enum(values) => {
            if values.is_empty() {
                return Err(SchemaError::invalid_schema(path, "enum without values"));
            }
            let mut out = Map::new();
            out.insert("enum".into(), Value::Array(values.iter().cloned().map(Value::String).collect()));
            Ok(out)
        }
        SchemaNode::Literal(value) => {
            if value.is_object() || value.is_array() {
                return Err(SchemaError::unsupported(path, "non-scalar literal"));
            }
            let mut out = Map::new();
            out.insert("enum".into(), Value::Array(vec![value.clone()]));
            Ok(out)
        }
        SchemaNode::String(s) => {
            let mut out = typed("string");
            apply_string_checks(&mut out, &s.checks, path)?;
            Ok(out)
        }
        SchemaNode::Number(checks) => {
            let mut out = if checks.contains(&NumberCheck::Integer) {
                let mut m = Map::new();
                m.insert("bsonType".into(), json!(["int", "long"]));
                m
            } else {
                typed("number")
            };
            apply_number_checks(&mut out, checks, path)?;
            Ok(out)
        }
        SchemaNode::Boolean => Ok(typed("bool")),
        SchemaNode::Date => Ok(typed("date")),
        SchemaNode::Null => Ok(typed("null")),
        SchemaNode::Any => Ok(Map::new()),
        SchemaNode::Never => Err(SchemaError::unsupported(path, "never has no BSON representation")),
    }
}

fn typed(bson_type: &str) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("bsonType".into(), Value::String(bson_type.to_string()));
    out
}

fn compile_object(obj: &ObjectNode, path: &str) -> SchemaResult<Map<String, Value>> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (name, field) in &obj.fields {
        let field_path = make_path(path, name);
        properties.insert(name.clone(), Value::Object(compile_node(field, &field_path)?));
        if !field.accepts_absent() {
            required.push(Value::String(name.clone()));
        }
    }

    let mut out = typed("object");
    out.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        out.insert("required".into(), Value::Array(required));
    }
    let additional = match &obj.catchall {
        Some(catchall) => Value::Object(compile_node(catchall, &format!("{}.*", path))?),
        None => Value::Bool(false),
    };
    out.insert("additionalProperties".into(), additional);
    Ok(out)
}

fn compile_discriminated(key: &str, options: &[SchemaNode], path: &str) -> SchemaResult<Map<String, Value>> {
    if options.is_empty() {
        return Err(SchemaError::invalid_schema(path, "discriminated union without options"));
    }

    let mut seen: Vec<&Value> = Vec::new();
    let mut compiled = Vec::with_capacity(options.len());
    for (i, option) in options.iter().enumerate() {
        let option_path = format!("{}<{}>", path, i);
        let SchemaNode::Object(obj) = option else {
            return Err(SchemaError::invalid_schema(
                option_path,
                format!("discriminated union option must be an object, got {}", option.kind_name()),
            ));
        };
        let literal = discriminator_literal(obj, key).ok_or_else(|| {
            SchemaError::invalid_schema(
                &option_path,
                format!("discriminator '{}' must be a single literal", key),
            )
        })?;
        if seen.contains(&literal) {
            return Err(SchemaError::invalid_schema(
                &option_path,
                format!("duplicate discriminator value {}", literal),
            ));
        }
        seen.push(literal);
        compiled.push(Value::Object(compile_object(obj, path)?));
    }

    let mut out = Map::new();
    out.insert("oneOf".into(), Value::Array(compiled));
    Ok(out)
}

/// The literal a discriminated-union option carries in its `key` field
pub(crate) fn discriminator_literal<'a>(obj: &'a ObjectNode, key: &str) -> Option<&'a Value> {
    match obj.field(key)? {
        SchemaNode::Literal(value) if !value.is_object() && !value.is_array() => Some(value),
        _ => None,
    }
}

/// Adds `null` to whatever the compiled inner node accepts
fn admit_null(mut out: Map<String, Value>) -> Map<String, Value> {
    if out.is_empty() {
        return out;
    }

    if let Some(Value::Array(values)) = out.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }

    match out.get("bsonType").cloned() {
        Some(Value::String(t)) => {
            out.insert("bsonType".into(), json!([t, "null"]));
            out
        }
        Some(Value::Array(mut types)) => {
            if !types.contains(&json!("null")) {
                types.push(json!("null"));
            }
            out.insert("bsonType".into(), Value::Array(types));
            out
        }
        _ if out.len() == 1 && out.contains_key("enum") => out,
        _ => {
            let mut wrapped = Map::new();
            wrapped.insert(
                "anyOf".into(),
                Value::Array(vec![Value::Object(typed("null")), Value::Object(out)]),
            );
            wrapped
        }
    }
}

fn apply_string_checks(out: &mut Map<String, Value>, checks: &[StringCheck], path: &str) -> SchemaResult<()> {
    for check in checks {
        match check {
            StringCheck::MinLength(n) => raise_lower(out, "minLength", *n),
            StringCheck::MaxLength(n) => lower_upper(out, "maxLength", *n),
            StringCheck::Length(n) => {
                raise_lower(out, "minLength", *n);
                lower_upper(out, "maxLength", *n);
            }
            StringCheck::Pattern(re) => set_pattern(out, re.as_str(), path)?,
            StringCheck::Email => set_pattern(out, EMAIL_PATTERN, path)?,
            StringCheck::Uuid => set_pattern(out, UUID_PATTERN, path)?,
            StringCheck::Url
            | StringCheck::StartsWith(_)
            | StringCheck::EndsWith(_)
            | StringCheck::Includes(_) => {
                return Err(SchemaError::unsupported(
                    path,
                    format!("string check '{}'", check.name()),
                ))
            }
        }
    }
    Ok(())
}

fn raise_lower(out: &mut Map<String, Value>, keyword: &str, n: usize) {
    let current = out.get(keyword).and_then(Value::as_u64);
    if current.map_or(true, |c| (n as u64) > c) {
        out.insert(keyword.into(), json!(n));
    }
}

fn lower_upper(out: &mut Map<String, Value>, keyword: &str, n: usize) {
    let current = out.get(keyword).and_then(Value::as_u64);
    if current.map_or(true, |c| (n as u64) < c) {
        out.insert(keyword.into(), json!(n));
    }
}

fn set_pattern(out: &mut Map<String, Value>, pattern: &str, path: &str) -> SchemaResult<()> {
    match out.get("pattern").and_then(Value::as_str) {
        Some(existing) if existing != pattern => Err(SchemaError::unsupported(
            path,
            "more than one pattern constraint on a string",
        )),
        _ => {
            out.insert("pattern".into(), Value::String(pattern.to_string()));
            Ok(())
        }
    }
}

fn apply_number_checks(out: &mut Map<String, Value>, checks: &[NumberCheck], path: &str) -> SchemaResult<()> {
    for check in checks {
        match check {
            NumberCheck::Integer => narrow_to_integer(out, path)?,
            NumberCheck::Min { value, inclusive } => {
                set_bound(out, "minimum", "exclusiveMinimum", *value, *inclusive, path, |new, old| new > old)?
            }
            NumberCheck::Max { value, inclusive } => {
                set_bound(out, "maximum", "exclusiveMaximum", *value, *inclusive, path, |new, old| new < old)?
            }
            NumberCheck::MultipleOf(divisor) => {
                if *divisor <= 0.0 {
                    return Err(SchemaError::invalid_schema(path, "multipleOf must be positive"));
                }
                let value = number_value(*divisor)
                    .ok_or_else(|| SchemaError::invalid_schema(path, "multipleOf must be finite"))?;
                match out.get("multipleOf") {
                    Some(existing) if existing != &value => {
                        return Err(SchemaError::unsupported(path, "more than one multipleOf constraint"))
                    }
                    _ => {
                        out.insert("multipleOf".into(), value);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Replaces a `number` type with the integer BSON types. The node must
/// already carry a numeric `bsonType`; there is nothing to narrow otherwise.
fn narrow_to_integer(out: &mut Map<String, Value>, path: &str) -> SchemaResult<()> {
    let narrowed = match out.get("bsonType") {
        Some(Value::String(t)) if t == "number" => json!(["int", "long"]),
        Some(Value::Array(types)) if types.contains(&json!("number")) => {
            let mut next = Vec::with_capacity(types.len() + 1);
            for t in types {
                if t == "number" {
                    next.push(json!("int"));
                    next.push(json!("long"));
                } else if !next.contains(t) {
                    next.push(t.clone());
                }
            }
            Value::Array(next)
        }
        Some(Value::Array(types)) if types.contains(&json!("int")) => return Ok(()),
        _ => {
            return Err(SchemaError::unsupported(
                path,
                "integer constraint on a node without a numeric bsonType",
            ))
        }
    };
    out.insert("bsonType".into(), narrowed);
    Ok(())
}

/// Keeps the stricter of the existing and the new bound; at equal values
/// the exclusive bound is stricter.
fn set_bound(
    out: &mut Map<String, Value>,
    keyword: &str,
    exclusive_keyword: &str,
    value: f64,
    inclusive: bool,
    path: &str,
    stricter: impl Fn(f64, f64) -> bool,
) -> SchemaResult<()> {
    let encoded = number_value(value)
        .ok_or_else(|| SchemaError::invalid_schema(path, format!("{} must be finite", keyword)))?;

    let replace = match out.get(keyword).and_then(Value::as_f64) {
        None => true,
        Some(existing) => {
            let existing_exclusive = out.get(exclusive_keyword) == Some(&Value::Bool(true));
            stricter(value, existing) || (value == existing && !inclusive && !existing_exclusive)
        }
    };

    if replace {
        out.insert(keyword.into(), encoded);
        if inclusive {
            out.remove(exclusive_keyword);
        } else {
            out.insert(exclusive_keyword.into(), Value::Bool(true));
        }
    }
    Ok(())
}
