//! Modifier transformer
//!
//! Validates update modifiers against a [`RelaxedSchema`] and applies field
//! transforms to their payloads. The output is the modifier to send to
//! storage.
//!
//! Operator handling:
//! - `$set`, `$setOnInsert`, `$push`, `$addToSet`: payload parsed key by key
//! - `$unset`, `$inc`, `$pull`, `$min`, `$max`, `$mul`, `$rename`: passed through
//! - any other operator: rejected
//!
//! A modifier without operator keys is an implicit `$set`. Append-shaped
//! `$set` values on array fields (a bare element or `{$each: [...]}`) are
//! sent as `$push` or `$addToSet`.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::context::OperationContext;
use crate::schema::{parse_field, SchemaError, SchemaResult, ValidationIssue};

use super::relax::{root_segment, RelaxedSchema};

const PARSED_OPERATORS: &[&str] = &["$set", "$setOnInsert", "$push", "$addToSet"];
const PASSTHROUGH_OPERATORS: &[&str] = &["$unset", "$inc", "$pull", "$min", "$max", "$mul", "$rename"];

/// Transforms modifier payloads.
pub struct ModifierTransformer;

impl ModifierTransformer {
    /// Parses one operator payload, e.g. the body of a `$set`.
    ///
    /// Top-level fields absent from the payload whose relaxed type accepts
    /// absence are run as well, so auto-value transforms can fill them.
    ///
    /// # Errors
    ///
    /// - AERO_MODIFIER_INVALID if the payload is not an object
    /// - AERO_SCHEMA_VALIDATION_FAILED for an unknown key or a bad value
    pub fn parse_mongo_operation(
        relaxed: &RelaxedSchema,
        operation: &Value,
        ctx: &OperationContext,
    ) -> SchemaResult<Map<String, Value>> {
        transform_operation(relaxed, operation, Some(&HashSet::new()), ctx)
    }

    /// Parses a whole modifier.
    ///
    /// When `is_upsert` is set, `$setOnInsert` also receives the resolved
    /// default of every top-level field with a default that no operator
    /// already supplies.
    ///
    /// # Errors
    ///
    /// - AERO_MODIFIER_INVALID for a non-object modifier, a mix of operator
    ///   and plain keys, or an unsupported operator
    /// - AERO_SCHEMA_VALIDATION_FAILED for payload values that fail the schema
    pub fn parse_mongo_modifier(
        relaxed: &RelaxedSchema,
        modifier: &Value,
        is_upsert: bool,
        ctx: &OperationContext,
    ) -> SchemaResult<Value> {
        let explicit = normalize_modifier(relaxed, modifier)?;

        let mut out = Map::new();
        for (operator, payload) in &explicit {
            let op = operator.as_str();
            if op == "$set" {
                continue;
            }
            if PARSED_OPERATORS.contains(&op) {
                let parsed = transform_operation(relaxed, payload, None, ctx)?;
                out.insert(operator.clone(), Value::Object(parsed));
            } else if PASSTHROUGH_OPERATORS.contains(&op) {
                if !payload.is_object() {
                    return Err(SchemaError::modifier_invalid(format!("payload of '{}' must be an object", op)));
                }
                out.insert(operator.clone(), payload.clone());
            } else {
                return Err(SchemaError::modifier_invalid(format!("unsupported operator '{}'", op)));
            }
        }

        let targeted = targeted_roots(&explicit);
        let empty = Value::Object(Map::new());
        let set_payload = explicit.get("$set").unwrap_or(&empty);
        let set = transform_operation(relaxed, set_payload, Some(&targeted), ctx)?;

        if is_upsert {
            let mut supplied = targeted;
            supplied.extend(set.keys().map(|k| root_segment(k).to_string()));
            let mut on_insert = match out.remove("$setOnInsert") {
                Some(Value::Object(existing)) => existing,
                _ => Map::new(),
            };
            for (name, inner, default) in relaxed.defaults() {
                if supplied.contains(name) || on_insert.contains_key(name) {
                    continue;
                }
                let Some(resolved) = default.resolve(ctx) else {
                    continue;
                };
                if let Some(parsed) = parse_field(inner, Some(&resolved), ctx, name).map_err(SchemaError::from)? {
                    on_insert.insert(name.clone(), parsed);
                }
            }
            if !on_insert.is_empty() {
                out.insert("$setOnInsert".into(), Value::Object(on_insert));
            }
        }

        if !set.is_empty() {
            out.insert("$set".into(), Value::Object(set));
        }

        debug!(
            event = "MODIFIER_PARSED",
            operators = ?out.keys().collect::<Vec<_>>(),
            upsert = is_upsert,
            operation = ?ctx.kind(),
        );
        Ok(Value::Object(out))
    }
}

/// Rewrites a modifier into the explicit operator form.
///
/// A plain object is an implicit `$set`. Inside `$set`, an append-shaped
/// value for an array field moves to the operator that appends it: a bare
/// element to `$push`, `{$each: [...]}` to `$addToSet`, or to `$push` when it
/// carries `$position` or `$slice`.
pub(crate) fn normalize_modifier(relaxed: &RelaxedSchema, modifier: &Value) -> SchemaResult<Map<String, Value>> {
    let obj = modifier
        .as_object()
        .ok_or_else(|| SchemaError::modifier_invalid("modifier must be an object"))?;

    let operators = obj.keys().filter(|k| k.starts_with('$')).count();
    let mut explicit = if operators == 0 {
        let mut explicit = Map::new();
        explicit.insert("$set".into(), modifier.clone());
        explicit
    } else if operators == obj.len() {
        obj.clone()
    } else {
        return Err(SchemaError::modifier_invalid(
            "modifier mixes update operators with plain fields",
        ));
    };

    route_appends(relaxed, &mut explicit)?;
    Ok(explicit)
}

/// Moves append-shaped `$set` entries to `$push` or `$addToSet`
fn route_appends(relaxed: &RelaxedSchema, explicit: &mut Map<String, Value>) -> SchemaResult<()> {
    let Some(Value::Object(set)) = explicit.get_mut("$set") else {
        return Ok(());
    };

    let routed: Vec<(String, &'static str)> = set
        .iter()
        .filter_map(|(key, value)| append_operator(relaxed, key, value).map(|op| (key.clone(), op)))
        .collect();
    let mut moved = Vec::with_capacity(routed.len());
    for (key, operator) in routed {
        if let Some(value) = set.remove(&key) {
            moved.push((operator, key, value));
        }
    }
    if set.is_empty() && !moved.is_empty() {
        explicit.remove("$set");
    }

    for (operator, key, value) in moved {
        let payload = explicit
            .entry(operator)
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(fields) = payload.as_object_mut() else {
            return Err(SchemaError::modifier_invalid(format!("payload of '{}' must be an object", operator)));
        };
        if fields.contains_key(&key) {
            return Err(SchemaError::modifier_invalid(format!(
                "'{}' is written by both $set and {}",
                key, operator
            )));
        }
        fields.insert(key, value);
    }
    Ok(())
}

/// Operator that appends `value` to the array field `key`, if the value is
/// in an append shape
fn append_operator(relaxed: &RelaxedSchema, key: &str, value: &Value) -> Option<&'static str> {
    relaxed.base_node_for(key)?.array_item()?;
    match value {
        Value::Array(_) | Value::Null => None,
        Value::Object(obj) if obj.contains_key("$each") => {
            if obj.contains_key("$position") || obj.contains_key("$slice") {
                Some("$push")
            } else {
                Some("$addToSet")
            }
        }
        _ => Some("$push"),
    }
}

/// Top-level fields written by operators other than `$set`
fn targeted_roots(explicit: &Map<String, Value>) -> HashSet<String> {
    let mut roots = HashSet::new();
    for (operator, payload) in explicit {
        if operator == "$set" {
            continue;
        }
        let Some(fields) = payload.as_object() else {
            continue;
        };
        for (key, value) in fields {
            roots.insert(root_segment(key).to_string());
            if operator == "$rename" {
                if let Some(target) = value.as_str() {
                    roots.insert(root_segment(target).to_string());
                }
            }
        }
    }
    roots
}

/// Parses an operator payload. `fill` enables auto-fill of absent top-level
/// fields, skipping the roots it names.
fn transform_operation(
    relaxed: &RelaxedSchema,
    operation: &Value,
    fill: Option<&HashSet<String>>,
    ctx: &OperationContext,
) -> SchemaResult<Map<String, Value>> {
    let input = operation
        .as_object()
        .ok_or_else(|| SchemaError::modifier_invalid("operator payload must be an object"))?;

    let mut out = Map::new();
    for (key, value) in input {
        let node = relaxed
            .node_for(key)
            .ok_or_else(|| ValidationIssue::extra_field(key.as_str()))?;
        if let Some(parsed) = parse_field(&node, Some(value), ctx, key)? {
            out.insert(key.clone(), parsed);
        }
    }

    if let Some(skip) = fill {
        let written: HashSet<&str> = input.keys().map(|k| root_segment(k)).collect();
        for (name, node) in relaxed.fields() {
            if written.contains(name.as_str()) || skip.contains(name) || !node.accepts_absent() {
                continue;
            }
            if let Some(parsed) = parse_field(node, None, ctx, name)? {
                out.insert(name.clone(), parsed);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ManualClock, NoActor, OperationKind};
    use crate::modifier::ModifierRelaxer;
    use crate::schema::custom::{created_timestamp, last_write_timestamp, updated_timestamp};
    use crate::schema::{SchemaErrorCode, SchemaNode};
    use serde_json::json;
    use std::sync::Arc;

    fn relaxed() -> RelaxedSchema {
        ModifierRelaxer::relax_schema(&SchemaNode::object([
            ("name", SchemaNode::string().min_length(1).default_value("foo")),
            ("count", SchemaNode::integer().optional()),
            ("tags", SchemaNode::string().min_length(1).array().default_value(json!(["foo"]))),
        ]))
        .unwrap()
    }

    fn ctx(kind: OperationKind) -> OperationContext {
        OperationContext::new(kind, Arc::new(ManualClock::at_millis(0)), Arc::new(NoActor))
    }

    #[test]
    fn test_implicit_set() {
        let out = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"name": "bar"}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap();
        assert_eq!(out, json!({"$set": {"name": "bar"}}));
    }

    #[test]
    fn test_mixed_modifier_rejected() {
        let err = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"name": "bar", "$inc": {"count": 1}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::AeroModifierInvalid);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"$currentDate": {"name": true}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap_err();
        assert!(err.message().contains("$currentDate"));
    }

    #[test]
    fn test_passthrough_operators() {
        let out = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"$inc": {"count": 2}, "$unset": {"name": ""}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap();
        assert_eq!(out, json!({"$inc": {"count": 2}, "$unset": {"name": ""}}));
    }

    #[test]
    fn test_push_shapes() {
        let out = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"$push": {"tags": {"$each": ["a", "b"], "$slice": -5}}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap();
        assert_eq!(out["$push"]["tags"]["$each"], json!(["a", "b"]));

        let err = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"$push": {"tags": 3}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap_err();
        assert_eq!(err.path(), Some("tags"));
    }

    #[test]
    fn test_append_shapes_follow_dot_paths() {
        let schema = ModifierRelaxer::relax_schema(&SchemaNode::object([(
            "profile",
            SchemaNode::object([
                ("name", SchemaNode::string().min_length(1)),
                ("links", SchemaNode::string().min_length(1).array()),
            ]),
        )]))
        .unwrap();
        let out = ModifierTransformer::parse_mongo_modifier(
            &schema,
            &json!({"profile.links": "x", "profile.name": "y"}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap();
        assert_eq!(out, json!({"$push": {"profile.links": "x"}, "$set": {"profile.name": "y"}}));
    }

    #[test]
    fn test_append_shape_conflicting_with_operator_rejected() {
        let err = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"$set": {"tags": "a"}, "$push": {"tags": "b"}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::AeroModifierInvalid);
        assert!(err.message().contains("tags"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"$set": {"ghost": 1}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::AeroSchemaValidationFailed);
        assert_eq!(err.path(), Some("ghost"));
    }

    #[test]
    fn test_upsert_defaults_go_to_set_on_insert() {
        let out = ModifierTransformer::parse_mongo_modifier(&relaxed(), &json!({}), true, &ctx(OperationKind::Upsert))
            .unwrap();
        assert_eq!(out, json!({"$setOnInsert": {"name": "foo", "tags": ["foo"]}}));

        let out = ModifierTransformer::parse_mongo_modifier(
            &relaxed(),
            &json!({"name": "bar"}),
            true,
            &ctx(OperationKind::Upsert),
        )
        .unwrap();
        assert_eq!(out, json!({"$set": {"name": "bar"}, "$setOnInsert": {"tags": ["foo"]}}));
    }

    #[test]
    fn test_plain_update_has_no_set_on_insert() {
        let out = ModifierTransformer::parse_mongo_modifier(&relaxed(), &json!({}), false, &ctx(OperationKind::Update))
            .unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn test_auto_fill_skips_targeted_fields() {
        let schema = ModifierRelaxer::relax_schema(&SchemaNode::object([
            ("createdAt", created_timestamp()),
            ("updatedAt", updated_timestamp()),
            ("lastWrittenAt", last_write_timestamp()),
        ]))
        .unwrap();
        let epoch = json!({"$date": "1970-01-01T00:00:00.000Z"});

        let out = ModifierTransformer::parse_mongo_modifier(&schema, &json!({}), false, &ctx(OperationKind::Update))
            .unwrap();
        assert_eq!(out, json!({"$set": {"updatedAt": epoch, "lastWrittenAt": epoch}}));

        let out = ModifierTransformer::parse_mongo_modifier(
            &schema,
            &json!({"$unset": {"updatedAt": ""}}),
            false,
            &ctx(OperationKind::Update),
        )
        .unwrap();
        assert_eq!(out, json!({"$unset": {"updatedAt": ""}, "$set": {"lastWrittenAt": epoch}}));

        let out = ModifierTransformer::parse_mongo_modifier(&schema, &json!({}), true, &ctx(OperationKind::Upsert))
            .unwrap();
        assert_eq!(
            out,
            json!({"$set": {"lastWrittenAt": epoch}, "$setOnInsert": {"createdAt": epoch}})
        );
    }

    #[test]
    fn test_parse_mongo_operation_dot_path() {
        let schema = ModifierRelaxer::relax_schema(&SchemaNode::object([(
            "object",
            SchemaNode::object([(
                "moreNested",
                SchemaNode::object([(
                    "string",
                    SchemaNode::string()
                        .min_length(1)
                        .map_value(|v| Value::String(v.as_str().unwrap_or_default().to_uppercase())),
                )]),
            )]),
        )]))
        .unwrap();
        let out = ModifierTransformer::parse_mongo_operation(
            &schema,
            &json!({"object.moreNested.string": "foo"}),
            &ctx(OperationKind::Update),
        )
        .unwrap();
        assert_eq!(Value::Object(out), json!({"object.moreNested.string": "FOO"}));
    }
}
