//! Selector matching for the in-memory store
//!
//! Supported:
//! - `"id"` (a bare string): `_id` equality
//! - `{field: value}`: equality; an array field also matches when it
//!   contains the value
//! - `{field: {$eq | $ne | $gt | $gte | $lt | $lte | $in | $nin | $exists}}`
//! - `{$and: [...]}`, `{$or: [...]}`
//!
//! Fields may be dot-paths.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::schema::{as_date, values_equal};

use super::errors::{StorageError, StorageResult};

/// Check if a document matches a selector
pub fn matches(selector: &Value, doc: &Value) -> StorageResult<bool> {
    match selector {
        Value::String(id) => Ok(doc.get("_id").and_then(Value::as_str) == Some(id.as_str())),
        Value::Object(clauses) => matches_clauses(clauses, doc),
        other => Err(StorageError::Selector(format!(
            "selector must be an object or an id string, got {}",
            other
        ))),
    }
}

fn matches_clauses(clauses: &Map<String, Value>, doc: &Value) -> StorageResult<bool> {
    for (key, condition) in clauses {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_selectors(key, condition)? {
                    all &= matches(sub, doc)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_selectors(key, condition)? {
                    any |= matches(sub, doc)?;
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(StorageError::Selector(format!("unsupported operator '{}'", op)));
            }
            field => matches_field(lookup(doc, field), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_selectors<'a>(key: &str, condition: &'a Value) -> StorageResult<&'a Vec<Value>> {
    condition
        .as_array()
        .ok_or_else(|| StorageError::Selector(format!("'{}' takes an array of selectors", key)))
}

fn is_operator_object(condition: &Value) -> bool {
    match condition {
        Value::Object(obj) => !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) && as_date(condition).is_none(),
        _ => false,
    }
}

fn matches_field(actual: Option<&Value>, condition: &Value) -> StorageResult<bool> {
    if !is_operator_object(condition) {
        return Ok(equals(actual, condition));
    }

    let Value::Object(operators) = condition else {
        return Ok(false);
    };
    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$in" => in_list(actual, op, operand)?,
            "$nin" => !in_list(actual, op, operand)?,
            "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
            "$gt" => compare(actual, operand, |o| o == Ordering::Greater),
            "$gte" => compare(actual, operand, |o| o != Ordering::Less),
            "$lt" => compare(actual, operand, |o| o == Ordering::Less),
            "$lte" => compare(actual, operand, |o| o != Ordering::Greater),
            other => {
                return Err(StorageError::Selector(format!("unsupported operator '{}'", other)));
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality; a missing field equals null, an array field equals any of its
/// elements
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) => {
            values_equal(value, expected)
                || matches!(value, Value::Array(items) if items.iter().any(|item| values_equal(item, expected)))
        }
    }
}

fn in_list(actual: Option<&Value>, op: &str, operand: &Value) -> StorageResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StorageError::Selector(format!("'{}' takes an array", op)))?;
    Ok(candidates.iter().any(|candidate| equals(actual, candidate)))
}

fn compare(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|value| compare_json_values(value, operand))
        .map_or(false, accept)
}

/// Compare two JSON values for ordering; values of different types are
/// unordered
pub(crate) fn compare_json_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (as_date(a), as_date(b)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
    }
}

/// Reads a dot-path; numeric segments index into arrays
pub(crate) fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(obj) => obj.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Plain equality clauses of a selector; used to seed upserted documents
pub(crate) fn equality_fields(selector: &Value) -> Vec<(String, Value)> {
    let mut fields = Vec::new();
    match selector {
        Value::String(id) => fields.push(("_id".to_string(), Value::String(id.clone()))),
        Value::Object(clauses) => {
            for (key, condition) in clauses {
                if key == "$and" {
                    for sub in condition.as_array().into_iter().flatten() {
                        fields.extend(equality_fields(sub));
                    }
                } else if key.starts_with('$') {
                    continue;
                } else if !is_operator_object(condition) {
                    fields.push((key.clone(), condition.clone()));
                } else if let Some(eq) = condition.get("$eq") {
                    fields.push((key.clone(), eq.clone()));
                }
            }
        }
        _ => {}
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "_id": "u1",
            "name": "Alice",
            "age": 30,
            "tags": ["a", "b"],
            "profile": {"city": "Oslo"},
            "joined": {"$date": "2024-01-01T00:00:00.000Z"}
        })
    }

    #[test]
    fn test_equality() {
        assert!(matches(&json!({"name": "Alice"}), &doc()).unwrap());
        assert!(!matches(&json!({"name": "Bob"}), &doc()).unwrap());
        assert!(matches(&json!({"age": 30.0}), &doc()).unwrap());
        assert!(matches(&json!({"profile.city": "Oslo"}), &doc()).unwrap());
        assert!(matches(&json!({"tags": "b"}), &doc()).unwrap());
        assert!(matches(&json!({"missing": null}), &doc()).unwrap());
    }

    #[test]
    fn test_id_shortcut() {
        assert!(matches(&json!("u1"), &doc()).unwrap());
        assert!(!matches(&json!("u2"), &doc()).unwrap());
    }

    #[test]
    fn test_comparison_operators() {
        assert!(matches(&json!({"age": {"$gt": 18, "$lte": 30}}), &doc()).unwrap());
        assert!(!matches(&json!({"age": {"$lt": 30}}), &doc()).unwrap());
        assert!(matches(&json!({"name": {"$ne": "Bob"}}), &doc()).unwrap());
        assert!(matches(&json!({"age": {"$in": [1, 30]}}), &doc()).unwrap());
        assert!(matches(&json!({"age": {"$nin": [1, 2]}}), &doc()).unwrap());
        assert!(matches(&json!({"nick": {"$exists": false}}), &doc()).unwrap());
        assert!(!matches(&json!({"name": {"$gt": 5}}), &doc()).unwrap());
        assert!(matches(
            &json!({"joined": {"$gte": {"$date": "2023-06-01T00:00:00.000Z"}}}),
            &doc()
        )
        .unwrap());
    }

    #[test]
    fn test_date_equality_is_not_operator() {
        assert!(matches(&json!({"joined": {"$date": "2024-01-01T00:00:00.000Z"}}), &doc()).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        assert!(matches(&json!({"$or": [{"name": "Bob"}, {"age": 30}]}), &doc()).unwrap());
        assert!(!matches(&json!({"$and": [{"name": "Alice"}, {"age": 31}]}), &doc()).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_error() {
        assert!(matches(&json!({"age": {"$regex": "x"}}), &doc()).is_err());
        assert!(matches(&json!({"$where": "1"}), &doc()).is_err());
        assert!(matches(&json!(5), &doc()).is_err());
    }

    #[test]
    fn test_equality_fields() {
        let fields = equality_fields(&json!({
            "owner": "u1",
            "kind": {"$eq": "a"},
            "age": {"$gt": 3},
            "$and": [{"team": "x"}]
        }));
        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"owner"));
        assert!(names.contains(&"kind"));
        assert!(names.contains(&"team"));
        assert!(!names.contains(&"age"));
    }

    #[test]
    fn test_lookup_array_index() {
        assert_eq!(lookup(&doc(), "tags.1"), Some(&json!("b")));
        assert_eq!(lookup(&doc(), "tags.x"), None);
    }
}
