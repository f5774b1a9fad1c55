//! Modifier application for the in-memory store
//!
//! Applies an explicit-operator modifier to a stored document in place.
//! Positional path segments (`$`, `$[]`, `$[ident]`) need the matched query
//! and are not supported here.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::schema::values_equal;

use super::errors::{StorageError, StorageResult};
use super::selector::{compare_json_values, lookup};

/// Applies `modifier` to `doc`. `inserting` is true when an upsert creates
/// the document, which is the only time `$setOnInsert` takes effect.
pub fn apply_modifier(doc: &mut Value, modifier: &Value, inserting: bool) -> StorageResult<()> {
    let operators = modifier
        .as_object()
        .ok_or_else(|| StorageError::Modifier("modifier must be an object".into()))?;

    for (operator, payload) in operators {
        let fields = payload
            .as_object()
            .ok_or_else(|| StorageError::Modifier(format!("payload of '{}' must be an object", operator)))?;

        for (path, operand) in fields {
            match operator.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(doc, path, operand.clone())?;
                    }
                }
                "$unset" => {
                    remove_path(doc, path)?;
                }
                "$inc" => {
                    let next = arithmetic(lookup(doc, path), operand, path, Arith::Add)?;
                    set_path(doc, path, next)?;
                }
                "$mul" => {
                    let next = arithmetic(lookup(doc, path), operand, path, Arith::Mul)?;
                    set_path(doc, path, next)?;
                }
                "$min" => bound(doc, path, operand, Ordering::Less)?,
                "$max" => bound(doc, path, operand, Ordering::Greater)?,
                "$push" => push(doc, path, operand, false)?,
                "$addToSet" => push(doc, path, operand, true)?,
                "$pull" => pull(doc, path, operand)?,
                "$rename" => {
                    let target = operand
                        .as_str()
                        .ok_or_else(|| StorageError::Modifier(format!("$rename target for '{}' must be a string", path)))?;
                    if let Some(moved) = remove_path(doc, path)? {
                        set_path(doc, target, moved)?;
                    }
                }
                other => {
                    return Err(StorageError::Modifier(format!("unsupported operator '{}'", other)));
                }
            }
        }
    }
    Ok(())
}

fn segments(path: &str) -> StorageResult<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|s| s.is_empty()) {
        return Err(StorageError::Modifier(format!("empty segment in path '{}'", path)));
    }
    if parts.iter().any(|s| s.starts_with('$')) {
        return Err(StorageError::Modifier(format!(
            "positional path '{}' is not supported by the in-memory store",
            path
        )));
    }
    Ok(parts)
}

fn index(segment: &str, path: &str) -> StorageResult<usize> {
    segment
        .parse::<usize>()
        .map_err(|_| StorageError::Modifier(format!("'{}' in '{}' is not an array index", segment, path)))
}

/// Element `i` of an array; one past the end appends a slot, anything
/// further is an error
fn slot_mut<'a>(items: &'a mut Vec<Value>, i: usize, path: &str) -> StorageResult<&'a mut Value> {
    if i == items.len() {
        items.push(Value::Null);
    }
    let len = items.len();
    items.get_mut(i).ok_or_else(|| {
        StorageError::Modifier(format!(
            "index {} in '{}' is past the end of an array of {} elements",
            i, path, len
        ))
    })
}

/// Descends one segment, creating intermediate objects
fn child_mut<'a>(current: &'a mut Value, segment: &str, path: &str) -> StorageResult<&'a mut Value> {
    match current {
        Value::Object(obj) => Ok(obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => {
            let slot = slot_mut(items, index(segment, path)?, path)?;
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            Ok(slot)
        }
        _ => Err(StorageError::Modifier(format!(
            "cannot traverse '{}' in '{}': not a container",
            segment, path
        ))),
    }
}

pub(crate) fn set_path(doc: &mut Value, path: &str, value: Value) -> StorageResult<()> {
    let parts = segments(path)?;
    let Some((last, parents)) = parts.split_last() else {
        return Err(StorageError::Modifier("empty path".into()));
    };

    let mut current = doc;
    for segment in parents {
        current = child_mut(current, segment, path)?;
    }

    match current {
        Value::Object(obj) => {
            obj.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            *slot_mut(items, index(last, path)?, path)? = value;
            Ok(())
        }
        _ => Err(StorageError::Modifier(format!("cannot set '{}': parent is not a container", path))),
    }
}

fn get_path_mut<'a>(doc: &'a mut Value, parts: &[&str]) -> Option<&'a mut Value> {
    parts.iter().try_fold(doc, |current, segment| match current {
        Value::Object(obj) => obj.get_mut(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Removes a field; array elements are set to null, as MongoDB does
fn remove_path(doc: &mut Value, path: &str) -> StorageResult<Option<Value>> {
    let parts = segments(path)?;
    let Some((last, parents)) = parts.split_last() else {
        return Ok(None);
    };
    let removed = match get_path_mut(doc, parents) {
        Some(Value::Object(obj)) => obj.remove(*last),
        Some(Value::Array(items)) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => Some(std::mem::replace(slot, Value::Null)),
            None => None,
        },
        _ => None,
    };
    Ok(removed)
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Mul,
}

fn arithmetic(current: Option<&Value>, operand: &Value, path: &str, op: Arith) -> StorageResult<Value> {
    let Value::Number(rhs) = operand else {
        return Err(StorageError::Modifier(format!("operand for '{}' must be a number", path)));
    };
    let lhs = match current {
        None => Number::from(0),
        Some(Value::Number(n)) => n.clone(),
        Some(other) => {
            return Err(StorageError::Modifier(format!(
                "cannot apply arithmetic to non-numeric field '{}' ({})",
                path, other
            )))
        }
    };

    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        let exact = match op {
            Arith::Add => a.checked_add(b),
            Arith::Mul => a.checked_mul(b),
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let (a, b) = (lhs.as_f64().unwrap_or(0.0), rhs.as_f64().unwrap_or(0.0));
    let result = match op {
        Arith::Add => a + b,
        Arith::Mul => a * b,
    };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| StorageError::Modifier(format!("arithmetic on '{}' is not finite", path)))
}

/// `$min` / `$max`: replace when the operand orders `wanted` relative to
/// the current value
fn bound(doc: &mut Value, path: &str, operand: &Value, wanted: Ordering) -> StorageResult<()> {
    let replace = match lookup(doc, path) {
        None => true,
        Some(current) => compare_json_values(operand, current) == Some(wanted),
    };
    if replace {
        set_path(doc, path, operand.clone())?;
    }
    Ok(())
}

fn array_at<'a>(doc: &'a mut Value, path: &str) -> StorageResult<&'a mut Vec<Value>> {
    if lookup(doc, path).is_none() {
        set_path(doc, path, Value::Array(Vec::new()))?;
    }
    let parts = segments(path)?;
    match get_path_mut(doc, &parts) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(StorageError::Modifier(format!("field '{}' is not an array", path))),
    }
}

fn push(doc: &mut Value, path: &str, operand: &Value, unique: bool) -> StorageResult<()> {
    let (values, position, slice) = match operand.as_object().and_then(|o| o.get("$each").map(|each| (o, each))) {
        Some((options, each)) => {
            let values = each
                .as_array()
                .cloned()
                .ok_or_else(|| StorageError::Modifier(format!("$each for '{}' must be an array", path)))?;
            (
                values,
                options.get("$position").and_then(Value::as_i64),
                options.get("$slice").and_then(Value::as_i64),
            )
        }
        None => (vec![operand.clone()], None, None),
    };

    let items = array_at(doc, path)?;
    let mut at = match position {
        None => items.len(),
        Some(p) if p < 0 => items.len().saturating_sub(p.unsigned_abs() as usize),
        Some(p) => (p as usize).min(items.len()),
    };
    for value in values {
        if unique && items.iter().any(|existing| values_equal(existing, &value)) {
            continue;
        }
        items.insert(at, value);
        at += 1;
    }

    if let Some(n) = slice {
        if n >= 0 {
            items.truncate(n as usize);
        } else {
            let keep = n.unsigned_abs() as usize;
            if items.len() > keep {
                items.drain(..items.len() - keep);
            }
        }
    }
    Ok(())
}

fn pull(doc: &mut Value, path: &str, operand: &Value) -> StorageResult<()> {
    if lookup(doc, path).is_none() {
        return Ok(());
    }
    let in_list = operand.get("$in").and_then(Value::as_array).cloned();
    let items = array_at(doc, path)?;
    items.retain(|item| match &in_list {
        Some(candidates) => !candidates.iter().any(|c| values_equal(c, item)),
        None => !values_equal(operand, item),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(doc: Value, modifier: Value) -> Value {
        let mut doc = doc;
        apply_modifier(&mut doc, &modifier, false).unwrap();
        doc
    }

    #[test]
    fn test_set_and_unset() {
        let doc = apply(json!({"a": 1}), json!({"$set": {"b.c": 2}, "$unset": {"a": ""}}));
        assert_eq!(doc, json!({"b": {"c": 2}}));
    }

    #[test]
    fn test_set_on_insert_only_when_inserting() {
        let doc = apply(json!({}), json!({"$setOnInsert": {"a": 1}}));
        assert_eq!(doc, json!({}));

        let mut doc = json!({});
        apply_modifier(&mut doc, &json!({"$setOnInsert": {"a": 1}}), true).unwrap();
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_inc_and_mul() {
        let doc = apply(json!({"n": 2, "f": 1.5}), json!({"$inc": {"n": 3, "m": 1}, "$mul": {"f": 2}}));
        assert_eq!(doc, json!({"n": 5, "m": 1, "f": 3.0}));

        let mut doc = json!({"s": "x"});
        assert!(apply_modifier(&mut doc, &json!({"$inc": {"s": 1}}), false).is_err());
    }

    #[test]
    fn test_min_max() {
        let doc = apply(json!({"lo": 5, "hi": 5}), json!({"$min": {"lo": 3}, "$max": {"hi": 3}}));
        assert_eq!(doc, json!({"lo": 3, "hi": 5}));
    }

    #[test]
    fn test_push_variants() {
        let doc = apply(json!({}), json!({"$push": {"t": "a"}}));
        assert_eq!(doc, json!({"t": ["a"]}));

        let doc = apply(
            json!({"t": ["a", "b"]}),
            json!({"$push": {"t": {"$each": ["x", "y"], "$position": 1}}}),
        );
        assert_eq!(doc, json!({"t": ["a", "x", "y", "b"]}));

        let doc = apply(json!({"t": [1, 2, 3]}), json!({"$push": {"t": {"$each": [4], "$slice": -2}}}));
        assert_eq!(doc, json!({"t": [3, 4]}));
    }

    #[test]
    fn test_add_to_set() {
        let doc = apply(json!({"t": ["a"]}), json!({"$addToSet": {"t": {"$each": ["a", "b", "b"]}}}));
        assert_eq!(doc, json!({"t": ["a", "b"]}));
    }

    #[test]
    fn test_pull() {
        let doc = apply(json!({"t": ["a", "b", "a", "c"]}), json!({"$pull": {"t": "a"}}));
        assert_eq!(doc, json!({"t": ["b", "c"]}));

        let doc = apply(json!({"t": [1, 2, 3]}), json!({"$pull": {"t": {"$in": [1, 3]}}}));
        assert_eq!(doc, json!({"t": [2]}));
    }

    #[test]
    fn test_rename() {
        let doc = apply(json!({"a": 1}), json!({"$rename": {"a": "b"}}));
        assert_eq!(doc, json!({"b": 1}));
    }

    #[test]
    fn test_array_index_paths() {
        let doc = apply(json!({"t": ["a", "b"]}), json!({"$set": {"t.1": "z"}}));
        assert_eq!(doc, json!({"t": ["a", "z"]}));
    }

    #[test]
    fn test_index_may_append_one_element() {
        let doc = apply(json!({"t": ["a"]}), json!({"$set": {"t.1": "b"}}));
        assert_eq!(doc, json!({"t": ["a", "b"]}));

        let doc = apply(json!({"t": []}), json!({"$set": {"t.0.name": "x"}}));
        assert_eq!(doc, json!({"t": [{"name": "x"}]}));
    }

    #[test]
    fn test_index_past_the_end_rejected() {
        for path in ["t.3", "t.4000000000", "t.5.name"] {
            let mut doc = json!({"t": ["a"]});
            let err = apply_modifier(&mut doc, &json!({"$set": {path: "x"}}), false).unwrap_err();
            assert!(matches!(err, StorageError::Modifier(_)), "{}", path);
            assert_eq!(doc, json!({"t": ["a"]}));
        }
    }

    #[test]
    fn test_positional_paths_rejected() {
        let mut doc = json!({"t": ["a"]});
        assert!(apply_modifier(&mut doc, &json!({"$set": {"t.$": "b"}}), false).is_err());
    }
}
