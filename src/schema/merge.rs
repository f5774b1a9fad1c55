//! Structural merge of intersection branches.
//!
//! Both the compiler and the parser evaluate `Intersection(l, r)` as the
//! single node produced here, so both layers see the same merged shape:
//! objects merge their fields, strings and numbers concatenate checks, enums
//! keep the common values.

use super::errors::{SchemaError, SchemaResult};
use super::types::{ObjectNode, SchemaNode, StringNode};
use super::value::make_path;

/// Merges two intersection branches into one node
pub fn intersect(left: &SchemaNode, right: &SchemaNode, path: &str) -> SchemaResult<SchemaNode> {
    use SchemaNode as N;

    let merged = match (left, right) {
        (N::Intersection(l, r), other) | (other, N::Intersection(l, r)) => {
            let inner = intersect(l, r, path)?;
            intersect(&inner, other, path)?
        }
        (N::Any, other) | (other, N::Any) => other.clone(),
        (N::Optional(l), N::Optional(r)) => N::Optional(Box::new(intersect(l, r, path)?)),
        (N::Optional(l), r) | (r, N::Optional(l)) => intersect(l, r, path)?,
        (N::Nullable(l), N::Nullable(r)) => N::Nullable(Box::new(intersect(l, r, path)?)),
        (N::Nullable(l), r) | (r, N::Nullable(l)) => intersect(l, r, path)?,
        (N::Object(l), N::Object(r)) => N::Object(intersect_objects(l, r, path)?),
        (N::String(l), N::String(r)) => N::String(StringNode {
            checks: l.checks.iter().chain(r.checks.iter()).cloned().collect(),
            allow_empty: l.allow_empty && r.allow_empty,
        }),
        (N::Number(l), N::Number(r)) => N::Number(l.iter().chain(r.iter()).cloned().collect()),
        (N::Enum(l), N::Enum(r)) => {
            let common: Vec<String> = l.iter().filter(|v| r.contains(v)).cloned().collect();
            if common.is_empty() {
                return Err(SchemaError::invalid_schema(path, "intersection of enums has no common value"));
            }
            N::Enum(common)
        }
        (N::Literal(l), N::Literal(r)) if l == r => N::Literal(l.clone()),
        (N::Array(l), N::Array(r)) => N::Array(Box::new(intersect(l, r, &format!("{}[]", path))?)),
        (N::Tuple(l), N::Tuple(r)) => {
            if l.len() != r.len() {
                return Err(SchemaError::unsupported(
                    path,
                    format!("mismatched tuple arity ({} vs {})", l.len(), r.len()),
                ));
            }
            let items = l
                .iter()
                .zip(r.iter())
                .enumerate()
                .map(|(i, (a, b))| intersect(a, b, &format!("{}[{}]", path, i)))
                .collect::<SchemaResult<Vec<_>>>()?;
            N::Tuple(items)
        }
        (N::Record(l), N::Record(r)) => N::Record(Box::new(intersect(l, r, &format!("{}.*", path))?)),
        (N::Boolean, N::Boolean) => N::Boolean,
        (N::Date, N::Date) => N::Date,
        (N::Null, N::Null) => N::Null,
        (l, r) => {
            return Err(SchemaError::unsupported(
                path,
                format!("intersection of {} and {}", l.kind_name(), r.kind_name()),
            ))
        }
    };

    Ok(merged)
}

fn intersect_objects(left: &ObjectNode, right: &ObjectNode, path: &str) -> SchemaResult<ObjectNode> {
    let mut fields = Vec::with_capacity(left.fields.len() + right.fields.len());

    for (name, node) in &left.fields {
        let merged = match right.field(name) {
            Some(other) => intersect(node, other, &make_path(path, name))?,
            None => node.clone(),
        };
        fields.push((name.clone(), merged));
    }
    for (name, node) in &right.fields {
        if !left.has_field(name) {
            fields.push((name.clone(), node.clone()));
        }
    }

    let catchall = match (&left.catchall, &right.catchall) {
        (Some(l), Some(r)) => Some(Box::new(intersect(l, r, &format!("{}.*", path))?)),
        _ => None,
    };

    Ok(ObjectNode { fields, catchall })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::StringCheck;

    #[test]
    fn test_objects_merge_fields() {
        let left = SchemaNode::object([("a", SchemaNode::string())]);
        let right = SchemaNode::object([
            ("a", SchemaNode::string().min_length(2)),
            ("b", SchemaNode::number().optional()),
        ]);

        let SchemaNode::Object(merged) = intersect(&left, &right, "").unwrap() else {
            panic!("expected object");
        };
        assert_eq!(merged.fields.len(), 2);
        assert!(matches!(
            merged.field("a"),
            Some(SchemaNode::String(s)) if matches!(s.checks.as_slice(), [StringCheck::MinLength(2)])
        ));
        assert!(merged.field("b").unwrap().accepts_absent());
    }

    #[test]
    fn test_required_wins_over_optional() {
        let merged = intersect(&SchemaNode::string().optional(), &SchemaNode::string(), "x").unwrap();
        assert!(!merged.accepts_absent());
    }

    #[test]
    fn test_enum_intersection() {
        let merged = intersect(
            &SchemaNode::enumeration(["a", "b", "c"]),
            &SchemaNode::enumeration(["b", "c", "d"]),
            "",
        )
        .unwrap();
        assert!(matches!(merged, SchemaNode::Enum(ref v) if v == &["b".to_string(), "c".to_string()]));

        let err = intersect(&SchemaNode::enumeration(["a"]), &SchemaNode::enumeration(["b"]), "e")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let err = intersect(
            &SchemaNode::tuple([SchemaNode::string()]),
            &SchemaNode::tuple([SchemaNode::string(), SchemaNode::number()]),
            "pair",
        )
        .unwrap_err();
        assert!(err.message().contains("arity"));
        assert_eq!(err.path(), Some("pair"));
    }

    #[test]
    fn test_incompatible_kinds() {
        let err = intersect(&SchemaNode::string(), &SchemaNode::number(), "v").unwrap_err();
        assert!(err.message().contains("string"));
        assert!(err.message().contains("number"));
    }

    #[test]
    fn test_any_is_identity() {
        let merged = intersect(&SchemaNode::Any, &SchemaNode::Boolean, "").unwrap();
        assert!(matches!(merged, SchemaNode::Boolean));
    }
}
