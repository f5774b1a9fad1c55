//! Modifier relaxer
//!
//! Derives from a document schema the schema that update modifiers are
//! checked against. Relative to the base tree:
//! - defaults are stripped (an update must not re-apply them)
//! - array fields also accept a single element and `{$each: [...]}`
//! - dot-path keys resolve through the base tree to the leaf they target
//!
//! Fields carrying a default are remembered so upserts can place the
//! resolved default under `$setOnInsert`.

use crate::schema::{intersect, DefaultFn, ObjectNode, SchemaError, SchemaNode, SchemaResult};

/// Relaxed view of a document schema
#[derive(Debug, Clone)]
pub struct RelaxedSchema {
    base: ObjectNode,
    fields: Vec<(String, SchemaNode)>,
    catchall: Option<SchemaNode>,
    defaults: Vec<(String, SchemaNode, DefaultFn)>,
}

impl RelaxedSchema {
    /// Relaxed top-level fields in declaration order
    pub fn fields(&self) -> &[(String, SchemaNode)] {
        &self.fields
    }

    /// Relaxed type of a top-level field
    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    /// Top-level fields with a default: name, the node inside the default,
    /// and the default itself
    pub fn defaults(&self) -> &[(String, SchemaNode, DefaultFn)] {
        &self.defaults
    }

    /// Relaxed type for a modifier key, plain or dot-path. `None` means
    /// the key addresses nothing in the schema.
    pub fn node_for(&self, key: &str) -> Option<SchemaNode> {
        if key.contains('.') {
            return self.resolve_path(key);
        }
        self.field(key).cloned().or_else(|| self.catchall.clone())
    }

    /// Resolves a dot-path through the base tree and relaxes the leaf
    pub fn resolve_path(&self, path: &str) -> Option<SchemaNode> {
        self.base_node_for(path).map(|node| ModifierRelaxer::relax(&node))
    }

    /// Unrelaxed type a modifier key addresses in the base tree
    pub fn base_node_for(&self, key: &str) -> Option<SchemaNode> {
        let mut current = SchemaNode::Object(self.base.clone());
        for segment in key.split('.') {
            current = step(&current, segment)?;
        }
        Some(current)
    }
}

/// Builds [`RelaxedSchema`]s.
pub struct ModifierRelaxer;

impl ModifierRelaxer {
    /// Relaxes a schema rooted at an object.
    ///
    /// # Errors
    ///
    /// Returns AERO_SCHEMA_INVALID if the root is not an object, or the
    /// merge error of a root intersection.
    pub fn relax_schema(root: &SchemaNode) -> SchemaResult<RelaxedSchema> {
        let merged;
        let root = match root {
            SchemaNode::Intersection(left, right) => {
                merged = intersect(left, right, "")?;
                &merged
            }
            other => other,
        };
        let SchemaNode::Object(base) = root else {
            return Err(SchemaError::invalid_schema(
                "",
                format!("modifier schema root must be an object, got {}", root.kind_name()),
            ));
        };

        let fields = base
            .fields
            .iter()
            .map(|(name, node)| (name.clone(), Self::relax(node)))
            .collect();
        let defaults = base
            .fields
            .iter()
            .filter_map(|(name, node)| match node {
                SchemaNode::WithDefault { inner, default } => {
                    Some((name.clone(), (**inner).clone(), default.clone()))
                }
                _ => None,
            })
            .collect();

        Ok(RelaxedSchema {
            base: base.clone(),
            fields,
            catchall: base.catchall.as_deref().map(Self::relax),
            defaults,
        })
    }

    /// Relaxes one field type
    pub fn relax(node: &SchemaNode) -> SchemaNode {
        let stripped = strip_defaults(node);
        match node.array_item() {
            Some(item) => SchemaNode::Union(vec![stripped, item.clone(), each_shape(item)]),
            None => stripped,
        }
    }
}

/// Removes defaults from the wrapper chain of a node
fn strip_defaults(node: &SchemaNode) -> SchemaNode {
    match node {
        SchemaNode::WithDefault { inner, .. } => strip_defaults(inner),
        SchemaNode::Optional(inner) => SchemaNode::Optional(Box::new(strip_defaults(inner))),
        SchemaNode::Nullable(inner) => SchemaNode::Nullable(Box::new(strip_defaults(inner))),
        SchemaNode::Transform { inner, validate, apply } => SchemaNode::Transform {
            inner: Box::new(strip_defaults(inner)),
            validate: validate.clone(),
            apply: apply.clone(),
        },
        other => other.clone(),
    }
}

/// `{$each: [item], $position?: int, $slice?: int}`
fn each_shape(item: &SchemaNode) -> SchemaNode {
    SchemaNode::object([
        ("$each", SchemaNode::array_of(item.clone())),
        ("$position", SchemaNode::integer().optional()),
        ("$slice", SchemaNode::integer().optional()),
    ])
}

/// Array index segments: `0`, `$`, `$[]`, `$[ident]`
fn is_index_segment(segment: &str) -> bool {
    if segment == "$" || segment == "$[]" {
        return true;
    }
    if let Some(ident) = segment.strip_prefix("$[").and_then(|s| s.strip_suffix(']')) {
        return !ident.is_empty() && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    }
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

/// Type one path segment below `node`
fn step(node: &SchemaNode, segment: &str) -> Option<SchemaNode> {
    match node {
        SchemaNode::Optional(inner)
        | SchemaNode::Nullable(inner)
        | SchemaNode::WithDefault { inner, .. }
        | SchemaNode::Transform { inner, .. } => step(inner, segment),
        SchemaNode::Object(obj) => obj
            .field(segment)
            .cloned()
            .or_else(|| obj.catchall.as_deref().cloned()),
        SchemaNode::Record(value_type) => Some((**value_type).clone()),
        SchemaNode::Array(item) => is_index_segment(segment).then(|| (**item).clone()),
        SchemaNode::Tuple(items) => match segment.parse::<usize>() {
            Ok(i) => items.get(i).cloned(),
            Err(_) if is_index_segment(segment) && !items.is_empty() => Some(SchemaNode::Union(items.clone())),
            Err(_) => None,
        },
        SchemaNode::Union(options) | SchemaNode::DiscriminatedUnion { options, .. } => {
            let mut candidates: Vec<SchemaNode> = options.iter().filter_map(|o| step(o, segment)).collect();
            match candidates.len() {
                0 => None,
                1 => candidates.pop(),
                _ => Some(SchemaNode::Union(candidates)),
            }
        }
        SchemaNode::Intersection(left, right) => {
            let merged = intersect(left, right, "").ok()?;
            step(&merged, segment)
        }
        SchemaNode::Any => Some(SchemaNode::Any),
        SchemaNode::Enum(_)
        | SchemaNode::Literal(_)
        | SchemaNode::String(_)
        | SchemaNode::Number(_)
        | SchemaNode::Boolean
        | SchemaNode::Date
        | SchemaNode::Null
        | SchemaNode::Never => None,
    }
}

/// First segment of a modifier key
pub(crate) fn root_segment(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OperationContext, OperationKind};
    use crate::schema::parse_field;
    use serde_json::{json, Value};

    fn accepts(node: &SchemaNode, value: &Value) -> bool {
        let ctx = OperationContext::for_kind(Some(OperationKind::Update));
        parse_field(node, Some(value), &ctx, "").is_ok()
    }

    fn schema() -> SchemaNode {
        SchemaNode::object([
            ("name", SchemaNode::string().min_length(1).default_value("anon")),
            ("tags", SchemaNode::string().min_length(1).array().default_value(json!([]))),
            (
                "profile",
                SchemaNode::object([
                    ("bio", SchemaNode::string().min_length(1).optional()),
                    ("links", SchemaNode::record(SchemaNode::string().min_length(1))),
                ])
                .optional(),
            ),
            ("pairs", SchemaNode::tuple([SchemaNode::string().min_length(1), SchemaNode::number()])),
            (
                "shape",
                SchemaNode::union([
                    SchemaNode::object([("r", SchemaNode::number())]),
                    SchemaNode::object([("side", SchemaNode::integer())]),
                ]),
            ),
        ])
    }

    #[test]
    fn test_defaults_stripped_and_remembered() {
        let relaxed = ModifierRelaxer::relax_schema(&schema()).unwrap();
        assert!(matches!(relaxed.field("name"), Some(SchemaNode::String(_))));
        let names: Vec<&str> = relaxed.defaults().iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "tags"]);
    }

    #[test]
    fn test_array_field_shapes() {
        let relaxed = ModifierRelaxer::relax_schema(&schema()).unwrap();
        let tags = relaxed.field("tags").unwrap();
        assert!(accepts(tags, &json!("a")));
        assert!(accepts(tags, &json!(["a", "b"])));
        assert!(accepts(tags, &json!({"$each": ["a"], "$position": 0})));
        assert!(!accepts(tags, &json!(1)));
        assert!(!accepts(tags, &json!([1])));
        assert!(!accepts(tags, &json!({"$each": [1]})));
    }

    #[test]
    fn test_dot_paths() {
        let relaxed = ModifierRelaxer::relax_schema(&schema()).unwrap();
        assert!(matches!(relaxed.node_for("profile.bio"), Some(SchemaNode::Optional(_))));
        assert!(matches!(relaxed.node_for("profile.links.home"), Some(SchemaNode::String(_))));
        assert!(matches!(relaxed.node_for("tags.0"), Some(SchemaNode::String(_))));
        assert!(matches!(relaxed.node_for("tags.$"), Some(SchemaNode::String(_))));
        assert!(matches!(relaxed.node_for("tags.$[]"), Some(SchemaNode::String(_))));
        assert!(matches!(relaxed.node_for("tags.$[elem]"), Some(SchemaNode::String(_))));
        assert!(matches!(relaxed.node_for("pairs.1"), Some(SchemaNode::Number(_))));
        assert!(relaxed.node_for("tags.name").is_none());
        assert!(relaxed.node_for("profile.nope").is_none());
        assert!(relaxed.node_for("nope").is_none());
    }

    #[test]
    fn test_dot_path_through_union() {
        let relaxed = ModifierRelaxer::relax_schema(&schema()).unwrap();
        assert!(matches!(relaxed.node_for("shape.r"), Some(SchemaNode::Number(_))));
        assert!(relaxed.node_for("shape.side").is_some());
        assert!(relaxed.node_for("shape.area").is_none());
    }

    #[test]
    fn test_catchall_keys() {
        let relaxed = ModifierRelaxer::relax_schema(
            &SchemaNode::object([("a", SchemaNode::Boolean)]).catchall(SchemaNode::number()),
        )
        .unwrap();
        assert!(matches!(relaxed.node_for("anything"), Some(SchemaNode::Number(_))));
    }

    #[test]
    fn test_root_segment() {
        assert_eq!(root_segment("a.b.c"), "a");
        assert_eq!(root_segment("a"), "a");
    }
}
