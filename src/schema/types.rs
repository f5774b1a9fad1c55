//! Schema type definitions
//!
//! A schema is a tree of [`SchemaNode`]s. The set of variants is closed:
//! the compiler, linter, parser and modifier relaxer are all exhaustive
//! matches over it.
//!
//! Supported shapes:
//! - object: ordered named fields, optional catchall for undeclared keys
//! - array / tuple: homogeneous or positional elements
//! - union / discriminated union / intersection
//! - record: string keys, uniform value type
//! - optional / nullable / default / transform wrappers
//! - enum, literal, and scalar leaves (string, number, bool, date, null, any, never)

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::context::OperationContext;

/// Produces the value of a field the caller left out.
///
/// `None` means no default applies in this context and the field stays
/// absent.
#[derive(Clone)]
pub struct DefaultFn(Arc<dyn Fn(&OperationContext) -> Option<Value> + Send + Sync>);

impl DefaultFn {
    pub fn new(f: impl Fn(&OperationContext) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A default that is always the same value
    pub fn constant(value: Value) -> Self {
        Self::new(move |_| Some(value.clone()))
    }

    pub fn resolve(&self, ctx: &OperationContext) -> Option<Value> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for DefaultFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultFn(..)")
    }
}

/// Rewrites a parsed value. `None` in or out means the field is absent.
///
/// An `Err` is reported to the caller as a validation failure at the
/// field's path.
#[derive(Clone)]
pub struct TransformFn(
    Arc<dyn Fn(Option<Value>, &OperationContext) -> Result<Option<Value>, String> + Send + Sync>,
);

impl TransformFn {
    pub fn new(
        f: impl Fn(Option<Value>, &OperationContext) -> Result<Option<Value>, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, value: Option<Value>, ctx: &OperationContext) -> Result<Option<Value>, String> {
        (self.0)(value, ctx)
    }
}

impl fmt::Debug for TransformFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformFn(..)")
    }
}

/// String constraint
#[derive(Debug, Clone)]
pub enum StringCheck {
    MinLength(usize),
    MaxLength(usize),
    /// Exact length
    Length(usize),
    Pattern(Regex),
    Email,
    Uuid,
    /// Parsed, but has no validator representation
    Url,
    /// Parsed, but has no validator representation
    StartsWith(String),
    /// Parsed, but has no validator representation
    EndsWith(String),
    /// Parsed, but has no validator representation
    Includes(String),
}

impl StringCheck {
    /// Returns the check name for error messages
    pub fn name(&self) -> &'static str {
        match self {
            StringCheck::MinLength(_) => "minLength",
            StringCheck::MaxLength(_) => "maxLength",
            StringCheck::Length(_) => "length",
            StringCheck::Pattern(_) => "pattern",
            StringCheck::Email => "email",
            StringCheck::Uuid => "uuid",
            StringCheck::Url => "url",
            StringCheck::StartsWith(_) => "startsWith",
            StringCheck::EndsWith(_) => "endsWith",
            StringCheck::Includes(_) => "includes",
        }
    }
}

/// Number constraint
#[derive(Debug, Clone, PartialEq)]
pub enum NumberCheck {
    /// Lower bound; `inclusive: false` is an exclusive minimum
    Min { value: f64, inclusive: bool },
    /// Upper bound; `inclusive: false` is an exclusive maximum
    Max { value: f64, inclusive: bool },
    Integer,
    MultipleOf(f64),
}

impl NumberCheck {
    pub fn name(&self) -> &'static str {
        match self {
            NumberCheck::Min { inclusive: true, .. } => "min",
            NumberCheck::Min { inclusive: false, .. } => "exclusiveMin",
            NumberCheck::Max { inclusive: true, .. } => "max",
            NumberCheck::Max { inclusive: false, .. } => "exclusiveMax",
            NumberCheck::Integer => "integer",
            NumberCheck::MultipleOf(_) => "multipleOf",
        }
    }
}

/// Constraint facet attachable to a transform
#[derive(Debug, Clone)]
pub enum Constraints {
    String(Vec<StringCheck>),
    Number(Vec<NumberCheck>),
}

/// String leaf
#[derive(Debug, Clone, Default)]
pub struct StringNode {
    pub checks: Vec<StringCheck>,
    /// Marks the distinguished leaf that may hold `""`
    pub allow_empty: bool,
}

/// Object shape with fields in declaration order
#[derive(Debug, Clone, Default)]
pub struct ObjectNode {
    pub fields: Vec<(String, SchemaNode)>,
    /// Schema for undeclared keys; `None` rejects them
    pub catchall: Option<Box<SchemaNode>>,
}

impl ObjectNode {
    pub fn new(fields: Vec<(String, SchemaNode)>) -> Self {
        Self {
            fields,
            catchall: None,
        }
    }

    /// Looks up a declared field
    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// A node of the schema tree
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Object(ObjectNode),
    Array(Box<SchemaNode>),
    Tuple(Vec<SchemaNode>),
    Union(Vec<SchemaNode>),
    /// Options are expected to be objects; the compiler rejects any other
    DiscriminatedUnion {
        key: String,
        options: Vec<SchemaNode>,
    },
    Intersection(Box<SchemaNode>, Box<SchemaNode>),
    Record(Box<SchemaNode>),
    Optional(Box<SchemaNode>),
    Nullable(Box<SchemaNode>),
    WithDefault {
        inner: Box<SchemaNode>,
        default: DefaultFn,
    },
    Transform {
        inner: Box<SchemaNode>,
        validate: Option<Constraints>,
        apply: TransformFn,
    },
    Enum(Vec<String>),
    Literal(Value),
    String(StringNode),
    Number(Vec<NumberCheck>),
    Boolean,
    Date,
    Null,
    Any,
    Never,
}

impl SchemaNode {
    /// Returns the kind name for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            SchemaNode::Object(_) => "object",
            SchemaNode::Array(_) => "array",
            SchemaNode::Tuple(_) => "tuple",
            SchemaNode::Union(_) => "union",
            SchemaNode::DiscriminatedUnion { .. } => "discriminated union",
            SchemaNode::Intersection(_, _) => "intersection",
            SchemaNode::Record(_) => "record",
            SchemaNode::Optional(_) => "optional",
            SchemaNode::Nullable(_) => "nullable",
            SchemaNode::WithDefault { .. } => "default",
            SchemaNode::Transform { .. } => "transform",
            SchemaNode::Enum(_) => "enum",
            SchemaNode::Literal(_) => "literal",
            SchemaNode::String(_) => "string",
            SchemaNode::Number(_) => "number",
            SchemaNode::Boolean => "bool",
            SchemaNode::Date => "date",
            SchemaNode::Null => "null",
            SchemaNode::Any => "any",
            SchemaNode::Never => "never",
        }
    }

    /// Whether an object field of this type may be left out
    pub fn accepts_absent(&self) -> bool {
        match self {
            SchemaNode::Optional(_) | SchemaNode::WithDefault { .. } | SchemaNode::Any => true,
            SchemaNode::Nullable(inner) | SchemaNode::Transform { inner, .. } => inner.accepts_absent(),
            SchemaNode::Union(options) => options.iter().any(SchemaNode::accepts_absent),
            SchemaNode::Intersection(left, right) => left.accepts_absent() && right.accepts_absent(),
            _ => false,
        }
    }

    /// Element type of an array-typed node, seen through wrappers
    pub fn array_item(&self) -> Option<&SchemaNode> {
        match self {
            SchemaNode::Array(item) => Some(item),
            SchemaNode::Optional(inner)
            | SchemaNode::Nullable(inner)
            | SchemaNode::WithDefault { inner, .. }
            | SchemaNode::Transform { inner, .. } => inner.array_item(),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn object<N: Into<String>>(fields: impl IntoIterator<Item = (N, SchemaNode)>) -> Self {
        SchemaNode::Object(ObjectNode::new(
            fields.into_iter().map(|(n, node)| (n.into(), node)).collect(),
        ))
    }

    pub fn string() -> Self {
        SchemaNode::String(StringNode::default())
    }

    pub fn number() -> Self {
        SchemaNode::Number(Vec::new())
    }

    pub fn integer() -> Self {
        SchemaNode::Number(vec![NumberCheck::Integer])
    }

    pub fn array_of(item: SchemaNode) -> Self {
        SchemaNode::Array(Box::new(item))
    }

    pub fn tuple(items: impl IntoIterator<Item = SchemaNode>) -> Self {
        SchemaNode::Tuple(items.into_iter().collect())
    }

    pub fn union(options: impl IntoIterator<Item = SchemaNode>) -> Self {
        SchemaNode::Union(options.into_iter().collect())
    }

    /// Discriminated union; every option must be an object
    pub fn discriminated_union(key: impl Into<String>, options: impl IntoIterator<Item = SchemaNode>) -> Self {
        SchemaNode::DiscriminatedUnion {
            key: key.into(),
            options: options.into_iter().collect(),
        }
    }

    pub fn intersection(left: SchemaNode, right: SchemaNode) -> Self {
        SchemaNode::Intersection(Box::new(left), Box::new(right))
    }

    pub fn record(value_type: SchemaNode) -> Self {
        SchemaNode::Record(Box::new(value_type))
    }

    pub fn enumeration<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        SchemaNode::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        SchemaNode::Literal(value.into())
    }

    // ------------------------------------------------------------------
    // Wrappers
    // ------------------------------------------------------------------

    pub fn optional(self) -> Self {
        SchemaNode::Optional(Box::new(self))
    }

    pub fn nullable(self) -> Self {
        SchemaNode::Nullable(Box::new(self))
    }

    pub fn array(self) -> Self {
        SchemaNode::Array(Box::new(self))
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        SchemaNode::WithDefault {
            inner: Box::new(self),
            default: DefaultFn::constant(value.into()),
        }
    }

    pub fn default_with(self, f: impl Fn(&OperationContext) -> Value + Send + Sync + 'static) -> Self {
        SchemaNode::WithDefault {
            inner: Box::new(self),
            default: DefaultFn::new(move |ctx| Some(f(ctx))),
        }
    }

    /// Default that may decline to produce a value
    pub fn default_when(
        self,
        f: impl Fn(&OperationContext) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        SchemaNode::WithDefault {
            inner: Box::new(self),
            default: DefaultFn::new(f),
        }
    }

    /// Transform that always succeeds
    pub fn transform(
        self,
        f: impl Fn(Option<Value>, &OperationContext) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        SchemaNode::Transform {
            inner: Box::new(self),
            validate: None,
            apply: TransformFn::new(move |value, ctx| Ok(f(value, ctx))),
        }
    }

    pub fn try_transform(
        self,
        f: impl Fn(Option<Value>, &OperationContext) -> Result<Option<Value>, String> + Send + Sync + 'static,
    ) -> Self {
        SchemaNode::Transform {
            inner: Box::new(self),
            validate: None,
            apply: TransformFn::new(f),
        }
    }

    /// Transform of present values only; absent stays absent
    pub fn map_value(self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform(move |value, _| value.map(&f))
    }

    /// Attaches the constraint facet of a transform node
    pub fn validated(self, constraints: Constraints) -> Self {
        match self {
            SchemaNode::Transform { inner, apply, .. } => SchemaNode::Transform {
                inner,
                validate: Some(constraints),
                apply,
            },
            other => SchemaNode::Transform {
                inner: Box::new(other),
                validate: Some(constraints),
                apply: TransformFn::new(|value, _| Ok(value)),
            },
        }
    }

    /// Lets undeclared object keys through when they match `catchall`
    pub fn catchall(self, catchall: SchemaNode) -> Self {
        match self {
            SchemaNode::Object(mut obj) => {
                obj.catchall = Some(Box::new(catchall));
                SchemaNode::Object(obj)
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Leaf checks
    // ------------------------------------------------------------------

    /// Appends a string check; no-op on non-string nodes
    pub fn with_string_check(self, check: StringCheck) -> Self {
        match self {
            SchemaNode::String(mut s) => {
                s.checks.push(check);
                SchemaNode::String(s)
            }
            other => other,
        }
    }

    /// Appends a number check; no-op on non-number nodes
    pub fn with_number_check(self, check: NumberCheck) -> Self {
        match self {
            SchemaNode::Number(mut checks) => {
                checks.push(check);
                SchemaNode::Number(checks)
            }
            other => other,
        }
    }

    pub fn min_length(self, n: usize) -> Self {
        self.with_string_check(StringCheck::MinLength(n))
    }

    pub fn max_length(self, n: usize) -> Self {
        self.with_string_check(StringCheck::MaxLength(n))
    }

    pub fn length(self, n: usize) -> Self {
        self.with_string_check(StringCheck::Length(n))
    }

    pub fn pattern(self, re: Regex) -> Self {
        self.with_string_check(StringCheck::Pattern(re))
    }

    pub fn email(self) -> Self {
        self.with_string_check(StringCheck::Email)
    }

    pub fn uuid(self) -> Self {
        self.with_string_check(StringCheck::Uuid)
    }

    /// Marks a string leaf as allowed to hold `""`
    pub fn allow_empty(self) -> Self {
        match self {
            SchemaNode::String(mut s) => {
                s.allow_empty = true;
                SchemaNode::String(s)
            }
            other => other,
        }
    }

    pub fn min(self, value: f64) -> Self {
        self.with_number_check(NumberCheck::Min { value, inclusive: true })
    }

    pub fn max(self, value: f64) -> Self {
        self.with_number_check(NumberCheck::Max { value, inclusive: true })
    }

    pub fn gt(self, value: f64) -> Self {
        self.with_number_check(NumberCheck::Min { value, inclusive: false })
    }

    pub fn lt(self, value: f64) -> Self {
        self.with_number_check(NumberCheck::Max { value, inclusive: false })
    }

    pub fn multiple_of(self, value: f64) -> Self {
        self.with_number_check(NumberCheck::MultipleOf(value))
    }

    pub fn int(self) -> Self {
        self.with_number_check(NumberCheck::Integer)
    }
}
