//! Reusable field definitions
//!
//! Auto-value fields derive their value from the running operation:
//!
//! | field                  | insert | update | upsert (new doc) |
//! |------------------------|--------|--------|------------------|
//! | `created_timestamp`    | now    | absent | now, on insert   |
//! | `updated_timestamp`    | absent | now    | absent           |
//! | `last_write_timestamp` | now    | now    | now              |
//! | `created_user`         | actor  | absent | actor, on insert |
//! | `updated_user`         | absent | actor  | actor            |
//!
//! A caller-supplied value is kept, except that created fields are dropped
//! on update so history cannot be rewritten.

use serde_json::Value;

use crate::context::OperationContext;

use super::types::SchemaNode;
use super::value::date_value;

/// String that must hold at least one character
pub fn non_empty_string() -> SchemaNode {
    SchemaNode::string().min_length(1)
}

/// String that may hold `""`
pub fn allowed_empty_string() -> SchemaNode {
    SchemaNode::string().allow_empty()
}

/// `_id` of a document in another collection
pub fn foreign_key() -> SchemaNode {
    non_empty_string()
}

fn now(ctx: &OperationContext) -> Value {
    date_value(ctx.now())
}

fn actor(ctx: &OperationContext) -> Option<Value> {
    ctx.current_actor().map(Value::String)
}

/// Set once, when the document is created
pub fn created_timestamp() -> SchemaNode {
    SchemaNode::Date
        .optional()
        .transform(|value, ctx| if ctx.is_update() { None } else { value })
        .default_with(now)
}

/// Set on every update after creation
pub fn updated_timestamp() -> SchemaNode {
    SchemaNode::Date
        .optional()
        .transform(|value, ctx| value.or_else(|| ctx.is_update().then(|| now(ctx))))
}

/// Set on every write
pub fn last_write_timestamp() -> SchemaNode {
    SchemaNode::Date
        .optional()
        .transform(|value, ctx| value.or_else(|| ctx.kind().map(|_| now(ctx))))
}

/// Actor that created the document
pub fn created_user() -> SchemaNode {
    non_empty_string()
        .optional()
        .transform(|value, ctx| if ctx.is_update() { None } else { value })
        .default_when(actor)
}

/// Actor behind the latest update
pub fn updated_user() -> SchemaNode {
    non_empty_string().optional().transform(|value, ctx| {
        value.or_else(|| {
            if ctx.is_update() || ctx.is_upsert() {
                actor(ctx)
            } else {
                None
            }
        })
    })
}
