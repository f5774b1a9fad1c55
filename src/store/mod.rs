//! Document storage
//!
//! [`DocumentStore`] is the boundary to the storage engine. Every write is
//! re-checked there against the collection's [`ValidatorDocument`], with
//! MongoDB's `validationLevel` / `validationAction` semantics.
//!
//! [`InMemoryStore`] is the reference implementation.

mod apply;
mod errors;
mod memory;
mod selector;

pub use apply::apply_modifier;
pub use errors::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use selector::matches;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::ValidatorDocument;

/// Which writes the collection validator checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// No validation
    Off,
    /// Inserts, and updates of documents that were valid before
    Moderate,
    /// Every insert and update
    #[default]
    Strict,
}

/// What happens to a write the validator rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationAction {
    /// The write fails
    #[default]
    Error,
    /// The write succeeds and the failure is logged
    Warn,
}

/// Validator settings attached to a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default)]
    pub level: ValidationLevel,
    #[serde(default)]
    pub action: ValidationAction,
}

impl ValidationSettings {
    pub fn new(level: ValidationLevel, action: ValidationAction) -> Self {
        Self { level, action }
    }
}

/// Result of an `update_one`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Documents matched by the selector (0 or 1)
    pub matched: u64,
    /// Documents whose content changed (0 or 1)
    pub modified: u64,
    /// `_id` of the document an upsert inserted
    pub upserted_id: Option<String>,
}

/// Storage backend for one database
pub trait DocumentStore: Send + Sync {
    /// Attaches (or replaces) a collection's validator
    fn set_validator(
        &self,
        collection: &str,
        validator: Arc<ValidatorDocument>,
        settings: ValidationSettings,
    ) -> StorageResult<()>;

    /// Inserts a document and returns its `_id`, generating one if absent
    fn insert_one<'a>(&'a self, collection: &'a str, document: Value) -> BoxFuture<'a, StorageResult<String>>;

    /// Applies an explicit-operator modifier to the first matching document
    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        selector: &'a Value,
        modifier: Value,
        upsert: bool,
    ) -> BoxFuture<'a, StorageResult<UpdateOutcome>>;

    /// First document matching the selector
    fn find_one<'a>(&'a self, collection: &'a str, selector: &'a Value) -> BoxFuture<'a, StorageResult<Option<Value>>>;

    /// Every document matching the selector, in `_id` order
    fn find<'a>(&'a self, collection: &'a str, selector: &'a Value) -> BoxFuture<'a, StorageResult<Vec<Value>>>;

    /// Removes every matching document and returns how many were removed
    fn remove<'a>(&'a self, collection: &'a str, selector: &'a Value) -> BoxFuture<'a, StorageResult<u64>>;
}
