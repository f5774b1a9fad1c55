//! In-memory document store
//!
//! Collections live in one `RwLock`-guarded map. The lock is only held
//! inside synchronous sections, never across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::schema::ValidatorDocument;

use super::apply::{apply_modifier, set_path};
use super::errors::{StorageError, StorageResult};
use super::selector::{equality_fields, matches};
use super::{DocumentStore, UpdateOutcome, ValidationAction, ValidationLevel, ValidationSettings};

#[derive(Default)]
struct CollectionState {
    documents: BTreeMap<String, Value>,
    validator: Option<(Arc<ValidatorDocument>, ValidationSettings)>,
}

impl CollectionState {
    /// Runs the collection validator. `previous` is the stored document an
    /// update replaces; `moderate` skips updates of already-invalid ones.
    fn enforce(&self, collection: &str, document: &Value, previous: Option<&Value>) -> StorageResult<()> {
        let Some((validator, settings)) = &self.validator else {
            return Ok(());
        };
        match (settings.level, previous) {
            (ValidationLevel::Off, _) => return Ok(()),
            (ValidationLevel::Moderate, Some(old)) if !validator.is_valid(old) => return Ok(()),
            _ => {}
        }

        let Err(issue) = validator.validate(document) else {
            return Ok(());
        };
        match settings.action {
            ValidationAction::Error => Err(StorageError::DocumentFailedValidation {
                collection: collection.to_string(),
                issue,
            }),
            ValidationAction::Warn => {
                warn!(
                    event = "VALIDATOR_WARN",
                    collection,
                    path = %issue.path,
                    expected = %issue.expected,
                    actual = %issue.actual,
                    "document failed validation; stored anyway"
                );
                Ok(())
            }
        }
    }

    fn first_match(&self, selector: &Value) -> StorageResult<Option<(&String, &Value)>> {
        for (id, doc) in &self.documents {
            if matches(selector, doc)? {
                return Ok(Some((id, doc)));
            }
        }
        Ok(None)
    }

    /// Assigns `_id` if absent, validates, and inserts
    fn insert(&mut self, collection: &str, mut document: Value) -> StorageResult<String> {
        let obj = document
            .as_object_mut()
            .ok_or_else(|| StorageError::Modifier("document must be an object".into()))?;
        let id = match obj.get("_id") {
            Some(existing) => id_key(existing),
            None => {
                let generated = uuid::Uuid::new_v4().to_string();
                obj.insert("_id".to_string(), Value::String(generated.clone()));
                generated
            }
        };

        if self.documents.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        self.enforce(collection, &document, None)?;
        self.documents.insert(id.clone(), document);
        Ok(id)
    }
}

/// Map key for an `_id` value
fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// In-memory storage backend
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<String, CollectionState>) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self
            .collections
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        f(&*guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut HashMap<String, CollectionState>) -> StorageResult<T>) -> StorageResult<T> {
        let mut guard = self
            .collections
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        f(&mut *guard)
    }

    fn insert_sync(&self, collection: &str, document: Value) -> StorageResult<String> {
        self.write(|collections| {
            let id = collections
                .entry(collection.to_string())
                .or_default()
                .insert(collection, document)?;
            debug!(event = "DOCUMENT_INSERTED", collection, id = %id);
            Ok(id)
        })
    }

    fn update_sync(&self, collection: &str, selector: &Value, modifier: &Value, upsert: bool) -> StorageResult<UpdateOutcome> {
        self.write(|collections| {
            let state = collections.entry(collection.to_string()).or_default();

            if let Some((id, current)) = state.first_match(selector)? {
                let id = id.clone();
                let mut next = current.clone();
                apply_modifier(&mut next, modifier, false)?;
                if next.get("_id") != current.get("_id") {
                    return Err(StorageError::Modifier("_id is immutable".into()));
                }
                state.enforce(collection, &next, Some(current))?;

                let modified = u64::from(&next != current);
                state.documents.insert(id, next);
                return Ok(UpdateOutcome {
                    matched: 1,
                    modified,
                    upserted_id: None,
                });
            }

            if !upsert {
                return Ok(UpdateOutcome::default());
            }

            let mut seeded = Value::Object(serde_json::Map::new());
            for (path, value) in equality_fields(selector) {
                set_path(&mut seeded, &path, value)?;
            }
            apply_modifier(&mut seeded, modifier, true)?;
            let id = state.insert(collection, seeded)?;
            debug!(event = "DOCUMENT_UPSERTED", collection, id = %id);
            Ok(UpdateOutcome {
                matched: 0,
                modified: 0,
                upserted_id: Some(id),
            })
        })
    }

    fn find_sync(&self, collection: &str, selector: &Value, limit: Option<usize>) -> StorageResult<Vec<Value>> {
        self.read(|collections| {
            let Some(state) = collections.get(collection) else {
                return Ok(Vec::new());
            };
            let mut found = Vec::new();
            for doc in state.documents.values() {
                if limit.map_or(false, |l| found.len() >= l) {
                    break;
                }
                if matches(selector, doc)? {
                    found.push(doc.clone());
                }
            }
            Ok(found)
        })
    }

    fn remove_sync(&self, collection: &str, selector: &Value) -> StorageResult<u64> {
        self.write(|collections| {
            let Some(state) = collections.get_mut(collection) else {
                return Ok(0);
            };
            let mut doomed = Vec::new();
            for (id, doc) in &state.documents {
                if matches(selector, doc)? {
                    doomed.push(id.clone());
                }
            }
            for id in &doomed {
                state.documents.remove(id);
            }
            Ok(doomed.len() as u64)
        })
    }
}

impl DocumentStore for InMemoryStore {
    fn set_validator(
        &self,
        collection: &str,
        validator: Arc<ValidatorDocument>,
        settings: ValidationSettings,
    ) -> StorageResult<()> {
        self.write(|collections| {
            collections.entry(collection.to_string()).or_default().validator = Some((validator, settings));
            Ok(())
        })
    }

    fn insert_one<'a>(&'a self, collection: &'a str, document: Value) -> BoxFuture<'a, StorageResult<String>> {
        Box::pin(async move { self.insert_sync(collection, document) })
    }

    fn update_one<'a>(
        &'a self,
        collection: &'a str,
        selector: &'a Value,
        modifier: Value,
        upsert: bool,
    ) -> BoxFuture<'a, StorageResult<UpdateOutcome>> {
        Box::pin(async move { self.update_sync(collection, selector, &modifier, upsert) })
    }

    fn find_one<'a>(&'a self, collection: &'a str, selector: &'a Value) -> BoxFuture<'a, StorageResult<Option<Value>>> {
        Box::pin(async move { Ok(self.find_sync(collection, selector, Some(1))?.into_iter().next()) })
    }

    fn find<'a>(&'a self, collection: &'a str, selector: &'a Value) -> BoxFuture<'a, StorageResult<Vec<Value>>> {
        Box::pin(async move { self.find_sync(collection, selector, None) })
    }

    fn remove<'a>(&'a self, collection: &'a str, selector: &'a Value) -> BoxFuture<'a, StorageResult<u64>> {
        Box::pin(async move { self.remove_sync(collection, selector) })
    }
}
