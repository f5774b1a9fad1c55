//! Model façade
//!
//! A [`Model`] binds a schema to a collection. Construction lints and
//! compiles the schema once and attaches the compiled validator to the
//! collection. Every write is then validated twice: by the parser in
//! process, and by the storage engine against the compiled validator.
//!
//! `bypass_schema` skips the in-process layer only, and is refused when the
//! collection validator is off. A storage rejection of
//! a document the parser accepted means the two layers disagree; it is
//! reported as [`ModelError::Consistency`], never as a client error.

mod config;
mod errors;

pub use config::ModelConfig;
pub use errors::{ModelError, ModelResult};

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::context::{ActorProvider, Clock, NoActor, OperationContext, OperationKind, SystemClock};
use crate::modifier::{normalize_modifier, ModifierRelaxer, ModifierTransformer, RelaxedSchema};
use crate::schema::custom::non_empty_string;
use crate::schema::{
    intersect, parse_document, SchemaCompiler, SchemaError, SchemaLinter, SchemaNode, ValidationIssue,
    ValidatorDocument,
};
use crate::store::{DocumentStore, StorageError, UpdateOutcome, ValidationLevel};

/// Options for inserts and upserts
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Skip application-layer parsing; the storage validator still applies
    pub bypass_schema: bool,
}

impl WriteOptions {
    pub fn bypass() -> Self {
        Self { bypass_schema: true }
    }
}

/// Options for updates
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub bypass_schema: bool,
    /// Insert a document when nothing matches
    pub upsert: bool,
}

/// Schema-validated collection
pub struct Model {
    collection: String,
    schema: SchemaNode,
    relaxed: RelaxedSchema,
    validator: Arc<ValidatorDocument>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    actors: Arc<dyn ActorProvider>,
    config: ModelConfig,
}

impl Model {
    /// Defines a model and attaches its validator to the collection.
    ///
    /// # Errors
    ///
    /// - `ModelError::Validation` (FATAL codes) if the schema fails the
    ///   linter or cannot be compiled
    /// - `ModelError::Storage` if the validator cannot be attached
    pub fn new(
        collection: impl Into<String>,
        schema: SchemaNode,
        store: Arc<dyn DocumentStore>,
        config: ModelConfig,
    ) -> ModelResult<Self> {
        let collection = collection.into();
        let in_collection = |e: SchemaError| ModelError::Validation(e.in_collection(collection.as_str()));

        SchemaLinter::lint(&schema).map_err(in_collection)?;
        let schema = if config.add_id_field {
            with_id_field(schema).map_err(in_collection)?
        } else {
            schema
        };

        let validator = Arc::new(SchemaCompiler::compile(&schema).map_err(in_collection)?);
        let relaxed = ModifierRelaxer::relax_schema(&schema).map_err(in_collection)?;
        store.set_validator(&collection, Arc::clone(&validator), config.settings())?;

        info!(
            event = "MODEL_REGISTERED",
            collection = %collection,
            validation_level = ?config.validation_level,
            validation_action = ?config.validation_action,
        );

        Ok(Self {
            collection,
            schema,
            relaxed,
            validator,
            store,
            clock: Arc::new(SystemClock),
            actors: Arc::new(NoActor),
            config,
        })
    }

    /// Replaces the clock auto-value fields read
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the provider of the current actor
    pub fn with_actors(mut self, actors: Arc<dyn ActorProvider>) -> Self {
        self.actors = actors;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The schema as enforced, including any added `_id`
    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    pub fn relaxed(&self) -> &RelaxedSchema {
        &self.relaxed
    }

    /// The compiled storage validator
    pub fn validator(&self) -> &Arc<ValidatorDocument> {
        &self.validator
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn context(&self, kind: OperationKind) -> OperationContext {
        OperationContext::new(kind, Arc::clone(&self.clock), Arc::clone(&self.actors))
    }

    /// Inserts a document and returns its `_id`.
    pub async fn insert(&self, document: Value, options: WriteOptions) -> ModelResult<String> {
        self.check_bypass(options.bypass_schema)?;
        let document = if options.bypass_schema {
            document
        } else {
            let ctx = self.context(OperationKind::Insert);
            parse_document(&self.schema, &document, &ctx).map_err(|issue| self.rejected(issue.into()))?
        };

        let id = self
            .store
            .insert_one(&self.collection, document)
            .await
            .map_err(|e| self.storage_error(e, options.bypass_schema))?;
        debug!(event = "MODEL_INSERT", collection = %self.collection, id = %id, bypass = options.bypass_schema);
        Ok(id)
    }

    /// Applies a modifier to the first document matching `selector`.
    ///
    /// The modifier is either explicit (`{"$set": {...}, "$inc": {...}}`) or
    /// a plain object, which is an implicit `$set`.
    pub async fn update(&self, selector: Value, modifier: Value, options: UpdateOptions) -> ModelResult<UpdateOutcome> {
        self.check_bypass(options.bypass_schema)?;
        let modifier = if options.bypass_schema {
            Value::Object(normalize_modifier(&self.relaxed, &modifier).map_err(|e| self.rejected(e))?)
        } else {
            let kind = if options.upsert {
                OperationKind::Upsert
            } else {
                OperationKind::Update
            };
            let ctx = self.context(kind);
            ModifierTransformer::parse_mongo_modifier(&self.relaxed, &modifier, options.upsert, &ctx)
                .map_err(|e| self.rejected(e))?
        };

        let outcome = self
            .store
            .update_one(&self.collection, &selector, modifier, options.upsert)
            .await
            .map_err(|e| self.storage_error(e, options.bypass_schema))?;
        debug!(
            event = "MODEL_UPDATE",
            collection = %self.collection,
            matched = outcome.matched,
            modified = outcome.modified,
            upserted = outcome.upserted_id.is_some(),
        );
        Ok(outcome)
    }

    /// Updates the first match or inserts a new document. Defaults of
    /// fields the modifier leaves out are written with `$setOnInsert`.
    pub async fn upsert(&self, selector: Value, modifier: Value, options: WriteOptions) -> ModelResult<UpdateOutcome> {
        self.update(
            selector,
            modifier,
            UpdateOptions {
                bypass_schema: options.bypass_schema,
                upsert: true,
            },
        )
        .await
    }

    /// First document matching `selector`, exactly as stored.
    ///
    /// Reads never run the schema: defaults, transforms and auto-values
    /// belong to writes, so a read cannot invent a value that was never
    /// written.
    pub async fn find_one(&self, selector: Value) -> ModelResult<Option<Value>> {
        Ok(self.store.find_one(&self.collection, &selector).await?)
    }

    /// Like [`find_one`](Self::find_one), but a missing document is an error
    pub async fn get(&self, selector: Value) -> ModelResult<Value> {
        self.find_one(selector).await?.ok_or_else(|| ModelError::NotFound {
            collection: self.collection.clone(),
        })
    }

    /// Every document matching `selector`, as stored
    pub async fn find(&self, selector: Value) -> ModelResult<Vec<Value>> {
        Ok(self.store.find(&self.collection, &selector).await?)
    }

    /// Removes every document matching `selector`
    pub async fn remove(&self, selector: Value) -> ModelResult<u64> {
        let removed = self.store.remove(&self.collection, &selector).await?;
        debug!(event = "MODEL_REMOVE", collection = %self.collection, removed);
        Ok(removed)
    }

    /// A bypassed write must still meet the storage validator
    fn check_bypass(&self, bypass: bool) -> ModelResult<()> {
        if bypass && self.config.validation_level == ValidationLevel::Off {
            return Err(self.rejected(SchemaError::validation_failed(ValidationIssue::new(
                "",
                "storage validation for a bypassed write",
                "validation level off",
            ))));
        }
        Ok(())
    }

    fn rejected(&self, err: SchemaError) -> ModelError {
        ModelError::Validation(err.in_collection(self.collection.as_str()))
    }

    fn storage_error(&self, err: StorageError, bypassed: bool) -> ModelError {
        match err {
            StorageError::DocumentFailedValidation { collection, issue } if bypassed => {
                ModelError::StorageRejected { collection, issue }
            }
            StorageError::DocumentFailedValidation { collection, issue } => {
                error!(
                    event = "SCHEMA_LAYER_DRIFT",
                    collection = %collection,
                    path = %issue.path,
                    expected = %issue.expected,
                    actual = %issue.actual,
                    "storage validator rejected an application-validated document"
                );
                ModelError::Consistency { collection, issue }
            }
            other => ModelError::Storage(other),
        }
    }
}

/// Adds an optional, non-empty `_id` to a root object that lacks one
fn with_id_field(schema: SchemaNode) -> Result<SchemaNode, SchemaError> {
    let schema = match schema {
        SchemaNode::Intersection(left, right) => intersect(&left, &right, "")?,
        other => other,
    };
    match schema {
        SchemaNode::Object(mut obj) => {
            if !obj.has_field("_id") {
                obj.fields.insert(0, ("_id".to_string(), non_empty_string().optional()));
            }
            Ok(SchemaNode::Object(obj))
        }
        other => Err(SchemaError::invalid_schema(
            "",
            format!("model schema must be an object, got {}", other.kind_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaErrorCode;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn schema() -> SchemaNode {
        SchemaNode::object([
            ("name", non_empty_string()),
            ("role", non_empty_string().default_value("member")),
        ])
    }

    fn model() -> Model {
        Model::new("users", schema(), Arc::new(InMemoryStore::new()), ModelConfig::default()).unwrap()
    }

    #[test]
    fn test_id_field_added() {
        let model = model();
        let SchemaNode::Object(obj) = model.schema() else {
            panic!("expected object");
        };
        assert_eq!(obj.fields[0].0, "_id");
        assert!(model.validator().as_value()["properties"].get("_id").is_some());
    }

    #[test]
    fn test_lint_failure_is_fatal() {
        let err = Model::new(
            "users",
            SchemaNode::object([("name", SchemaNode::string())]),
            Arc::new(InMemoryStore::new()),
            ModelConfig::default(),
        )
        .err()
        .unwrap();
        let ModelError::Validation(inner) = err else {
            panic!("expected validation error");
        };
        assert_eq!(inner.code(), SchemaErrorCode::AeroSchemaLintViolation);
        assert_eq!(inner.collection(), Some("users"));
    }

    #[tokio::test]
    async fn test_insert_applies_defaults() {
        let model = model();
        let id = model.insert(json!({"name": "ann"}), WriteOptions::default()).await.unwrap();
        let doc = model.get(json!({"_id": id})).await.unwrap();
        assert_eq!(doc["role"], "member");
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid() {
        let model = model();
        let err = model.insert(json!({"name": ""}), WriteOptions::default()).await.unwrap_err();
        assert_eq!(err.issue().map(|i| i.path.as_str()), Some("name"));
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let model = model();
        model
            .insert(json!({"_id": "1", "name": "ann"}), WriteOptions::default())
            .await
            .unwrap();
        let outcome = model
            .update(json!({"_id": "1"}), json!({"name": "bea"}), UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);
        assert_eq!(model.get(json!("1")).await.unwrap()["name"], "bea");

        assert_eq!(model.remove(json!({"_id": "1"})).await.unwrap(), 1);
        assert!(matches!(
            model.get(json!("1")).await.unwrap_err(),
            ModelError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_find_returns_stored_documents() {
        let model = model();
        model.insert(json!({"name": "a"}), WriteOptions::default()).await.unwrap();
        model.insert(json!({"name": "b"}), WriteOptions::default()).await.unwrap();
        let all = model.find(json!({})).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
