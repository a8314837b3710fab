//! The verb handlers: each one turns an inbound request into a
//! validated store operation and a shaped JSON response.
//!
//! Every request moves through the same stages: compile constraints,
//! build the query, execute the store, then shape the result or
//! surface a typed HTTP error.

use crate::query::{coerce_query_value, QueryContext};
use crate::relation;
use crate::store::{Query, Record, Store};
use crate::storage::Storage;
use crate::{
    Compiler, Condition, ConstraintSet, Error, Filter, HttpError, ModelSchemas, Ontology, Request,
    Result, Verb,
};

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Engine configuration, as consumed from the host application's
/// settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Default page size. Absent or zero disables pagination.
    pub per_page: Option<u64>,
}

/// A normalized handler result: a status code and the serialized
/// record list.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub records: Vec<Value>,
}

impl Response {
    fn ok(records: Vec<Value>) -> Response {
        Response {
            status: 200,
            records,
        }
    }
}

/// Callback-style boundary adapter: splits a handler result into the
/// `(error, result)` pair callback-oriented HTTP layers expect.
pub fn respond_with<F>(result: Result<Response>, callback: F)
where
    F: FnOnce(Option<Error>, Option<Response>),
{
    match result {
        Ok(response) => callback(None, Some(response)),
        Err(err) => callback(Some(err), None),
    }
}

/// The CRUD handler set, constructed with everything it needs: the
/// frozen ontology, the storage engine, an optional file-storage
/// adapter and the engine config. Handlers never read ambient globals.
#[derive(Debug)]
pub struct Handlers {
    ontology: Arc<Ontology>,
    schemas: IndexMap<String, ModelSchemas>,
    store: Arc<dyn Store>,
    storage: Option<Arc<dyn Storage>>,
    config: Config,
}

impl Handlers {
    /// Build the handler set, deriving validation schemas for every
    /// blueprint up front. Fails fast on unknown attribute types or
    /// dangling relationship targets.
    pub fn new(ontology: Arc<Ontology>, store: Arc<dyn Store>, config: Config) -> Result<Handlers> {
        let mut schemas = IndexMap::new();

        for blueprint in ontology.blueprints() {
            schemas.insert(
                blueprint.name.clone(),
                ModelSchemas::generate(blueprint, &ontology)?,
            );
        }

        Ok(Handlers {
            ontology,
            schemas,
            store,
            storage: None,
            config,
        })
    }

    /// Attach a file-storage adapter, enabling the UPLOAD handler.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Handlers {
        self.storage = Some(storage);
        self
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// The validation shapes derived for a blueprint.
    pub fn schemas(&self, collection: &str) -> Option<&ModelSchemas> {
        self.schemas.get(collection)
    }

    /// Compile a verb's constraint rules against the request.
    fn compile_constraints(&self, request: &Request, rules: &ConstraintSet) -> Result<Filter> {
        Compiler::new()
            .set_source(request.constraint_source())
            .set_rules(rules.clone())
            .compile()
    }

    /// Posted data implies record creation.
    ///
    /// On success the new record's id is folded into `params.id` and
    /// control transfers to GET, so create and read share one response
    /// shape.
    pub async fn post(&self, collection: &str, request: &mut Request) -> Result<Response> {
        let blueprint = self.ontology.expect(collection)?;
        let schemas = &self.schemas[collection];

        let payload = request.payload.clone().unwrap_or_else(|| json!({}));
        let mut payload = schemas.create.validate(&payload, &self.ontology)?;

        // Constraints on POST are pre-database checks against the raw
        // request.
        if let Some(rules) = blueprint.constraints.get(Verb::Post) {
            let constraints = self.compile_constraints(request, rules)?;
            let source = request.constraint_source();

            for (key, condition) in constraints.iter() {
                if let Some(actual) = source.get(key.as_str()) {
                    if !condition.matches(Some(actual)) {
                        return Err(
                            HttpError::precondition_failed("Constraints validation failed").into(),
                        );
                    }
                }
            }

            // Equality constraints fold into the payload; comparatives
            // only gate the precondition above.
            let object = payload.as_object_mut().expect("validated payload is an object");
            for (key, condition) in constraints.iter() {
                if let Condition::Eq(value) = condition {
                    object.insert(key.clone(), value.clone());
                }
            }
        }

        let created = self.store.create(collection, &payload).await?;
        tracing::debug!(collection, id = ?created.id(), "record created");

        request.params.id = created.id().cloned();
        self.read(collection, request, true, 200).await
    }

    /// Fetch records by query string and optional id param.
    pub async fn get(&self, collection: &str, request: &Request) -> Result<Response> {
        self.read(collection, request, false, 200).await
    }

    /// The shared read path. `internal` is set when another handler
    /// delegates here right after a write, skipping `get` constraints
    /// so a just-created record is not filtered away.
    async fn read(
        &self,
        collection: &str,
        request: &Request,
        internal: bool,
        status: u16,
    ) -> Result<Response> {
        let blueprint = self.ontology.expect(collection)?;

        let mut ctx = QueryContext::from_query(&request.query, blueprint, &self.config);

        if let Some(id) = &request.params.id {
            ctx.filter.insert("id", Condition::Eq(coerce_query_value(id)));
        }

        if !internal {
            if let Some(rules) = blueprint.constraints.get(Verb::Get) {
                ctx.filter.extend(self.compile_constraints(request, rules)?);
            }
        }

        // Relationship keys in the filter become concurrent subqueries
        // against their target stores.
        let mut populated_by_key = false;
        if blueprint.has_relationships() {
            let (expanded, had_keys) =
                relation::expand_filter(self.store.as_ref(), blueprint, ctx.filter).await?;
            ctx.filter = expanded;
            populated_by_key = had_keys;
        }

        let filtered_by_id = ctx.filter.contains_key("id");
        let per_page = ctx.per_page;
        let query = ctx.into_store_query();

        tracing::debug!(collection, ?query, "executing find");
        let mut records = self.store.find(collection, &query).await?;

        if filtered_by_id && records.is_empty() {
            return Err(Error::not_found());
        }

        if blueprint.has_relationships() && !populated_by_key {
            relation::populate(
                self.store.as_ref(),
                &self.ontology,
                blueprint,
                &mut records,
                per_page,
            )
            .await?;
        }

        Ok(Response {
            status,
            records: records.iter().map(Record::to_json).collect(),
        })
    }

    /// Patch data implies a partial update of one record.
    pub async fn patch(&self, collection: &str, request: &mut Request) -> Result<Response> {
        let blueprint = self.ontology.expect(collection)?;
        let schemas = &self.schemas[collection];

        let mut filter = Filter::new();
        if let Some(id) = &request.params.id {
            filter.insert("id", Condition::Eq(coerce_query_value(id)));
        }

        if let Some(rules) = blueprint.constraints.get(Verb::Patch) {
            filter.extend(self.compile_constraints(request, rules)?);
        }

        let payload = request.payload.clone().unwrap_or_else(|| json!({}));
        let changes = schemas.update.validate(&payload, &self.ontology)?;

        self.store.update(collection, &filter, &changes).await?;
        self.read(collection, request, false, 200).await
    }

    /// Put data implies replacement: upsert keyed by an explicit or
    /// query-derived identity.
    pub async fn put(&self, collection: &str, request: &mut Request) -> Result<Response> {
        let blueprint = self.ontology.expect(collection)?;
        let schemas = &self.schemas[collection];

        let mut payload = request.payload.clone().unwrap_or_else(|| json!({}));

        // Phase one: find-or-create any nested related records and
        // substitute their ids, before the primary write.
        relation::resolve_related_payload(
            self.store.as_ref(),
            &self.ontology,
            blueprint,
            &mut payload,
        )
        .await?;

        // The working filter. An explicit id wins; otherwise identity
        // derives from the query string merged with the payload's
        // scalar fields.
        let mut filter = match &request.params.id {
            Some(id) => Filter::by_id(coerce_query_value(id)),
            None => {
                let mut filter = Filter::new();
                for (key, value) in &request.query {
                    if key != "page" && key != "sortBy" {
                        filter.insert(key.clone(), Condition::Eq(coerce_query_value(value)));
                    }
                }
                if let Some(object) = payload.as_object() {
                    for (key, value) in object {
                        if !value.is_object() && !value.is_array() {
                            filter.insert(key.clone(), Condition::Eq(value.clone()));
                        }
                    }
                }
                filter
            }
        };

        relation::strip_relationship_keys(&mut filter, blueprint);

        if let Some(rules) = blueprint.constraints.get(Verb::Put) {
            filter.extend(self.compile_constraints(request, rules)?);
        }

        match self.store.find_one(collection, &filter).await? {
            None => {
                let mut validated = schemas.create.validate(&payload, &self.ontology)?;
                if let Some(id) = &request.params.id {
                    validated
                        .as_object_mut()
                        .expect("validated payload is an object")
                        .insert("id".into(), coerce_query_value(id));
                }

                let created = self.store.create(collection, &validated).await?;
                tracing::debug!(collection, id = ?created.id(), "upsert created");

                request.params.id = created.id().cloned();
                self.read(collection, request, true, 200).await
            }
            Some(existing) => {
                let changes = schemas.update.validate(&payload, &self.ontology)?;
                self.store.update(collection, &filter, &changes).await?;
                tracing::debug!(collection, id = ?existing.id(), "upsert updated");

                request.params.id = existing.id().cloned();
                self.read(collection, request, false, 200).await
            }
        }
    }

    /// Delete implies permanent destruction. Zero matches is a 404,
    /// never a silent no-op.
    pub async fn delete(&self, collection: &str, request: &Request) -> Result<Response> {
        let blueprint = self.ontology.expect(collection)?;

        let mut filter = Filter::new();
        if let Some(id) = &request.params.id {
            filter.insert("id", Condition::Eq(coerce_query_value(id)));
        }

        if let Some(rules) = blueprint.constraints.get(Verb::Delete) {
            filter.extend(self.compile_constraints(request, rules)?);
        }

        let found = self
            .store
            .find(collection, &Query::from_filter(filter.clone()))
            .await?;

        if found.is_empty() {
            return Err(Error::not_found());
        }

        let destroyed = self.store.destroy(collection, &filter).await?;
        tracing::debug!(collection, count = destroyed.len(), "records destroyed");

        Ok(Response::ok(destroyed.iter().map(Record::to_json).collect()))
    }

    /// Bind an uploaded file to a host record: find the record,
    /// transfer the bytes under a generated unique name, then mark the
    /// record with the stored filename.
    pub async fn upload(&self, collection: &str, request: &mut Request) -> Result<Response> {
        let blueprint = self.ontology.expect(collection)?;

        let storage = self.storage.as_ref().ok_or_else(|| {
            Error::Store(anyhow::anyhow!("no storage adapter configured for uploads"))
        })?;

        // The upload route is always id-scoped; without one there is no
        // host document to bind to.
        let Some(id) = request.params.id.clone() else {
            return Err(Error::not_found());
        };

        let mut filter = Filter::by_id(coerce_query_value(&id));

        if let Some(rules) = blueprint.constraints.get(Verb::Post) {
            filter.extend(self.compile_constraints(request, rules)?);
        }

        let Some(host) = self.store.find_one(collection, &filter).await? else {
            let id = match &id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(HttpError::not_found(format!(
                "Upload failed, could not find the host document with the id \"{id}\"."
            ))
            .into());
        };

        let upload = request.upload.take().ok_or_else(|| Error::Validation {
            field: "file".into(),
            message: "no file in payload".into(),
        })?;

        // uuid + lowercased original extension.
        let extension = Path::new(&upload.filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let name = format!("{}{extension}", Uuid::new_v4());

        let job = storage.upload(upload.source, &name).await?;
        job.finish().await?;

        let mut changes = serde_json::Map::new();
        changes.insert("pending".into(), Value::Bool(false));
        changes.insert(blueprint.upload_field().into(), Value::String(name));

        let host_filter = Filter::by_id(host.id().cloned().unwrap_or(Value::Null));
        self.store
            .update(collection, &host_filter, &Value::Object(changes))
            .await?;

        self.read(collection, request, false, 202).await
    }
}
