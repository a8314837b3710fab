//! The Polychrome engine: blueprint-driven verb handlers between an
//! HTTP boundary and a storage boundary, both external.
//!
//! Build an [`Ontology`] from blueprints, hand it to [`Handlers`] along
//! with a [`Store`] implementation (and optionally a [`Storage`]
//! adapter for uploads), then dispatch requests:
//!
//! ```no_run
//! # use polychrome::*;
//! # use std::sync::Arc;
//! # async fn example(store: Arc<dyn Store>) -> Result<()> {
//! let ontology: Ontology = [Blueprint::builder("test")
//!     .attribute("name", Attribute::of_type(AttributeType::String).required())
//!     .build()]
//! .into_iter()
//! .collect();
//!
//! let handlers = Handlers::new(Arc::new(ontology), store, Config::default())?;
//!
//! let mut request = Request::new().with_payload(serde_json::json!({"name": "test"}));
//! let response = handlers.post("test", &mut request).await?;
//! # Ok(())
//! # }
//! ```

pub use polychrome_core::{
    Attribute, AttributeType, Blueprint, Comparative, Compiler, Condition, ConstraintMap,
    ConstraintRule, ConstraintSet, DefaultValue, Error, Filter, HttpError, ModelSchemas,
    Multiplicity, Ontology, Relationship, Result, Schema, Verb,
};

mod handlers;
pub use handlers::{respond_with, Config, Handlers, Response};

mod query;
pub use query::QueryContext;

pub(crate) mod relation;

mod request;
pub use request::{FileUpload, Params, Request};

mod store;
pub use store::{Query, Record, SortDirection, SortKey, Store};

mod storage;
pub use storage::{Storage, UploadJob, UploadSource};

pub use async_trait::async_trait;
