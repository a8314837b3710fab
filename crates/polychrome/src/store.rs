use crate::{Filter, Result};

use serde_json::Value;
use std::fmt::Debug;

/// The storage-engine boundary: per-blueprint CRUD primitives.
///
/// Implementations provide their own internal concurrency safety and
/// per-record atomicity for create/update/destroy; the engine assumes
/// no cross-record transactions.
#[async_trait::async_trait]
pub trait Store: Debug + Send + Sync + 'static {
    /// Find every record matching the query, honoring its pagination
    /// and sort.
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Record>>;

    /// Find the first record matching the filter.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Record>>;

    /// Create a record from the payload, returning it with its
    /// generated id and timestamps.
    async fn create(&self, collection: &str, payload: &Value) -> Result<Record>;

    /// Apply the changes to every record matching the filter, returning
    /// the updated records.
    async fn update(&self, collection: &str, filter: &Filter, changes: &Value)
        -> Result<Vec<Record>>;

    /// Destroy every record matching the filter, returning what was
    /// destroyed.
    async fn destroy(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>>;
}

/// A find operation: filter plus pagination and sort.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Filter,
    pub skip: u64,
    pub limit: Option<u64>,
    pub sort: Vec<SortKey>,
}

impl Query {
    pub fn from_filter(filter: Filter) -> Query {
        Query {
            filter,
            ..Query::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A stored record: a JSON object with an `id` and server-managed
/// timestamps.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Record(pub serde_json::Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn fields(&self) -> &serde_json::Map<String, Value> {
        &self.0
    }

    /// Serialize for a response, stripping null entries.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }
}

impl From<serde_json::Map<String, Value>> for Record {
    fn from(fields: serde_json::Map<String, Value>) -> Record {
        Record(fields)
    }
}
