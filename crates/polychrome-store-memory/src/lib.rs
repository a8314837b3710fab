//! An in-memory [`Store`] implementation.
//!
//! The reference storage-engine semantics: per-collection
//! auto-increment ids, server-managed `createdAt`/`updatedAt`
//! timestamps, full condition matching, sort, skip and limit. Used by
//! the engine's test suite and useful as a scratch backend.

use polychrome::{Error, Filter, Query, Record, Result, SortDirection, Store};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-memory store. Cheap to create, safe to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct Memory {
    tables: RwLock<HashMap<String, Table>>,
}

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Record>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            } else if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
                a.cmp(b)
            } else {
                Ordering::Equal
            }
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait::async_trait]
impl Store for Memory {
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Record>> {
        let tables = self.tables.read().await;

        let Some(table) = tables.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Record> = table
            .rows
            .iter()
            .filter(|record| query.filter.matches(record.fields()))
            .collect();

        for sort in query.sort.iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = compare_fields(a.get(&sort.field), b.get(&sort.field));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let skipped = matched.into_iter().skip(query.skip as usize);
        let records: Vec<Record> = match query.limit {
            Some(limit) => skipped.take(limit as usize).cloned().collect(),
            None => skipped.cloned().collect(),
        };

        Ok(records)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Record>> {
        let tables = self.tables.read().await;

        Ok(tables.get(collection).and_then(|table| {
            table
                .rows
                .iter()
                .find(|record| filter.matches(record.fields()))
                .cloned()
        }))
    }

    async fn create(&self, collection: &str, payload: &Value) -> Result<Record> {
        let Some(fields) = payload.as_object() else {
            return Err(Error::Store(anyhow::anyhow!("create payload must be an object")));
        };

        let mut tables = self.tables.write().await;
        let table = tables.entry(collection.to_string()).or_default();

        let mut record = Record(fields.clone());

        // Honor an explicit id (upsert create path), otherwise assign
        // the next in sequence.
        let id = match record.get("id").and_then(Value::as_i64) {
            Some(id) => id,
            None => {
                table.next_id += 1;
                table.next_id
            }
        };
        table.next_id = table.next_id.max(id);

        record.insert("id", Value::from(id));
        let stamp = now();
        record.insert("createdAt", stamp.clone());
        record.insert("updatedAt", stamp);

        table.rows.push(record.clone());

        Ok(record)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Value,
    ) -> Result<Vec<Record>> {
        let Some(changes) = changes.as_object() else {
            return Err(Error::Store(anyhow::anyhow!("update changes must be an object")));
        };

        let mut tables = self.tables.write().await;

        let Some(table) = tables.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();

        for record in table
            .rows
            .iter_mut()
            .filter(|record| filter.matches(record.fields()))
        {
            for (key, value) in changes {
                record.insert(key.clone(), value.clone());
            }
            record.insert("updatedAt", now());
            updated.push(record.clone());
        }

        Ok(updated)
    }

    async fn destroy(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>> {
        let mut tables = self.tables.write().await;

        let Some(table) = tables.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let mut destroyed = Vec::new();

        table.rows.retain(|record| {
            if filter.matches(record.fields()) {
                destroyed.push(record.clone());
                false
            } else {
                true
            }
        });

        Ok(destroyed)
    }
}
