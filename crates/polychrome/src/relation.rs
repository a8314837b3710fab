//! Association resolution: expanding queries across relationship
//! attributes and pre-resolving relationship-valued payloads.

use crate::store::{Query, Record, Store};
use crate::{Blueprint, Condition, Filter, Ontology, Relationship, Result};

use futures::future::try_join_all;
use serde_json::Value;

/// Pull relationship-aliased keys out of the primary filter and resolve
/// each one against the *target* blueprint's store, concurrently. The
/// matching target ids are folded back into the primary filter as `In`
/// conditions before the primary find executes.
///
/// Returns the expanded filter and whether any relationship keys were
/// present (in which case the caller skips the populate-all strategy).
pub(crate) async fn expand_filter(
    store: &dyn Store,
    blueprint: &Blueprint,
    mut filter: Filter,
) -> Result<(Filter, bool)> {
    let mut subqueries = Vec::new();

    for relationship in &blueprint.relationships {
        if let Some(condition) = filter.remove(&relationship.alias) {
            subqueries.push((relationship, condition));
        }
    }

    if subqueries.is_empty() {
        return Ok((filter, false));
    }

    let resolved = try_join_all(subqueries.iter().map(|(relationship, condition)| async move {
        let target_filter = subquery_filter(condition);
        let related = store
            .find(&relationship.target, &Query::from_filter(target_filter))
            .await?;

        let ids = related
            .iter()
            .filter_map(|record| record.id().cloned())
            .collect::<Vec<_>>();

        tracing::debug!(
            alias = relationship.alias.as_str(),
            target = relationship.target.as_str(),
            matches = ids.len(),
            "relationship subquery resolved"
        );

        Ok::<_, crate::Error>((relationship.alias.clone(), ids))
    }))
    .await?;

    for (alias, ids) in resolved {
        filter.insert(alias, Condition::In(ids));
    }

    Ok((filter, true))
}

/// The filter a relationship subquery runs against its target store.
/// An object value filters the target by its entries; a scalar is the
/// target's identifier.
fn subquery_filter(condition: &Condition) -> Filter {
    match condition {
        Condition::Eq(Value::Object(entries)) => entries
            .iter()
            .map(|(key, value)| (key.clone(), Condition::Eq(value.clone())))
            .collect(),
        Condition::Eq(scalar) => Filter::by_id(scalar.clone()),
        other => {
            let mut filter = Filter::new();
            filter.insert("id", other.clone());
            filter
        }
    }
}

/// Populate every relation of every record: the full "populate all
/// relations, paginated per relation" strategy used when no
/// relationship keys were present in the query.
pub(crate) async fn populate(
    store: &dyn Store,
    ontology: &Ontology,
    blueprint: &Blueprint,
    records: &mut [Record],
    per_page: Option<u64>,
) -> Result<()> {
    for relationship in &blueprint.relationships {
        ontology.expect(&relationship.target)?;

        for record in records.iter_mut() {
            let related = if relationship.is_many() {
                let Some(id) = record.id().cloned() else {
                    continue;
                };

                let via = relationship
                    .via
                    .clone()
                    .unwrap_or_else(|| blueprint.name.clone());

                let mut filter = Filter::new();
                filter.insert(via, Condition::Eq(id));

                let found = store
                    .find(
                        &relationship.target,
                        &Query {
                            filter,
                            skip: 0,
                            limit: per_page,
                            sort: Vec::new(),
                        },
                    )
                    .await?;

                Value::Array(found.iter().map(Record::to_json).collect())
            } else {
                // The record holds the related id under the alias.
                let Some(id) = record.get(&relationship.alias).cloned() else {
                    continue;
                };
                if id.is_null() || id.is_object() {
                    continue;
                }

                match store
                    .find_one(&relationship.target, &Filter::by_id(id))
                    .await?
                {
                    Some(found) => found.to_json(),
                    None => continue,
                }
            };

            record.insert(relationship.alias.clone(), related);
        }
    }

    Ok(())
}

/// Find-or-create every nested related record in the payload against
/// its target store, substituting the resulting ids, *before* the
/// primary write.
///
/// This two-phase ordering (resolve related, then write primary) is
/// mandatory, not an implementation detail: the primary payload must
/// carry plain identifiers by the time it reaches the store. There is
/// no rollback of created related records if the primary write later
/// fails.
pub(crate) async fn resolve_related_payload(
    store: &dyn Store,
    ontology: &Ontology,
    blueprint: &Blueprint,
    payload: &mut Value,
) -> Result<()> {
    let Some(object) = payload.as_object() else {
        return Ok(());
    };

    let pending: Vec<(&Relationship, Value)> = blueprint
        .relationships
        .iter()
        .filter_map(|relationship| {
            object
                .get(&relationship.alias)
                .map(|value| (relationship, value.clone()))
        })
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let resolved = try_join_all(pending.into_iter().map(|(relationship, value)| async move {
        ontology.expect(&relationship.target)?;

        let replacement = match value {
            Value::Array(items) => Value::Array(
                try_join_all(
                    items
                        .into_iter()
                        .map(|item| find_or_create(store, &relationship.target, item)),
                )
                .await?,
            ),
            other => find_or_create(store, &relationship.target, other).await?,
        };

        Ok::<_, crate::Error>((relationship.alias.clone(), replacement))
    }))
    .await?;

    let object = payload.as_object_mut().unwrap();
    for (alias, replacement) in resolved {
        object.insert(alias, replacement);
    }

    Ok(())
}

/// Resolve one related value to an identifier. Scalars are already
/// identifiers; nested objects are looked up by their scalar entries
/// and created when absent. Races here are last-write-wins.
async fn find_or_create(store: &dyn Store, target: &str, value: Value) -> Result<Value> {
    let Value::Object(entries) = value else {
        return Ok(value);
    };

    let filter: Filter = entries
        .iter()
        .filter(|(_, value)| !value.is_object() && !value.is_array())
        .map(|(key, value)| (key.clone(), Condition::Eq(value.clone())))
        .collect();

    let existing = if filter.is_empty() {
        None
    } else {
        store.find_one(target, &filter).await?
    };

    let record = match existing {
        Some(record) => record,
        None => store.create(target, &Value::Object(entries)).await?,
    };

    record
        .id()
        .cloned()
        .ok_or_else(|| crate::Error::Store(anyhow::anyhow!("related record has no id")))
}

/// Drop relationship-valued keys from a working filter; they are not
/// plain columns.
pub(crate) fn strip_relationship_keys(filter: &mut Filter, blueprint: &Blueprint) {
    for relationship in &blueprint.relationships {
        filter.remove(&relationship.alias);
    }
}
