use crate::handlers::Config;
use crate::store::{Query, SortDirection, SortKey};
use crate::{Blueprint, Condition, Filter};

use indexmap::IndexMap;
use serde_json::Value;

/// Per-request query scratch state: the resolved filter, the pagination
/// cursor and the sort spec, pulled out of the raw query string before
/// the store executes anything.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub filter: Filter,

    /// 0-indexed page. The query string is 1-indexed.
    pub page: u64,

    pub per_page: Option<u64>,

    pub sort: Vec<SortKey>,
}

impl QueryContext {
    /// Build the context from a raw query-string map. Consumes the
    /// `page` and `sortBy` meta keys; every remaining entry becomes an
    /// equality condition.
    pub fn from_query(raw: &IndexMap<String, Value>, blueprint: &Blueprint, config: &Config) -> QueryContext {
        let mut page = 0;
        let mut sort = Vec::new();
        let mut filter = Filter::new();

        for (key, value) in raw {
            match key.as_str() {
                "page" => {
                    // 1-indexed on the wire, 0-indexed internally.
                    page = as_u64(value).unwrap_or(0).saturating_sub(1);
                }
                "sortBy" => {
                    if let Some(spec) = value.as_str() {
                        sort = parse_sort(spec);
                    }
                }
                _ => {
                    filter.insert(key.clone(), Condition::Eq(coerce_query_value(value)));
                }
            }
        }

        if sort.is_empty() && blueprint.has_attribute("updatedAt") {
            sort.push(SortKey {
                field: "updatedAt".into(),
                direction: SortDirection::Desc,
            });
        }

        QueryContext {
            filter,
            page,
            per_page: config.per_page.filter(|per_page| *per_page > 0),
            sort,
        }
    }

    /// Lower into a store query: `skip = page * per_page`,
    /// `limit = per_page`. Pagination disabled entirely without a
    /// `per_page`.
    pub fn into_store_query(self) -> Query {
        let (skip, limit) = match self.per_page {
            Some(per_page) => (self.page * per_page, Some(per_page)),
            None => (0, None),
        };

        Query {
            filter: self.filter,
            skip,
            limit,
            sort: self.sort,
        }
    }
}

/// Parse `sortBy=col:dir,col2:dir2` into an ordered sort spec. A
/// missing or unrecognized direction sorts ascending.
fn parse_sort(spec: &str) -> Vec<SortKey> {
    spec.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }

            let (field, direction) = match part.split_once(':') {
                Some((field, direction)) => (field, direction),
                None => (part, "asc"),
            };

            Some(SortKey {
                field: field.trim().to_string(),
                direction: if direction.trim().eq_ignore_ascii_case("desc") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                },
            })
        })
        .collect()
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Query-string values arrive as strings; coerce numerals and booleans
/// so they compare against typed record fields.
pub(crate) fn coerce_query_value(value: &Value) -> Value {
    let Some(s) = value.as_str() else {
        return value.clone();
    };

    if let Ok(n) = s.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = s.parse::<f64>() {
        return Value::from(n);
    }
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attribute, AttributeType};
    use serde_json::json;

    fn blueprint() -> Blueprint {
        Blueprint::builder("test")
            .attribute("name", Attribute::of_type(AttributeType::String))
            .build()
    }

    fn config(per_page: Option<u64>) -> Config {
        Config { per_page }
    }

    #[test]
    fn page_is_one_indexed_on_the_wire() {
        let mut raw = IndexMap::new();
        raw.insert("page".to_string(), json!("3"));

        let ctx = QueryContext::from_query(&raw, &blueprint(), &config(Some(10)));
        assert_eq!(ctx.page, 2);
        assert!(!ctx.filter.contains_key("page"));

        let query = ctx.into_store_query();
        assert_eq!(query.skip, 20);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn absent_or_low_page_skips_nothing() {
        let raw = IndexMap::new();
        let query =
            QueryContext::from_query(&raw, &blueprint(), &config(Some(10))).into_store_query();
        assert_eq!(query.skip, 0);

        let mut raw = IndexMap::new();
        raw.insert("page".to_string(), json!("1"));
        let query =
            QueryContext::from_query(&raw, &blueprint(), &config(Some(10))).into_store_query();
        assert_eq!(query.skip, 0);
    }

    #[test]
    fn zero_per_page_disables_pagination() {
        let mut raw = IndexMap::new();
        raw.insert("page".to_string(), json!("5"));

        let query =
            QueryContext::from_query(&raw, &blueprint(), &config(Some(0))).into_store_query();
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, None);
    }

    #[test]
    fn sort_by_parses_ordered_spec() {
        let mut raw = IndexMap::new();
        raw.insert("sortBy".to_string(), json!("age:desc,name"));

        let ctx = QueryContext::from_query(&raw, &blueprint(), &config(None));
        assert_eq!(
            ctx.sort,
            vec![
                SortKey {
                    field: "age".into(),
                    direction: SortDirection::Desc
                },
                SortKey {
                    field: "name".into(),
                    direction: SortDirection::Asc
                },
            ]
        );
        assert!(!ctx.filter.contains_key("sortBy"));
    }

    #[test]
    fn default_sort_when_blueprint_declares_updated_at() {
        let blueprint = Blueprint::builder("test")
            .attribute("updatedAt", Attribute::of_type(AttributeType::Datetime))
            .build();

        let ctx = QueryContext::from_query(&IndexMap::new(), &blueprint, &config(None));
        assert_eq!(
            ctx.sort,
            vec![SortKey {
                field: "updatedAt".into(),
                direction: SortDirection::Desc
            }]
        );
    }

    #[test]
    fn remaining_keys_become_coerced_equality_conditions() {
        let mut raw = IndexMap::new();
        raw.insert("age".to_string(), json!("30"));
        raw.insert("name".to_string(), json!("dave"));

        let ctx = QueryContext::from_query(&raw, &blueprint(), &config(None));
        assert_eq!(ctx.filter.get("age"), Some(&Condition::Eq(json!(30))));
        assert_eq!(ctx.filter.get("name"), Some(&Condition::Eq(json!("dave"))));
    }
}
