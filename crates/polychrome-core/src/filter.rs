use crate::Comparative;

use indexmap::IndexMap;
use serde_json::Value;

/// An ordered set of per-field conditions, the shape every query against
/// the store boils down to.
///
/// Compiled constraints, query-string filters and relationship subquery
/// results all merge into one of these before the store executes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: IndexMap<String, Condition>,
}

/// A single condition on a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq(Value),
    /// Field compares to the value with the given comparative.
    Cmp(Comparative, Value),
    /// Field is one of the values. Produced by relationship subquery
    /// resolution.
    In(Vec<Value>),
}

impl Filter {
    pub fn new() -> Filter {
        Filter::default()
    }

    /// A filter matching a single record by id.
    pub fn by_id(id: Value) -> Filter {
        let mut filter = Filter::new();
        filter.insert("id", Condition::Eq(id));
        filter
    }

    pub fn insert(&mut self, field: impl Into<String>, condition: Condition) {
        self.conditions.insert(field.into(), condition);
    }

    pub fn remove(&mut self, field: &str) -> Option<Condition> {
        self.conditions.shift_remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.conditions.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.conditions.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.conditions.keys()
    }

    /// Merge another filter into this one, overwriting on key collision.
    pub fn extend(&mut self, other: Filter) {
        for (field, condition) in other.conditions {
            self.conditions.insert(field, condition);
        }
    }

    /// Whether a record object satisfies every condition in the filter.
    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(record.get(field.as_str())))
    }
}

impl FromIterator<(String, Condition)> for Filter {
    fn from_iter<T: IntoIterator<Item = (String, Condition)>>(iter: T) -> Filter {
        Filter {
            conditions: iter.into_iter().collect(),
        }
    }
}

impl Condition {
    /// Whether the actual field value (absent fields come through as
    /// `None`) satisfies this condition.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Condition::Eq(expected) => match actual {
                Some(actual) => value_eq(actual, expected),
                None => expected.is_null(),
            },
            Condition::In(expected) => match actual {
                Some(actual) => expected.iter().any(|value| value_eq(actual, value)),
                None => false,
            },
            Condition::Cmp(comparative, expected) => {
                let Some(actual) = actual else {
                    // An absent field only satisfies a not-equal check
                    // against a non-null value.
                    return matches!(comparative, Comparative::Not) && !expected.is_null();
                };
                compare(*comparative, actual, expected)
            }
        }
    }
}

fn compare(comparative: Comparative, actual: &Value, expected: &Value) -> bool {
    use Comparative::*;

    match comparative {
        Not => !value_eq(actual, expected),
        Lt | Gt | Le | Ge => {
            if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
                match comparative {
                    Lt => a < b,
                    Gt => a > b,
                    Le => a <= b,
                    Ge => a >= b,
                    _ => unreachable!(),
                }
            } else if let (Some(a), Some(b)) = (actual.as_str(), expected.as_str()) {
                match comparative {
                    Lt => a < b,
                    Gt => a > b,
                    Le => a <= b,
                    Ge => a >= b,
                    _ => unreachable!(),
                }
            } else {
                false
            }
        }
        StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => a.starts_with(b),
            _ => false,
        },
        EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => a.ends_with(b),
            _ => false,
        },
        Like => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => like_match(a, b),
            _ => false,
        },
    }
}

/// Loose equality: numbers compare by value regardless of their JSON
/// representation (`1` vs `1.0`), everything else compares strictly.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// `%` wildcard matching, the waterline `like` convention.
fn like_match(haystack: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();

    if parts.len() == 1 {
        return haystack == pattern;
    }

    let mut rest = haystack;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }

        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn eq_matches_loosely_across_number_representations() {
        let condition = Condition::Eq(json!(1));
        assert!(condition.matches(Some(&json!(1.0))));
        assert!(!condition.matches(Some(&json!(2))));
        assert!(!condition.matches(None));
    }

    #[test]
    fn comparatives_on_numbers() {
        assert!(Condition::Cmp(Comparative::Gt, json!(0)).matches(Some(&json!(100))));
        assert!(!Condition::Cmp(Comparative::Gt, json!(100)).matches(Some(&json!(100))));
        assert!(Condition::Cmp(Comparative::Ge, json!(100)).matches(Some(&json!(100))));
        assert!(Condition::Cmp(Comparative::Lt, json!(10)).matches(Some(&json!(9))));
        assert!(Condition::Cmp(Comparative::Le, json!(9)).matches(Some(&json!(9))));
    }

    #[test]
    fn string_comparatives() {
        assert!(Condition::Cmp(Comparative::StartsWith, json!("da")).matches(Some(&json!("dave"))));
        assert!(Condition::Cmp(Comparative::EndsWith, json!("ve")).matches(Some(&json!("dave"))));
        assert!(!Condition::Cmp(Comparative::StartsWith, json!("ve")).matches(Some(&json!("dave"))));
        assert!(Condition::Cmp(Comparative::Not, json!("dave")).matches(Some(&json!("jane"))));
    }

    #[test]
    fn like_patterns() {
        let cond = |pattern: &str| Condition::Cmp(Comparative::Like, json!(pattern));
        assert!(cond("%col%").matches(Some(&json!("multicolour"))));
        assert!(cond("multi%").matches(Some(&json!("multicolour"))));
        assert!(cond("%colour").matches(Some(&json!("multicolour"))));
        assert!(!cond("%green%").matches(Some(&json!("multicolour"))));
        assert!(cond("exact").matches(Some(&json!("exact"))));
    }

    #[test]
    fn in_condition() {
        let condition = Condition::In(vec![json!(1), json!(2)]);
        assert!(condition.matches(Some(&json!(2))));
        assert!(!condition.matches(Some(&json!(3))));
        assert!(!condition.matches(None));
    }

    #[test]
    fn filter_matches_all_conditions() {
        let mut filter = Filter::new();
        filter.insert("name", Condition::Eq(json!("test")));
        filter.insert("age", Condition::Cmp(Comparative::Ge, json!(18)));

        assert!(filter.matches(&record(json!({"name": "test", "age": 30}))));
        assert!(!filter.matches(&record(json!({"name": "test", "age": 12}))));
        assert!(!filter.matches(&record(json!({"name": "other", "age": 30}))));
    }

    #[test]
    fn extend_overwrites_on_collision() {
        let mut filter = Filter::by_id(json!(1));
        let mut other = Filter::new();
        other.insert("id", Condition::Eq(json!(2)));
        filter.extend(other);

        assert_eq!(filter.get("id"), Some(&Condition::Eq(json!(2))));
    }
}
