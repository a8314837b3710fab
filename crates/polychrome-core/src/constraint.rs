//! Constraints are a code-less way to express business logic.
//!
//! A rule maps an output field name to either a dotted path into the
//! request context (optionally prefixed with a comparative symbol), a
//! literal value, or a computed function. Rules are parsed once at load
//! time into [`ConstraintRule`] variants; per request the [`Compiler`]
//! resolves them against a JSON source into a [`Filter`].
//!
//! ```
//! use polychrome_core::{Compiler, ConstraintRule, ConstraintSet};
//! use serde_json::json;
//!
//! let mut rules = ConstraintSet::new();
//! rules.insert("age".into(), ConstraintRule::path("> request.payload.age").unwrap());
//!
//! let filter = Compiler::new()
//!     .set_source(json!({"request": {"payload": {"age": 0}}}))
//!     .set_rules(rules)
//!     .compile()
//!     .unwrap();
//! ```

use crate::{Condition, Error, Filter, Result};

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// The supported comparative operations a rule may prefix its value
/// with. At most one per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparative {
    Lt,
    Gt,
    Le,
    Ge,
    Not,
    StartsWith,
    EndsWith,
    Like,
}

impl Comparative {
    /// Parse a comparative symbol token. Returns `None` for anything
    /// outside the supported set.
    pub fn parse(symbol: &str) -> Option<Comparative> {
        match symbol {
            "<" => Some(Comparative::Lt),
            ">" => Some(Comparative::Gt),
            "<=" => Some(Comparative::Le),
            ">=" => Some(Comparative::Ge),
            "!" => Some(Comparative::Not),
            "^" => Some(Comparative::StartsWith),
            "$" => Some(Comparative::EndsWith),
            "%" => Some(Comparative::Like),
            _ => None,
        }
    }

}

/// A function rule, invoked with the request source at compile time.
pub type ComputedRule = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A single constraint rule, parsed at load time.
#[derive(Clone)]
pub enum ConstraintRule {
    /// A dotted path into the request context, resolved per request.
    /// Missing paths resolve to `null`.
    Path {
        comparative: Option<Comparative>,
        path: String,
    },
    /// A literal value used as-is (`compile: false` in declarative
    /// sources).
    Literal {
        comparative: Option<Comparative>,
        value: Value,
    },
    /// A pure function producing the value from the source.
    Computed(ComputedRule),
}

impl ConstraintRule {
    /// Parse a path rule: `([comparative ]object.path)`.
    pub fn path(raw: &str) -> Result<ConstraintRule> {
        let (comparative, token) = split_rule(raw)?;
        Ok(ConstraintRule::Path {
            comparative,
            path: token.to_string(),
        })
    }

    /// Parse a literal rule: `([comparative ]value)`. The value token is
    /// coerced to a JSON scalar where possible (`"18"` becomes `18`).
    pub fn literal(raw: &str) -> Result<ConstraintRule> {
        let (comparative, token) = split_rule(raw)?;
        Ok(ConstraintRule::Literal {
            comparative,
            value: coerce_scalar(token),
        })
    }

    /// A literal rule wrapping an already-typed value.
    pub fn value(value: impl Into<Value>) -> ConstraintRule {
        ConstraintRule::Literal {
            comparative: None,
            value: value.into(),
        }
    }

    /// A computed rule.
    pub fn computed<F>(f: F) -> ConstraintRule
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        ConstraintRule::Computed(Arc::new(f))
    }
}

impl core::fmt::Debug for ConstraintRule {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ConstraintRule::Path { comparative, path } => f
                .debug_struct("Path")
                .field("comparative", comparative)
                .field("path", path)
                .finish(),
            ConstraintRule::Literal { comparative, value } => f
                .debug_struct("Literal")
                .field("comparative", comparative)
                .field("value", value)
                .finish(),
            ConstraintRule::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Split a raw rule string into its optional comparative and its value
/// token. More than two whitespace-separated tokens is a malformed
/// rule.
fn split_rule(raw: &str) -> Result<(Option<Comparative>, &str)> {
    let parts: Vec<&str> = raw.split_whitespace().collect();

    match parts.as_slice() {
        [] => Err(Error::MalformedConstraint("no value".into())),
        [token] => Ok((None, token)),
        [symbol, token] => match Comparative::parse(symbol) {
            Some(comparative) => Ok((Some(comparative), token)),
            None => Err(Error::UnknownComparative(symbol.to_string())),
        },
        parts => Err(Error::MalformedConstraint(format!(
            "too many parts ({} > 2). ([comparative? ]object.path)",
            parts.len()
        ))),
    }
}

/// Coerce a raw token into a JSON scalar.
fn coerce_scalar(token: &str) -> Value {
    if let Ok(n) = token.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = token.parse::<f64>() {
        return Value::from(n);
    }
    match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => Value::String(token.to_string()),
    }
}

/// Named rules for one verb.
pub type ConstraintSet = IndexMap<String, ConstraintRule>;

/// The verbs a blueprint may constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Post,
    Get,
    Patch,
    Put,
    Delete,
}

/// Per-verb constraint rule sets declared on a blueprint.
#[derive(Debug, Clone, Default)]
pub struct ConstraintMap {
    verbs: IndexMap<Verb, ConstraintSet>,
}

impl ConstraintMap {
    pub fn new() -> ConstraintMap {
        ConstraintMap::default()
    }

    pub fn insert(&mut self, verb: Verb, rules: ConstraintSet) {
        self.verbs.insert(verb, rules);
    }

    pub fn get(&self, verb: Verb) -> Option<&ConstraintSet> {
        self.verbs.get(&verb)
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }
}

/// Compiles constraint rules against a request source into a [`Filter`].
///
/// Compilation is synchronous and in-process, never I/O bound. The same
/// instance can be rebound to a new source or rule set and compiled
/// again.
#[derive(Default)]
pub struct Compiler {
    source: Value,
    rules: ConstraintSet,
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler::default()
    }

    /// Set the source for the compiler to resolve paths from.
    pub fn set_source(&mut self, source: Value) -> &mut Compiler {
        self.source = source;
        self
    }

    /// Set the rules for the compiler to resolve.
    pub fn set_rules(&mut self, rules: ConstraintSet) -> &mut Compiler {
        self.rules = rules;
        self
    }

    /// Compile the bound rules against the bound source.
    pub fn compile(&self) -> Result<Filter> {
        let mut filter = Filter::new();

        for (key, rule) in &self.rules {
            let condition = match rule {
                ConstraintRule::Computed(f) => Condition::Eq(f(&self.source)),
                ConstraintRule::Literal { comparative, value } => {
                    wrap(*comparative, value.clone())
                }
                ConstraintRule::Path { comparative, path } => {
                    let resolved = resolve_path(&self.source, path)
                        .cloned()
                        .unwrap_or(Value::Null);
                    wrap(*comparative, resolved)
                }
            };

            filter.insert(key.clone(), condition);
        }

        tracing::debug!(?filter, "constraints compiled");

        Ok(filter)
    }
}

fn wrap(comparative: Option<Comparative>, value: Value) -> Condition {
    match comparative {
        Some(comparative) => Condition::Cmp(comparative, value),
        None => Condition::Eq(value),
    }
}

/// Resolve a dotted path against a JSON value. Numeric segments index
/// into arrays.
pub fn resolve_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = source;

    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}
