//! Derives read/write validation shapes from a blueprint's attributes.
//!
//! Three shapes per blueprint: `create` excludes the server-managed
//! fields, `update` makes everything optional, and `read` adds the
//! server-managed fields back as permitted output.

use crate::{Attribute, AttributeType, Blueprint, DefaultValue, Error, Ontology, Result};

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::Value;

/// Fields the server manages; never writable by a client.
const SERVER_MANAGED: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// The validation primitive an attribute type maps onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Number,
    Bool,
    Date,
    Json,
    /// A relationship field: accepts the target's shape or a bare
    /// identifier; an array of either when `many`.
    Related { target: String, many: bool },
}

/// The validation rule for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// `None` for metadata-only attribute types, which permit the field
    /// without constraining its value.
    pub ty: Option<FieldType>,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub default: Option<DefaultValue>,
}

/// One validation shape: an ordered set of field rules.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldRule>,
    apply_defaults: bool,
}

/// The three shapes derived from one blueprint.
#[derive(Debug, Clone)]
pub struct ModelSchemas {
    pub create: Schema,
    pub update: Schema,
    pub read: Schema,
}

impl ModelSchemas {
    /// Derive all three shapes. Fails fast when a relationship
    /// attribute targets a blueprint the ontology does not know.
    pub fn generate(blueprint: &Blueprint, ontology: &Ontology) -> Result<ModelSchemas> {
        let mut writable = IndexMap::new();

        for (name, attribute) in &blueprint.attributes {
            if SERVER_MANAGED.contains(&name.as_str()) {
                continue;
            }
            writable.insert(name.clone(), field_rule(attribute, ontology)?);
        }

        let create = Schema {
            fields: writable.clone(),
            apply_defaults: true,
        };

        let update = Schema {
            fields: writable
                .iter()
                .map(|(name, rule)| {
                    (
                        name.clone(),
                        FieldRule {
                            required: false,
                            ..rule.clone()
                        },
                    )
                })
                .collect(),
            apply_defaults: false,
        };

        let mut read_fields = IndexMap::new();
        read_fields.insert("id".to_string(), permissive(None));
        for (name, rule) in &writable {
            read_fields.insert(
                name.clone(),
                FieldRule {
                    required: false,
                    ..rule.clone()
                },
            );
        }
        read_fields.insert("createdAt".to_string(), permissive(Some(FieldType::Date)));
        read_fields.insert("updatedAt".to_string(), permissive(Some(FieldType::Date)));

        let read = Schema {
            fields: read_fields,
            apply_defaults: false,
        };

        Ok(ModelSchemas {
            create,
            update,
            read,
        })
    }
}

fn permissive(ty: Option<FieldType>) -> FieldRule {
    FieldRule {
        ty,
        required: false,
        min: None,
        max: None,
        default: None,
    }
}

fn field_rule(attribute: &Attribute, ontology: &Ontology) -> Result<FieldRule> {
    let ty = if let Some(target) = &attribute.model {
        ontology.expect(target)?;
        Some(FieldType::Related {
            target: target.clone(),
            many: false,
        })
    } else if let Some(target) = &attribute.collection {
        ontology.expect(target)?;
        Some(FieldType::Related {
            target: target.clone(),
            many: true,
        })
    } else {
        attribute.ty.and_then(value_type)
    };

    Ok(FieldRule {
        ty,
        required: attribute.required,
        min: attribute.min,
        max: attribute.max,
        default: attribute.default.clone(),
    })
}

fn value_type(ty: AttributeType) -> Option<FieldType> {
    match ty {
        AttributeType::String | AttributeType::Text | AttributeType::Email => Some(FieldType::Str),
        AttributeType::Integer | AttributeType::Float => Some(FieldType::Number),
        AttributeType::Boolean => Some(FieldType::Bool),
        AttributeType::Date | AttributeType::Datetime => Some(FieldType::Date),
        AttributeType::Json => Some(FieldType::Json),
        // Metadata only.
        AttributeType::AutoIncrement
        | AttributeType::PrimaryKey
        | AttributeType::Unique
        | AttributeType::Index => None,
    }
}

impl Schema {
    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldRule)> {
        self.fields.iter()
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn permits(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Validate a payload against this shape, applying defaults where
    /// the shape does, and return the normalized payload.
    pub fn validate(&self, payload: &Value, ontology: &Ontology) -> Result<Value> {
        let Some(payload) = payload.as_object() else {
            return Err(Error::Validation {
                field: "payload".into(),
                message: "expected an object".into(),
            });
        };

        for key in payload.keys() {
            if !self.fields.contains_key(key) {
                return Err(Error::Validation {
                    field: key.clone(),
                    message: "unknown field".into(),
                });
            }
        }

        let mut out = serde_json::Map::new();

        for (name, rule) in &self.fields {
            match payload.get(name) {
                Some(value) if !value.is_null() => {
                    check_value(name, rule, value, ontology)?;
                    out.insert(name.clone(), value.clone());
                }
                _ => {
                    if let (true, Some(default)) = (self.apply_defaults, &rule.default) {
                        out.insert(name.clone(), evaluate_default(default));
                    } else if rule.required {
                        return Err(Error::Validation {
                            field: name.clone(),
                            message: "is required".into(),
                        });
                    }
                }
            }
        }

        Ok(Value::Object(out))
    }
}

/// Evaluate a default at write time. `Now` produces the current
/// timestamp on every call rather than a value frozen when the schema
/// was generated.
fn evaluate_default(default: &DefaultValue) -> Value {
    match default {
        DefaultValue::Value(value) => value.clone(),
        DefaultValue::Now => Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    }
}

fn check_value(name: &str, rule: &FieldRule, value: &Value, ontology: &Ontology) -> Result<()> {
    let fail = |message: String| {
        Err(Error::Validation {
            field: name.to_string(),
            message,
        })
    };

    let Some(ty) = &rule.ty else {
        return Ok(());
    };

    match ty {
        FieldType::Str => {
            let Some(s) = value.as_str() else {
                return fail("expected a string".into());
            };
            check_bounds(name, rule, s.chars().count() as f64, "length")?;
        }
        FieldType::Number => {
            let Some(n) = value.as_f64() else {
                return fail("expected a number".into());
            };
            check_bounds(name, rule, n, "value")?;
        }
        FieldType::Bool => {
            if !value.is_boolean() {
                return fail("expected a boolean".into());
            }
        }
        FieldType::Date => {
            // Dates travel as strings or epoch numbers.
            if !value.is_string() && !value.is_number() {
                return fail("expected a date".into());
            }
        }
        FieldType::Json => {}
        FieldType::Related { target, many } => {
            check_related(name, target, *many, value, ontology)?;
        }
    }

    Ok(())
}

fn check_bounds(name: &str, rule: &FieldRule, actual: f64, what: &str) -> Result<()> {
    if let Some(min) = rule.min {
        if actual < min {
            return Err(Error::Validation {
                field: name.to_string(),
                message: format!("{what} {actual} below minimum {min}"),
            });
        }
    }
    if let Some(max) = rule.max {
        if actual > max {
            return Err(Error::Validation {
                field: name.to_string(),
                message: format!("{what} {actual} above maximum {max}"),
            });
        }
    }
    Ok(())
}

/// A relationship field accepts either a full nested object (validated
/// against the target blueprint's create shape) or a bare identifier;
/// to-many, an array of either.
fn check_related(
    name: &str,
    target: &str,
    many: bool,
    value: &Value,
    ontology: &Ontology,
) -> Result<()> {
    if many {
        let Some(items) = value.as_array() else {
            return Err(Error::Validation {
                field: name.to_string(),
                message: "expected an array of related records or identifiers".into(),
            });
        };
        for item in items {
            check_related(name, target, false, item, ontology)?;
        }
        return Ok(());
    }

    match value {
        Value::String(_) | Value::Number(_) => Ok(()),
        Value::Object(_) => {
            let blueprint = ontology.expect(target)?;
            let schemas = ModelSchemas::generate(blueprint, ontology)?;
            schemas.create.validate(value, ontology).map(|_| ())
        }
        _ => Err(Error::Validation {
            field: name.to_string(),
            message: "expected a related record or identifier".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Blueprint;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn test_blueprint() -> Blueprint {
        Blueprint::builder("test")
            .attribute("name", Attribute::of_type(AttributeType::String).required())
            .attribute(
                "age",
                Attribute::of_type(AttributeType::Integer).min(0.0).max(9000.0),
            )
            .attribute(
                "seen",
                Attribute::of_type(AttributeType::Datetime).default_value("now"),
            )
            .build()
    }

    fn ontology() -> Ontology {
        [test_blueprint()].into_iter().collect()
    }

    fn schemas() -> ModelSchemas {
        let ontology = ontology();
        ModelSchemas::generate(ontology.get("test").unwrap(), &ontology).unwrap()
    }

    #[test]
    fn create_shape_excludes_server_managed_fields() {
        let schemas = schemas();
        assert!(!schemas.create.permits("id"));
        assert!(!schemas.create.permits("createdAt"));
        assert!(!schemas.create.permits("updatedAt"));
        assert!(schemas.create.permits("name"));
    }

    #[test]
    fn read_shape_adds_server_managed_fields() {
        let schemas = schemas();
        assert!(schemas.read.permits("id"));
        assert!(schemas.read.permits("createdAt"));
        assert!(schemas.read.permits("updatedAt"));
        assert!(schemas.read.permits("name"));
    }

    #[test]
    fn update_shape_makes_everything_optional() {
        let schemas = schemas();
        let normalized = schemas
            .update
            .validate(&json!({"age": 30}), &ontology())
            .unwrap();
        assert_eq!(normalized, json!({"age": 30}));
    }

    #[test]
    fn missing_required_field_fails_create() {
        let err = schemas()
            .create
            .validate(&json!({"age": 30}), &ontology())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field, .. } if field == "name"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = schemas()
            .create
            .validate(&json!({"name": "x", "colour": "red"}), &ontology())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field, .. } if field == "colour"));
    }

    #[test]
    fn numeric_bounds_are_enforced() {
        let schemas = schemas();
        let ontology = ontology();

        assert!(schemas
            .create
            .validate(&json!({"name": "x", "age": 100}), &ontology)
            .is_ok());
        assert!(schemas
            .create
            .validate(&json!({"name": "x", "age": -1}), &ontology)
            .is_err());
        assert!(schemas
            .create
            .validate(&json!({"name": "x", "age": 9001}), &ontology)
            .is_err());
    }

    #[test]
    fn now_default_is_evaluated_per_write() {
        let schemas = schemas();
        let ontology = ontology();

        let normalized = schemas
            .create
            .validate(&json!({"name": "x"}), &ontology)
            .unwrap();

        let seen = normalized["seen"].as_str().unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(seen).unwrap();
        let age = Utc::now().signed_duration_since(parsed);
        assert!(age.num_seconds().abs() < 5, "default not evaluated at write time");
    }

    #[test]
    fn type_mismatches_fail() {
        let schemas = schemas();
        let ontology = ontology();

        let err = schemas
            .create
            .validate(&json!({"name": 42}), &ontology)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field, .. } if field == "name"));

        let err = schemas
            .create
            .validate(&json!({"name": "x", "age": "old"}), &ontology)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field, .. } if field == "age"));
    }

    #[test]
    fn related_fields_accept_object_or_identifier() {
        let ontology: Ontology = [
            Blueprint::builder("person")
                .attribute("name", Attribute::of_type(AttributeType::String).required())
                .build(),
            Blueprint::builder("book")
                .attribute("title", Attribute::of_type(AttributeType::String))
                .attribute("author", Attribute::model("person"))
                .attribute("readers", Attribute::collection("person"))
                .build(),
        ]
        .into_iter()
        .collect();

        let schemas =
            ModelSchemas::generate(ontology.get("book").unwrap(), &ontology).unwrap();

        // Bare identifier.
        assert!(schemas
            .create
            .validate(&json!({"title": "t", "author": 1}), &ontology)
            .is_ok());

        // Full nested object, validated against the target shape.
        assert!(schemas
            .create
            .validate(&json!({"title": "t", "author": {"name": "dave"}}), &ontology)
            .is_ok());
        assert!(schemas
            .create
            .validate(&json!({"title": "t", "author": {"age": 9}}), &ontology)
            .is_err());

        // To-many takes an array of either.
        assert!(schemas
            .create
            .validate(
                &json!({"title": "t", "readers": [1, {"name": "jane"}]}),
                &ontology
            )
            .is_ok());
        assert!(schemas
            .create
            .validate(&json!({"title": "t", "readers": 1}), &ontology)
            .is_err());
    }

    #[test]
    fn generate_rejects_unknown_relation_targets() {
        let ontology: Ontology = [Blueprint::builder("book")
            .attribute("author", Attribute::model("person"))
            .build()]
        .into_iter()
        .collect();

        let err = ModelSchemas::generate(ontology.get("book").unwrap(), &ontology).unwrap_err();
        assert!(matches!(err, Error::UnknownBlueprint(name) if name == "person"));
    }

    #[test]
    fn metadata_types_contribute_no_value_rule() {
        let ontology: Ontology = [Blueprint::builder("counter")
            .attribute("seq", Attribute::of_type(AttributeType::AutoIncrement))
            .build()]
        .into_iter()
        .collect();

        let schemas =
            ModelSchemas::generate(ontology.get("counter").unwrap(), &ontology).unwrap();
        let rule = schemas.create.field("seq").unwrap();
        assert_eq!(rule.ty, None);

        // Any value passes.
        assert!(schemas
            .create
            .validate(&json!({"seq": {"weird": true}}), &ontology)
            .is_ok());
    }
}
