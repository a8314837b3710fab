mod attribute;
pub use attribute::{Attribute, AttributeType, DefaultValue};

mod relationship;
pub use relationship::{Multiplicity, Relationship};

use crate::{ConstraintMap, ConstraintRule, ConstraintSet, Error, Result, Verb};

use indexmap::IndexMap;
use serde_json::Value;

/// A named data-model definition.
///
/// Blueprints are loaded once at startup, have their relationships
/// derived by scanning attributes, and are immutable for the life of
/// the process once registered with an [`Ontology`](crate::Ontology) —
/// except for explicit runtime joins.
#[derive(Debug, Clone, Default)]
pub struct Blueprint {
    pub name: String,

    pub attributes: IndexMap<String, Attribute>,

    /// Per-verb authorization/filter rules.
    pub constraints: ConstraintMap,

    /// When set, UPLOAD binds files to records of this blueprint,
    /// storing the generated name under the named field.
    pub can_upload_file: Option<String>,

    /// Derived from attributes at load time; augmented only through
    /// `Ontology::join`.
    pub relationships: Vec<Relationship>,
}

impl Blueprint {
    pub fn builder(name: impl Into<String>) -> Builder {
        Builder {
            blueprint: Blueprint {
                name: name.into(),
                ..Blueprint::default()
            },
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// A blueprint has relationships iff any attribute carries
    /// `model` or `collection`.
    pub fn has_relationships(&self) -> bool {
        !self.relationships.is_empty()
    }

    pub fn relationship(&self, alias: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|rel| rel.alias == alias)
    }

    /// The field an upload stores its generated filename under.
    pub fn upload_field(&self) -> &str {
        self.can_upload_file.as_deref().unwrap_or("file")
    }

    /// Load a blueprint from its declarative JSON form:
    ///
    /// ```json
    /// {
    ///   "attributes": { "name": { "type": "string", "required": true } },
    ///   "constraints": { "get": { "user": "auth.session.id" } },
    ///   "can_upload_file": true
    /// }
    /// ```
    pub fn from_def(name: impl Into<String>, def: &Value) -> Result<Blueprint> {
        let name = name.into();
        let mut builder = Blueprint::builder(&name);

        let attributes = def
            .get("attributes")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Validation {
                field: name.clone(),
                message: "blueprint definition has no attributes".into(),
            })?;

        for (attr_name, attr_def) in attributes {
            let attribute = Attribute::from_def(&name, attr_name, attr_def)?;
            builder = builder.attribute(attr_name, attribute);
        }

        if let Some(constraints) = def.get("constraints").and_then(Value::as_object) {
            for (verb, rules) in constraints {
                let verb = parse_verb(verb).ok_or_else(|| Error::Validation {
                    field: name.clone(),
                    message: format!("unknown constraint verb `{verb}`"),
                })?;
                builder = builder.constraints(verb, parse_rules(rules)?);
            }
        }

        match def.get("can_upload_file") {
            Some(Value::Bool(true)) => builder = builder.can_upload_file("file"),
            Some(Value::String(field)) => builder = builder.can_upload_file(field),
            _ => {}
        }

        Ok(builder.build())
    }
}

fn parse_verb(verb: &str) -> Option<Verb> {
    match verb {
        "post" => Some(Verb::Post),
        "get" => Some(Verb::Get),
        "patch" => Some(Verb::Patch),
        "put" => Some(Verb::Put),
        "delete" => Some(Verb::Delete),
        _ => None,
    }
}

/// Parse one verb's rule map. A rule is a path string, or an object
/// `{compile: bool, value: string}` where `compile: false` keeps the
/// value literal.
fn parse_rules(rules: &Value) -> Result<ConstraintSet> {
    let mut set = ConstraintSet::new();

    let Some(rules) = rules.as_object() else {
        return Ok(set);
    };

    for (key, rule) in rules {
        let parsed = match rule {
            Value::String(raw) => ConstraintRule::path(raw)?,
            Value::Object(object) => {
                let compile = object.get("compile").and_then(Value::as_bool).unwrap_or(true);
                let value = object
                    .get("value")
                    .ok_or_else(|| Error::MalformedConstraint("no value".into()))?;

                match (compile, value) {
                    (true, Value::String(raw)) => ConstraintRule::path(raw)?,
                    (false, Value::String(raw)) => ConstraintRule::literal(raw)?,
                    (_, value) => ConstraintRule::value(value.clone()),
                }
            }
            other => ConstraintRule::value(other.clone()),
        };

        set.insert(key.clone(), parsed);
    }

    Ok(set)
}

/// Builds a [`Blueprint`], deriving relationships from its attributes.
#[derive(Debug)]
pub struct Builder {
    blueprint: Blueprint,
}

impl Builder {
    pub fn attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Builder {
        self.blueprint.attributes.insert(name.into(), attribute);
        self
    }

    pub fn constraints(mut self, verb: Verb, rules: ConstraintSet) -> Builder {
        self.blueprint.constraints.insert(verb, rules);
        self
    }

    pub fn can_upload_file(mut self, field: impl Into<String>) -> Builder {
        self.blueprint.can_upload_file = Some(field.into());
        self
    }

    /// Finish the blueprint, scanning attributes once to derive the
    /// relationship registry.
    pub fn build(mut self) -> Blueprint {
        self.blueprint.relationships = self
            .blueprint
            .attributes
            .iter()
            .filter_map(|(name, attribute)| {
                if let Some(target) = &attribute.model {
                    Some(Relationship {
                        alias: name.clone(),
                        target: target.clone(),
                        multiplicity: Multiplicity::One,
                        via: None,
                    })
                } else if let Some(target) = &attribute.collection {
                    Some(Relationship {
                        alias: name.clone(),
                        target: target.clone(),
                        multiplicity: Multiplicity::Many,
                        via: attribute.via.clone(),
                    })
                } else {
                    None
                }
            })
            .collect();

        self.blueprint
    }
}
