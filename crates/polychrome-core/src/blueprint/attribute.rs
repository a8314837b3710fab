use crate::{Error, Result};

use serde_json::Value;

/// The closed set of attribute types a blueprint may declare.
///
/// Unknown type names are rejected when the blueprint loads, rather
/// than silently contributing no validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Json,
    Email,

    // Metadata-only types. These contribute no value rule by
    // themselves.
    AutoIncrement,
    PrimaryKey,
    Unique,
    Index,
}

impl AttributeType {
    pub fn parse(name: &str) -> Option<AttributeType> {
        match name {
            "string" => Some(AttributeType::String),
            "text" => Some(AttributeType::Text),
            "integer" => Some(AttributeType::Integer),
            "float" => Some(AttributeType::Float),
            "boolean" => Some(AttributeType::Boolean),
            "date" => Some(AttributeType::Date),
            "datetime" => Some(AttributeType::Datetime),
            "json" => Some(AttributeType::Json),
            "email" => Some(AttributeType::Email),
            "autoIncrement" => Some(AttributeType::AutoIncrement),
            "primaryKey" => Some(AttributeType::PrimaryKey),
            "unique" => Some(AttributeType::Unique),
            "index" => Some(AttributeType::Index),
            _ => None,
        }
    }

    /// True for types that are markers only and carry no value shape.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            AttributeType::AutoIncrement
                | AttributeType::PrimaryKey
                | AttributeType::Unique
                | AttributeType::Index
        )
    }
}

/// An attribute's default: either a fixed value or a producer evaluated
/// at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    /// "Now" on a datetime attribute. Evaluated per write so the
    /// default never freezes at schema-definition time.
    Now,
}

/// One field of a blueprint.
#[derive(Debug, Clone, Default)]
pub struct Attribute {
    /// The declared type. `None` for pure relationship attributes that
    /// only carry `model`/`collection`.
    pub ty: Option<AttributeType>,

    pub required: bool,

    /// Numeric bound, or length bound for string types.
    pub min: Option<f64>,
    pub max: Option<f64>,

    pub default: Option<DefaultValue>,

    pub unique: bool,

    /// To-one relationship target blueprint name.
    pub model: Option<String>,

    /// To-many relationship target blueprint name.
    pub collection: Option<String>,

    /// The field on the target that points back at this blueprint.
    pub via: Option<String>,
}

impl Attribute {
    pub fn of_type(ty: AttributeType) -> Attribute {
        Attribute {
            ty: Some(ty),
            ..Attribute::default()
        }
    }

    /// A to-one relationship attribute.
    pub fn model(target: impl Into<String>) -> Attribute {
        Attribute {
            model: Some(target.into()),
            ..Attribute::default()
        }
    }

    /// A to-many relationship attribute.
    pub fn collection(target: impl Into<String>) -> Attribute {
        Attribute {
            collection: Some(target.into()),
            ..Attribute::default()
        }
    }

    pub fn required(mut self) -> Attribute {
        self.required = true;
        self
    }

    pub fn min(mut self, min: f64) -> Attribute {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Attribute {
        self.max = Some(max);
        self
    }

    pub fn unique(mut self) -> Attribute {
        self.unique = true;
        self
    }

    pub fn via(mut self, via: impl Into<String>) -> Attribute {
        self.via = Some(via.into());
        self
    }

    /// Set the default, rewriting a `"now"` literal on a datetime
    /// attribute to the dynamic producer.
    pub fn default_value(mut self, value: impl Into<Value>) -> Attribute {
        let value = value.into();

        let is_now = self.ty == Some(AttributeType::Datetime)
            && value
                .as_str()
                .is_some_and(|s| s.eq_ignore_ascii_case("now"));

        self.default = Some(if is_now {
            DefaultValue::Now
        } else {
            DefaultValue::Value(value)
        });
        self
    }

    pub fn is_relation(&self) -> bool {
        self.model.is_some() || self.collection.is_some()
    }

    /// Parse an attribute from its declarative JSON form: either a bare
    /// type name or an object of properties.
    pub fn from_def(blueprint: &str, name: &str, def: &Value) -> Result<Attribute> {
        let unknown_type = |ty: &str| Error::UnknownAttributeType {
            blueprint: blueprint.to_string(),
            attribute: name.to_string(),
            ty: ty.to_string(),
        };

        if let Some(ty) = def.as_str() {
            let ty = AttributeType::parse(ty).ok_or_else(|| unknown_type(ty))?;
            return Ok(Attribute::of_type(ty));
        }

        let Some(object) = def.as_object() else {
            return Err(unknown_type(&def.to_string()));
        };

        let mut attribute = Attribute::default();

        if let Some(ty) = object.get("type") {
            let ty = ty.as_str().ok_or_else(|| unknown_type(&ty.to_string()))?;
            attribute.ty = Some(AttributeType::parse(ty).ok_or_else(|| unknown_type(ty))?);
        }

        attribute.required = object
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        attribute.unique = object
            .get("unique")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // min/minLength and max/maxLength collapse onto one numeric
        // bound, coerced through a numeric cast.
        attribute.min = numeric(object.get("min")).or_else(|| numeric(object.get("minLength")));
        attribute.max = numeric(object.get("max")).or_else(|| numeric(object.get("maxLength")));

        attribute.model = object
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string);
        attribute.collection = object
            .get("collection")
            .and_then(Value::as_str)
            .map(str::to_string);
        attribute.via = object
            .get("via")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(default) = object.get("default") {
            attribute = attribute.default_value(default.clone());
        }

        Ok(attribute)
    }
}

fn numeric(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
