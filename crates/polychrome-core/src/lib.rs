pub mod blueprint;
pub use blueprint::{Attribute, AttributeType, Blueprint, DefaultValue, Multiplicity, Relationship};

mod error;
pub use error::{Error, HttpError};

pub mod constraint;
pub use constraint::{Comparative, Compiler, ConstraintMap, ConstraintRule, ConstraintSet, Verb};

pub mod filter;
pub use filter::{Condition, Filter};

mod ontology;
pub use ontology::Ontology;

pub mod schema;
pub use schema::{FieldRule, FieldType, ModelSchemas, Schema};

/// A Result type alias that uses Polychrome's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;
