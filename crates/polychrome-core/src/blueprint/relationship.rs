/// Whether a relationship points at one record or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    Many,
}

/// A derived relationship between two blueprints.
///
/// Relationships are never declared directly; any attribute carrying
/// `model` or `collection` becomes one at load time, and
/// [`Ontology::join`](crate::Ontology::join) can add more at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// The attribute name the relationship lives under.
    pub alias: String,

    /// Target blueprint name.
    pub target: String,

    pub multiplicity: Multiplicity,

    /// For to-many relationships, the field on the target pointing back
    /// at the source. Defaults to the source blueprint's name.
    pub via: Option<String>,
}

impl Relationship {
    pub fn is_many(&self) -> bool {
        self.multiplicity == Multiplicity::Many
    }
}
