use crate::{Blueprint, Error, Multiplicity, Relationship, Result};

use indexmap::IndexMap;

/// The full set of loaded blueprints plus their resolved relationships.
///
/// Built once at startup and frozen (behind an `Arc`) for the life of
/// the process; [`Ontology::join`] is the one sanctioned mutation and
/// happens before the registry is shared.
#[derive(Debug, Default)]
pub struct Ontology {
    blueprints: IndexMap<String, Blueprint>,
}

impl Ontology {
    pub fn new() -> Ontology {
        Ontology::default()
    }

    /// Register a blueprint. Last registration wins on name collision.
    pub fn register(&mut self, blueprint: Blueprint) {
        self.blueprints.insert(blueprint.name.clone(), blueprint);
    }

    pub fn get(&self, name: &str) -> Option<&Blueprint> {
        self.blueprints.get(name)
    }

    /// Look up a blueprint, erroring when it is unknown.
    pub fn expect(&self, name: &str) -> Result<&Blueprint> {
        self.blueprints
            .get(name)
            .ok_or_else(|| Error::UnknownBlueprint(name.to_string()))
    }

    pub fn blueprints(&self) -> impl Iterator<Item = &Blueprint> {
        self.blueprints.values()
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Register a new relationship between two already-registered
    /// blueprints.
    ///
    /// Fails when either endpoint is unknown, or when the alias already
    /// exists on `from`. Not idempotent: joining the same alias twice is
    /// an error, preventing silent relationship overwrites.
    pub fn join(
        &mut self,
        from: &str,
        to: &str,
        alias: impl Into<String>,
        multiplicity: Multiplicity,
    ) -> Result<()> {
        let alias = alias.into();

        if !self.blueprints.contains_key(to) {
            return Err(Error::UnknownBlueprint(to.to_string()));
        }

        let source = self
            .blueprints
            .get_mut(from)
            .ok_or_else(|| Error::UnknownBlueprint(from.to_string()))?;

        if source.relationship(&alias).is_some() {
            return Err(Error::DuplicateRelationship {
                blueprint: from.to_string(),
                alias,
            });
        }

        source.relationships.push(Relationship {
            alias,
            target: to.to_string(),
            multiplicity,
            via: None,
        });

        Ok(())
    }
}

impl FromIterator<Blueprint> for Ontology {
    fn from_iter<T: IntoIterator<Item = Blueprint>>(iter: T) -> Ontology {
        let mut ontology = Ontology::new();
        for blueprint in iter {
            ontology.register(blueprint);
        }
        ontology
    }
}
