//! Builders and their persistence view.
//!
//! A [`Builder`] exposes the two construction modes over one shared
//! resolution algorithm: `build_struct` stays entirely in memory, while
//! [`Persistable::create`] writes through the store and re-reads the row
//! with its associations combined. The modes diverge only in whether nested
//! associations persist and whether the final record is read back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::FactoryError;
use crate::evaluator::TupleEvaluator;
use crate::factories::Factories;
use crate::registry::AttributeRegistry;
use crate::relation::Relation;
use crate::sequences::Sequences;
use crate::value::{AttrMap, Record, Value};

/// One entry of a trait list: apply a named trait, or exclude a named
/// association from resolution.
///
/// Exclusion is also how a belongs-to parent suppresses its inverse has-many
/// while constructing itself, which is what keeps mutually-declared
/// parent/child factories from recursing forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraitRef {
    Apply(String),
    Exclude(String),
}

impl TraitRef {
    pub fn exclude(name: impl Into<String>) -> Self {
        TraitRef::Exclude(name.into())
    }
}

impl From<&str> for TraitRef {
    fn from(name: &str) -> Self {
        TraitRef::Apply(name.to_string())
    }
}

impl From<String> for TraitRef {
    fn from(name: String) -> Self {
        TraitRef::Apply(name)
    }
}

/// A named factory: an attribute registry bound to a relation, with trait
/// overlays.
pub struct Builder {
    name: String,
    attributes: AttributeRegistry,
    traits: HashMap<String, AttributeRegistry>,
    evaluator: TupleEvaluator,
}

impl Builder {
    pub(crate) fn new(
        name: impl Into<String>,
        attributes: AttributeRegistry,
        traits: HashMap<String, AttributeRegistry>,
        relation: Arc<dyn Relation>,
        sequences: Arc<Sequences>,
    ) -> Self {
        let evaluator = TupleEvaluator::new(
            attributes.clone(),
            relation,
            traits.clone(),
            sequences,
        );
        Self {
            name: name.into(),
            attributes,
            traits,
            evaluator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation(&self) -> &Arc<dyn Relation> {
        self.evaluator.relation()
    }

    /// Registry snapshot used to seed an inheriting factory.
    pub(crate) fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub(crate) fn trait_registries(&self) -> &HashMap<String, AttributeRegistry> {
        &self.traits
    }

    /// Resolved defaults merged with overrides; no record is constructed.
    pub fn tuple(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: &AttrMap,
    ) -> Result<AttrMap, FactoryError> {
        self.evaluator.defaults(factories, traits, overrides, true)
    }

    /// Build an in-memory record. Never touches the store.
    pub fn build_struct(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: AttrMap,
    ) -> Result<Record, FactoryError> {
        self.validate_keys(traits, &overrides)?;
        self.evaluator.build_struct(factories, traits, &overrides)
    }

    /// The persistence view over this builder.
    pub fn persistable(&self) -> Persistable<'_> {
        Persistable { builder: self }
    }

    /// Every override key must be a schema column or a declared association.
    fn validate_keys(&self, traits: &[TraitRef], overrides: &AttrMap) -> Result<(), FactoryError> {
        let mut known: HashSet<String> =
            self.relation().attribute_names().into_iter().collect();
        known.extend(self.evaluator.assoc_names(traits));
        known.extend(self.relation().associations().into_iter().map(|a| a.key));

        let unknown: Vec<String> = overrides
            .keys()
            .filter(|k| !known.contains(*k))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(FactoryError::UnknownAttributes(unknown))
        }
    }
}

/// Write-through view of a [`Builder`].
pub struct Persistable<'a> {
    builder: &'a Builder,
}

impl Persistable<'_> {
    /// Persist a record: resolve the tuple, insert the schema-column subset,
    /// invoke pending association closures against the stored row's key,
    /// and re-fetch the row combined with its associations.
    pub fn create(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: AttrMap,
    ) -> Result<Record, FactoryError> {
        let builder = self.builder;
        builder.validate_keys(traits, &overrides)?;

        let evaluator = &builder.evaluator;
        let tuple = evaluator.defaults(factories, traits, &overrides, true)?;

        let schema: HashSet<String> = builder.relation().attribute_names().into_iter().collect();
        let insertable: AttrMap = tuple
            .iter()
            .filter(|(k, v)| schema.contains(*k) && !v.is_deferred())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let persisted = builder.relation().insert(insertable)?;

        let dataset = builder.relation().id().dataset;
        if !evaluator.has_associations(traits) {
            return Ok(Record::new(dataset, persisted));
        }

        evaluator.persist_associations(factories, &tuple, &persisted, traits)?;

        let pk_names = builder.relation().primary_key();
        if pk_names.is_empty() {
            return Ok(Record::new(dataset, persisted));
        }
        let pk: Vec<Value> = pk_names
            .iter()
            .map(|k| persisted.get(k).cloned().unwrap_or(Value::Null))
            .collect();
        let combined = builder
            .relation()
            .fetch_combined(&pk, &evaluator.assoc_names(traits))?;
        Ok(combined)
    }
}
