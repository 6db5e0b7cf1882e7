//! The factory registry.
//!
//! [`Factories`] owns every builder in a slab arena, plus the sequence
//! counter service. It is cheap to clone and share; all interior state is
//! behind locks and written only at definition time. Associations resolve
//! their target factory lazily through the relation index, so factories may
//! reference each other before both are defined.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use slab::Slab;

use crate::builder::{Builder, TraitRef};
use crate::dsl::Dsl;
use crate::error::FactoryError;
use crate::relation::Store;
use crate::sequences::Sequences;
use crate::value::{AttrMap, Record};

struct Inner {
    store: Arc<dyn Store>,
    builders: RwLock<Slab<Arc<Builder>>>,
    names: RwLock<HashMap<String, usize>>,
    /// Dataset name to builder slot; the first factory defined for a
    /// relation answers association lookups for it.
    by_relation: RwLock<HashMap<String, usize>>,
    sequences: Arc<Sequences>,
}

/// A registry of all configured factories for one store.
#[derive(Clone)]
pub struct Factories {
    inner: Arc<Inner>,
}

impl Factories {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                builders: RwLock::new(Slab::new()),
                names: RwLock::new(HashMap::new()),
                by_relation: RwLock::new(HashMap::new()),
                sequences: Arc::new(Sequences::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn sequences(&self) -> &Arc<Sequences> {
        &self.inner.sequences
    }

    /// Clear every sequence counter. Intended between isolated test runs.
    pub fn reset_sequences(&self) {
        self.inner.sequences.reset();
    }

    /// Define a factory whose relation is the naive plural of its name.
    ///
    /// Inflection belongs to the store layer; this default only appends an
    /// `s`. Use [`Factories::define_for`] whenever that is not the dataset
    /// name.
    pub fn define(
        &self,
        name: &str,
        body: impl FnOnce(&mut Dsl),
    ) -> Result<(), FactoryError> {
        let dataset = naive_plural(name);
        self.define_for(name, &dataset, body)
    }

    /// Define a factory bound to an explicit relation.
    pub fn define_for(
        &self,
        name: &str,
        dataset: &str,
        body: impl FnOnce(&mut Dsl),
    ) -> Result<(), FactoryError> {
        if self.has_factory(name) {
            return Err(FactoryError::AlreadyDefined(name.to_string()));
        }
        let relation = self
            .inner
            .store
            .relation(dataset)
            .ok_or_else(|| FactoryError::RelationNotDefined(dataset.to_string()))?;
        let mut dsl = Dsl::new(name, Arc::clone(&relation));
        body(&mut dsl);
        let (attributes, traits) = dsl.finish()?;
        self.register(
            name,
            Builder::new(
                name,
                attributes,
                traits,
                relation,
                Arc::clone(&self.inner.sequences),
            ),
        );
        Ok(())
    }

    /// Define a factory seeded from a parent: the child starts with a copy
    /// of the parent's attributes and traits, bound to the same relation,
    /// then the block applies additional or overriding declarations.
    pub fn define_from(
        &self,
        name: &str,
        parent: &str,
        body: impl FnOnce(&mut Dsl),
    ) -> Result<(), FactoryError> {
        if self.has_factory(name) {
            return Err(FactoryError::AlreadyDefined(name.to_string()));
        }
        let parent = self.builder(parent)?;
        let mut dsl = Dsl::with_seed(
            name,
            Arc::clone(parent.relation()),
            parent.attributes().clone(),
            parent.trait_registries().clone(),
        );
        body(&mut dsl);
        let (attributes, traits) = dsl.finish()?;
        self.register(
            name,
            Builder::new(
                name,
                attributes,
                traits,
                Arc::clone(parent.relation()),
                Arc::clone(&self.inner.sequences),
            ),
        );
        Ok(())
    }

    fn register(&self, name: &str, builder: Builder) {
        let dataset = builder.relation().id().dataset;
        let slot = self.inner.builders.write().insert(Arc::new(builder));
        self.inner.names.write().insert(name.to_string(), slot);
        self.inner
            .by_relation
            .write()
            .entry(dataset)
            .or_insert(slot);
    }

    /// Look up a builder by factory name, failing fast on typos.
    pub fn builder(&self, name: &str) -> Result<Arc<Builder>, FactoryError> {
        let slot = self
            .inner
            .names
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| FactoryError::FactoryNotDefined(name.to_string()))?;
        self.builder_at(slot)
    }

    pub(crate) fn builder_at(&self, slot: usize) -> Result<Arc<Builder>, FactoryError> {
        self.inner
            .builders
            .read()
            .get(slot)
            .cloned()
            .ok_or_else(|| FactoryError::FactoryNotDefined(format!("slot {slot}")))
    }

    /// Arena slot of the factory answering for `dataset`.
    pub(crate) fn slot_for_relation(&self, dataset: &str) -> Result<usize, FactoryError> {
        self.inner
            .by_relation
            .read()
            .get(dataset)
            .copied()
            .ok_or_else(|| FactoryError::FactoryNotDefined(dataset.to_string()))
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.inner.names.read().contains_key(name)
    }

    /// Create and persist a record.
    pub fn create(
        &self,
        name: &str,
        traits: &[TraitRef],
        overrides: AttrMap,
    ) -> Result<Record, FactoryError> {
        self.builder(name)?.persistable().create(self, traits, overrides)
    }

    /// Build an in-memory record; the store is never touched.
    pub fn build_struct(
        &self,
        name: &str,
        traits: &[TraitRef],
        overrides: AttrMap,
    ) -> Result<Record, FactoryError> {
        self.builder(name)?.build_struct(self, traits, overrides)
    }

    /// Resolved defaults merged with overrides, without constructing
    /// anything.
    pub fn tuple(
        &self,
        name: &str,
        traits: &[TraitRef],
        overrides: &AttrMap,
    ) -> Result<AttrMap, FactoryError> {
        self.builder(name)?.tuple(self, traits, overrides)
    }

    /// The in-memory construction view.
    pub fn structs(&self) -> Structs<'_> {
        Structs { factories: self }
    }
}

/// In-memory builder API, mirroring the persisting one.
pub struct Structs<'a> {
    factories: &'a Factories,
}

impl Structs<'_> {
    pub fn create(
        &self,
        name: &str,
        traits: &[TraitRef],
        overrides: AttrMap,
    ) -> Result<Record, FactoryError> {
        self.factories.build_struct(name, traits, overrides)
    }
}

fn naive_plural(name: &str) -> String {
    if name.ends_with('s') {
        name.to_string()
    } else {
        format!("{name}s")
    }
}
