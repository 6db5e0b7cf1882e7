//! Association attributes and their kind-specific resolution.
//!
//! Each kind answers the same three questions: how to resolve into a partial
//! tuple, whether resolution must wait for the owning record's key, and what
//! it contributes to dependency ordering (nothing — the dependency here is on
//! the owning key, not on another named attribute, which is exactly why
//! child-side kinds are deferred instead of topologically sorted).

use std::fmt;
use std::sync::OnceLock;

use crate::builder::TraitRef;
use crate::error::FactoryError;
use crate::factories::Factories;
use crate::relation::{AssociationKind, AssociationMeta};
use crate::value::{AttrMap, Record, Value};

/// Options accepted when declaring an association on a factory.
#[derive(Debug, Clone, Default)]
pub struct AssocOpts {
    count: Option<usize>,
    traits: Vec<TraitRef>,
}

impl AssocOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records to construct. Defaults to 1.
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Traits applied to every constructed record.
    pub fn traits(mut self, traits: &[&str]) -> Self {
        self.traits = traits.iter().map(|t| TraitRef::from(*t)).collect();
        self
    }
}

/// A declared association attribute.
///
/// The target factory is not resolved at definition time — factories may
/// reference each other before both exist — but lazily, through the
/// relation index of the owning [`Factories`] arena, and cached.
pub struct AssociationAttr {
    meta: AssociationMeta,
    traits: Vec<TraitRef>,
    count: usize,
    target_factory: OnceLock<usize>,
}

impl AssociationAttr {
    pub fn new(meta: AssociationMeta, opts: AssocOpts) -> Result<Self, FactoryError> {
        let count = opts.count.unwrap_or(1);
        if meta.kind.is_to_one() && count > 1 {
            return Err(FactoryError::InvalidCount {
                name: meta.key.clone(),
                count,
            });
        }
        Ok(Self {
            meta,
            traits: opts.traits,
            count,
            target_factory: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.meta.key
    }

    pub fn meta(&self) -> &AssociationMeta {
        &self.meta
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn through(&self) -> bool {
        self.meta.kind.is_through()
    }

    /// True when this association cannot resolve until `relation`'s record
    /// has a key.
    pub fn dependency_on(&self, relation: &str) -> bool {
        self.meta.dependency_on(relation)
    }

    fn builder(&self, factories: &Factories) -> Result<std::sync::Arc<crate::builder::Builder>, FactoryError> {
        if let Some(&slot) = self.target_factory.get() {
            return factories.builder_at(slot);
        }
        let slot = factories.slot_for_relation(&self.meta.target)?;
        let slot = *self.target_factory.get_or_init(|| slot);
        factories.builder_at(slot)
    }

    /// Resolve this association into a partial tuple.
    ///
    /// For [`AssociationKind::ManyToOne`], `parent` is the caller override
    /// map of the owning tuple; for every other kind it is the owning
    /// record's (possibly just persisted) attributes.
    pub fn call(
        &self,
        factories: &Factories,
        parent: &AttrMap,
        persist: bool,
    ) -> Result<Option<AttrMap>, FactoryError> {
        match self.meta.kind {
            AssociationKind::ManyToOne => self.call_many_to_one(factories, parent, persist),
            AssociationKind::OneToMany => self.call_one_to_many(factories, parent, persist),
            AssociationKind::OneToOne => self.call_one_to_one(factories, parent, persist),
            AssociationKind::OneToOneThrough | AssociationKind::ManyToMany => {
                self.call_through(factories, parent, persist)
            }
        }
    }

    /// belongs-to: the foreign key lands on the owning tuple.
    fn call_many_to_one(
        &self,
        factories: &Factories,
        attrs: &AttrMap,
        persist: bool,
    ) -> Result<Option<AttrMap>, FactoryError> {
        let key = self.name();
        if matches!(attrs.get(key), Some(Value::Null)) {
            return Ok(None);
        }

        // A caller-supplied record already carries its key.
        if let Some(Value::Record(existing)) = attrs.get(key) {
            let (fk, value) = self.meta.parent_key(existing);
            let mut partial = AttrMap::new();
            partial.insert(key.to_string(), Value::Record(existing.clone()));
            partial.insert(fk, value);
            return Ok(Some(partial));
        }

        let fk_override = attrs.get(&self.meta.foreign_key).filter(|v| !v.is_null());
        let builder = self.builder(factories)?;
        let parent_traits = self.parent_traits(&builder);

        let parent = if persist && fk_override.is_none() {
            builder
                .persistable()
                .create(factories, &parent_traits, AttrMap::new())?
        } else {
            // Struct mode, or the key is already known: never touch the
            // store. Seed the parent's key from the override when present.
            let mut overrides = AttrMap::new();
            if let Some(value) = fk_override {
                overrides.insert(self.meta.target_primary_key.clone(), value.clone());
            }
            builder.build_struct(factories, &parent_traits, overrides)?
        };

        let (fk, value) = self.meta.parent_key(&parent);
        let mut partial = AttrMap::new();
        partial.insert(key.to_string(), Value::Record(parent));
        partial.insert(fk, value);
        Ok(Some(partial))
    }

    /// Suppress the inverse association when constructing the parent, so a
    /// mutually-declared parent/child pair cannot recurse.
    fn parent_traits(&self, builder: &crate::builder::Builder) -> Vec<TraitRef> {
        let mut traits = self.traits.clone();
        let inverse = builder
            .relation()
            .associations()
            .into_iter()
            .find(|a| a.target == self.meta.source && a.dependency_on(&self.meta.target));
        if let Some(inverse) = inverse {
            traits.push(TraitRef::Exclude(inverse.key));
        }
        traits
    }

    /// has-many: construct `count` children, each wired to the parent key.
    fn call_one_to_many(
        &self,
        factories: &Factories,
        parent: &AttrMap,
        persist: bool,
    ) -> Result<Option<AttrMap>, FactoryError> {
        let builder = self.builder(factories)?;
        let mut children = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let (fk, value) = self.meta.child_key(parent);
            let mut overrides = AttrMap::new();
            overrides.insert(fk, value);
            let child = if persist {
                builder
                    .persistable()
                    .create(factories, &self.traits, overrides)?
            } else {
                builder.build_struct(factories, &self.traits, overrides)?
            };
            children.push(child);
        }
        let mut partial = AttrMap::new();
        partial.insert(self.name().to_string(), Value::Records(children));
        Ok(Some(partial))
    }

    /// has-one: a single child, or an explicit null with `count: 0`.
    fn call_one_to_one(
        &self,
        factories: &Factories,
        parent: &AttrMap,
        persist: bool,
    ) -> Result<Option<AttrMap>, FactoryError> {
        let mut partial = AttrMap::new();
        if self.count == 0 {
            partial.insert(self.name().to_string(), Value::Null);
            return Ok(Some(partial));
        }

        let builder = self.builder(factories)?;
        let (fk, value) = self.meta.child_key(parent);
        let mut overrides = AttrMap::new();
        overrides.insert(fk, value);
        if !persist {
            // In-memory children expose their owner under the singular
            // source alias.
            let owner = finalized_record(&self.meta.source, parent);
            overrides.insert(self.meta.source_alias.clone(), Value::Record(owner));
        }
        let child = if persist {
            builder
                .persistable()
                .create(factories, &self.traits, overrides)?
        } else {
            builder.build_struct(factories, &self.traits, overrides)?
        };
        partial.insert(self.name().to_string(), Value::Record(child));
        Ok(Some(partial))
    }

    /// Through associations: construct the target side, then wire join rows
    /// — via the registered join factory when there is one, else through the
    /// store's bulk join persist.
    fn call_through(
        &self,
        factories: &Factories,
        parent: &AttrMap,
        persist: bool,
    ) -> Result<Option<AttrMap>, FactoryError> {
        let builder = self.builder(factories)?;
        let mut targets = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let target = if persist {
                builder
                    .persistable()
                    .create(factories, &self.traits, AttrMap::new())?
            } else {
                builder.build_struct(factories, &self.traits, AttrMap::new())?
            };
            targets.push(target);
        }

        if persist {
            let through = self
                .meta
                .through
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("through association {:?} without join metadata", self.name()))?;
            if factories.has_factory(&through.factory) {
                let owner = finalized_record(&self.meta.source, parent);
                for target in &targets {
                    let mut join_attrs = AttrMap::new();
                    join_attrs.insert(through.source_attr.clone(), Value::Record(owner.clone()));
                    join_attrs.insert(through.target_attr.clone(), Value::Record(target.clone()));
                    factories.create(&through.factory, &[], join_attrs)?;
                }
            } else {
                let parent_key = parent
                    .get(&self.meta.source_primary_key)
                    .cloned()
                    .unwrap_or(Value::Null);
                let child_keys: Vec<Value> = targets
                    .iter()
                    .map(|t| {
                        t.get(&self.meta.target_primary_key)
                            .cloned()
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                factories
                    .store()
                    .persist_join(through, &parent_key, &child_keys)?;
            }
        }

        let mut partial = AttrMap::new();
        let result = if self.meta.kind.is_to_one() {
            targets.into_iter().next().map(Value::Record).unwrap_or(Value::Null)
        } else {
            Value::Records(targets)
        };
        partial.insert(self.name().to_string(), result);
        Ok(Some(partial))
    }
}

impl Clone for AssociationAttr {
    fn clone(&self) -> Self {
        let target_factory = OnceLock::new();
        if let Some(&slot) = self.target_factory.get() {
            let _ = target_factory.set(slot);
        }
        Self {
            meta: self.meta.clone(),
            traits: self.traits.clone(),
            count: self.count,
            target_factory,
        }
    }
}

impl fmt::Debug for AssociationAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationAttr")
            .field("key", &self.meta.key)
            .field("kind", &self.meta.kind)
            .field("count", &self.count)
            .finish()
    }
}

/// A pending association stored in a tuple until the owning record's key is
/// known. Invoked exactly once, with the parent attributes and a persist
/// flag.
#[derive(Clone)]
pub struct DeferredAssociation {
    attr: std::sync::Arc<AssociationAttr>,
}

impl DeferredAssociation {
    pub fn new(attr: AssociationAttr) -> Self {
        Self {
            attr: std::sync::Arc::new(attr),
        }
    }

    pub fn name(&self) -> &str {
        self.attr.name()
    }

    pub fn call(
        &self,
        factories: &Factories,
        parent: &AttrMap,
        persist: bool,
    ) -> Result<Option<AttrMap>, FactoryError> {
        self.attr.call(factories, parent, persist)
    }
}

/// Snapshot of in-progress attributes as a record, with pending closures
/// dropped.
fn finalized_record(relation: &str, attrs: &AttrMap) -> Record {
    let values: AttrMap = attrs
        .iter()
        .filter(|(_, v)| !v.is_deferred())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Record::new(relation, values)
}
