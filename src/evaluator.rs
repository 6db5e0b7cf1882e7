//! The tuple evaluation core.
//!
//! Given an attribute registry, a target relation, trait registries, and
//! caller overrides, [`TupleEvaluator`] produces the fully resolved
//! attribute mapping for one construction. Values resolve in topological
//! order; associations resolve inline when the foreign key lives on this
//! tuple, and defer to a closure otherwise — the dependency on the owning
//! record's not-yet-assigned key is not expressible as an attribute-name
//! edge, so deferral is what breaks the chicken-and-egg ordering.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::attributes::{AssociationAttr, Attribute, DeferredAssociation};
use crate::builder::TraitRef;
use crate::error::FactoryError;
use crate::factories::Factories;
use crate::registry::AttributeRegistry;
use crate::relation::{AssociationKind, Relation};
use crate::sequences::{SequenceKey, Sequences};
use crate::value::{AttrMap, Record, Value};

pub struct TupleEvaluator {
    attributes: AttributeRegistry,
    relation: Arc<dyn Relation>,
    traits: HashMap<String, AttributeRegistry>,
    sequences: Arc<Sequences>,
}

impl TupleEvaluator {
    pub(crate) fn new(
        attributes: AttributeRegistry,
        relation: Arc<dyn Relation>,
        traits: HashMap<String, AttributeRegistry>,
        sequences: Arc<Sequences>,
    ) -> Self {
        Self {
            attributes,
            relation,
            traits,
            sequences,
        }
    }

    pub fn relation(&self) -> &Arc<dyn Relation> {
        &self.relation
    }

    pub fn primary_key(&self) -> Vec<String> {
        self.relation.primary_key()
    }

    fn dataset(&self) -> String {
        self.relation.id().dataset
    }

    /// Resolve defaults for one construction: values in topological order,
    /// associations (inline or deferred), trait overlays, then caller
    /// overrides — which always win and are never re-derived.
    pub fn defaults(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: &AttrMap,
        persist: bool,
    ) -> Result<AttrMap, FactoryError> {
        let mut resolved = self.evaluate_values(overrides)?;
        resolved.extend(self.evaluate_associations(factories, traits, overrides, persist)?);
        resolved.extend(self.evaluate_traits(factories, traits, overrides, persist)?);
        resolved.extend(self.mergeable_overrides(traits, overrides));
        Ok(resolved)
    }

    fn evaluate_values(&self, overrides: &AttrMap) -> Result<AttrMap, FactoryError> {
        let values = self.attributes.values();
        let order = values.topological_order()?;
        let relation_id = self.relation.id();
        let mut acc = AttrMap::new();
        for attr in order {
            if overrides.contains_key(attr.name()) {
                continue;
            }
            let deps: Vec<Value> = attr
                .dependency_names()
                .iter()
                .map(|d| {
                    acc.get(d)
                        .or_else(|| overrides.get(d))
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect();
            let value = match attr {
                Attribute::Value(v) => v.value().clone(),
                Attribute::Callable(c) => c.call(&deps),
                Attribute::Sequence(s) => {
                    let n = self.sequences.next(&SequenceKey::new(&relation_id, s.name()));
                    s.call(n, &deps)
                }
                Attribute::Association(_) => continue,
            };
            acc.insert(attr.name().to_string(), value);
        }
        Ok(acc)
    }

    fn evaluate_associations(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: &AttrMap,
        persist: bool,
    ) -> Result<AttrMap, FactoryError> {
        let dataset = self.dataset();
        let mut acc = AttrMap::new();
        for assoc in self.assocs(traits) {
            match overrides.get(assoc.name()) {
                // An explicit null means "no association at all".
                Some(Value::Null) => continue,
                // A caller-supplied value for a child-side association
                // stands as-is; nothing to construct.
                Some(_) if assoc.dependency_on(&dataset) => continue,
                _ => {}
            }
            if assoc.dependency_on(&dataset) {
                acc.insert(
                    assoc.name().to_string(),
                    Value::Deferred(DeferredAssociation::new(assoc)),
                );
            } else if let Some(partial) = assoc.call(factories, overrides, persist)? {
                acc.extend(partial);
            }
        }
        Ok(acc)
    }

    /// Overlay each applied trait through a fresh evaluator scoped to the
    /// trait's value attributes. Trait-contributed associations are folded
    /// into the association pass instead, so they resolve exactly once.
    fn evaluate_traits(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: &AttrMap,
        persist: bool,
    ) -> Result<AttrMap, FactoryError> {
        let mut acc = AttrMap::new();
        for t in traits {
            let TraitRef::Apply(name) = t else { continue };
            let Some(trait_registry) = self.traits.get(name) else {
                continue;
            };
            let scoped = TupleEvaluator::new(
                trait_registry.values(),
                Arc::clone(&self.relation),
                HashMap::new(),
                Arc::clone(&self.sequences),
            );
            acc.extend(scoped.defaults(factories, &[], overrides, persist)?);
        }
        Ok(acc)
    }

    /// Caller overrides minus the keys that feed through-association join
    /// factories rather than this tuple.
    fn mergeable_overrides(&self, traits: &[TraitRef], overrides: &AttrMap) -> AttrMap {
        let unmergeable: HashSet<String> = self
            .assocs(traits)
            .iter()
            .filter(|a| a.through())
            .filter_map(|a| a.meta().through.as_ref().map(|t| t.target_attr.clone()))
            .collect();
        overrides
            .iter()
            .filter(|(k, _)| !unmergeable.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Associations relevant under `traits`: the base registry's plus any
    /// trait-contributed ones, minus explicit exclusions.
    fn assocs(&self, traits: &[TraitRef]) -> Vec<AssociationAttr> {
        let mut registry = self.attributes.associations();
        for t in traits {
            if let TraitRef::Apply(name) = t {
                if let Some(trait_registry) = self.traits.get(name) {
                    registry.merge(&trait_registry.associations());
                }
            }
        }
        let excluded: HashSet<&str> = traits
            .iter()
            .filter_map(|t| match t {
                TraitRef::Exclude(name) => Some(name.as_str()),
                TraitRef::Apply(_) => None,
            })
            .collect();
        registry
            .iter()
            .filter(|a| !excluded.contains(a.name()))
            .filter_map(|a| a.as_association().cloned())
            .collect()
    }

    pub fn assoc_names(&self, traits: &[TraitRef]) -> Vec<String> {
        self.assocs(traits)
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn has_associations(&self, traits: &[TraitRef]) -> bool {
        !self.assocs(traits).is_empty()
    }

    /// Every schema column nulled out, with primary-key columns seeded from
    /// the sequence service.
    fn struct_attrs(&self) -> AttrMap {
        let relation_id = self.relation.id();
        let pk = self.relation.primary_key();
        let mut attrs = AttrMap::new();
        for name in self.relation.attribute_names() {
            if pk.contains(&name) {
                continue;
            }
            attrs.insert(name, Value::Null);
        }
        for name in pk {
            let n = self.sequences.next(&SequenceKey::new(&relation_id, &name));
            attrs.insert(name, Value::Int(n as i64));
        }
        attrs
    }

    /// Build an in-memory record. Never touches the store.
    pub fn build_struct(
        &self,
        factories: &Factories,
        traits: &[TraitRef],
        overrides: &AttrMap,
    ) -> Result<Record, FactoryError> {
        let mut merged = self.struct_attrs();
        merged.extend(self.defaults(factories, traits, overrides, false)?);

        let mut deferred: Vec<DeferredAssociation> = Vec::new();
        let mut attributes = AttrMap::new();
        for (name, value) in merged {
            match value {
                Value::Deferred(d) => deferred.push(d),
                other => {
                    attributes.insert(name, other);
                }
            }
        }
        // Now that the primary key is known, materialize pending children.
        for d in &deferred {
            if let Some(partial) = d.call(factories, &attributes, false)? {
                attributes.extend(partial);
            }
        }

        self.wire_foreign_keys(traits, &mut attributes);

        let schema: HashSet<String> = self.relation.attribute_names().into_iter().collect();
        let assoc_keys: HashSet<String> = self
            .relation
            .associations()
            .into_iter()
            .map(|a| a.key)
            .collect();
        let finalized: AttrMap = attributes
            .into_iter()
            .filter(|(k, _)| schema.contains(k) || assoc_keys.contains(k))
            .collect();
        Ok(Record::new(self.dataset(), finalized))
    }

    /// Foreign-key consistency pass over the assembled struct: the owning
    /// tuple's belongs-to cell is filled from its nested parent, and nested
    /// children — including caller-supplied ones — get the owning key.
    fn wire_foreign_keys(&self, traits: &[TraitRef], attributes: &mut AttrMap) {
        for assoc in self.assocs(traits) {
            if assoc.count() == 0 {
                continue;
            }
            let meta = assoc.meta().clone();
            match meta.kind {
                AssociationKind::ManyToOne => {
                    let parent_pk = attributes
                        .get(&meta.key)
                        .and_then(Value::as_record)
                        .and_then(|r| r.get(&meta.target_primary_key))
                        .cloned();
                    if let Some(pk) = parent_pk {
                        let missing = attributes
                            .get(&meta.foreign_key)
                            .map(Value::is_null)
                            .unwrap_or(true);
                        if missing {
                            attributes.insert(meta.foreign_key.clone(), pk);
                        }
                    }
                }
                AssociationKind::OneToMany | AssociationKind::OneToOne => {
                    let own_pk = attributes
                        .get(&meta.source_primary_key)
                        .cloned()
                        .unwrap_or(Value::Null);
                    if own_pk.is_null() {
                        continue;
                    }
                    match attributes.get_mut(&meta.key) {
                        Some(Value::Records(children)) => {
                            for child in children {
                                inject_foreign_key(child, &meta.foreign_key, &own_pk);
                            }
                        }
                        Some(Value::Record(child)) => {
                            inject_foreign_key(child, &meta.foreign_key, &own_pk);
                        }
                        _ => {}
                    }
                }
                AssociationKind::OneToOneThrough | AssociationKind::ManyToMany => {}
            }
        }
    }

    /// Invoke every pending association closure against the persisted
    /// parent's attributes.
    pub fn persist_associations(
        &self,
        factories: &Factories,
        tuple: &AttrMap,
        persisted: &AttrMap,
        traits: &[TraitRef],
    ) -> Result<(), FactoryError> {
        for name in self.assoc_names(traits) {
            if let Some(Value::Deferred(d)) = tuple.get(&name) {
                d.call(factories, persisted, true)?;
            }
        }
        Ok(())
    }
}

fn inject_foreign_key(child: &mut Record, foreign_key: &str, value: &Value) {
    let missing = child.get(foreign_key).map(Value::is_null).unwrap_or(true);
    if missing {
        child.insert(foreign_key, value.clone());
    }
}
