//! The attribute-registration surface used inside `define` blocks.
//!
//! Every verb ultimately inserts into an [`AttributeRegistry`]; nothing here
//! is reflective. Errors — unknown attribute names, bad counts, unsupported
//! fake kinds — accumulate and surface from `Factories::define`, so a block
//! can stay free of `?`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::attributes::{
    AssocOpts, AssociationAttr, Attribute, CallableAttr, SequenceAttr, ValueAttr,
};
use crate::error::FactoryError;
use crate::registry::AttributeRegistry;
use crate::relation::Relation;
use crate::value::Value;

/// Factory definition context, scoped to one relation's schema.
pub struct Dsl {
    factory: String,
    relation: Arc<dyn Relation>,
    valid_names: HashSet<String>,
    attributes: AttributeRegistry,
    traits: HashMap<String, AttributeRegistry>,
    errors: Vec<FactoryError>,
}

impl Dsl {
    pub(crate) fn new(factory: &str, relation: Arc<dyn Relation>) -> Self {
        Self::with_seed(factory, relation, AttributeRegistry::new(), HashMap::new())
    }

    pub(crate) fn with_seed(
        factory: &str,
        relation: Arc<dyn Relation>,
        attributes: AttributeRegistry,
        traits: HashMap<String, AttributeRegistry>,
    ) -> Self {
        let valid_names = relation.attribute_names().into_iter().collect();
        Self {
            factory: factory.to_string(),
            relation,
            valid_names,
            attributes,
            traits,
            errors: Vec::new(),
        }
    }

    /// Declare a static value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        if self.check_name(name) {
            self.attributes
                .insert(Attribute::Value(ValueAttr::new(name, value)));
        }
        self
    }

    /// Declare a computed value. `deps` name the attributes whose resolved
    /// values arrive positionally in the block.
    pub fn computed(
        &mut self,
        name: &str,
        deps: &[&str],
        block: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        if self.check_name(name) {
            self.attributes
                .insert(Attribute::Callable(CallableAttr::new(name, deps, block)));
        }
        self
    }

    /// Declare a sequence: the block receives 1, 2, 3, … drawn from the
    /// counter shared by every builder targeting this relation.
    pub fn sequence(
        &mut self,
        name: &str,
        block: impl Fn(u64) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        if self.check_name(name) {
            self.attributes
                .insert(Attribute::Sequence(SequenceAttr::new(name, block)));
        }
        self
    }

    /// A sequence whose block additionally receives dependency values.
    pub fn sequence_with(
        &mut self,
        name: &str,
        deps: &[&str],
        block: impl Fn(u64, &[Value]) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        if self.check_name(name) {
            self.attributes.insert(Attribute::Sequence(
                SequenceAttr::with_dependencies(name, deps, block),
            ));
        }
        self
    }

    /// Declare an association by its relation-metadata name.
    pub fn association(&mut self, name: &str, opts: AssocOpts) -> &mut Self {
        match self.relation.association(name) {
            None => self.errors.push(FactoryError::UnknownAssociation {
                factory: self.factory.clone(),
                name: name.to_string(),
            }),
            Some(meta) => match AssociationAttr::new(meta, opts) {
                Ok(attr) => {
                    self.attributes.insert(Attribute::Association(attr));
                }
                Err(err) => self.errors.push(err),
            },
        }
        self
    }

    /// Declare a trait: a named overlay registry, optionally seeded from
    /// parent traits merged in declaration order.
    pub fn trait_def(
        &mut self,
        name: &str,
        parents: &[&str],
        body: impl FnOnce(&mut Dsl),
    ) -> &mut Self {
        let mut seed = AttributeRegistry::new();
        for parent in parents {
            if let Some(registry) = self.traits.get(*parent) {
                seed.merge(registry);
            }
        }
        let mut inner = Dsl::with_seed(
            &format!("{}_{}", self.factory, name),
            Arc::clone(&self.relation),
            seed,
            HashMap::new(),
        );
        body(&mut inner);
        self.errors.append(&mut inner.errors);
        self.traits.insert(name.to_string(), inner.attributes);
        self
    }

    /// Declare `created_at` and `updated_at` as now-valued computed
    /// attributes.
    pub fn timestamps(&mut self) -> &mut Self {
        self.computed("created_at", &[], |_| Value::Timestamp(Utc::now()));
        self.computed("updated_at", &[], |_| Value::Timestamp(Utc::now()))
    }

    /// Declare an attribute drawn from the fake-value provider on every
    /// build.
    #[cfg(feature = "fake-values")]
    pub fn fake(&mut self, name: &str, genre: &str, kind: &str) -> &mut Self {
        if !crate::fakes::supports(genre, kind) {
            self.errors.push(FactoryError::UnknownFakeKind {
                genre: genre.to_string(),
                kind: kind.to_string(),
            });
            return self;
        }
        let genre = genre.to_string();
        let kind = kind.to_string();
        self.computed(name, &[], move |_| {
            crate::fakes::fake(&genre, &kind).unwrap_or(Value::Null)
        })
    }

    fn check_name(&mut self, name: &str) -> bool {
        if self.valid_names.contains(name) {
            true
        } else {
            self.errors
                .push(FactoryError::UnknownAttributes(vec![name.to_string()]));
            false
        }
    }

    pub(crate) fn finish(
        self,
    ) -> Result<(AttributeRegistry, HashMap<String, AttributeRegistry>), FactoryError> {
        let mut unknown = Vec::new();
        let mut first_other = None;
        for error in self.errors {
            match error {
                FactoryError::UnknownAttributes(names) => unknown.extend(names),
                other => {
                    if first_other.is_none() {
                        first_other = Some(other);
                    }
                }
            }
        }
        if let Some(error) = first_other {
            return Err(error);
        }
        if !unknown.is_empty() {
            return Err(FactoryError::UnknownAttributes(unknown));
        }
        Ok((self.attributes, self.traits))
    }
}
