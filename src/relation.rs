//! The store-collaborator boundary.
//!
//! This crate never talks SQL. Everything it needs from the relational layer
//! is behind [`Store`] and [`Relation`]: schema attribute names, primary-key
//! names, association metadata, and insert/fetch operations. Association
//! metadata arrives fully precomputed — including singular aliases and join
//! attribute names — so no inflection ever happens on this side of the
//! boundary.

use std::fmt;
use std::sync::Arc;

use crate::value::{AttrMap, Record, Value};

/// Identity of a relation inside a store: gateway plus dataset name.
///
/// Used to key sequence counters, so two stores with the same dataset names
/// do not share counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationId {
    pub gateway: String,
    pub dataset: String,
}

impl RelationId {
    pub fn new(gateway: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.gateway, self.dataset)
    }
}

/// The closed set of association shapes the evaluator knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// belongs-to: the foreign key lives on the owning tuple.
    ManyToOne,
    /// has-many: the foreign key lives on the target rows.
    OneToMany,
    /// has-one: as has-many, restricted to a single row.
    OneToOne,
    /// has-one through a join relation.
    OneToOneThrough,
    /// many-to-many through a join relation.
    ManyToMany,
}

impl AssociationKind {
    /// True for kinds that resolve to at most one record.
    pub fn is_to_one(self) -> bool {
        matches!(self, AssociationKind::OneToOne | AssociationKind::OneToOneThrough)
    }

    /// True for kinds that go through a join relation.
    pub fn is_through(self) -> bool {
        matches!(self, AssociationKind::OneToOneThrough | AssociationKind::ManyToMany)
    }
}

/// Join-relation wiring for through associations.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughMeta {
    /// Dataset name of the join relation.
    pub relation: String,
    /// Factory name to delegate join-row creation to, when one is registered.
    pub factory: String,
    /// Attribute name under which the join factory receives the parent record.
    pub source_attr: String,
    /// Attribute name under which the join factory receives the target record.
    pub target_attr: String,
    /// Foreign key on the join relation referencing the owning side.
    pub source_foreign_key: String,
    /// Foreign key on the join relation referencing the target side.
    pub target_foreign_key: String,
}

/// Read-only association metadata supplied by the store layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationMeta {
    /// The attribute name this association exposes on the tuple.
    pub key: String,
    pub kind: AssociationKind,
    /// Dataset name of the owning relation.
    pub source: String,
    /// Dataset name of the target relation.
    pub target: String,
    /// Foreign-key column: on the owning tuple for [`AssociationKind::ManyToOne`],
    /// on the target rows otherwise.
    pub foreign_key: String,
    pub source_primary_key: String,
    pub target_primary_key: String,
    /// Singular name of the owning relation, used for the struct-mode
    /// back-reference on has-one children.
    pub source_alias: String,
    pub through: Option<ThroughMeta>,
}

impl AssociationMeta {
    /// True when this association cannot resolve before the owning record's
    /// key exists — i.e. the foreign key points back at `relation`.
    pub fn dependency_on(&self, relation: &str) -> bool {
        !matches!(self.kind, AssociationKind::ManyToOne) && self.source == relation
    }

    /// Foreign-key cell for the owning tuple referencing `parent`.
    pub fn parent_key(&self, parent: &Record) -> (String, Value) {
        let value = parent
            .get(&self.target_primary_key)
            .cloned()
            .unwrap_or(Value::Null);
        (self.foreign_key.clone(), value)
    }

    /// Foreign-key cell for a child row referencing the owning `parent`
    /// attributes.
    pub fn child_key(&self, parent: &AttrMap) -> (String, Value) {
        let value = parent
            .get(&self.source_primary_key)
            .cloned()
            .unwrap_or(Value::Null);
        (self.foreign_key.clone(), value)
    }
}

/// One relation of the backing store.
pub trait Relation: Send + Sync {
    /// Identity used for sequence scoping.
    fn id(&self) -> RelationId;

    /// Names of every schema attribute.
    fn attribute_names(&self) -> Vec<String>;

    /// Primary-key column names. May be empty, may be composite.
    fn primary_key(&self) -> Vec<String>;

    /// Metadata for the named association, if declared.
    fn association(&self, name: &str) -> Option<AssociationMeta>;

    /// Every declared association.
    fn associations(&self) -> Vec<AssociationMeta>;

    /// Insert a row and return it as stored, with any store-assigned keys
    /// filled in.
    fn insert(&self, row: AttrMap) -> Result<AttrMap, anyhow::Error>;

    /// Fetch a row by primary-key values.
    fn by_pk(&self, pk: &[Value]) -> Result<Option<AttrMap>, anyhow::Error>;

    /// Fetch a row by primary-key values with the named associations nested
    /// into the result.
    fn fetch_combined(&self, pk: &[Value], assoc_names: &[String])
        -> Result<Record, anyhow::Error>;
}

/// The backing store: a bag of relations plus the bulk join-persist
/// fallback used by through associations with no registered join factory.
pub trait Store: Send + Sync {
    fn relation(&self, dataset: &str) -> Option<Arc<dyn Relation>>;

    /// Write join rows pairing `parent_key` with each of `child_keys`.
    fn persist_join(
        &self,
        through: &ThroughMeta,
        parent_key: &Value,
        child_keys: &[Value],
    ) -> Result<(), anyhow::Error>;
}
