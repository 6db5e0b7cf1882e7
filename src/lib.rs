//! rowforge: declarative test-data factories for relational stores.
//!
//! A factory declares how to produce records for one relation — static
//! values, computed attributes, shared sequences, traits, and associations —
//! and exposes two construction modes over the same resolution engine:
//!
//! - **struct**: a pure in-memory record, never touching the store
//! - **create**: a persisted row, with associated records persisted and the
//!   result re-read with its associations combined
//!
//! Attribute declarations form an unordered bag; the evaluator orders them
//! by declared dependencies, so `email` can be computed from `first_name`
//! regardless of declaration order. Associations whose foreign key points
//! back at the record under construction are deferred until its key exists.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rowforge::{attrs, Factories, MemoryStore, Value};
//!
//! let store = MemoryStore::new();
//! store.relation("users", |r| {
//!     r.primary_key("id")
//!         .attributes(&["first_name", "last_name", "email"]);
//! });
//!
//! let factories = Factories::new(Arc::new(store));
//! factories
//!     .define("user", |f| {
//!         f.set("first_name", "Jane")
//!             .set("last_name", "Doe")
//!             .sequence("email", |n| Value::from(format!("user{n}@rowforge.dev")));
//!     })
//!     .unwrap();
//!
//! let user = factories.create("user", &[], attrs! {}).unwrap();
//! assert_eq!(
//!     user.get("email").and_then(Value::as_str),
//!     Some("user1@rowforge.dev")
//! );
//!
//! // Overrides always win and are never re-derived.
//! let user = factories
//!     .create("user", &[], attrs! { "first_name" => "Joe" })
//!     .unwrap();
//! assert_eq!(user.get("first_name").and_then(Value::as_str), Some("Joe"));
//! ```

mod attributes;
mod builder;
mod dsl;
mod error;
mod evaluator;
mod factories;
#[cfg(feature = "fake-values")]
pub mod fakes;
mod memory;
mod registry;
mod relation;
mod sequences;
mod value;

pub use attributes::{
    AssocOpts, AssociationAttr, AttrFn, Attribute, CallableAttr, DeferredAssociation,
    SequenceAttr, SequenceFn, ValueAttr,
};
pub use builder::{Builder, Persistable, TraitRef};
pub use dsl::Dsl;
pub use error::FactoryError;
pub use evaluator::TupleEvaluator;
pub use factories::{Factories, Structs};
pub use memory::{MemoryStore, RelationSchema};
pub use relation::{
    AssociationKind, AssociationMeta, Relation, RelationId, Store, ThroughMeta,
};
pub use registry::AttributeRegistry;
pub use sequences::{SequenceKey, Sequences};
pub use value::{AttrMap, Record, Value};
