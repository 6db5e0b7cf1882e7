//! Attribute variants: the units of tuple-value computation.
//!
//! Every attribute has a unique name within its registry and declares the
//! names of the attributes it depends on. The evaluator resolves values in
//! dependency order, so declaration order never matters to correctness.

mod association;

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

pub use association::{AssocOpts, AssociationAttr, DeferredAssociation};

/// Signature of a computed attribute block. Dependency values arrive
/// positionally, in declared order.
pub type AttrFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Signature of a sequence block: the drawn counter value plus dependency
/// values.
pub type SequenceFn = Arc<dyn Fn(u64, &[Value]) -> Value + Send + Sync>;

/// A named unit of tuple-value computation.
#[derive(Clone)]
pub enum Attribute {
    /// A static value.
    Value(ValueAttr),
    /// A lazily computed value with declared dependencies.
    Callable(CallableAttr),
    /// A value derived from a shared monotonic counter.
    Sequence(SequenceAttr),
    /// A relational association.
    Association(AssociationAttr),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Value(a) => a.name(),
            Attribute::Callable(a) => a.name(),
            Attribute::Sequence(a) => a.name(),
            Attribute::Association(a) => a.name(),
        }
    }

    pub fn dependency_names(&self) -> &[String] {
        match self {
            Attribute::Value(_) | Attribute::Association(_) => &[],
            Attribute::Callable(a) => a.dependency_names(),
            Attribute::Sequence(a) => a.dependency_names(),
        }
    }

    /// True for everything that is not an association.
    pub fn is_value(&self) -> bool {
        !matches!(self, Attribute::Association(_))
    }

    pub fn as_association(&self) -> Option<&AssociationAttr> {
        match self {
            Attribute::Association(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Value(a) => write!(f, "Value({:?})", a.name()),
            Attribute::Callable(a) => write!(f, "Callable({:?})", a.name()),
            Attribute::Sequence(a) => write!(f, "Sequence({:?})", a.name()),
            Attribute::Association(a) => write!(f, "Association({:?})", a.name()),
        }
    }
}

/// A static attribute value.
#[derive(Clone)]
pub struct ValueAttr {
    name: String,
    value: Value,
}

impl ValueAttr {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A computed attribute. Evaluated once per tuple build, after every
/// attribute it depends on.
#[derive(Clone)]
pub struct CallableAttr {
    name: String,
    dependency_names: Vec<String>,
    block: AttrFn,
}

impl CallableAttr {
    pub fn new(
        name: impl Into<String>,
        dependency_names: &[&str],
        block: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dependency_names: dependency_names.iter().map(|s| s.to_string()).collect(),
            block: Arc::new(block),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependency_names(&self) -> &[String] {
        &self.dependency_names
    }

    pub fn call(&self, deps: &[Value]) -> Value {
        (self.block)(deps)
    }
}

/// A sequence attribute. The counter is drawn from the shared
/// [`Sequences`](crate::Sequences) service, keyed by the owning relation and
/// this attribute's name — never per-instance state.
#[derive(Clone)]
pub struct SequenceAttr {
    name: String,
    dependency_names: Vec<String>,
    block: SequenceFn,
}

impl SequenceAttr {
    pub fn new(
        name: impl Into<String>,
        block: impl Fn(u64) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dependency_names: Vec::new(),
            block: Arc::new(move |n, _deps| block(n)),
        }
    }

    pub fn with_dependencies(
        name: impl Into<String>,
        dependency_names: &[&str],
        block: impl Fn(u64, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dependency_names: dependency_names.iter().map(|s| s.to_string()).collect(),
            block: Arc::new(block),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependency_names(&self) -> &[String] {
        &self.dependency_names
    }

    pub fn call(&self, n: u64, deps: &[Value]) -> Value {
        (self.block)(n, deps)
    }
}
