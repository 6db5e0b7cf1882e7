//! Error types for factory definition and tuple construction.

use thiserror::Error;

/// Everything that can go wrong while defining a factory or building a
/// record.
///
/// All errors are synchronous; construction is all-or-nothing and no partial
/// tuple ever reaches the caller. Store failures are carried opaquely — this
/// crate imposes no retry or transaction semantics of its own.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// A factory with this name was already registered.
    #[error("factory {0:?} has already been defined")]
    AlreadyDefined(String),

    /// Lookup of a factory name that was never defined.
    #[error("factory {0:?} not defined")]
    FactoryNotDefined(String),

    /// The store has no relation under this dataset name.
    #[error("relation {0:?} not defined in the store")]
    RelationNotDefined(String),

    /// Caller-supplied attribute names absent from both the relation schema
    /// and the declared associations. Lists every offender.
    #[error("unknown attributes: {}", .0.join(", "))]
    UnknownAttributes(Vec<String>),

    /// `association` was declared for a name the relation metadata does not
    /// know about.
    #[error("association {name:?} not defined on the relation of factory {factory:?}")]
    UnknownAssociation { factory: String, name: String },

    /// A `count` other than 0 or 1 on a to-one association.
    #[error("count cannot be greater than 1 on a to-one association ({name:?} got {count})")]
    InvalidCount { name: String, count: usize },

    /// The attribute dependency graph contains a cycle.
    #[error("attribute dependency cycle detected: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// The fake-value provider does not support this (genre, kind) pair.
    #[error("unsupported fake value kind: {genre}.{kind}")]
    UnknownFakeKind { genre: String, kind: String },

    /// A store-collaborator failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
