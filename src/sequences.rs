//! Shared monotonic counters for sequence attributes and primary keys.
//!
//! Counters are keyed by (relation identity, attribute name), so every
//! builder targeting the same collection draws from the same pool — a child
//! factory defined by inheritance cannot collide with its parent's keys.
//! The service is owned by the top-level [`Factories`](crate::Factories)
//! object and injected into evaluators; there is no process-wide singleton.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::relation::RelationId;

/// Key for one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub relation: String,
    pub attribute: String,
}

impl SequenceKey {
    pub fn new(relation: &RelationId, attribute: impl Into<String>) -> Self {
        Self {
            relation: relation.to_string(),
            attribute: attribute.into(),
        }
    }
}

/// Thread-safe monotonic counters.
///
/// `next` returns 1, 2, 3, … per key; every value is handed out exactly once
/// even under concurrent callers for the same key.
#[derive(Debug, Default)]
pub struct Sequences {
    counters: RwLock<HashMap<SequenceKey, Arc<AtomicU64>>>,
}

impl Sequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next value for `key`.
    pub fn next(&self, key: &SequenceKey) -> u64 {
        if let Some(counter) = self.counters.read().get(key) {
            return counter.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let counter = {
            let mut counters = self.counters.write();
            counters
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone()
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Clear every counter; the next draw for any key starts from 1 again.
    ///
    /// Intended for isolation between test cases.
    pub fn reset(&self) {
        self.counters.write().clear();
    }
}
