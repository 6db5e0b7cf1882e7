//! Ordered, name-keyed attribute collections.
//!
//! A registry is declared as an unordered bag but traversed in dependency
//! order, which is what lets a factory compute `email` from `first_name`
//! without the author sequencing declarations by hand.

use crate::attributes::Attribute;
use crate::error::FactoryError;

/// An ordered collection of attributes, unique by name.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    elements: Vec<Attribute>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Attribute>) -> Self {
        let mut registry = Self::new();
        for element in elements {
            registry.insert(element);
        }
        registry
    }

    /// Upsert by name: a duplicate replaces the prior attribute and moves to
    /// the end, everything else keeps its insertion order.
    pub fn insert(&mut self, attribute: Attribute) -> &mut Self {
        if let Some(pos) = self.position(attribute.name()) {
            self.elements.remove(pos);
        }
        self.elements.push(attribute);
        self
    }

    /// Insert clones of every attribute in `other`, with the same upsert
    /// semantics.
    pub fn merge(&mut self, other: &AttributeRegistry) -> &mut Self {
        for attribute in &other.elements {
            self.insert(attribute.clone());
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Attribute> {
        self.position(name).map(|pos| &self.elements[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.elements.iter()
    }

    /// Sub-registry of everything that is not an association.
    pub fn values(&self) -> AttributeRegistry {
        AttributeRegistry {
            elements: self
                .elements
                .iter()
                .filter(|a| a.is_value())
                .cloned()
                .collect(),
        }
    }

    /// Sub-registry of association attributes only.
    pub fn associations(&self) -> AttributeRegistry {
        AttributeRegistry {
            elements: self
                .elements
                .iter()
                .filter(|a| !a.is_value())
                .cloned()
                .collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|a| a.name() == name)
    }

    /// Attributes ordered so that every resolvable declared dependency
    /// precedes its dependent. Dependency names that do not resolve within
    /// this registry (caller overrides, for instance) impose no constraint.
    /// Ties keep insertion order, so the result is stable across calls.
    pub fn topological_order(&self) -> Result<Vec<&Attribute>, FactoryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit<'a>(
            registry: &'a AttributeRegistry,
            idx: usize,
            marks: &mut [Mark],
            order: &mut Vec<&'a Attribute>,
            stack: &mut Vec<String>,
        ) -> Result<(), FactoryError> {
            match marks[idx] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    let name = registry.elements[idx].name().to_string();
                    let start = stack.iter().position(|n| *n == name).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..].to_vec();
                    path.push(name);
                    return Err(FactoryError::DependencyCycle { path });
                }
                Mark::Unvisited => {}
            }
            marks[idx] = Mark::InProgress;
            stack.push(registry.elements[idx].name().to_string());
            for dep in registry.elements[idx].dependency_names() {
                if let Some(dep_idx) = registry.position(dep) {
                    visit(registry, dep_idx, marks, order, stack)?;
                }
            }
            stack.pop();
            marks[idx] = Mark::Done;
            order.push(&registry.elements[idx]);
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.elements.len()];
        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack = Vec::new();
        for idx in 0..self.elements.len() {
            visit(self, idx, &mut marks, &mut order, &mut stack)?;
        }
        Ok(order)
    }
}
