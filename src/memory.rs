//! In-memory reference store.
//!
//! Implements the [`Store`]/[`Relation`] boundary over plain maps: schema
//! registration, per-table auto-increment keys, insert, fetch-by-key, and
//! association-combining fetches. The test suite runs against it, and
//! downstream crates can use it as a drop-in store double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::RwLock;

use crate::relation::{
    AssociationKind, AssociationMeta, Relation, RelationId, Store, ThroughMeta,
};
use crate::value::{AttrMap, Record, Value};

#[derive(Clone)]
struct AssocDecl {
    key: String,
    kind: AssociationKind,
    target: String,
    foreign_key: String,
    through: Option<ThroughMeta>,
}

#[derive(Clone)]
struct RelationDef {
    dataset: String,
    attributes: Vec<String>,
    primary_key: Vec<String>,
    associations: Vec<AssocDecl>,
}

struct MemoryInner {
    relations: RwLock<HashMap<String, RelationDef>>,
    rows: RwLock<HashMap<String, Vec<AttrMap>>>,
    next_keys: RwLock<HashMap<String, i64>>,
    inserts: AtomicU64,
}

/// A schema-aware in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                relations: RwLock::new(HashMap::new()),
                rows: RwLock::new(HashMap::new()),
                next_keys: RwLock::new(HashMap::new()),
                inserts: AtomicU64::new(0),
            }),
        }
    }

    /// Register a relation schema.
    pub fn relation(&self, dataset: &str, body: impl FnOnce(&mut RelationSchema)) -> &Self {
        let mut schema = RelationSchema {
            def: RelationDef {
                dataset: dataset.to_string(),
                attributes: Vec::new(),
                primary_key: Vec::new(),
                associations: Vec::new(),
            },
        };
        body(&mut schema);
        self.inner
            .relations
            .write()
            .insert(dataset.to_string(), schema.def);
        self
    }

    /// Total number of rows written since creation. Test hook.
    pub fn insert_count(&self) -> u64 {
        self.inner.inserts.load(Ordering::SeqCst)
    }

    /// Snapshot of a table's rows. Test hook.
    pub fn rows(&self, dataset: &str) -> Vec<AttrMap> {
        self.inner
            .rows
            .read()
            .get(dataset)
            .cloned()
            .unwrap_or_default()
    }

    fn relation_handle(&self, dataset: &str) -> MemoryRelation {
        MemoryRelation {
            inner: Arc::clone(&self.inner),
            dataset: dataset.to_string(),
        }
    }
}

impl Store for MemoryStore {
    fn relation(&self, dataset: &str) -> Option<Arc<dyn Relation>> {
        if !self.inner.relations.read().contains_key(dataset) {
            return None;
        }
        Some(Arc::new(self.relation_handle(dataset)))
    }

    fn persist_join(
        &self,
        through: &ThroughMeta,
        parent_key: &Value,
        child_keys: &[Value],
    ) -> Result<(), anyhow::Error> {
        let join = self.relation_handle(&through.relation);
        for child_key in child_keys {
            let mut row = AttrMap::new();
            row.insert(through.source_foreign_key.clone(), parent_key.clone());
            row.insert(through.target_foreign_key.clone(), child_key.clone());
            join.insert(row)?;
        }
        Ok(())
    }
}

/// Schema declaration context for one relation.
pub struct RelationSchema {
    def: RelationDef,
}

impl RelationSchema {
    pub fn attribute(&mut self, name: &str) -> &mut Self {
        self.def.attributes.push(name.to_string());
        self
    }

    pub fn attributes(&mut self, names: &[&str]) -> &mut Self {
        for name in names {
            self.attribute(name);
        }
        self
    }

    /// Declare a primary-key column. Call repeatedly for composite keys.
    pub fn primary_key(&mut self, name: &str) -> &mut Self {
        if !self.def.attributes.iter().any(|a| a == name) {
            self.def.attributes.insert(0, name.to_string());
        }
        self.def.primary_key.push(name.to_string());
        self
    }

    /// belongs-to: `foreign_key` lives on this relation.
    pub fn belongs_to(&mut self, key: &str, target: &str, foreign_key: &str) -> &mut Self {
        self.push_assoc(key, AssociationKind::ManyToOne, target, foreign_key, None)
    }

    /// has-many: `foreign_key` lives on the target relation.
    pub fn has_many(&mut self, key: &str, target: &str, foreign_key: &str) -> &mut Self {
        self.push_assoc(key, AssociationKind::OneToMany, target, foreign_key, None)
    }

    /// has-one: as has-many, restricted to a single row.
    pub fn has_one(&mut self, key: &str, target: &str, foreign_key: &str) -> &mut Self {
        self.push_assoc(key, AssociationKind::OneToOne, target, foreign_key, None)
    }

    /// many-to-many through a join relation.
    pub fn many_to_many(&mut self, key: &str, target: &str, through: ThroughMeta) -> &mut Self {
        let foreign_key = through.source_foreign_key.clone();
        self.push_assoc(
            key,
            AssociationKind::ManyToMany,
            target,
            &foreign_key,
            Some(through),
        )
    }

    /// has-one through a join relation.
    pub fn has_one_through(&mut self, key: &str, target: &str, through: ThroughMeta) -> &mut Self {
        let foreign_key = through.source_foreign_key.clone();
        self.push_assoc(
            key,
            AssociationKind::OneToOneThrough,
            target,
            &foreign_key,
            Some(through),
        )
    }

    fn push_assoc(
        &mut self,
        key: &str,
        kind: AssociationKind,
        target: &str,
        foreign_key: &str,
        through: Option<ThroughMeta>,
    ) -> &mut Self {
        self.def.associations.push(AssocDecl {
            key: key.to_string(),
            kind,
            target: target.to_string(),
            foreign_key: foreign_key.to_string(),
            through,
        });
        self
    }
}

struct MemoryRelation {
    inner: Arc<MemoryInner>,
    dataset: String,
}

impl MemoryRelation {
    fn def(&self) -> Result<RelationDef, anyhow::Error> {
        self.inner
            .relations
            .read()
            .get(&self.dataset)
            .cloned()
            .ok_or_else(|| anyhow!("relation {:?} not registered", self.dataset))
    }

    fn build_meta(
        relations: &HashMap<String, RelationDef>,
        def: &RelationDef,
        decl: &AssocDecl,
    ) -> AssociationMeta {
        let source_primary_key = def
            .primary_key
            .first()
            .cloned()
            .unwrap_or_else(|| "id".to_string());
        let target_primary_key = relations
            .get(&decl.target)
            .and_then(|d| d.primary_key.first().cloned())
            .unwrap_or_else(|| "id".to_string());
        AssociationMeta {
            key: decl.key.clone(),
            kind: decl.kind,
            source: def.dataset.clone(),
            target: decl.target.clone(),
            foreign_key: decl.foreign_key.clone(),
            source_primary_key,
            target_primary_key,
            source_alias: singular(&def.dataset),
            through: decl.through.clone(),
        }
    }

    fn combined_value(
        &self,
        meta: &AssociationMeta,
        row: &AttrMap,
    ) -> Result<Value, anyhow::Error> {
        let rows = self.inner.rows.read();
        let empty = Vec::new();
        let target_rows = rows.get(&meta.target).unwrap_or(&empty);
        let value = match meta.kind {
            AssociationKind::ManyToOne => {
                let fk = row.get(&meta.foreign_key).cloned().unwrap_or(Value::Null);
                if fk.is_null() {
                    Value::Null
                } else {
                    target_rows
                        .iter()
                        .find(|r| r.get(&meta.target_primary_key) == Some(&fk))
                        .map(|r| Value::Record(Record::new(meta.target.clone(), r.clone())))
                        .unwrap_or(Value::Null)
                }
            }
            AssociationKind::OneToMany | AssociationKind::OneToOne => {
                let key = row
                    .get(&meta.source_primary_key)
                    .cloned()
                    .unwrap_or(Value::Null);
                let matched: Vec<Record> = target_rows
                    .iter()
                    .filter(|r| r.get(&meta.foreign_key) == Some(&key))
                    .map(|r| Record::new(meta.target.clone(), r.clone()))
                    .collect();
                if meta.kind == AssociationKind::OneToOne {
                    matched
                        .into_iter()
                        .next()
                        .map(Value::Record)
                        .unwrap_or(Value::Null)
                } else {
                    Value::Records(matched)
                }
            }
            AssociationKind::ManyToMany | AssociationKind::OneToOneThrough => {
                let through = meta
                    .through
                    .as_ref()
                    .ok_or_else(|| anyhow!("association {:?} has no join metadata", meta.key))?;
                let join_rows = rows.get(&through.relation).unwrap_or(&empty);
                let key = row
                    .get(&meta.source_primary_key)
                    .cloned()
                    .unwrap_or(Value::Null);
                let child_keys: Vec<Value> = join_rows
                    .iter()
                    .filter(|j| j.get(&through.source_foreign_key) == Some(&key))
                    .filter_map(|j| j.get(&through.target_foreign_key).cloned())
                    .collect();
                let matched: Vec<Record> = target_rows
                    .iter()
                    .filter(|r| {
                        r.get(&meta.target_primary_key)
                            .map(|v| child_keys.contains(v))
                            .unwrap_or(false)
                    })
                    .map(|r| Record::new(meta.target.clone(), r.clone()))
                    .collect();
                if meta.kind == AssociationKind::OneToOneThrough {
                    matched
                        .into_iter()
                        .next()
                        .map(Value::Record)
                        .unwrap_or(Value::Null)
                } else {
                    Value::Records(matched)
                }
            }
        };
        Ok(value)
    }
}

impl Relation for MemoryRelation {
    fn id(&self) -> RelationId {
        RelationId::new("memory", self.dataset.clone())
    }

    fn attribute_names(&self) -> Vec<String> {
        self.def().map(|d| d.attributes).unwrap_or_default()
    }

    fn primary_key(&self) -> Vec<String> {
        self.def().map(|d| d.primary_key).unwrap_or_default()
    }

    fn association(&self, name: &str) -> Option<AssociationMeta> {
        let relations = self.inner.relations.read();
        let def = relations.get(&self.dataset)?;
        let decl = def.associations.iter().find(|d| d.key == name)?;
        Some(Self::build_meta(&relations, def, decl))
    }

    fn associations(&self) -> Vec<AssociationMeta> {
        let relations = self.inner.relations.read();
        let Some(def) = relations.get(&self.dataset) else {
            return Vec::new();
        };
        def.associations
            .iter()
            .map(|decl| Self::build_meta(&relations, def, decl))
            .collect()
    }

    fn insert(&self, mut row: AttrMap) -> Result<AttrMap, anyhow::Error> {
        let def = self.def()?;
        row.retain(|k, _| def.attributes.iter().any(|a| a == k));
        for pk in &def.primary_key {
            let missing = row.get(pk).map(Value::is_null).unwrap_or(true);
            if missing {
                let mut keys = self.inner.next_keys.write();
                let counter = keys
                    .entry(format!("{}.{}", self.dataset, pk))
                    .or_insert(0);
                *counter += 1;
                row.insert(pk.clone(), Value::Int(*counter));
            }
        }
        for name in &def.attributes {
            row.entry(name.clone()).or_insert(Value::Null);
        }
        self.inner
            .rows
            .write()
            .entry(self.dataset.clone())
            .or_default()
            .push(row.clone());
        self.inner.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    fn by_pk(&self, pk: &[Value]) -> Result<Option<AttrMap>, anyhow::Error> {
        let def = self.def()?;
        if def.primary_key.len() != pk.len() {
            return Err(anyhow!(
                "relation {:?} has {} key column(s), got {} value(s)",
                self.dataset,
                def.primary_key.len(),
                pk.len()
            ));
        }
        let rows = self.inner.rows.read();
        let found = rows.get(&self.dataset).and_then(|table| {
            table
                .iter()
                .find(|row| {
                    def.primary_key
                        .iter()
                        .zip(pk)
                        .all(|(col, value)| row.get(col) == Some(value))
                })
                .cloned()
        });
        Ok(found)
    }

    fn fetch_combined(
        &self,
        pk: &[Value],
        assoc_names: &[String],
    ) -> Result<Record, anyhow::Error> {
        let row = self
            .by_pk(pk)?
            .ok_or_else(|| anyhow!("no row in {:?} for key {:?}", self.dataset, pk))?;
        let mut values = row.clone();
        for name in assoc_names {
            let meta = self.association(name).ok_or_else(|| {
                anyhow!("unknown association {:?} on {:?}", name, self.dataset)
            })?;
            let value = self.combined_value(&meta, &row)?;
            values.insert(name.clone(), value);
        }
        Ok(Record::new(self.dataset.clone(), values))
    }
}

fn singular(dataset: &str) -> String {
    dataset.strip_suffix('s').unwrap_or(dataset).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.relation("users", |r| {
            r.primary_key("id").attributes(&["name"]).has_many(
                "tasks",
                "tasks",
                "user_id",
            );
        });
        store.relation("tasks", |r| {
            r.primary_key("id")
                .attributes(&["user_id", "title"])
                .belongs_to("user", "users", "user_id");
        });
        store
    }

    #[test]
    fn insert_assigns_missing_keys() {
        let store = store();
        let users = Store::relation(&store, "users").unwrap();
        let row = users.insert(attrs! { "name" => "Jane" }).unwrap();
        assert_eq!(row.get("id").and_then(Value::as_int), Some(1));
        let row = users.insert(attrs! { "name" => "John" }).unwrap();
        assert_eq!(row.get("id").and_then(Value::as_int), Some(2));
        assert_eq!(store.insert_count(), 2);
    }

    #[test]
    fn fetch_combined_nests_children() {
        let store = store();
        let users = Store::relation(&store, "users").unwrap();
        let tasks = Store::relation(&store, "tasks").unwrap();
        let user = users.insert(attrs! { "name" => "Jane" }).unwrap();
        let user_id = user.get("id").cloned().unwrap();
        tasks
            .insert(attrs! { "user_id" => user_id.clone(), "title" => "one" })
            .unwrap();
        tasks
            .insert(attrs! { "user_id" => user_id.clone(), "title" => "two" })
            .unwrap();

        let combined = users
            .fetch_combined(&[user_id], &["tasks".to_string()])
            .unwrap();
        let children = combined.get("tasks").and_then(Value::as_records).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn by_pk_misses_return_none() {
        let store = store();
        let users = Store::relation(&store, "users").unwrap();
        assert!(users.by_pk(&[Value::Int(99)]).unwrap().is_none());
    }
}
