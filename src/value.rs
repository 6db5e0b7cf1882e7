//! Dynamic values for tuples under construction.
//!
//! A tuple is a name-to-value mapping assembled by the evaluator. Cells hold
//! scalars, timestamps, nested records, or — transiently — a deferred
//! association closure that stands in for a value that cannot be resolved
//! until the owning record's primary key is known.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::attributes::DeferredAssociation;

/// A name-to-value mapping for one record's attributes.
pub type AttrMap = BTreeMap<String, Value>;

/// A single tuple cell.
///
/// `Deferred` never appears in a finalized [`Record`]; it is invoked exactly
/// once with the owning record's attributes and a persist flag, then replaced
/// by its result.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// A nested associated record.
    Record(Record),
    /// A collection of nested associated records.
    Records(Vec<Record>),
    /// A pending association, resolvable only once the owning key is known.
    Deferred(DeferredAssociation),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Value::Records(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Timestamp(t) => write!(f, "{t:?}"),
            Value::Record(r) => write!(f, "{r:?}"),
            Value::Records(rs) => f.debug_list().entries(rs).finish(),
            Value::Deferred(d) => write!(f, "<deferred {}>", d.name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Records(a), Value::Records(b)) => a == b,
            // A pending closure is never equal to anything, itself included.
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Vec<Record>> for Value {
    fn from(rs: Vec<Record>) -> Self {
        Value::Records(rs)
    }
}

/// A finalized, immutable record produced by struct construction or
/// persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    relation: String,
    values: AttrMap,
}

impl Record {
    pub fn new(relation: impl Into<String>, values: AttrMap) -> Self {
        Self {
            relation: relation.into(),
            values,
        }
    }

    /// Dataset name of the relation this record belongs to.
    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &AttrMap {
        &self.values
    }

    pub fn into_values(self) -> AttrMap {
        self.values
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

/// Build an [`AttrMap`] from `key => value` pairs.
///
/// Values go through [`Value::from`], so plain literals work:
///
/// ```
/// use rowforge::{attrs, Value};
///
/// let map = attrs! { "first_name" => "Jane", "age" => 42 };
/// assert_eq!(map.get("first_name"), Some(&Value::Text("Jane".into())));
/// ```
#[macro_export]
macro_rules! attrs {
    () => { $crate::AttrMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::AttrMap::new();
        $(map.insert(::std::string::String::from($key), $crate::Value::from($value));)+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrs_macro_converts_literals() {
        let map = attrs! { "name" => "Jane", "admin" => true, "age" => 42 };
        assert_eq!(map.get("name").and_then(Value::as_str), Some("Jane"));
        assert_eq!(map.get("admin").and_then(Value::as_bool), Some(true));
        assert_eq!(map.get("age").and_then(Value::as_int), Some(42));
    }

    #[test]
    fn record_lookup() {
        let rec = Record::new("users", attrs! { "id" => 1 });
        assert_eq!(rec.relation(), "users");
        assert_eq!(rec.get("id").and_then(Value::as_int), Some(1));
        assert!(rec.get("missing").is_none());
    }
}
