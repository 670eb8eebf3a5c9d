//! Attribute value system.
//!
//! Property sets on nodes and edges are ordered `(attr_id, value)` lists,
//! per the data model: lookup is linear in property count because property
//! sets are expected to be small. Attribute names are interned through
//! [`crate::runtime::Runtime`] so attribute sets carry `AttrId` (a `u32`)
//! rather than repeated `String`s.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interned attribute name id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrId(pub u32);

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr#{}", self.0)
    }
}

/// Tagged union over the value types an attribute can hold.
///
/// `Float` deliberately does not derive `Eq`/`Hash` (NaN has no total order);
/// callers that need set semantics over attribute values should match on the
/// variant explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<AttrValue>),
    Null,
}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::Array(_) => "array",
            AttrValue::Null => "null",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            (AttrValue::Int(a), AttrValue::Int(b)) => a == b,
            (AttrValue::Float(a), AttrValue::Float(b)) => a == b,
            (AttrValue::Str(a), AttrValue::Str(b)) => a == b,
            (AttrValue::Array(a), AttrValue::Array(b)) => a == b,
            (AttrValue::Null, AttrValue::Null) => true,
            _ => false,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// Ordered `(attr_id, value)` pairs attached to a node or edge.
///
/// Property sets are expected to be small (a handful of fields), so lookup
/// is a linear scan rather than a hash map — avoids the allocation and
/// hashing overhead a `HashMap` would impose on the common 2-5 property case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    entries: Vec<(AttrId, AttrValue)>,
}

impl AttributeSet {
    pub fn new() -> Self {
        AttributeSet { entries: Vec::new() }
    }

    pub fn get(&self, id: AttrId) -> Option<&AttrValue> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, v)| v)
    }

    /// Sets an attribute, replacing any existing value for `id`.
    pub fn set(&mut self, id: AttrId, value: AttrValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == id) {
            slot.1 = value;
        } else {
            self.entries.push((id, value));
        }
    }

    pub fn remove(&mut self, id: AttrId) -> Option<AttrValue> {
        let idx = self.entries.iter().position(|(k, _)| *k == id)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(AttrId, AttrValue)> {
        self.entries.iter()
    }
}

impl FromIterator<(AttrId, AttrValue)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (AttrId, AttrValue)>>(iter: I) -> Self {
        AttributeSet { entries: iter.into_iter().collect() }
    }
}
