//! Property values held by entities.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EntityId;

/// A value stored under an entity property.
///
/// On disk every variant is a plain JSON scalar: `Unknown` is `null`,
/// numbers are numbers, and both text and references are strings. Whether a
/// string is a reference is decided by the schema when the graph is loaded,
/// so a freshly deserialized string is always `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Not yet observed.
    Unknown,
    Integer(i64),
    Float(f64),
    Text(String),
    Ref(EntityId),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Unknown => "UNKNOWN",
            PropertyValue::Integer(_) => "INTEGER",
            PropertyValue::Float(_) => "FLOAT",
            PropertyValue::Text(_) => "TEXT",
            PropertyValue::Ref(_) => "REF",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PropertyValue::Unknown)
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text or a reference's id, as a plain string. Readers that already
    /// know a property's declared type use this so they do not depend on
    /// which variant the value happens to be stored as.
    pub fn as_plain_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Ref(id) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&EntityId> {
        match self {
            PropertyValue::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// Reinterpret as a leaf literal. References collapse to their id text.
    pub fn into_leaf(self) -> Self {
        match self {
            PropertyValue::Ref(id) => PropertyValue::Text(id.into_inner()),
            other => other,
        }
    }

    /// Reinterpret a string as a reference. Used when decoding persisted
    /// values for properties whose declared type is not a leaf.
    pub fn into_reference(self) -> Self {
        match self {
            PropertyValue::Text(s) => PropertyValue::Ref(EntityId::from(s)),
            other => other,
        }
    }
}

impl From<i64> for PropertyValue { fn from(v: i64) -> Self { PropertyValue::Integer(v) } }
impl From<i32> for PropertyValue { fn from(v: i32) -> Self { PropertyValue::Integer(v as i64) } }
impl From<f64> for PropertyValue { fn from(v: f64) -> Self { PropertyValue::Float(v) } }
impl From<String> for PropertyValue { fn from(v: String) -> Self { PropertyValue::Text(v) } }
impl From<&str> for PropertyValue { fn from(v: &str) -> Self { PropertyValue::Text(v.to_owned()) } }
impl From<EntityId> for PropertyValue { fn from(v: EntityId) -> Self { PropertyValue::Ref(v) } }
impl From<&EntityId> for PropertyValue { fn from(v: &EntityId) -> Self { PropertyValue::Ref(v.clone()) } }

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Unknown => write!(f, "UNKNOWN"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Text(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            PropertyValue::Ref(id) => write!(f, "@{id}"),
        }
    }
}
