//! Value types a property may declare: a leaf kind or another declared type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Terminal value kinds. Values of these kinds are never resolved against
/// the entity graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafKind {
    String,
    Integer,
    Date,
}

impl LeafKind {
    pub const ALL: [LeafKind; 3] = [LeafKind::String, LeafKind::Integer, LeafKind::Date];

    pub fn name(&self) -> &'static str {
        match self {
            LeafKind::String => "string",
            LeafKind::Integer => "integer",
            LeafKind::Date => "date",
        }
    }

    pub fn is_leaf_name(name: &str) -> bool {
        name.parse::<LeafKind>().is_ok()
    }
}

impl FromStr for LeafKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(LeafKind::String),
            "integer" => Ok(LeafKind::Integer),
            "date" => Ok(LeafKind::Date),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The type a property points at.
///
/// Serialized as a bare string: a leaf name (`"string"`) or a declared
/// type name (`"country"`). Leaf names always win when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ValueType {
    Leaf(LeafKind),
    Declared(String),
}

impl ValueType {
    pub fn parse(name: &str) -> Self {
        match name.parse::<LeafKind>() {
            Ok(kind) => ValueType::Leaf(kind),
            Err(()) => ValueType::Declared(name.to_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ValueType::Leaf(kind) => kind.name(),
            ValueType::Declared(name) => name,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ValueType::Leaf(_))
    }

    /// The declared type name, if this is not a leaf.
    pub fn as_declared(&self) -> Option<&str> {
        match self {
            ValueType::Declared(name) => Some(name),
            ValueType::Leaf(_) => None,
        }
    }
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        match name.parse::<LeafKind>() {
            Ok(kind) => ValueType::Leaf(kind),
            Err(()) => ValueType::Declared(name),
        }
    }
}

impl From<&str> for ValueType {
    fn from(name: &str) -> Self {
        ValueType::parse(name)
    }
}

impl From<LeafKind> for ValueType {
    fn from(kind: LeafKind) -> Self {
        ValueType::Leaf(kind)
    }
}

impl From<ValueType> for String {
    fn from(v: ValueType) -> Self {
        match v {
            ValueType::Leaf(kind) => kind.name().to_owned(),
            ValueType::Declared(name) => name,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_names_parse_as_leaf() {
        assert_eq!(ValueType::parse("string"), ValueType::Leaf(LeafKind::String));
        assert_eq!(ValueType::parse("date"), ValueType::Leaf(LeafKind::Date));
        assert_eq!(ValueType::parse("city"), ValueType::Declared("city".into()));
    }

    #[test]
    fn test_serializes_as_bare_string() {
        let json = serde_json::to_string(&ValueType::parse("integer")).unwrap();
        assert_eq!(json, "\"integer\"");
        let back: ValueType = serde_json::from_str("\"continent\"").unwrap();
        assert_eq!(back.as_declared(), Some("continent"));
    }
}
