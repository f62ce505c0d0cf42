//! Entities: typed records in the graph.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::PropertyValue;

/// Opaque entity identifier (a UUID v4 string for generated ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed entity. Persisted as one flat JSON object whose reserved
/// `@type` key carries the type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "@type")]
    pub type_name: String,
    #[serde(flatten)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}

/// All entities keyed by id. Ordered so persisted files diff cleanly.
pub type EntityMap = BTreeMap<EntityId, Entity>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn test_entity_json_shape() {
        let entity = Entity::new("person")
            .with_property("name", "Hamish")
            .with_property("age", PropertyValue::Unknown);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"@type": "person", "name": "Hamish", "age": null})
        );
        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }
}
