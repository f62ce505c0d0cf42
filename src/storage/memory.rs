//! In-memory store.
//!
//! Keeps the same JSON encoding as [`JsonStore`](super::JsonStore) but in
//! process memory, so a save/load cycle goes through identical
//! serialization without touching disk. Useful for tests and embedding.

use std::collections::BTreeMap;

use super::{to_pretty_json, Persistence};
use crate::graph::normalize_values;
use crate::model::{Entity, EntityMap};
use crate::schema::{Schema, SchemaSnapshot};
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    schema: Option<String>,
    /// type name → serialized entities of that type
    graph: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The serialized schema, if one has been saved.
    pub fn schema_json(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn type_json(&self, type_name: &str) -> Option<&str> {
        self.graph.get(type_name).map(String::as_str)
    }
}

impl Persistence for MemoryStore {
    fn load_schema(&self) -> Result<SchemaSnapshot> {
        match &self.schema {
            Some(text) => Ok(serde_json::from_str(text)?),
            None => Ok(SchemaSnapshot::new()),
        }
    }

    fn save_schema(&mut self, schema: &SchemaSnapshot) -> Result<()> {
        self.schema = Some(to_pretty_json(schema)?);
        Ok(())
    }

    fn load_graph(&self, schema: &Schema) -> Result<EntityMap> {
        let mut entities = EntityMap::new();
        for type_name in schema.type_names() {
            if let Some(text) = self.graph.get(type_name) {
                let loaded: EntityMap = serde_json::from_str(text)?;
                entities.extend(loaded);
            }
        }
        normalize_values(&mut entities, schema);
        Ok(entities)
    }

    fn save_graph(&mut self, entities: &EntityMap) -> Result<()> {
        let mut by_type: BTreeMap<&str, BTreeMap<_, &Entity>> = BTreeMap::new();
        for (id, entity) in entities {
            by_type.entry(entity.type_name.as_str()).or_default().insert(id, entity);
        }
        for (type_name, group) in by_type {
            self.graph.insert(type_name.to_owned(), to_pretty_json(&group)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_unknown_types_are_not_loaded() {
        let mut graph = Graph::default();
        graph.schema_mut().create_type("person").unwrap();
        graph.schema_mut().create_type("city").unwrap();
        graph.create_from_type("person").unwrap();
        graph.create_from_type("city").unwrap();

        let mut store = MemoryStore::new();
        store.save_graph(graph.entities()).unwrap();
        assert!(store.type_json("person").is_some());

        let mut narrow = Schema::default();
        narrow.create_type("person").unwrap();
        assert_eq!(store.load_graph(&narrow).unwrap().len(), 1);
    }

    #[test]
    fn test_unsaved_store_is_empty() {
        let store = MemoryStore::new();
        assert!(store.schema_json().is_none());
        assert!(store.load_schema().unwrap().is_empty());
    }
}
