//! JSON directory store.
//!
//! ```text
//! <root>/schema.json          {type: {"properties": {...}, "@parent"?: type}}
//! <root>/graph/<type>.json    {id: {"@type": type, property: value, ...}}
//! ```
//!
//! Files are pretty-printed with sorted keys so they diff cleanly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{to_pretty_json, Persistence};
use crate::graph::normalize_values;
use crate::model::{Entity, EntityMap};
use crate::schema::{Schema, SchemaSnapshot};
use crate::Result;

pub const SCHEMA_FILE: &str = "schema.json";
pub const CHANGELOG_FILE: &str = "schema.log";
pub const GRAPH_DIR: &str = "graph";

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_path(&self) -> PathBuf {
        self.root.join(SCHEMA_FILE)
    }

    pub fn changelog_path(&self) -> PathBuf {
        self.root.join(CHANGELOG_FILE)
    }

    pub fn type_path(&self, type_name: &str) -> PathBuf {
        self.root.join(GRAPH_DIR).join(format!("{type_name}.json"))
    }
}

impl Persistence for JsonStore {
    fn load_schema(&self) -> Result<SchemaSnapshot> {
        let path = self.schema_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no schema file, starting empty");
            return Ok(SchemaSnapshot::new());
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save_schema(&mut self, schema: &SchemaSnapshot) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.schema_path(), to_pretty_json(schema)?)?;
        Ok(())
    }

    fn load_graph(&self, schema: &Schema) -> Result<EntityMap> {
        let mut entities = EntityMap::new();
        for type_name in schema.type_names() {
            let path = self.type_path(type_name);
            if !path.exists() {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            let loaded: EntityMap = serde_json::from_str(&text)?;
            for (id, entity) in loaded {
                if entity.type_name != *type_name {
                    tracing::warn!(%id, file = %path.display(), found = %entity.type_name, "entity filed under another type");
                }
                entities.insert(id, entity);
            }
        }
        normalize_values(&mut entities, schema);
        tracing::debug!(entities = entities.len(), root = %self.root.display(), "graph loaded");
        Ok(entities)
    }

    fn save_graph(&mut self, entities: &EntityMap) -> Result<()> {
        let mut by_type: BTreeMap<&str, BTreeMap<_, &Entity>> = BTreeMap::new();
        for (id, entity) in entities {
            by_type.entry(entity.type_name.as_str()).or_default().insert(id, entity);
        }
        fs::create_dir_all(self.root.join(GRAPH_DIR))?;
        for (type_name, group) in by_type {
            fs::write(self.type_path(type_name), to_pretty_json(&group)?)?;
        }
        Ok(())
    }
}
