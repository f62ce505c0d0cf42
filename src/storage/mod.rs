//! # Persistence
//!
//! Load/save of schema and graph snapshots. Persistence only serializes:
//! nothing is validated on the way in or out (that is what
//! [`Graph::audit`](crate::graph::Graph::audit) is for).
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `JsonStore` | `json` | `schema.json` + one `graph/<type>.json` per type |
//! | `MemoryStore` | `memory` | Same encoding, kept in process |

pub mod json;
pub mod memory;

use std::path::PathBuf;

use crate::model::EntityMap;
use crate::schema::{Schema, SchemaSnapshot};
use crate::Result;

pub use json::JsonStore;
pub use memory::MemoryStore;

// ============================================================================
// Configuration
// ============================================================================

/// Where a [`Lifegraph`](crate::Lifegraph) keeps its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// In-process only; nothing survives the handle.
    Memory,
    /// A data directory holding `schema.json`, `schema.log` and `graph/`.
    Directory { data_dir: PathBuf },
}

// ============================================================================
// Persistence trait
// ============================================================================

/// The contract between the core and its on-disk (or in-memory) state.
pub trait Persistence {
    fn load_schema(&self) -> Result<SchemaSnapshot>;

    fn save_schema(&mut self, schema: &SchemaSnapshot) -> Result<()>;

    /// Load every entity whose type is declared in `schema`, with values
    /// put into their schema form by
    /// [`normalize_values`](crate::graph::normalize_values).
    fn load_graph(&self, schema: &Schema) -> Result<EntityMap>;

    fn save_graph(&mut self, entities: &EntityMap) -> Result<()>;
}

impl<P: Persistence + ?Sized> Persistence for Box<P> {
    fn load_schema(&self) -> Result<SchemaSnapshot> {
        (**self).load_schema()
    }

    fn save_schema(&mut self, schema: &SchemaSnapshot) -> Result<()> {
        (**self).save_schema(schema)
    }

    fn load_graph(&self, schema: &Schema) -> Result<EntityMap> {
        (**self).load_graph(schema)
    }

    fn save_graph(&mut self, entities: &EntityMap) -> Result<()> {
        (**self).save_graph(entities)
    }
}

/// Pretty JSON with four-space indentation.
pub(crate) fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
