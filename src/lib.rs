//! # lifegraph: Schema-Governed Local Property Graph
//!
//! Declared entity types with single inheritance and typed properties,
//! entities instantiated against those types, and a read-only
//! generalization layer that groups entities by the shared entities they
//! reference.
//!
//! ## Design Principles
//!
//! 1. **Schema first**: every entity write is checked against the schema;
//!    drift that slips in through loading is reported by `audit`
//! 2. **Atomic cascades**: property changes reach every descendant type or none
//! 3. **Injected changelog**: schema mutations go to a `ChangelogSink`
//!    owned by the schema, never to global state
//! 4. **Persistence is dumb**: stores serialize, the core validates
//!
//! ## Quick Start
//!
//! ```rust
//! use lifegraph::{Lifegraph, aggregation::{reduce, LevelKey}};
//!
//! # fn example() -> lifegraph::Result<()> {
//! let mut lg = Lifegraph::open_memory()?;
//! let graph = lg.graph_mut();
//!
//! let schema = graph.schema_mut();
//! schema.create_type("continent")?;
//! schema.create_type("country")?;
//! schema.add_property("country", "continent", "continent")?;
//! schema.add_property("country", "oil", "integer")?;
//!
//! let europe = graph.create_from_type("continent")?;
//! let sweden = graph.create_from_type("country")?;
//! graph.edit_property(&sweden, "continent", &europe)?;
//! graph.edit_property(&sweden, "oil", 0)?;
//!
//! let ids = graph.get_ids_of_type("country");
//! let levels = graph.aggregator().categorical_aggregation_paths(&ids)?;
//! let keys: Vec<LevelKey> = levels.iter().map(|l| l.key()).collect();
//! let groups = graph.aggregator().categorical_aggregation(&ids, "oil", reduce::mean, &keys)?;
//! assert_eq!(groups.len(), 1);
//!
//! lg.close()?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Stores
//!
//! | Store | Constructor | Description |
//! |-------|-------------|-------------|
//! | Memory | `Lifegraph::open_memory()` | In-process, for tests/embedding |
//! | JSON directory | `Lifegraph::open_dir(path)` | `schema.json`, `graph/*.json`, `schema.log` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod graph;
pub mod aggregation;
pub mod storage;

use std::path::Path;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Entity, EntityId, EntityMap, LeafKind, PropertyValue, ValueType};
pub use schema::{
    ChangeEvent, ChangeLogEntry, ChangelogSink, FileChangelog, MemoryChangelog, NullChangelog,
    Schema, SchemaSnapshot, TypeDef,
};
pub use graph::{AuditFinding, Graph, JaroWinkler, SimilarityScorer};
pub use aggregation::{AggregateGroup, Aggregator, GeneralizationLevel, LevelKey, PathRecord};
pub use storage::{JsonStore, MemoryStore, Persistence, StoreConfig};

// ============================================================================
// Top-level handle
// ============================================================================

/// The primary entry point: a graph bound to the store it was loaded from.
///
/// State is written back only by [`Lifegraph::save`] and
/// [`Lifegraph::close`]; dropping the handle discards unsaved changes.
pub struct Lifegraph<P: Persistence> {
    persistence: P,
    graph: Graph,
}

impl<P: Persistence> Lifegraph<P> {
    /// Load schema and graph from `persistence`.
    pub fn open(persistence: P, changelog: Box<dyn ChangelogSink>) -> Result<Self> {
        let schema = Schema::from_snapshot(persistence.load_schema()?, changelog);
        let entities = persistence.load_graph(&schema)?;
        tracing::info!(types = schema.len(), entities = entities.len(), "lifegraph opened");
        Ok(Self { persistence, graph: Graph::from_parts(schema, entities) })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Normalize stored values, write schema and graph back and flush the
    /// changelog.
    pub fn save(&mut self) -> Result<()> {
        self.graph.normalize_values();
        self.persistence.save_schema(&self.graph.schema().snapshot())?;
        self.persistence.save_graph(self.graph.entities())?;
        self.graph.schema_mut().flush()?;
        tracing::debug!(entities = self.graph.len(), "lifegraph saved");
        Ok(())
    }

    /// Save, then hand the store back.
    pub fn close(mut self) -> Result<P> {
        self.save()?;
        Ok(self.persistence)
    }
}

impl Lifegraph<MemoryStore> {
    /// Empty in-memory graph with a discarded changelog.
    pub fn open_memory() -> Result<Self> {
        Self::open(MemoryStore::new(), Box::new(NullChangelog))
    }
}

impl Lifegraph<JsonStore> {
    /// Open a data directory, appending schema changes to its `schema.log`.
    pub fn open_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let store = JsonStore::new(data_dir.as_ref());
        let changelog = FileChangelog::open(store.changelog_path())?;
        Self::open(store, Box::new(changelog))
    }
}

impl StoreConfig {
    pub fn open(&self) -> Result<Lifegraph<Box<dyn Persistence>>> {
        let (store, changelog): (Box<dyn Persistence>, Box<dyn ChangelogSink>) = match self {
            StoreConfig::Memory => (Box::new(MemoryStore::new()), Box::new(NullChangelog)),
            StoreConfig::Directory { data_dir } => {
                let store = JsonStore::new(data_dir);
                let changelog = FileChangelog::open(store.changelog_path())?;
                (Box::new(store), Box::new(changelog))
            }
        };
        Lifegraph::open(store, changelog)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Type {0} not in schema.")]
    UnknownType(String),

    #[error("Type {0} already exists in schema.")]
    TypeAlreadyExists(String),

    #[error("Type {type_name} has existing property {property}.")]
    DuplicateProperty { type_name: String, property: String },

    #[error("Type {type_name} has no property {property}.")]
    PropertyNotFound { type_name: String, property: String },

    #[error("Property {property} is an inherited property for type {type_name}.")]
    InheritedProperty { type_name: String, property: String },

    #[error("Type {type_name} has existing parent {parent}.")]
    AlreadyHasParent { type_name: String, parent: String },

    #[error("Type {0} has no parent.")]
    NoParent(String),

    #[error("Entity {0} not in graph.")]
    UnknownEntity(EntityId),

    #[error("Entity {entity} property {property} expects type {expected}, got {found}.")]
    TypeMismatch { entity: EntityId, property: String, expected: String, found: String },

    #[error("Entities are not all of one type: {}", .0.join(", "))]
    MixedTypes(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
