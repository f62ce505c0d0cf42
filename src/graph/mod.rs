//! # Entity Store
//!
//! Typed entities instantiated against a [`Schema`]. The store owns its
//! schema, so type changes and entity changes go through one handle.

pub mod audit;
pub mod search;

use crate::model::{Entity, EntityId, EntityMap, PropertyValue, ValueType};
use crate::schema::Schema;
use crate::{Error, Result};

pub use audit::AuditFinding;
pub use search::{JaroWinkler, SimilarityScorer};

/// The entity graph and the schema it is governed by.
#[derive(Debug, Default)]
pub struct Graph {
    schema: Schema,
    entities: EntityMap,
}

impl Graph {
    pub fn new(schema: Schema) -> Self {
        Self::from_parts(schema, EntityMap::new())
    }

    /// Assemble a graph from loaded parts. Nothing is validated here; run
    /// [`Graph::audit`] to find drift.
    pub fn from_parts(schema: Schema, entities: EntityMap) -> Self {
        Self { schema, entities }
    }

    pub fn into_parts(self) -> (Schema, EntityMap) {
        (self.schema, self.entities)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity or fail with `UnknownEntity`.
    pub fn entity(&self, id: &EntityId) -> Result<&Entity> {
        self.entities.get(id).ok_or_else(|| Error::UnknownEntity(id.clone()))
    }

    /// All entity ids whose type is exactly `type_name`.
    pub fn get_ids_of_type(&self, type_name: &str) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.type_name == type_name)
            .map(|(id, _)| id.clone())
            .collect()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// New entity of `type_name` with every effective property `Unknown`.
    pub fn create_from_type(&mut self, type_name: &str) -> Result<EntityId> {
        let props = self.schema.effective_properties(type_name)?;
        let mut entity = Entity::new(type_name);
        for name in props.into_keys() {
            entity.properties.insert(name, PropertyValue::Unknown);
        }
        Ok(self.insert(entity))
    }

    /// New entity holding a full duplicate of `id`.
    pub fn create_from_copy(&mut self, id: &EntityId) -> Result<EntityId> {
        let entity = self.entity(id)?.clone();
        Ok(self.insert(entity))
    }

    /// New entity that keeps the values `id` shares with at least one other
    /// entity of its type, and resets the values unique to `id`.
    pub fn create_from_smart_copy(&mut self, id: &EntityId) -> Result<EntityId> {
        let source = self.entity(id)?;
        let peers: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|(peer_id, peer)| *peer_id != id && peer.type_name == source.type_name)
            .map(|(_, peer)| peer)
            .collect();

        let mut copy = Entity::new(source.type_name.clone());
        for (name, value) in &source.properties {
            let shared = peers.iter().any(|peer| peer.get(name) == Some(value));
            let kept = if shared { value.clone() } else { PropertyValue::Unknown };
            copy.properties.insert(name.clone(), kept);
        }
        Ok(self.insert(copy))
    }

    fn insert(&mut self, entity: Entity) -> EntityId {
        let id = EntityId::generate();
        tracing::info!(%id, type_name = %entity.type_name, "create entity");
        self.entities.insert(id.clone(), entity);
        id
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Set `property` on entity `id`.
    ///
    /// Leaf-typed properties take any literal. Properties typed with a
    /// declared type take `Unknown` or a reference to an existing entity of
    /// exactly that type; descendant types are rejected here even though
    /// [`Graph::audit`] accepts them.
    pub fn edit_property(
        &mut self,
        id: &EntityId,
        property: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let value = value.into();
        let type_name = self.entity(id)?.type_name.clone();
        let expected = self
            .schema
            .property_type(&type_name, property)
            .cloned()
            .ok_or_else(|| Error::PropertyNotFound {
                type_name: type_name.clone(),
                property: property.to_owned(),
            })?;

        let stored = match &expected {
            ValueType::Leaf(_) => value.into_leaf(),
            ValueType::Declared(expected_type) => {
                self.check_reference(id, property, expected_type, &value)?;
                value
            }
        };

        tracing::debug!(%id, property, value = %stored, "edit property");
        if let Some(entity) = self.entities.get_mut(id) {
            entity.properties.insert(property.to_owned(), stored);
        }
        Ok(())
    }

    /// Rewrite every stored value into the form the schema calls for:
    /// strings become references under declared-type properties, and
    /// references become plain strings everywhere else. Returns how many
    /// values changed.
    pub fn normalize_values(&mut self) -> usize {
        normalize_values(&mut self.entities, &self.schema)
    }

    // ========================================================================
    // Schema changes that reshape stored values
    // ========================================================================

    /// [`Schema::edit_property`], then bring stored values in line with the
    /// new type.
    pub fn edit_property_type(
        &mut self,
        type_name: &str,
        property: &str,
        value_type: impl Into<ValueType>,
    ) -> Result<()> {
        self.schema.edit_property(type_name, property, value_type)?;
        self.normalize_values();
        Ok(())
    }

    pub fn make_parent(&mut self, parent: &str, child: &str) -> Result<()> {
        self.schema.make_parent(parent, child)?;
        self.normalize_values();
        Ok(())
    }

    pub fn edit_parent(&mut self, child: &str, new_parent: &str) -> Result<()> {
        self.schema.edit_parent(child, new_parent)?;
        self.normalize_values();
        Ok(())
    }

    pub fn remove_parent(&mut self, child: &str) -> Result<()> {
        self.schema.remove_parent(child)?;
        self.normalize_values();
        Ok(())
    }

    pub fn remove_property(&mut self, type_name: &str, property: &str) -> Result<()> {
        self.schema.remove_property(type_name, property)?;
        self.normalize_values();
        Ok(())
    }

    fn check_reference(
        &self,
        id: &EntityId,
        property: &str,
        expected_type: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        let found = match value {
            PropertyValue::Unknown => return Ok(()),
            PropertyValue::Ref(target) => match self.entities.get(target) {
                Some(target) if target.type_name == expected_type => return Ok(()),
                Some(target) => target.type_name.clone(),
                None => return Err(Error::UnknownEntity(target.clone())),
            },
            other => other.type_name().to_owned(),
        };
        Err(Error::TypeMismatch {
            entity: id.clone(),
            property: property.to_owned(),
            expected: expected_type.to_owned(),
            found,
        })
    }
}

/// Put each value of `entities` into its schema form. Values under
/// properties the schema does not declare are kept as plain strings, which
/// is how they decode from disk.
pub fn normalize_values(entities: &mut EntityMap, schema: &Schema) -> usize {
    let mut changed = 0;
    for entity in entities.values_mut() {
        for (property, value) in entity.properties.iter_mut() {
            let is_reference = schema
                .property_type(&entity.type_name, property)
                .is_some_and(|v| !v.is_leaf());
            let wrong_form = match value {
                PropertyValue::Text(_) => is_reference,
                PropertyValue::Ref(_) => !is_reference,
                _ => false,
            };
            if !wrong_form {
                continue;
            }
            let taken = std::mem::replace(value, PropertyValue::Unknown);
            *value = if is_reference { taken.into_reference() } else { taken.into_leaf() };
            changed += 1;
        }
    }
    if changed > 0 {
        tracing::debug!(changed, "normalized stored values");
    }
    changed
}

// ============================================================================
// Tests
// ============================================================================
