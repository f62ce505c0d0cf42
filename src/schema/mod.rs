//! # Schema Engine
//!
//! Type definitions, typed properties and single inheritance.
//!
//! Property mutations cascade to every descendant type. Cascades run in two
//! phases: the affected types are collected and validated first, and only
//! then mutated, so a rejected cascade leaves the schema untouched.
//!
//! Every applied mutation is reported to the injected [`ChangelogSink`], one
//! entry per mutated type.

pub mod changelog;
pub mod hierarchy;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{LeafKind, ValueType};
use crate::{Error, Result};

pub use changelog::{
    ChangeEvent, ChangeLogEntry, ChangelogSink, FileChangelog, MemoryChangelog, NullChangelog,
};
use hierarchy::ChildIndex;

// ============================================================================
// Type definitions
// ============================================================================

/// A declared type: its directly held properties and optional parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default)]
    pub properties: BTreeMap<String, ValueType>,
    #[serde(rename = "@parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Serializable form of a schema: type name → definition.
pub type SchemaSnapshot = BTreeMap<String, TypeDef>;

// ============================================================================
// Schema
// ============================================================================

pub struct Schema {
    types: BTreeMap<String, TypeDef>,
    children: ChildIndex,
    changelog: Box<dyn ChangelogSink>,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema").field("types", &self.types).finish_non_exhaustive()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(Box::new(NullChangelog))
    }
}

impl Schema {
    /// An empty schema reporting to `changelog`.
    pub fn new(changelog: Box<dyn ChangelogSink>) -> Self {
        Self::from_snapshot(SchemaSnapshot::new(), changelog)
    }

    /// Rebuild a schema from persisted definitions. Loading is not a
    /// mutation and records nothing.
    pub fn from_snapshot(types: SchemaSnapshot, changelog: Box<dyn ChangelogSink>) -> Self {
        let children = ChildIndex::build(&types);
        Self { types, children, changelog }
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        self.types.clone()
    }

    /// Flush the changelog sink.
    pub fn flush(&mut self) -> Result<()> {
        self.changelog.flush()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// True for leaf names and declared types.
    pub fn type_exists(&self, name: &str) -> bool {
        LeafKind::is_leaf_name(name) || self.types.contains_key(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Leaf names followed by declared type names.
    pub fn accepted_value_types(&self) -> Vec<String> {
        LeafKind::ALL
            .iter()
            .map(|k| k.name().to_owned())
            .chain(self.types.keys().cloned())
            .collect()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn show_type(&self, name: &str) -> Result<&TypeDef> {
        self.types.get(name).ok_or_else(|| Error::UnknownType(name.to_owned()))
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.types.get(name).and_then(|d| d.parent.as_deref())
    }

    /// Whether `property` is declared directly on `type_name`.
    pub fn property_exists(&self, type_name: &str, property: &str) -> Result<bool> {
        Ok(self.show_type(type_name)?.properties.contains_key(property))
    }

    /// The value type of `property` as seen by `type_name`: its own
    /// declaration, else the nearest ancestor's.
    pub fn property_type(&self, type_name: &str, property: &str) -> Option<&ValueType> {
        std::iter::once(type_name.to_owned())
            .chain(self.get_parent_ids(type_name))
            .find_map(|t| self.types.get(&t)?.properties.get(property))
    }

    /// Own properties united with everything inherited.
    pub fn effective_properties(&self, type_name: &str) -> Result<BTreeMap<String, ValueType>> {
        let own = self.show_type(type_name)?;
        let mut props = BTreeMap::new();
        for ancestor in self.get_parent_ids(type_name).iter().rev() {
            if let Some(def) = self.types.get(ancestor) {
                props.extend(def.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        props.extend(own.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(props)
    }

    /// Transitive descendants of `type_name` by directed reachability.
    pub fn get_child_ids(&self, type_name: &str) -> BTreeSet<String> {
        self.children.descendants(type_name)
    }

    /// Descendants by undirected connectivity over parent links. Kept next
    /// to [`Schema::get_child_ids`] because the two disagree whenever the
    /// component has more than one branch.
    pub fn connected_child_ids(&self, type_name: &str) -> BTreeSet<String> {
        hierarchy::connected_descendants(&self.types, type_name)
    }

    /// Ancestors of `type_name`, nearest first.
    pub fn get_parent_ids(&self, type_name: &str) -> Vec<String> {
        hierarchy::ancestors(&self.types, type_name)
    }

    /// `(ancestor, property)` for every property declared on an ancestor.
    pub fn get_parent_properties(&self, type_name: &str) -> Vec<(String, String)> {
        self.get_parent_ids(type_name)
            .into_iter()
            .filter_map(|ancestor| {
                let def = self.types.get(&ancestor)?;
                Some(def.properties.keys().map(move |p| (ancestor.clone(), p.clone())).collect::<Vec<_>>())
            })
            .flatten()
            .collect()
    }

    pub fn is_inherited_property(&self, type_name: &str, property: &str) -> bool {
        self.get_parent_properties(type_name).iter().any(|(_, p)| p == property)
    }

    /// `(type, property)` pairs whose declared value type is `string`.
    pub fn string_properties(&self) -> Vec<(String, String)> {
        self.types
            .iter()
            .flat_map(|(t, def)| {
                def.properties
                    .iter()
                    .filter(|(_, v)| **v == ValueType::Leaf(LeafKind::String))
                    .map(move |(p, _)| (t.clone(), p.clone()))
            })
            .collect()
    }

    // ========================================================================
    // Type mutations
    // ========================================================================

    pub fn create_type(&mut self, name: &str) -> Result<()> {
        if self.type_exists(name) {
            return Err(Error::TypeAlreadyExists(name.to_owned()));
        }
        self.types.insert(name.to_owned(), TypeDef::default());
        self.log(ChangeEvent::CreateType { type_name: name.to_owned() })
    }

    // ========================================================================
    // Property mutations (cascading)
    // ========================================================================

    /// Declare `property` on `type_name` and on all of its descendants.
    pub fn add_property(
        &mut self,
        type_name: &str,
        property: &str,
        value_type: impl Into<ValueType>,
    ) -> Result<()> {
        let value_type = value_type.into();
        self.require_declared(type_name)?;
        self.require_value_type(&value_type)?;
        if self.property_exists(type_name, property)? {
            return Err(Error::DuplicateProperty {
                type_name: type_name.to_owned(),
                property: property.to_owned(),
            });
        }
        if self.is_inherited_property(type_name, property) {
            return Err(Error::InheritedProperty {
                type_name: type_name.to_owned(),
                property: property.to_owned(),
            });
        }

        let descendants = self.get_child_ids(type_name);
        if let Some(clash) = descendants
            .iter()
            .find(|t| self.types.get(*t).is_some_and(|d| d.properties.contains_key(property)))
        {
            return Err(Error::DuplicateProperty {
                type_name: clash.clone(),
                property: property.to_owned(),
            });
        }

        tracing::debug!(type_name, property, cascade = descendants.len(), "add property");
        for target in std::iter::once(type_name.to_owned()).chain(descendants) {
            if let Some(def) = self.types.get_mut(&target) {
                def.properties.insert(property.to_owned(), value_type.clone());
            }
            self.log(ChangeEvent::CreateProperty {
                type_name: target,
                property: property.to_owned(),
                value_type: value_type.clone(),
            })?;
        }
        Ok(())
    }

    /// Change the value type of a property declared on `type_name`.
    /// Descendants that hold the property directly are updated too.
    pub fn edit_property(
        &mut self,
        type_name: &str,
        property: &str,
        value_type: impl Into<ValueType>,
    ) -> Result<()> {
        let value_type = value_type.into();
        self.require_value_type(&value_type)?;
        let targets = self.cascade_targets(type_name, property)?;

        tracing::debug!(type_name, property, cascade = targets.len() - 1, "edit property");
        for target in targets {
            let Some(def) = self.types.get_mut(&target) else { continue };
            let Some(old) = def.properties.insert(property.to_owned(), value_type.clone()) else {
                continue;
            };
            self.log(ChangeEvent::UpdateProperty {
                type_name: target,
                property: property.to_owned(),
                from: old,
                to: value_type.clone(),
            })?;
        }
        Ok(())
    }

    /// Remove a property declared on `type_name` from it and its descendants.
    pub fn remove_property(&mut self, type_name: &str, property: &str) -> Result<()> {
        let targets = self.cascade_targets(type_name, property)?;

        tracing::debug!(type_name, property, cascade = targets.len() - 1, "remove property");
        for target in targets {
            let removed = self
                .types
                .get_mut(&target)
                .and_then(|def| def.properties.remove(property));
            if removed.is_some() {
                self.log(ChangeEvent::RemoveProperty {
                    type_name: target,
                    property: property.to_owned(),
                })?;
            }
        }
        Ok(())
    }

    /// Validate an edit/remove on `type_name` and list the types it touches:
    /// `type_name` first, then descendants that declare `property` directly.
    fn cascade_targets(&self, type_name: &str, property: &str) -> Result<Vec<String>> {
        self.require_declared(type_name)?;
        if self.is_inherited_property(type_name, property) {
            return Err(Error::InheritedProperty {
                type_name: type_name.to_owned(),
                property: property.to_owned(),
            });
        }
        if !self.property_exists(type_name, property)? {
            return Err(Error::PropertyNotFound {
                type_name: type_name.to_owned(),
                property: property.to_owned(),
            });
        }
        let descendants = self
            .get_child_ids(type_name)
            .into_iter()
            .filter(|t| self.types.get(t).is_some_and(|d| d.properties.contains_key(property)));
        Ok(std::iter::once(type_name.to_owned()).chain(descendants).collect())
    }

    // ========================================================================
    // Parent mutations
    // ========================================================================

    pub fn make_parent(&mut self, parent: &str, child: &str) -> Result<()> {
        self.require_declared(child)?;
        self.require_declared(parent)?;
        if let Some(existing) = self.parent_of(child) {
            return Err(Error::AlreadyHasParent {
                type_name: child.to_owned(),
                parent: existing.to_owned(),
            });
        }
        self.set_parent(child, Some(parent));
        self.log(ChangeEvent::CreateParent {
            type_name: child.to_owned(),
            parent: parent.to_owned(),
        })
    }

    pub fn edit_parent(&mut self, child: &str, new_parent: &str) -> Result<()> {
        self.require_declared(child)?;
        self.require_declared(new_parent)?;
        let old = self
            .parent_of(child)
            .ok_or_else(|| Error::NoParent(child.to_owned()))?
            .to_owned();
        self.set_parent(child, Some(new_parent));
        self.log(ChangeEvent::UpdateParent {
            type_name: child.to_owned(),
            from: old,
            to: new_parent.to_owned(),
        })
    }

    pub fn remove_parent(&mut self, child: &str) -> Result<()> {
        self.require_declared(child)?;
        if self.parent_of(child).is_none() {
            return Err(Error::NoParent(child.to_owned()));
        }
        self.set_parent(child, None);
        self.log(ChangeEvent::RemoveParent { type_name: child.to_owned() })
    }

    /// Replace the parent link of `child`, keeping the child index in step.
    fn set_parent(&mut self, child: &str, parent: Option<&str>) {
        let Some(def) = self.types.get_mut(child) else { return };
        let old = std::mem::replace(&mut def.parent, parent.map(str::to_owned));
        if let Some(old) = old {
            self.children.unlink(&old, child);
        }
        if let Some(parent) = parent {
            self.children.link(parent, child);
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn require_declared(&self, name: &str) -> Result<()> {
        if self.types.contains_key(name) {
            Ok(())
        } else {
            Err(Error::UnknownType(name.to_owned()))
        }
    }

    fn require_value_type(&self, value_type: &ValueType) -> Result<()> {
        match value_type {
            ValueType::Leaf(_) => Ok(()),
            ValueType::Declared(name) => self.require_declared(name),
        }
    }

    fn log(&mut self, event: ChangeEvent) -> Result<()> {
        tracing::info!(subject = event.subject(), "{event}");
        self.changelog.record(&ChangeLogEntry::now(event))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema() -> (Schema, MemoryChangelog) {
        let log = MemoryChangelog::new();
        (Schema::new(Box::new(log.clone())), log)
    }

    #[test]
    fn test_create_type() {
        let (mut s, log) = schema();
        assert!(!s.type_exists("person"));
        s.create_type("person").unwrap();
        assert!(s.type_exists("person"));
        assert_eq!(s.show_type("person").unwrap(), &TypeDef::default());
        assert_eq!(log.events(), vec![ChangeEvent::CreateType { type_name: "person".into() }]);
        assert!(matches!(s.create_type("person"), Err(Error::TypeAlreadyExists(_))));
    }

    #[test]
    fn test_leaf_names_are_reserved() {
        let (mut s, _) = schema();
        assert!(matches!(s.create_type("string"), Err(Error::TypeAlreadyExists(_))));
        assert!(matches!(s.add_property("string", "x", "integer"), Err(Error::UnknownType(_))));
    }

    #[test]
    fn test_accepted_value_types() {
        let (mut s, _) = schema();
        s.create_type("person").unwrap();
        assert_eq!(s.accepted_value_types(), vec!["string", "integer", "date", "person"]);
    }

    #[test]
    fn test_add_property() {
        let (mut s, log) = schema();
        s.create_type("person").unwrap();
        s.add_property("person", "name", "string").unwrap();
        assert!(s.property_exists("person", "name").unwrap());
        assert_eq!(
            s.show_type("person").unwrap().properties["name"],
            ValueType::Leaf(LeafKind::String)
        );
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.events()[1].to_string(),
            "CREATE PROPERTY name VALUE string ON TYPE person"
        );
        assert!(matches!(
            s.add_property("person", "name", "string"),
            Err(Error::DuplicateProperty { .. })
        ));
    }

    #[test]
    fn test_add_property_unknown_types() {
        let (mut s, _) = schema();
        assert!(matches!(s.add_property("person", "name", "string"), Err(Error::UnknownType(t)) if t == "person"));
        s.create_type("person").unwrap();
        assert!(matches!(s.add_property("person", "home", "city"), Err(Error::UnknownType(t)) if t == "city"));
    }

    #[test]
    fn test_add_property_cascades() {
        let (mut s, log) = schema();
        for t in ["human", "adult", "parent"] {
            s.create_type(t).unwrap();
        }
        s.make_parent("human", "adult").unwrap();
        s.make_parent("adult", "parent").unwrap();
        s.add_property("human", "name", "string").unwrap();
        for t in ["human", "adult", "parent"] {
            assert!(s.property_exists(t, "name").unwrap(), "{t} missing name");
        }
        // 3 creates, 2 parents, 3 property entries
        assert_eq!(log.len(), 8);
    }

    #[test]
    fn test_add_property_cascade_is_atomic() {
        let (mut s, _) = schema();
        for t in ["human", "adult", "parent"] {
            s.create_type(t).unwrap();
        }
        s.add_property("parent", "name", "string").unwrap();
        s.make_parent("human", "adult").unwrap();
        s.make_parent("adult", "parent").unwrap();

        let err = s.add_property("human", "name", "string").unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { ref type_name, .. } if type_name == "parent"));
        assert!(!s.property_exists("human", "name").unwrap());
        assert!(!s.property_exists("adult", "name").unwrap());
    }

    #[test]
    fn test_add_property_cannot_shadow_inherited() {
        let (mut s, _) = schema();
        s.create_type("human").unwrap();
        s.create_type("adult").unwrap();
        s.add_property("human", "name", "string").unwrap();
        s.make_parent("human", "adult").unwrap();
        assert!(matches!(
            s.add_property("adult", "name", "integer"),
            Err(Error::InheritedProperty { .. })
        ));
    }

    #[test]
    fn test_edit_property() {
        let (mut s, log) = schema();
        s.create_type("person").unwrap();
        s.add_property("person", "name", "string").unwrap();
        s.edit_property("person", "name", "person").unwrap();
        assert_eq!(
            s.show_type("person").unwrap().properties["name"],
            ValueType::Declared("person".into())
        );
        assert_eq!(
            log.events()[2],
            ChangeEvent::UpdateProperty {
                type_name: "person".into(),
                property: "name".into(),
                from: ValueType::Leaf(LeafKind::String),
                to: ValueType::Declared("person".into()),
            }
        );
    }

    #[test]
    fn test_edit_property_errors() {
        let (mut s, _) = schema();
        assert!(matches!(s.edit_property("person", "name", "string"), Err(Error::UnknownType(_))));
        s.create_type("person").unwrap();
        assert!(matches!(
            s.edit_property("person", "name", "string"),
            Err(Error::PropertyNotFound { .. })
        ));
        s.add_property("person", "name", "string").unwrap();
        assert!(matches!(s.edit_property("person", "name", "city"), Err(Error::UnknownType(_))));
    }

    #[test]
    fn test_inherited_property_is_edited_on_ancestor() {
        let (mut s, _) = schema();
        s.create_type("human").unwrap();
        s.create_type("adult").unwrap();
        s.make_parent("human", "adult").unwrap();
        s.add_property("human", "name", "string").unwrap();

        assert!(matches!(
            s.edit_property("adult", "name", "integer"),
            Err(Error::InheritedProperty { .. })
        ));
        assert!(matches!(s.remove_property("adult", "name"), Err(Error::InheritedProperty { .. })));

        s.edit_property("human", "name", "integer").unwrap();
        assert_eq!(s.show_type("adult").unwrap().properties["name"], ValueType::Leaf(LeafKind::Integer));

        s.remove_property("human", "name").unwrap();
        assert!(!s.property_exists("adult", "name").unwrap());
        assert!(!s.property_exists("human", "name").unwrap());
    }

    #[test]
    fn test_remove_property() {
        let (mut s, log) = schema();
        s.create_type("person").unwrap();
        s.add_property("person", "name", "string").unwrap();
        s.remove_property("person", "name").unwrap();
        assert!(!s.property_exists("person", "name").unwrap());
        assert_eq!(log.events()[2].to_string(), "REMOVE PROPERTY name ON TYPE person");
        assert!(matches!(s.remove_property("person", "name"), Err(Error::PropertyNotFound { .. })));
    }

    #[test]
    fn test_parent_lifecycle() {
        let (mut s, log) = schema();
        assert!(matches!(s.make_parent("human", "adult"), Err(Error::UnknownType(t)) if t == "adult"));
        s.create_type("adult").unwrap();
        assert!(matches!(s.make_parent("human", "adult"), Err(Error::UnknownType(t)) if t == "human"));
        s.create_type("human").unwrap();
        s.create_type("mammal").unwrap();

        assert!(matches!(s.edit_parent("adult", "human"), Err(Error::NoParent(_))));
        assert!(matches!(s.remove_parent("adult"), Err(Error::NoParent(_))));

        s.make_parent("human", "adult").unwrap();
        assert_eq!(s.parent_of("adult"), Some("human"));
        assert!(matches!(s.make_parent("mammal", "adult"), Err(Error::AlreadyHasParent { .. })));

        s.edit_parent("adult", "mammal").unwrap();
        assert_eq!(s.parent_of("adult"), Some("mammal"));
        assert!(s.get_child_ids("human").is_empty());
        assert!(s.get_child_ids("mammal").contains("adult"));

        s.remove_parent("adult").unwrap();
        assert_eq!(s.parent_of("adult"), None);
        assert!(s.get_child_ids("mammal").is_empty());

        let phrases: Vec<String> = log.events().iter().skip(3).map(ToString::to_string).collect();
        assert_eq!(
            phrases,
            vec![
                "CREATE PARENT human ON TYPE adult",
                "UPDATE PARENT FROM VALUE human TO VALUE mammal ON TYPE adult",
                "REMOVE PARENT ON TYPE adult",
            ]
        );
    }

    #[test]
    fn test_effective_properties_and_parent_properties() {
        let (mut s, _) = schema();
        s.create_type("human").unwrap();
        s.create_type("adult").unwrap();
        s.add_property("human", "name", "string").unwrap();
        s.make_parent("human", "adult").unwrap();
        s.add_property("adult", "job", "string").unwrap();

        let props: Vec<String> = s.effective_properties("adult").unwrap().into_keys().collect();
        assert_eq!(props, vec!["job", "name"]);
        assert_eq!(
            s.get_parent_properties("adult"),
            vec![("human".to_string(), "name".to_string())]
        );
        assert_eq!(s.property_type("adult", "name"), Some(&ValueType::Leaf(LeafKind::String)));
        assert_eq!(s.get_parent_ids("adult"), vec!["human".to_string()]);
    }

    #[test]
    fn test_snapshot_rebuilds_child_index() {
        let (mut s, _) = schema();
        s.create_type("human").unwrap();
        s.create_type("adult").unwrap();
        s.make_parent("human", "adult").unwrap();
        let log = MemoryChangelog::new();
        let rebuilt = Schema::from_snapshot(s.snapshot(), Box::new(log.clone()));
        assert!(rebuilt.get_child_ids("human").contains("adult"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let (mut s, _) = schema();
        s.create_type("human").unwrap();
        s.create_type("adult").unwrap();
        s.add_property("human", "name", "string").unwrap();
        s.make_parent("human", "adult").unwrap();
        let json = serde_json::to_value(s.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "adult": {"properties": {}, "@parent": "human"},
                "human": {"properties": {"name": "string"}},
            })
        );
    }
}
