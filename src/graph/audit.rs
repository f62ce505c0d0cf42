//! Graph audit: report drift between entities and the schema.
//!
//! Auditing never fails. Both passes always run and every finding is
//! returned.

use std::fmt;

use serde::Serialize;

use super::Graph;
use crate::model::{EntityId, PropertyValue};

/// One audit finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditFinding {
    /// The entity's type is not declared in the schema.
    UnknownEntityType { entity: EntityId, type_name: String },
    MissingProperty { entity: EntityId, property: String },
    UnknownReference { entity: EntityId, property: String, target: EntityId },
    /// A declared-type property holds a number instead of a reference.
    NotAReference { entity: EntityId, property: String, value: String },
    TypeMismatch {
        entity: EntityId,
        property: String,
        target: EntityId,
        observed: String,
        expected: String,
    },
}

impl AuditFinding {
    pub fn entity(&self) -> &EntityId {
        match self {
            AuditFinding::UnknownEntityType { entity, .. }
            | AuditFinding::MissingProperty { entity, .. }
            | AuditFinding::UnknownReference { entity, .. }
            | AuditFinding::NotAReference { entity, .. }
            | AuditFinding::TypeMismatch { entity, .. } => entity,
        }
    }
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::UnknownEntityType { entity, type_name } => {
                write!(f, "Entity {entity} has unknown type {type_name}")
            }
            AuditFinding::MissingProperty { entity, property } => {
                write!(f, "Entity {entity} is missing required property {property}")
            }
            AuditFinding::UnknownReference { entity, property, target } => {
                write!(f, "Entity {entity} property {property} points to unknown entity {target}")
            }
            AuditFinding::NotAReference { entity, property, value } => {
                write!(f, "Entity {entity} property {property} holds {value}, not an entity reference")
            }
            AuditFinding::TypeMismatch { entity, property, target, observed, expected } => write!(
                f,
                "Entity {entity} property {property} points to entity {target} of type {observed}. Expected type {expected}."
            ),
        }
    }
}

impl Graph {
    /// Run both audit passes.
    pub fn audit(&self) -> Vec<AuditFinding> {
        let mut findings = self.audit_completeness();
        findings.extend(self.audit_references());
        if !findings.is_empty() {
            tracing::warn!(count = findings.len(), "audit found schema drift");
        }
        findings
    }

    /// Every entity holds every property its type requires.
    pub fn audit_completeness(&self) -> Vec<AuditFinding> {
        let mut findings = Vec::new();
        for (id, entity) in self.entities() {
            let Ok(required) = self.schema().effective_properties(&entity.type_name) else {
                findings.push(AuditFinding::UnknownEntityType {
                    entity: id.clone(),
                    type_name: entity.type_name.clone(),
                });
                continue;
            };
            for property in required.into_keys() {
                if !entity.has_property(&property) {
                    findings.push(AuditFinding::MissingProperty { entity: id.clone(), property });
                }
            }
        }
        findings
    }

    /// Every reference resolves to an entity of the expected type or one of
    /// its descendants.
    pub fn audit_references(&self) -> Vec<AuditFinding> {
        let schema = self.schema();
        let mut findings = Vec::new();
        for (id, entity) in self.entities() {
            for (property, value) in &entity.properties {
                let Some(expected) = schema
                    .property_type(&entity.type_name, property)
                    .and_then(|v| v.as_declared())
                else {
                    continue;
                };
                let target = match value {
                    PropertyValue::Unknown => continue,
                    PropertyValue::Ref(target) => target.clone(),
                    PropertyValue::Text(s) => EntityId::from(s.as_str()),
                    other => {
                        findings.push(AuditFinding::NotAReference {
                            entity: id.clone(),
                            property: property.clone(),
                            value: other.to_string(),
                        });
                        continue;
                    }
                };
                let Some(pointed) = self.get(&target) else {
                    findings.push(AuditFinding::UnknownReference {
                        entity: id.clone(),
                        property: property.clone(),
                        target,
                    });
                    continue;
                };
                let compatible = pointed.type_name == expected
                    || schema.get_child_ids(expected).contains(&pointed.type_name);
                if !compatible {
                    findings.push(AuditFinding::TypeMismatch {
                        entity: id.clone(),
                        property: property.clone(),
                        target,
                        observed: pointed.type_name.clone(),
                        expected: expected.to_owned(),
                    });
                }
            }
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, EntityMap};
    use crate::schema::Schema;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut schema = Schema::default();
        schema.create_type("person").unwrap();
        schema.create_type("city").unwrap();
        schema.create_type("little_city").unwrap();
        schema.make_parent("city", "little_city").unwrap();
        schema.add_property("person", "name", "string").unwrap();
        schema.add_property("person", "hometown", "city").unwrap();
        schema
    }

    fn graph(entities: Vec<(&str, Entity)>) -> Graph {
        let map: EntityMap = entities.into_iter().map(|(k, e)| (EntityId::from(k), e)).collect();
        Graph::from_parts(schema(), map)
    }

    #[test]
    fn test_clean_graph_has_no_findings() {
        let mut g = Graph::new(schema());
        let p = g.create_from_type("person").unwrap();
        let c = g.create_from_type("city").unwrap();
        g.edit_property(&p, "hometown", &c).unwrap();
        assert_eq!(g.audit(), vec![]);
    }

    #[test]
    fn test_missing_property() {
        let g = graph(vec![(
            "p1",
            Entity::new("person").with_property("hometown", PropertyValue::Unknown),
        )]);
        let findings = g.audit();
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].to_string(),
            "Entity p1 is missing required property name"
        );
    }

    #[test]
    fn test_descendant_type_is_accepted() {
        let g = graph(vec![
            ("p1", Entity::new("person").with_property("name", "x").with_property("hometown", EntityId::from("lc"))),
            ("lc", Entity::new("little_city")),
        ]);
        assert!(g.audit_references().is_empty());
    }

    #[test]
    fn test_wrong_type_is_flagged() {
        let g = graph(vec![
            ("p1", Entity::new("person").with_property("name", "x").with_property("hometown", EntityId::from("p2"))),
            ("p2", Entity::new("person").with_property("name", "y").with_property("hometown", PropertyValue::Unknown)),
        ]);
        let findings = g.audit();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].to_string().ends_with("type person. Expected type city."));
        assert_eq!(findings[0].entity(), &EntityId::from("p1"));
    }

    #[test]
    fn test_dangling_and_non_reference_values() {
        let g = graph(vec![
            ("p1", Entity::new("person").with_property("name", "x").with_property("hometown", "ghost")),
            ("p2", Entity::new("person").with_property("name", "y").with_property("hometown", 7)),
        ]);
        let findings = g.audit_references();
        assert_eq!(findings.len(), 2);
        assert!(matches!(findings[0], AuditFinding::UnknownReference { .. }));
        assert!(matches!(findings[1], AuditFinding::NotAReference { .. }));
    }

    #[test]
    fn test_both_passes_report() {
        let g = graph(vec![
            ("p1", Entity::new("person").with_property("hometown", EntityId::from("ghost"))),
            ("x1", Entity::new("planet")),
        ]);
        let findings = g.audit();
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().any(|f| matches!(f, AuditFinding::UnknownEntityType { .. })));
        assert!(findings.iter().any(|f| matches!(f, AuditFinding::MissingProperty { .. })));
        assert!(findings.iter().any(|f| matches!(f, AuditFinding::UnknownReference { .. })));
    }
}
