//! Outward reference walk from one entity property.

use std::collections::VecDeque;

use hashbrown::HashSet;

use super::{Aggregator, PathRecord};
use crate::model::EntityId;
use crate::Result;

impl Aggregator<'_> {
    /// Breadth-first walk along references starting at `property` of `id`.
    ///
    /// Depth 0 follows only `property`; every entity reached after that is
    /// expanded along all of its type's properties. An edge is recorded each
    /// time it is crossed, but an entity is expanded at most once per walk,
    /// which bounds the walk on cyclic reference data.
    pub fn search_out_from_id_property(&self, id: &EntityId, property: &str) -> Result<Vec<PathRecord>> {
        let graph = self.graph;
        let schema = graph.schema();
        graph.entity(id)?;

        let mut records = Vec::new();
        let mut visited: HashSet<EntityId> = HashSet::from_iter([id.clone()]);
        let mut frontier: VecDeque<(usize, EntityId, Vec<String>)> =
            VecDeque::from([(0, id.clone(), vec![property.to_owned()])]);

        while let Some((depth, current_id, properties)) = frontier.pop_front() {
            let Some(current) = graph.get(&current_id) else { continue };
            for pointing in properties {
                let declared = schema
                    .property_type(&current.type_name, &pointing)
                    .is_some_and(|v| !v.is_leaf());
                if !declared {
                    continue;
                }
                let Some(target) = current.get(&pointing).and_then(|v| v.as_plain_str()) else {
                    continue;
                };
                let Some((pointed_id, pointed)) = graph.entities().get_key_value(target) else {
                    continue;
                };

                records.push(PathRecord {
                    origin_id: id.clone(),
                    origin_property: property.to_owned(),
                    depth,
                    pointing_property: pointing,
                    pointed_id: pointed_id.clone(),
                    pointed_type: pointed.type_name.clone(),
                });

                if visited.insert(pointed_id.clone()) {
                    let next: Vec<String> = schema
                        .effective_properties(&pointed.type_name)
                        .map(|props| props.into_keys().collect())
                        .unwrap_or_default();
                    frontier.push_back((depth + 1, pointed_id.clone(), next));
                }
            }
        }

        tracing::debug!(%id, property, records = records.len(), "outward walk");
        Ok(records)
    }
}
