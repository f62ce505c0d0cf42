//! # Generalization and Aggregation
//!
//! Read-only queries over a [`Graph`]. For a set of entities of one type,
//! [`Aggregator::categorical_aggregation_paths`] lists the reference chains
//! ("generalization levels") they share, and
//! [`Aggregator::categorical_aggregation`] groups the entities by the
//! entities they reach at chosen levels and reduces a property per group.
//!
//! ```text
//! city ─country→ country ─continent→ continent
//!        depth 0               depth 1
//! ```

pub mod reduce;
pub mod traversal;

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::graph::Graph;
use crate::model::{EntityId, PropertyValue};
use crate::{Error, Result};

// ============================================================================
// Records
// ============================================================================

/// One reference crossed during an outward walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRecord {
    pub origin_id: EntityId,
    pub origin_property: String,
    pub depth: usize,
    pub pointing_property: String,
    pub pointed_id: EntityId,
    pub pointed_type: String,
}

/// Identifies a generalization level: `(depth, pointing property, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelKey {
    pub depth: usize,
    pub pointing_property: String,
    pub aggregation_type: String,
}

impl LevelKey {
    pub fn new(depth: usize, pointing_property: impl Into<String>, aggregation_type: impl Into<String>) -> Self {
        Self {
            depth,
            pointing_property: pointing_property.into(),
            aggregation_type: aggregation_type.into(),
        }
    }

    fn matches(&self, record: &PathRecord) -> bool {
        record.depth == self.depth
            && record.pointing_property == self.pointing_property
            && record.pointed_type == self.aggregation_type
    }
}

/// A candidate level with its statistics over the input entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizationLevel {
    pub depth: usize,
    pub pointing_property: String,
    pub aggregation_type: String,
    /// Distinct entities reached at this level.
    pub n_groups: usize,
    /// Rows at this level divided by the number of input entities.
    pub aggregation_proportion: f64,
}

impl GeneralizationLevel {
    pub fn key(&self) -> LevelKey {
        LevelKey::new(self.depth, self.pointing_property.clone(), self.aggregation_type.clone())
    }
}

/// Per-entity grouping key: the entity reached at each chosen level.
pub type GroupKey = SmallVec<[Option<EntityId>; 4]>;

/// One reduced group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateGroup {
    pub value: PropertyValue,
    pub group: GroupKey,
    pub ids: Vec<EntityId>,
}

// ============================================================================
// Aggregator
// ============================================================================

/// Stateless query layer over a graph.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator<'g> {
    graph: &'g Graph,
}

impl Graph {
    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(self)
    }
}

impl<'g> Aggregator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// The type shared by every id, or `MixedTypes`.
    fn shared_type(&self, ids: &[EntityId]) -> Result<Option<&'g str>> {
        let graph: &'g Graph = self.graph;
        let mut types: BTreeSet<&'g str> = BTreeSet::new();
        for id in ids {
            types.insert(graph.entity(id)?.type_name.as_str());
        }
        if types.len() > 1 {
            return Err(Error::MixedTypes(types.into_iter().map(str::to_owned).collect()));
        }
        Ok(types.into_iter().next())
    }

    /// Outward walks from every property of every id, concatenated.
    pub fn categorical_aggregation_groups(&self, ids: &[EntityId]) -> Result<Vec<PathRecord>> {
        let Some(type_name) = self.shared_type(ids)? else {
            return Ok(Vec::new());
        };
        let properties = self.graph.schema().effective_properties(type_name)?;
        let mut table = Vec::new();
        for id in ids {
            for property in properties.keys() {
                table.extend(self.search_out_from_id_property(id, property)?);
            }
        }
        Ok(table)
    }

    /// Candidate generalization levels for `ids`, ordered by depth, property
    /// and type.
    pub fn categorical_aggregation_paths(&self, ids: &[EntityId]) -> Result<Vec<GeneralizationLevel>> {
        let table = self.categorical_aggregation_groups(ids)?;
        let mut levels: BTreeMap<LevelKey, (BTreeSet<&EntityId>, usize)> = BTreeMap::new();
        for record in &table {
            let key = LevelKey::new(record.depth, record.pointing_property.clone(), record.pointed_type.clone());
            let (pointed, rows) = levels.entry(key).or_default();
            pointed.insert(&record.pointed_id);
            *rows += 1;
        }
        Ok(levels
            .into_iter()
            .map(|(key, (pointed, rows))| GeneralizationLevel {
                depth: key.depth,
                pointing_property: key.pointing_property,
                aggregation_type: key.aggregation_type,
                n_groups: pointed.len(),
                aggregation_proportion: rows as f64 / ids.len() as f64,
            })
            .collect())
    }

    /// Group `ids` by the entities they reach at each of `levels` and reduce
    /// `value_property` per group with `aggregation_fun`.
    ///
    /// Ids that do not reach a level get `None` in that slot and are grouped
    /// together with other such ids. Groups appear in first-seen order.
    ///
    /// An id that reaches several entities matching one level is keyed by
    /// the first of them. Walks run per origin property in name order, each
    /// in breadth-first order, so with `country` and `former_country` both
    /// leading to a continent the one reached through `country` decides.
    ///
    /// Fails with `PropertyNotFound` when `value_property` is not a property
    /// of the ids' type.
    pub fn categorical_aggregation<F>(
        &self,
        ids: &[EntityId],
        value_property: &str,
        aggregation_fun: F,
        levels: &[LevelKey],
    ) -> Result<Vec<AggregateGroup>>
    where
        F: Fn(&[PropertyValue]) -> PropertyValue,
    {
        if let Some(type_name) = self.shared_type(ids)? {
            if !self.graph.schema().effective_properties(type_name)?.contains_key(value_property) {
                return Err(Error::PropertyNotFound {
                    type_name: type_name.to_owned(),
                    property: value_property.to_owned(),
                });
            }
        }
        let table = self.categorical_aggregation_groups(ids)?;

        let lookups: Vec<HashMap<&EntityId, &EntityId>> = levels
            .iter()
            .map(|level| {
                let mut lookup = HashMap::new();
                for record in table.iter().filter(|r| level.matches(r)) {
                    lookup.entry(&record.origin_id).or_insert(&record.pointed_id);
                }
                lookup
            })
            .collect();

        let mut order: Vec<(GroupKey, Vec<EntityId>)> = Vec::new();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        for id in ids {
            let key: GroupKey = lookups.iter().map(|l| l.get(id).map(|p| (*p).clone())).collect();
            match index.get(&key) {
                Some(&i) => order[i].1.push(id.clone()),
                None => {
                    index.insert(key.clone(), order.len());
                    order.push((key, vec![id.clone()]));
                }
            }
        }

        let groups = order
            .into_iter()
            .map(|(group, members)| {
                let values: Vec<PropertyValue> = members
                    .iter()
                    .map(|id| {
                        self.graph
                            .get(id)
                            .and_then(|e| e.get(value_property))
                            .cloned()
                            .unwrap_or(PropertyValue::Unknown)
                    })
                    .collect();
                AggregateGroup { value: aggregation_fun(&values), group, ids: members }
            })
            .collect::<Vec<_>>();
        tracing::debug!(ids = ids.len(), levels = levels.len(), groups = groups.len(), "categorical aggregation");
        Ok(groups)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct World {
        graph: Graph,
        c1: EntityId,
        c2: EntityId,
        c3: EntityId,
        europe: EntityId,
        asia: EntityId,
    }

    fn world() -> World {
        let mut graph = Graph::default();
        let s = graph.schema_mut();
        s.create_type("country").unwrap();
        s.create_type("continent").unwrap();
        s.add_property("country", "name", "string").unwrap();
        s.add_property("country", "continent", "continent").unwrap();
        s.add_property("country", "oil", "integer").unwrap();
        s.add_property("continent", "name", "string").unwrap();

        let europe = graph.create_from_type("continent").unwrap();
        let asia = graph.create_from_type("continent").unwrap();
        let mut country = |continent: &EntityId, oil: i64| {
            let id = graph.create_from_type("country").unwrap();
            graph.edit_property(&id, "continent", continent).unwrap();
            graph.edit_property(&id, "oil", oil).unwrap();
            id
        };
        let c1 = country(&europe, 10);
        let c2 = country(&europe, 20);
        let c3 = country(&asia, 5);
        World { graph, c1, c2, c3, europe, asia }
    }

    #[test]
    fn test_paths_single_level() {
        let w = world();
        let levels = w
            .graph
            .aggregator()
            .categorical_aggregation_paths(&[w.c1.clone(), w.c2.clone()])
            .unwrap();
        assert_eq!(
            levels,
            vec![GeneralizationLevel {
                depth: 0,
                pointing_property: "continent".into(),
                aggregation_type: "continent".into(),
                n_groups: 1,
                aggregation_proportion: 1.0,
            }]
        );
    }

    #[test]
    fn test_paths_count_distinct_targets() {
        let w = world();
        let ids = [w.c1.clone(), w.c2.clone(), w.c3.clone()];
        let levels = w.graph.aggregator().categorical_aggregation_paths(&ids).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].n_groups, 2);
    }

    #[test]
    fn test_partial_reach_lowers_proportion() {
        let mut w = world();
        w.graph.edit_property(&w.c3, "continent", PropertyValue::Unknown).unwrap();
        let ids = [w.c1.clone(), w.c2.clone(), w.c3.clone()];
        let levels = w.graph.aggregator().categorical_aggregation_paths(&ids).unwrap();
        assert!((levels[0].aggregation_proportion - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_types_rejected() {
        let w = world();
        let err = w
            .graph
            .aggregator()
            .categorical_aggregation_groups(&[w.c1.clone(), w.europe.clone()])
            .unwrap_err();
        assert!(matches!(err, Error::MixedTypes(ref t) if t.len() == 2));
    }

    #[test]
    fn test_empty_input() {
        let w = world();
        let agg = w.graph.aggregator();
        assert!(agg.categorical_aggregation_paths(&[]).unwrap().is_empty());
        assert!(agg.categorical_aggregation(&[], "oil", reduce::mean, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_by_continent() {
        let w = world();
        let ids = [w.c1.clone(), w.c2.clone(), w.c3.clone()];
        let level = LevelKey::new(0, "continent", "continent");
        let groups = w
            .graph
            .aggregator()
            .categorical_aggregation(&ids, "oil", reduce::mean, &[level])
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group.as_slice(), &[Some(w.europe.clone())]);
        assert_eq!(groups[0].ids, vec![w.c1.clone(), w.c2.clone()]);
        assert_eq!(groups[0].value, PropertyValue::Float(15.0));
        assert_eq!(groups[1].group.as_slice(), &[Some(w.asia.clone())]);
        assert_eq!(groups[1].value, PropertyValue::Float(5.0));
    }

    #[test]
    fn test_ids_without_a_path_share_a_none_slot() {
        let mut w = world();
        w.graph.edit_property(&w.c3, "continent", PropertyValue::Unknown).unwrap();
        let ids = [w.c3.clone(), w.c1.clone()];
        let groups = w
            .graph
            .aggregator()
            .categorical_aggregation(&ids, "oil", reduce::sum, &[LevelKey::new(0, "continent", "continent")])
            .unwrap();
        assert_eq!(groups[0].group.as_slice(), &[None::<EntityId>]);
        assert_eq!(groups[0].value, PropertyValue::Float(5.0));
        assert_eq!(groups[1].group.as_slice(), &[Some(w.europe.clone())]);
    }

    #[test]
    fn test_unknown_value_property_is_rejected() {
        let w = world();
        let ids = [w.c1.clone(), w.c3.clone()];
        let err = w
            .graph
            .aggregator()
            .categorical_aggregation(&ids, "oill", reduce::sum, &[LevelKey::new(0, "continent", "continent")])
            .unwrap_err();
        match err {
            Error::PropertyNotFound { type_name, property } => {
                assert_eq!(type_name, "country");
                assert_eq!(property, "oill");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_reached_entity_keys_a_level() {
        let mut w = world();
        let s = w.graph.schema_mut();
        s.create_type("city").unwrap();
        s.add_property("city", "country", "country").unwrap();
        s.add_property("city", "former_country", "country").unwrap();
        s.add_property("city", "population", "integer").unwrap();
        let city = w.graph.create_from_type("city").unwrap();
        w.graph.edit_property(&city, "country", &w.c1).unwrap();
        w.graph.edit_property(&city, "former_country", &w.c3).unwrap();
        w.graph.edit_property(&city, "population", 7).unwrap();

        let groups = w
            .graph
            .aggregator()
            .categorical_aggregation(
                &[city.clone()],
                "population",
                reduce::sum,
                &[LevelKey::new(1, "continent", "continent")],
            )
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group.as_slice(), &[Some(w.europe.clone())]);
        assert_eq!(groups[0].ids, vec![city]);
    }

    #[test]
    fn test_no_levels_is_one_group() {
        let w = world();
        let ids = [w.c1.clone(), w.c2.clone(), w.c3.clone()];
        let groups = w.graph.aggregator().categorical_aggregation(&ids, "oil", reduce::count, &[]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].value, PropertyValue::Integer(3));
    }
}
