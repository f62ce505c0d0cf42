//! Fuzzy lookup of entities by their string-typed property values.

use std::collections::BTreeSet;

use super::Graph;
use crate::model::{EntityId, LeafKind, ValueType};
use crate::{Error, Result};

/// Scores candidate strings against a query. Higher is closer.
pub trait SimilarityScorer {
    /// One score per candidate, in candidate order.
    fn score_all(&self, query: &str, candidates: &[&str]) -> Vec<f64>;
}

/// Case-insensitive Jaro-Winkler similarity.
#[derive(Debug, Default, Clone, Copy)]
pub struct JaroWinkler;

impl SimilarityScorer for JaroWinkler {
    fn score_all(&self, query: &str, candidates: &[&str]) -> Vec<f64> {
        let query = query.to_lowercase();
        candidates
            .iter()
            .map(|c| strsim::jaro_winkler(&query, &c.to_lowercase()))
            .collect()
    }
}

impl Graph {
    /// [`Graph::search_with`] using [`JaroWinkler`].
    pub fn search(&self, query: &str, type_name: Option<&str>) -> Result<Vec<EntityId>> {
        self.search_with(&JaroWinkler, query, type_name)
    }

    /// Ids of every entity holding a string value tied for the best score
    /// against `query`. Only properties declared as `string` are considered,
    /// and only entities of `type_name` when one is given.
    pub fn search_with(
        &self,
        scorer: &dyn SimilarityScorer,
        query: &str,
        type_name: Option<&str>,
    ) -> Result<Vec<EntityId>> {
        if let Some(t) = type_name {
            if !self.schema().is_declared(t) {
                return Err(Error::UnknownType(t.to_owned()));
            }
        }

        let string_type = ValueType::Leaf(LeafKind::String);
        let mut ids: Vec<&EntityId> = Vec::new();
        let mut values: Vec<&str> = Vec::new();
        for (id, entity) in self.entities() {
            if type_name.is_some_and(|t| t != entity.type_name) {
                continue;
            }
            for (property, value) in &entity.properties {
                let Some(text) = value.as_plain_str() else { continue };
                if self.schema().property_type(&entity.type_name, property) == Some(&string_type) {
                    ids.push(id);
                    values.push(text);
                }
            }
        }

        let scores = scorer.score_all(query, &values);
        let Some(best) = scores.iter().copied().reduce(f64::max) else {
            return Ok(Vec::new());
        };
        let hits: BTreeSet<EntityId> = ids
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| (best - score).abs() <= f64::EPSILON)
            .map(|(id, _)| id.clone())
            .collect();
        tracing::debug!(query, candidates = values.len(), hits = hits.len(), best, "search");
        Ok(hits.into_iter().collect())
    }
}
