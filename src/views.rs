//! View types for report outputs
//!
//! Row types in `db` use snake_case for parity with the tables. Views use
//! camelCase and reshape rows for consumers: dimension scores are pivoted into
//! one object per entity, rankings carry their positions.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::aggregator::mean;
use crate::config::DimensionDef;
use crate::db::{DimensionScoreRow, EntityRow};

// ============================================================================
// Entity wide view
// ============================================================================

/// Entity with its dimension scores pivoted into columns
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WideEntityView {
    pub name: String,
    pub category: String,
    pub status: String,
    pub global_score: f64,
    pub composite_score: f64,
    /// Dimension name to score, catalog order; absent dimensions are null
    pub dimensions: Map<String, Value>,
}

impl WideEntityView {
    pub fn new(entity: &EntityRow, scores: &[&DimensionScoreRow], catalog: &[DimensionDef]) -> Self {
        let mut dimensions = Map::new();
        for def in catalog {
            let score = scores
                .iter()
                .find(|s| s.dimension_index == def.index)
                .map(|s| Value::from(s.score))
                .unwrap_or(Value::Null);
            dimensions.insert(def.name.clone(), score);
        }

        Self {
            name: entity.name.clone(),
            category: entity.category.clone(),
            status: entity.status.clone(),
            global_score: entity.global_score,
            composite_score: entity.composite_score,
            dimensions,
        }
    }
}

/// Pivot every entity against the catalog
pub fn wide_entities(
    entities: &[EntityRow],
    scores: &[DimensionScoreRow],
    catalog: &[DimensionDef],
) -> Vec<WideEntityView> {
    let mut by_entity: BTreeMap<i64, Vec<&DimensionScoreRow>> = BTreeMap::new();
    for score in scores {
        by_entity.entry(score.entity_id).or_default().push(score);
    }

    entities
        .iter()
        .map(|entity| {
            let scores = by_entity.get(&entity.id).map(Vec::as_slice).unwrap_or(&[]);
            WideEntityView::new(entity, scores, catalog)
        })
        .collect()
}

// ============================================================================
// Category x status summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatusSummaryView {
    pub category: String,
    pub status: String,
    pub count: usize,
    pub mean_global: f64,
    pub min_global: f64,
    pub max_global: f64,
    pub mean_composite: f64,
}

/// One row per (category, status) pair present in `entities`, sorted by both
pub fn category_status_summary(entities: &[EntityRow]) -> Vec<CategoryStatusSummaryView> {
    let mut groups: BTreeMap<(&str, &str), Vec<&EntityRow>> = BTreeMap::new();
    for entity in entities {
        groups
            .entry((entity.category.as_str(), entity.status.as_str()))
            .or_default()
            .push(entity);
    }

    groups
        .into_iter()
        .map(|((category, status), members)| {
            let globals: Vec<f64> = members.iter().map(|e| e.global_score).collect();
            CategoryStatusSummaryView {
                category: category.to_string(),
                status: status.to_string(),
                count: members.len(),
                mean_global: mean(globals.iter().copied()).unwrap_or(0.0),
                min_global: globals.iter().copied().fold(f64::INFINITY, f64::min),
                max_global: globals.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean_composite: mean(members.iter().map(|e| e.composite_score)).unwrap_or(0.0),
            }
        })
        .collect()
}

// ============================================================================
// Ranking
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntryView {
    /// 1-based competition rank by composite score; ties share a position
    pub position: usize,
    /// Same rank within the entity's category
    pub category_position: usize,
    pub name: String,
    pub category: String,
    pub composite_score: f64,
    pub global_score: f64,
}

/// Competition ranking ("1, 1, 3") over a run of composite scores
#[derive(Default)]
struct RankCounter {
    seen: usize,
    last: Option<(f64, usize)>,
}

impl RankCounter {
    fn next(&mut self, score: f64) -> usize {
        self.seen += 1;
        let position = match self.last {
            Some((last, position)) if last == score => position,
            _ => self.seen,
        };
        self.last = Some((score, position));
        position
    }
}

/// Positions for entities already sorted in ranking order
pub fn ranking(ranked: &[EntityRow]) -> Vec<RankingEntryView> {
    let mut overall = RankCounter::default();
    let mut per_category: BTreeMap<&str, RankCounter> = BTreeMap::new();
    ranked
        .iter()
        .map(|entity| RankingEntryView {
            position: overall.next(entity.composite_score),
            category_position: per_category
                .entry(entity.category.as_str())
                .or_default()
                .next(entity.composite_score),
            name: entity.name.clone(),
            category: entity.category.clone(),
            composite_score: entity.composite_score,
            global_score: entity.global_score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: i64, name: &str, category: &str, status: &str, score: f64) -> EntityRow {
        EntityRow {
            id,
            name: name.into(),
            category: category.into(),
            status: status.into(),
            global_score: score,
            composite_score: score,
            created_at: "t0".into(),
            updated_at: "t0".into(),
        }
    }

    #[test]
    fn test_wide_view_fills_missing_dimensions_with_null() {
        let catalog = vec![DimensionDef::new(1, "Performance"), DimensionDef::new(2, "Viability")];
        let scores = vec![DimensionScoreRow {
            entity_id: 7,
            dimension_index: 2,
            dimension_name: "Viability".into(),
            score: 2.5,
        }];
        let views = wide_entities(&[entity(7, "A", "X", "Ativa", 3.0)], &scores, &catalog);

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["globalScore"], 3.0);
        assert_eq!(json["dimensions"]["Performance"], Value::Null);
        assert_eq!(json["dimensions"]["Viability"], 2.5);
    }

    #[test]
    fn test_category_status_summary() {
        let rows = vec![
            entity(1, "A", "X", "Ativa", 2.0),
            entity(2, "B", "X", "Ativa", 4.0),
            entity(3, "C", "X", "Inativa", 1.0),
        ];
        let summary = category_status_summary(&rows);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].mean_global, 3.0);
        assert_eq!(summary[0].min_global, 2.0);
        assert_eq!(summary[0].max_global, 4.0);
        assert_eq!(summary[1].status, "Inativa");
    }

    #[test]
    fn test_ranking_positions() {
        let rows = vec![
            entity(1, "A", "X", "Ativa", 4.8),
            entity(2, "B", "Y", "Ativa", 4.5),
            entity(3, "C", "X", "Ativa", 4.2),
        ];
        let ranked = ranking(&rows);
        assert_eq!((ranked[2].position, ranked[2].category_position), (3, 2));
        assert_eq!(ranked[1].category_position, 1);
    }

    #[test]
    fn test_ranking_ties_share_position() {
        let rows = vec![
            entity(1, "A", "X", "Ativa", 4.8),
            entity(2, "B", "X", "Ativa", 4.8),
            entity(3, "C", "X", "Ativa", 4.2),
        ];
        let positions: Vec<_> = ranking(&rows).iter().map(|r| (r.position, r.category_position)).collect();
        assert_eq!(positions, vec![(1, 1), (1, 1), (3, 3)]);
    }
}
