//! Score aggregation
//!
//! Pure functions turning one entity's criterion values into global,
//! per-dimension and composite scores, plus the ranking order used by every
//! report.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::CompositeDefinition;
use crate::error::MaturityError;
use crate::resolver::BoundSchema;

/// Score of one dimension for one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionScore {
    pub index: u32,
    pub name: String,
    pub score: f64,
}

/// Aggregated scores of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityScores {
    pub global_score: f64,
    /// Catalog order
    pub dimensions: Vec<DimensionScore>,
    pub composite_score: f64,
}

impl EntityScores {
    pub fn dimension(&self, index: u32) -> Option<&DimensionScore> {
        self.dimensions.iter().find(|d| d.index == index)
    }
}

/// Arithmetic mean, `None` for an empty input
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Median of an unsorted sample, `None` when empty
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Aggregate one entity.
///
/// `values` is keyed by criterion label; iteration is in label order so the
/// floating-point result does not depend on the source column order.
pub fn aggregate(
    values: &BTreeMap<String, f64>,
    schema: &BoundSchema,
    composite: &CompositeDefinition,
) -> Result<EntityScores, MaturityError> {
    let global_score = mean(values.values().copied()).ok_or_else(|| {
        MaturityError::InsufficientData("entity has no criterion values".to_string())
    })?;

    let mut dimensions = Vec::with_capacity(schema.dimensions.len());
    for dim in &schema.dimensions {
        let mut group: Vec<(&str, f64)> = dim
            .criteria
            .iter()
            .filter_map(|label| values.get(label).map(|v| (label.as_str(), *v)))
            .collect();
        group.sort_by(|a, b| a.0.cmp(b.0));

        if let Some(score) = mean(group.into_iter().map(|(_, v)| v)) {
            dimensions.push(DimensionScore {
                index: dim.index,
                name: dim.name.clone(),
                score,
            });
        }
    }

    let mut referenced = Vec::with_capacity(composite.dimensions.len());
    for index in &composite.dimensions {
        let dim = dimensions.iter().find(|d| d.index == *index).ok_or_else(|| {
            MaturityError::MissingDimension(format!(
                "composite '{}' references dimension {} which has no scores",
                composite.name, index
            ))
        })?;
        referenced.push(dim.score);
    }
    let composite_score = mean(referenced).ok_or_else(|| {
        MaturityError::MissingDimension(format!(
            "composite '{}' references no dimensions",
            composite.name
        ))
    })?;

    Ok(EntityScores {
        global_score,
        dimensions,
        composite_score,
    })
}

/// Minimal view of an entity for ranking
pub trait Rankable {
    fn rank_name(&self) -> &str;
    fn rank_composite(&self) -> f64;
    fn rank_global(&self) -> f64;
}

/// Composite desc, then global desc, then name asc
pub fn ranking_order<T: Rankable>(a: &T, b: &T) -> Ordering {
    b.rank_composite()
        .total_cmp(&a.rank_composite())
        .then_with(|| b.rank_global().total_cmp(&a.rank_global()))
        .then_with(|| a.rank_name().cmp(b.rank_name()))
}

/// Sort in ranking order
pub fn rank<T: Rankable>(items: &mut [T]) {
    items.sort_by(ranking_order);
}

/// First `k` items in ranking order
pub fn top_k<T: Rankable>(mut items: Vec<T>, k: usize) -> Vec<T> {
    rank(&mut items);
    items.truncate(k);
    items
}
