//! Query service - read-only façade over the assessment store

use std::sync::Arc;

use serde::Serialize;

use crate::aggregator::top_k;
use crate::config::Config;
use crate::db::{
    self, ad_hoc, entities, scores, statistics, AdHocQuery, AdHocResult, AssessmentDb, DetailScoreRow,
    DimensionScoreRow, EntityOrder, EntityQuery, EntityRow, GroupStatisticsRow,
};
use crate::error::MaturityError;

/// Entity with its dimension and criterion scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityBreakdown {
    pub entity: EntityRow,
    pub dimensions: Vec<DimensionScoreRow>,
    pub details: Vec<DetailScoreRow>,
}

/// Query service
pub struct QueryService {
    db: Arc<AssessmentDb>,
    config: Arc<Config>,
}

impl QueryService {
    pub fn new(db: Arc<AssessmentDb>, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    // =========================================================================
    // Entity listings
    // =========================================================================

    /// Entities with `status`, ranking order
    pub fn list_by_status(&self, status: &str) -> Result<Vec<EntityRow>, MaturityError> {
        self.check_status(status)?;
        self.db.with_conn(|conn| {
            entities::list_entities(
                conn,
                &EntityQuery {
                    status: Some(status.to_string()),
                    ..Default::default()
                },
            )
        })
    }

    /// Entities of `category`, global score descending
    pub fn list_by_category(&self, category: &str) -> Result<Vec<EntityRow>, MaturityError> {
        self.db.with_conn(|conn| {
            if !entities::category_exists(conn, category)? {
                return Err(MaturityError::NotFound(format!("category '{}'", category)));
            }
            entities::list_entities(
                conn,
                &EntityQuery {
                    category: Some(category.to_string()),
                    order: EntityOrder::Global,
                    ..Default::default()
                },
            )
        })
    }

    /// First `k` entities of the ranking, optionally restricted to one status
    pub fn top_k(&self, k: usize, status: Option<&str>) -> Result<Vec<EntityRow>, MaturityError> {
        if let Some(status) = status {
            self.check_status(status)?;
        }
        let rows = self.db.with_conn(|conn| {
            entities::list_entities(
                conn,
                &EntityQuery {
                    status: status.map(str::to_string),
                    ..Default::default()
                },
            )
        })?;
        Ok(top_k(rows, k))
    }

    // =========================================================================
    // Single entity
    // =========================================================================

    /// Top-ranked entity with its breakdown, `None` on an empty store
    pub fn best_overall(&self) -> Result<Option<EntityBreakdown>, MaturityError> {
        self.best(None)
    }

    /// Top-ranked entity among those with `status`
    pub fn best_with_status(&self, status: &str) -> Result<Option<EntityBreakdown>, MaturityError> {
        self.check_status(status)?;
        self.best(Some(status))
    }

    /// Entity with dimension scores (catalog order) and detail scores
    pub fn entity_breakdown(&self, name: &str) -> Result<EntityBreakdown, MaturityError> {
        self.db.with_conn(|conn| {
            let entity = entities::get_entity(conn, name)?
                .ok_or_else(|| MaturityError::NotFound(format!("entity '{}'", name)))?;
            breakdown(conn, entity)
        })
    }

    fn best(&self, status: Option<&str>) -> Result<Option<EntityBreakdown>, MaturityError> {
        self.db.with_conn(|conn| {
            let mut rows = entities::list_entities(
                conn,
                &EntityQuery {
                    status: status.map(str::to_string),
                    limit: Some(1),
                    ..Default::default()
                },
            )?;
            match rows.pop() {
                Some(entity) => Ok(Some(breakdown(conn, entity)?)),
                None => Ok(None),
            }
        })
    }

    // =========================================================================
    // Statistics and exploration
    // =========================================================================

    /// All categories by mean descending, or just `category`
    pub fn group_statistics(&self, category: Option<&str>) -> Result<Vec<GroupStatisticsRow>, MaturityError> {
        self.db.with_conn(|conn| match category {
            None => statistics::list_group_statistics(conn),
            Some(category) => statistics::get_group_statistics(conn, category)?
                .map(|row| vec![row])
                .ok_or_else(|| MaturityError::NotFound(format!("statistics for category '{}'", category))),
        })
    }

    /// Execute a structured read-only query
    pub fn run_ad_hoc(&self, query: &AdHocQuery) -> Result<AdHocResult, MaturityError> {
        self.db.with_conn(|conn| ad_hoc::run_ad_hoc(conn, query))
    }

    pub fn stats(&self) -> Result<db::DbStats, MaturityError> {
        self.db.stats()
    }

    fn check_status(&self, status: &str) -> Result<(), MaturityError> {
        if self.config.statuses.contains(status) {
            Ok(())
        } else {
            Err(MaturityError::NotFound(format!("status '{}'", status)))
        }
    }
}

fn breakdown(conn: &rusqlite::Connection, entity: EntityRow) -> Result<EntityBreakdown, MaturityError> {
    let dimensions = scores::get_dimension_scores(conn, entity.id)?;
    let details = scores::get_detail_scores(conn, entity.id)?;
    Ok(EntityBreakdown { entity, dimensions, details })
}
