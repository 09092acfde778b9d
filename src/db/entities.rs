//! Entity CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::{EntityScores, Rankable};
use crate::config::ConflictPolicy;
use crate::error::MaturityError;

use super::scores::{self, DetailInput};

/// Entity row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub status: String,
    pub global_score: f64,
    pub composite_score: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            category: row.get("category")?,
            status: row.get("status")?,
            global_score: row.get("global_score")?,
            composite_score: row.get("composite_score")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl Rankable for EntityRow {
    fn rank_name(&self) -> &str {
        &self.name
    }

    fn rank_composite(&self) -> f64 {
        self.composite_score
    }

    fn rank_global(&self) -> f64 {
        self.global_score
    }
}

/// Fully aggregated entity ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub name: String,
    pub category: String,
    pub status: String,
    pub scores: EntityScores,
    pub details: Vec<DetailInput>,
}

/// What happened to a persisted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistAction {
    Inserted,
    Replaced,
    /// Replace policy, stored rows already identical
    Unchanged,
}

/// Sort order for entity listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityOrder {
    /// Composite desc, global desc, name asc
    #[default]
    Ranking,
    /// Global desc, composite desc, name asc
    Global,
}

impl EntityOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::Ranking => "composite_score DESC, global_score DESC, name ASC",
            Self::Global => "global_score DESC, composite_score DESC, name ASC",
        }
    }
}

/// Filters for listing entities
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub order: EntityOrder,
    pub limit: Option<u32>,
}

const ENTITY_COLUMNS: &str =
    "id, name, category, status, global_score, composite_score, created_at, updated_at";

/// Get entity by unique name
pub fn get_entity(conn: &Connection, name: &str) -> Result<Option<EntityRow>, MaturityError> {
    let sql = format!("SELECT {} FROM entities WHERE name = ?", ENTITY_COLUMNS);
    let row = conn
        .query_row(&sql, params![name], |row| EntityRow::from_row(row))
        .optional()?;
    Ok(row)
}

/// List entities with optional filters
pub fn list_entities(conn: &Connection, query: &EntityQuery) -> Result<Vec<EntityRow>, MaturityError> {
    let mut sql = format!("SELECT {} FROM entities", ENTITY_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec![];

    if let Some(ref status) = query.status {
        conditions.push("status = ?");
        params.push(Box::new(status.clone()));
    }

    if let Some(ref category) = query.category {
        conditions.push("category = ?");
        params.push(Box::new(category.clone()));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY ");
    sql.push_str(query.order.sql());

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        params.push(Box::new(limit as i64));
    }

    debug!("Executing query: {}", sql);

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| EntityRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Whether any entity carries this category
pub fn category_exists(conn: &Connection, category: &str) -> Result<bool, MaturityError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM entities WHERE category = ? LIMIT 1",
            params![category],
            |_| Ok(()),
        )
        .optional()?;
    Ok(exists.is_some())
}

/// Persist one entity with its dimension and detail rows.
///
/// Callers run this inside a savepoint so a failure leaves no partial rows.
pub fn persist_entity(
    conn: &Connection,
    entity: &NewEntity,
    policy: ConflictPolicy,
    now: &str,
) -> Result<(i64, PersistAction), MaturityError> {
    let existing = match policy {
        ConflictPolicy::Fail => None,
        ConflictPolicy::Replace => get_entity(conn, &entity.name)?,
    };

    match existing {
        None => {
            conn.execute(
                r#"
                INSERT INTO entities (
                    name, category, status, global_score, composite_score, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    entity.name,
                    entity.category,
                    entity.status,
                    entity.scores.global_score,
                    entity.scores.composite_score,
                    now,
                    now,
                ],
            )
            .map_err(|e| MaturityError::from_write(&format!("entity '{}'", entity.name), e))?;

            let id = conn.last_insert_rowid();
            scores::insert_scores(conn, id, &entity.scores.dimensions, &entity.details)?;
            Ok((id, PersistAction::Inserted))
        }
        Some(row) => {
            if is_unchanged(conn, &row, entity)? {
                return Ok((row.id, PersistAction::Unchanged));
            }

            conn.execute(
                r#"
                UPDATE entities
                SET category = ?, status = ?, global_score = ?, composite_score = ?, updated_at = ?
                WHERE id = ?
                "#,
                params![
                    entity.category,
                    entity.status,
                    entity.scores.global_score,
                    entity.scores.composite_score,
                    now,
                    row.id,
                ],
            )
            .map_err(|e| MaturityError::from_write(&format!("entity '{}'", entity.name), e))?;

            scores::delete_scores(conn, row.id)?;
            scores::insert_scores(conn, row.id, &entity.scores.dimensions, &entity.details)?;
            Ok((row.id, PersistAction::Replaced))
        }
    }
}

fn is_unchanged(conn: &Connection, row: &EntityRow, entity: &NewEntity) -> Result<bool, MaturityError> {
    if row.category != entity.category
        || row.status != entity.status
        || row.global_score != entity.scores.global_score
        || row.composite_score != entity.scores.composite_score
    {
        return Ok(false);
    }

    let mut stored_dims: Vec<(u32, String, f64)> = scores::get_dimension_scores(conn, row.id)?
        .into_iter()
        .map(|d| (d.dimension_index, d.dimension_name, d.score))
        .collect();
    let mut new_dims: Vec<(u32, String, f64)> = entity
        .scores
        .dimensions
        .iter()
        .map(|d| (d.index, d.name.clone(), d.score))
        .collect();
    stored_dims.sort_by_key(|d| d.0);
    new_dims.sort_by_key(|d| d.0);
    if stored_dims != new_dims {
        return Ok(false);
    }

    let mut stored_details: Vec<(String, u32, f64)> = scores::get_detail_scores(conn, row.id)?
        .into_iter()
        .map(|d| (d.criterion_label, d.dimension_index, d.score))
        .collect();
    let mut new_details: Vec<(String, u32, f64)> = entity
        .details
        .iter()
        .map(|d| (d.criterion_label.clone(), d.dimension_index, d.score))
        .collect();
    stored_details.sort_by(|a, b| a.0.cmp(&b.0));
    new_details.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(stored_details == new_details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::DimensionScore;
    use crate::db::schema::define_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        define_schema(&conn).unwrap();
        conn
    }

    fn entity(name: &str, composite: f64) -> NewEntity {
        NewEntity {
            name: name.into(),
            category: "Saúde".into(),
            status: "Ativa".into(),
            scores: EntityScores {
                global_score: 3.0,
                dimensions: vec![DimensionScore { index: 1, name: "Performance".into(), score: composite }],
                composite_score: composite,
            },
            details: vec![DetailInput { criterion_label: "1.1".into(), dimension_index: 1, score: composite }],
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = conn();
        let (id, action) = persist_entity(&conn, &entity("A", 4.0), ConflictPolicy::Fail, "t0").unwrap();
        assert_eq!(action, PersistAction::Inserted);

        let row = get_entity(&conn, "A").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.created_at, "t0");
        assert_eq!(scores::get_dimension_scores(&conn, id).unwrap().len(), 1);
        assert_eq!(scores::get_detail_scores(&conn, id).unwrap().len(), 1);
        assert!(get_entity(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_fails_under_fail_policy() {
        let conn = conn();
        persist_entity(&conn, &entity("A", 4.0), ConflictPolicy::Fail, "t0").unwrap();
        let err = persist_entity(&conn, &entity("A", 4.0), ConflictPolicy::Fail, "t1").unwrap_err();
        assert!(matches!(err, MaturityError::ConstraintViolation(_)));
    }

    #[test]
    fn test_replace_policy_upserts() {
        let conn = conn();
        let (id, _) = persist_entity(&conn, &entity("A", 4.0), ConflictPolicy::Replace, "t0").unwrap();

        let (same_id, action) =
            persist_entity(&conn, &entity("A", 4.0), ConflictPolicy::Replace, "t1").unwrap();
        assert_eq!((same_id, action), (id, PersistAction::Unchanged));
        assert_eq!(get_entity(&conn, "A").unwrap().unwrap().updated_at, "t0");

        let (_, action) = persist_entity(&conn, &entity("A", 2.0), ConflictPolicy::Replace, "t2").unwrap();
        assert_eq!(action, PersistAction::Replaced);
        let row = get_entity(&conn, "A").unwrap().unwrap();
        assert_eq!(row.composite_score, 2.0);
        assert_eq!(row.created_at, "t0");
        assert_eq!(row.updated_at, "t2");
        assert_eq!(scores::get_detail_scores(&conn, id).unwrap()[0].score, 2.0);
    }

    #[test]
    fn test_list_orders_and_filters() {
        let conn = conn();
        for (name, composite) in [("B", 4.8), ("A", 4.8), ("C", 4.2)] {
            persist_entity(&conn, &entity(name, composite), ConflictPolicy::Fail, "t0").unwrap();
        }

        let rows = list_entities(&conn, &EntityQuery::default()).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let rows = list_entities(
            &conn,
            &EntityQuery { status: Some("Inativa".into()), ..Default::default() },
        )
        .unwrap();
        assert!(rows.is_empty());

        let rows = list_entities(&conn, &EntityQuery { limit: Some(1), ..Default::default() }).unwrap();
        assert_eq!(rows.len(), 1);

        assert!(category_exists(&conn, "Saúde").unwrap());
        assert!(!category_exists(&conn, "Energia").unwrap());
    }
}
