//! Dimension and detail score rows

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::aggregator::DimensionScore;
use crate::error::MaturityError;

/// Dimension score row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScoreRow {
    pub entity_id: i64,
    pub dimension_index: u32,
    pub dimension_name: String,
    pub score: f64,
}

impl DimensionScoreRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            entity_id: row.get("entity_id")?,
            dimension_index: row.get("dimension_index")?,
            dimension_name: row.get("dimension_name")?,
            score: row.get("score")?,
        })
    }
}

/// Detail (criterion) score row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailScoreRow {
    pub entity_id: i64,
    pub criterion_label: String,
    pub dimension_index: u32,
    pub score: f64,
}

impl DetailScoreRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            entity_id: row.get("entity_id")?,
            criterion_label: row.get("criterion_label")?,
            dimension_index: row.get("dimension_index")?,
            score: row.get("score")?,
        })
    }
}

/// Criterion value to persist
#[derive(Debug, Clone, PartialEq)]
pub struct DetailInput {
    pub criterion_label: String,
    pub dimension_index: u32,
    pub score: f64,
}

/// Dimension scores of one entity, catalog order
pub fn get_dimension_scores(conn: &Connection, entity_id: i64) -> Result<Vec<DimensionScoreRow>, MaturityError> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, dimension_index, dimension_name, score
         FROM dimension_scores WHERE entity_id = ? ORDER BY dimension_index",
    )?;
    let rows = stmt
        .query_map(params![entity_id], |row| DimensionScoreRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Detail scores of one entity, ordered by dimension then label
pub fn get_detail_scores(conn: &Connection, entity_id: i64) -> Result<Vec<DetailScoreRow>, MaturityError> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, criterion_label, dimension_index, score
         FROM detail_scores WHERE entity_id = ? ORDER BY dimension_index, criterion_label",
    )?;
    let rows = stmt
        .query_map(params![entity_id], |row| DetailScoreRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every dimension score row
pub fn list_dimension_scores(conn: &Connection) -> Result<Vec<DimensionScoreRow>, MaturityError> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, dimension_index, dimension_name, score
         FROM dimension_scores ORDER BY entity_id, dimension_index",
    )?;
    let rows = stmt
        .query_map([], |row| DimensionScoreRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every detail score row
pub fn list_detail_scores(conn: &Connection) -> Result<Vec<DetailScoreRow>, MaturityError> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, criterion_label, dimension_index, score
         FROM detail_scores ORDER BY entity_id, dimension_index, criterion_label",
    )?;
    let rows = stmt
        .query_map([], |row| DetailScoreRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert the dimension rows and then the detail rows of one entity.
///
/// Detail rows reference their dimension row, so dimensions go first.
pub fn insert_scores(
    conn: &Connection,
    entity_id: i64,
    dimensions: &[DimensionScore],
    details: &[DetailInput],
) -> Result<(), MaturityError> {
    let mut dim_stmt = conn.prepare(
        "INSERT INTO dimension_scores (entity_id, dimension_index, dimension_name, score)
         VALUES (?, ?, ?, ?)",
    )?;
    for dim in dimensions {
        dim_stmt
            .execute(params![entity_id, dim.index, dim.name, dim.score])
            .map_err(|e| MaturityError::from_write(&format!("dimension '{}'", dim.name), e))?;
    }

    let mut detail_stmt = conn.prepare(
        "INSERT INTO detail_scores (entity_id, criterion_label, dimension_index, score)
         VALUES (?, ?, ?, ?)",
    )?;
    for detail in details {
        detail_stmt
            .execute(params![
                entity_id,
                detail.criterion_label,
                detail.dimension_index,
                detail.score
            ])
            .map_err(|e| {
                MaturityError::from_write(&format!("criterion '{}'", detail.criterion_label), e)
            })?;
    }

    Ok(())
}

/// Remove all score rows of one entity
pub fn delete_scores(conn: &Connection, entity_id: i64) -> Result<(), MaturityError> {
    conn.execute("DELETE FROM detail_scores WHERE entity_id = ?", params![entity_id])?;
    conn.execute("DELETE FROM dimension_scores WHERE entity_id = ?", params![entity_id])?;
    Ok(())
}
