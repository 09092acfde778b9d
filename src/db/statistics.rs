//! Per-category statistics
//!
//! The relation is derived: it is dropped and rebuilt from `entities` on every
//! recompute, never patched row by row.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{mean, median};
use crate::config::StatusLabels;
use crate::error::MaturityError;

/// Group statistics row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatisticsRow {
    pub category: String,
    pub total: u32,
    pub active_count: u32,
    pub inactive_count: u32,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub updated_at: String,
}

impl GroupStatisticsRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            category: row.get("category")?,
            total: row.get("total")?,
            active_count: row.get("active_count")?,
            inactive_count: row.get("inactive_count")?,
            mean: row.get("mean")?,
            median: row.get("median")?,
            min: row.get("min")?,
            max: row.get("max")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Default)]
struct Accumulator {
    scores: Vec<f64>,
    active: u32,
    inactive: u32,
}

/// Rebuild `group_statistics` from the current entity set.
///
/// Returns the number of categories written.
pub fn recompute_group_statistics(
    conn: &Connection,
    statuses: &StatusLabels,
    now: &str,
) -> Result<usize, MaturityError> {
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    {
        let mut stmt = conn.prepare("SELECT category, status, global_score FROM entities")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        for row in rows {
            let (category, status, score) = row?;
            // labels outside the configured pair (stored before a relabel) count as inactive
            if !statuses.contains(&status) {
                warn!(status = %status, category = %category, "Stored status is not a configured label");
            }

            let acc = groups.entry(category).or_default();
            if status == statuses.active {
                acc.active += 1;
            } else {
                acc.inactive += 1;
            }
            acc.scores.push(score);
        }
    }

    conn.execute("DELETE FROM group_statistics", [])?;

    let mut insert = conn.prepare(
        r#"
        INSERT INTO group_statistics (
            category, total, active_count, inactive_count, mean, median, min, max, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )?;

    for (category, acc) in &groups {
        let total = acc.scores.len() as u32;
        let mean = mean(acc.scores.iter().copied()).unwrap_or(0.0);
        let median = median(&acc.scores).unwrap_or(0.0);
        let min = acc.scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = acc.scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        debug!(category = %category, total, mean, "Writing group statistics");

        insert
            .execute(params![
                category,
                total,
                acc.active,
                acc.inactive,
                mean,
                median,
                min,
                max,
                now
            ])
            .map_err(|e| MaturityError::from_write(&format!("statistics '{}'", category), e))?;
    }

    info!(categories = groups.len(), "Recomputed group statistics");
    Ok(groups.len())
}

/// Statistics of one category
pub fn get_group_statistics(
    conn: &Connection,
    category: &str,
) -> Result<Option<GroupStatisticsRow>, MaturityError> {
    let row = conn
        .query_row(
            "SELECT category, total, active_count, inactive_count, mean, median, min, max, updated_at
             FROM group_statistics WHERE category = ?",
            params![category],
            |row| GroupStatisticsRow::from_row(row),
        )
        .optional()?;
    Ok(row)
}

/// Statistics of every category, mean score descending
pub fn list_group_statistics(conn: &Connection) -> Result<Vec<GroupStatisticsRow>, MaturityError> {
    let mut stmt = conn.prepare(
        "SELECT category, total, active_count, inactive_count, mean, median, min, max, updated_at
         FROM group_statistics ORDER BY mean DESC, category ASC",
    )?;
    let rows = stmt
        .query_map([], |row| GroupStatisticsRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
