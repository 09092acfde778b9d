//! Transactional batch persistence
//!
//! One SQLite transaction per import. Each entity is written inside its own
//! savepoint, and group statistics are rebuilt before the transaction commits,
//! so readers never see entities and statistics from different generations.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::config::{BatchMode, ConflictPolicy, StatusLabels};
use crate::error::MaturityError;

use super::entities::{self, NewEntity, PersistAction};
use super::statistics;

/// Aggregated row waiting to be written
#[derive(Debug, Clone)]
pub struct PreparedRow {
    pub row_index: usize,
    pub entity: NewEntity,
}

/// Row that could not be imported
#[derive(Debug)]
pub struct RowFailure {
    pub row_index: usize,
    pub name: Option<String>,
    pub error: MaturityError,
}

impl RowFailure {
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("row {} ('{}'): {}", self.row_index, name, self.error),
            None => format!("row {}: {}", self.row_index, self.error),
        }
    }
}

/// Entity written by a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedEntity {
    pub row_index: usize,
    pub name: String,
    pub entity_id: i64,
    pub action: PersistAction,
}

/// Result of a committed batch
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub persisted: Vec<PersistedEntity>,
    pub failures: Vec<RowFailure>,
    pub categories: usize,
}

/// Batch write options
#[derive(Debug, Clone)]
pub struct PersistOptions {
    pub conflict_policy: ConflictPolicy,
    pub batch_mode: BatchMode,
    pub statuses: StatusLabels,
    pub now: String,
}

/// Write every prepared row and rebuild statistics in one transaction.
///
/// In `AllOrNothing` mode the first failure aborts and rolls back the whole
/// batch; the error lists every failing row encountered.
pub fn persist_batch(
    conn: &mut Connection,
    rows: Vec<PreparedRow>,
    options: &PersistOptions,
) -> Result<PersistOutcome, MaturityError> {
    let mut tx = conn.transaction()?;
    let mut outcome = PersistOutcome::default();

    for row in rows {
        let sp = tx.savepoint()?;
        match entities::persist_entity(&sp, &row.entity, options.conflict_policy, &options.now) {
            Ok((entity_id, action)) => {
                sp.commit()?;
                debug!(name = %row.entity.name, entity_id, ?action, "Persisted entity");
                outcome.persisted.push(PersistedEntity {
                    row_index: row.row_index,
                    name: row.entity.name,
                    entity_id,
                    action,
                });
            }
            Err(error) => {
                // dropping the savepoint rolls back this entity's rows
                drop(sp);
                debug!(row = row.row_index, name = %row.entity.name, error = %error, "Rolled back entity");
                outcome.failures.push(RowFailure {
                    row_index: row.row_index,
                    name: Some(row.entity.name),
                    error,
                });
            }
        }
    }

    if options.batch_mode == BatchMode::AllOrNothing && !outcome.failures.is_empty() {
        tx.rollback()?;
        return Err(MaturityError::ImportRejected(
            outcome.failures.iter().map(RowFailure::describe).collect(),
        ));
    }

    outcome.categories = statistics::recompute_group_statistics(&tx, &options.statuses, &options.now)?;
    tx.commit()?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{DimensionScore, EntityScores};
    use crate::db::schema::define_schema;
    use crate::db::scores::DetailInput;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        define_schema(&conn).unwrap();
        conn
    }

    fn row(index: usize, name: &str, detail_dimension: u32) -> PreparedRow {
        PreparedRow {
            row_index: index,
            entity: NewEntity {
                name: name.into(),
                category: "Saúde".into(),
                status: "Ativa".into(),
                scores: EntityScores {
                    global_score: 3.0,
                    dimensions: vec![DimensionScore { index: 1, name: "Performance".into(), score: 3.0 }],
                    composite_score: 3.0,
                },
                details: vec![DetailInput {
                    criterion_label: format!("{}.1", detail_dimension),
                    dimension_index: detail_dimension,
                    score: 3.0,
                }],
            },
        }
    }

    fn options(mode: BatchMode) -> PersistOptions {
        PersistOptions {
            conflict_policy: ConflictPolicy::Fail,
            batch_mode: mode,
            statuses: StatusLabels::default(),
            now: "t0".into(),
        }
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_failed_entity_leaves_no_partial_rows() {
        let mut conn = conn();
        // detail row points at dimension 2 which has no dimension row
        let rows = vec![row(0, "A", 1), row(1, "B", 2), row(2, "C", 1)];
        let outcome = persist_batch(&mut conn, rows, &options(BatchMode::PerEntity)).unwrap();

        assert_eq!(outcome.persisted.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].name.as_deref(), Some("B"));
        assert_eq!(count(&conn, "entities"), 2);
        assert_eq!(count(&conn, "dimension_scores"), 2);
        assert_eq!(count(&conn, "detail_scores"), 2);
        assert_eq!(outcome.categories, 1);
    }

    #[test]
    fn test_all_or_nothing_rolls_back() {
        let mut conn = conn();
        let rows = vec![row(0, "A", 1), row(1, "B", 2)];
        let err = persist_batch(&mut conn, rows, &options(BatchMode::AllOrNothing)).unwrap_err();

        assert!(matches!(err, MaturityError::ImportRejected(ref v) if v.len() == 1));
        assert_eq!(count(&conn, "entities"), 0);
        assert_eq!(count(&conn, "group_statistics"), 0);
    }
}
