//! SQLite store for normalized assessment data
//!
//! ## Tables
//!
//! - `entities` - One row per assessed entity (unique name, category, status, scores)
//! - `dimension_scores` - Mean score of each dimension per entity
//! - `detail_scores` - Raw criterion scores per entity
//! - `group_statistics` - Derived per-category counts and distribution

pub mod schema;
pub mod entities;
pub mod scores;
pub mod statistics;
pub mod import;
pub mod ad_hoc;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::MaturityError;

/// SQLite database holding the four assessment relations
pub struct AssessmentDb {
    conn: Mutex<Connection>,
}

impl AssessmentDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, MaturityError> {
        info!("Opening SQLite database at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| MaturityError::Internal(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| MaturityError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.define_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, MaturityError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| MaturityError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.define_schema()?;

        Ok(db)
    }

    /// Ensure the relations exist
    pub fn define_schema(&self) -> Result<(), MaturityError> {
        self.with_conn(schema::define_schema)
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MaturityError>
    where
        F: FnOnce(&Connection) -> Result<T, MaturityError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| MaturityError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, MaturityError>
    where
        F: FnOnce(&mut Connection) -> Result<T, MaturityError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| MaturityError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, MaturityError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, MaturityError> {
                let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                entity_count: count("entities")?,
                dimension_score_count: count("dimension_scores")?,
                detail_score_count: count("detail_scores")?,
                category_count: count("group_statistics")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DbStats {
    pub entity_count: u64,
    pub dimension_score_count: u64,
    pub detail_score_count: u64,
    pub category_count: u64,
}

// Re-exports
pub use ad_hoc::{AdHocQuery, AdHocResult, Relation};
pub use entities::{EntityOrder, EntityQuery, EntityRow, NewEntity, PersistAction};
pub use scores::{DetailInput, DetailScoreRow, DimensionScoreRow};
pub use statistics::GroupStatisticsRow;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_has_empty_relations() {
        let db = AssessmentDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(
            stats,
            DbStats { entity_count: 0, dimension_score_count: 0, detail_score_count: 0, category_count: 0 }
        );
    }

    #[test]
    fn test_open_file_creates_parent_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("maturity.db");
        {
            let db = AssessmentDb::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO entities (name, category, status, global_score, composite_score)
                     VALUES ('A', 'Saúde', 'Ativa', 1.0, 1.0)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }
        let db = AssessmentDb::open(&path).unwrap();
        assert_eq!(db.stats().unwrap().entity_count, 1);
    }
}
