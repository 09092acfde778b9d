//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::MaturityError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Ensure the four relations exist. Safe to call on every open.
pub fn define_schema(conn: &Connection) -> Result<(), MaturityError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| MaturityError::Internal(format!("Failed to enable foreign keys: {}", e)))?;

    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(MaturityError::Schema(format!(
            "database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, MaturityError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| MaturityError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), MaturityError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), MaturityError> {
    conn.execute_batch(ENTITIES_SCHEMA)
        .map_err(|e| MaturityError::Internal(format!("Failed to create entity tables: {}", e)))?;

    conn.execute_batch(STATISTICS_SCHEMA)
        .map_err(|e| MaturityError::Internal(format!("Failed to create statistics table: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| MaturityError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Entities and their score relations
const ENTITIES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    global_score REAL NOT NULL,
    composite_score REAL NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per entity per dimension with criteria
CREATE TABLE IF NOT EXISTS dimension_scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    dimension_index INTEGER NOT NULL,
    dimension_name TEXT NOT NULL,
    score REAL NOT NULL,
    FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE,
    UNIQUE (entity_id, dimension_name),
    UNIQUE (entity_id, dimension_index)
);

-- One row per entity per source criterion column
CREATE TABLE IF NOT EXISTS detail_scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    criterion_label TEXT NOT NULL,
    dimension_index INTEGER NOT NULL,
    score REAL NOT NULL,
    FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE,
    FOREIGN KEY (entity_id, dimension_index)
        REFERENCES dimension_scores(entity_id, dimension_index),
    UNIQUE (entity_id, criterion_label)
);
"#;

/// Derived per-category statistics
const STATISTICS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS group_statistics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL UNIQUE,
    total INTEGER NOT NULL,
    active_count INTEGER NOT NULL,
    inactive_count INTEGER NOT NULL,
    mean REAL NOT NULL,
    median REAL NOT NULL,
    min REAL NOT NULL,
    max REAL NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entities_category ON entities(category);
CREATE INDEX IF NOT EXISTS idx_entities_status ON entities(status);
CREATE INDEX IF NOT EXISTS idx_entities_composite ON entities(composite_score DESC);
CREATE INDEX IF NOT EXISTS idx_dimension_scores_entity ON dimension_scores(entity_id);
CREATE INDEX IF NOT EXISTS idx_detail_scores_entity ON detail_scores(entity_id);
"#;
