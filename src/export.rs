//! JSON report export
//!
//! Writes one file per relation plus the derived report views into a
//! directory. Files are replaced on every export.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::{entities, scores, statistics, AssessmentDb, EntityQuery};
use crate::error::MaturityError;
use crate::views;

/// Files written by an export
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Export every relation and report view into `dir`
pub fn export_all(db: &AssessmentDb, config: &Config, dir: &Path) -> Result<ExportSummary, MaturityError> {
    fs::create_dir_all(dir)?;

    let (all, active, dimension_scores, detail_scores, group_statistics) = db.with_conn(|conn| {
        let all = entities::list_entities(conn, &EntityQuery::default())?;
        let active = entities::list_entities(
            conn,
            &EntityQuery {
                status: Some(config.statuses.active.clone()),
                ..Default::default()
            },
        )?;
        Ok((
            all,
            active,
            scores::list_dimension_scores(conn)?,
            scores::list_detail_scores(conn)?,
            statistics::list_group_statistics(conn)?,
        ))
    })?;

    let mut summary = ExportSummary {
        dir: dir.to_path_buf(),
        files: Vec::new(),
    };

    summary.files.push(write_json(dir, "entities.json", &all)?);
    summary.files.push(write_json(dir, "dimension_scores.json", &dimension_scores)?);
    summary.files.push(write_json(dir, "detail_scores.json", &detail_scores)?);
    summary.files.push(write_json(dir, "group_statistics.json", &group_statistics)?);
    summary.files.push(write_json(
        dir,
        "entities_wide.json",
        &views::wide_entities(&all, &dimension_scores, &config.dimensions),
    )?);
    summary.files.push(write_json(
        dir,
        "category_status_summary.json",
        &views::category_status_summary(&all),
    )?);
    summary.files.push(write_json(dir, "ranking.json", &views::ranking(&active))?);

    info!(dir = ?dir, files = summary.files.len(), "Export complete");
    Ok(summary)
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf, MaturityError> {
    let path = dir.join(file_name);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    debug!(path = ?path, "Wrote export file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_empty_store_writes_every_file() {
        let db = AssessmentDb::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let summary = export_all(&db, &Config::default(), dir.path()).unwrap();
        assert_eq!(summary.files.len(), 7);

        let ranking: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("ranking.json")).unwrap()).unwrap();
        assert_eq!(ranking, serde_json::json!([]));
    }
}
