//! Import service - resolves, aggregates and persists dataset rows
//!
//! The dataset's columns are resolved and bound to the dimension catalog once.
//! Per row: extract typed values against that layout, aggregate, then write the
//! entity with its score rows. Group statistics are rebuilt in the same
//! transaction as the writes.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::config::{BatchMode, Config};
use crate::dataset::{Dataset, SourceRow};
use crate::db::import::{persist_batch, PersistOptions, PersistedEntity, PreparedRow, RowFailure};
use crate::db::{statistics, AssessmentDb, DetailInput, NewEntity};
use crate::error::{ErrorKind, MaturityError};
use crate::resolver::{bind, resolve_required, BoundSchema};

use super::events::{EventBus, StoreEvent};

/// Row left out of an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntity {
    pub row_index: usize,
    pub name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<RowFailure> for SkippedEntity {
    fn from(failure: RowFailure) -> Self {
        Self {
            row_index: failure.row_index,
            name: failure.name,
            kind: failure.error.kind(),
            message: failure.error.to_string(),
        }
    }
}

/// Reconciliation of one import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub rows_in_source: usize,
    pub persisted: Vec<PersistedEntity>,
    pub skipped: Vec<SkippedEntity>,
    pub categories: usize,
}

impl ImportReport {
    pub fn entities_persisted(&self) -> usize {
        self.persisted.len()
    }

    pub fn entities_skipped(&self) -> usize {
        self.skipped.len()
    }

    /// `rows_in_source == persisted + skipped`
    pub fn is_reconciled(&self) -> bool {
        self.rows_in_source == self.entities_persisted() + self.entities_skipped()
    }
}

/// Import service
pub struct ImportService {
    db: Arc<AssessmentDb>,
    config: Arc<Config>,
    events: Arc<EventBus>,
}

impl ImportService {
    pub fn new(db: Arc<AssessmentDb>, config: Arc<Config>, events: Arc<EventBus>) -> Self {
        Self { db, config, events }
    }

    /// Resolve, aggregate and persist every row of `dataset`
    pub fn import_batch(&self, dataset: &Dataset) -> Result<ImportReport, MaturityError> {
        let batch_id = Uuid::new_v4().to_string();
        self.events.emit(StoreEvent::ImportStarted {
            batch_id: batch_id.clone(),
            rows: dataset.len(),
        });

        let layout = self.dataset_schema(dataset);
        if let Err(err) = &layout {
            if !dataset.is_empty() {
                warn!(batch_id = %batch_id, error = %err, "Dataset columns do not fit the dimension catalog");
            }
        }

        let mut prepared = Vec::with_capacity(dataset.len());
        let mut failures = Vec::new();
        for row in &dataset.rows {
            let entity = match &layout {
                Ok(schema) => self.prepare_row(row, schema),
                Err(err) => Err(MaturityError::Schema(schema_message(err))),
            };
            match entity {
                Ok(entity) => prepared.push(PreparedRow { row_index: row.index, entity }),
                Err(error) => failures.push(RowFailure {
                    row_index: row.index,
                    name: row.name_hint(&self.config.columns),
                    error,
                }),
            }
        }

        if self.config.import.batch_mode == BatchMode::AllOrNothing && !failures.is_empty() {
            self.events.emit(StoreEvent::ImportRejected {
                batch_id,
                violations: failures.len(),
            });
            return Err(MaturityError::ImportRejected(
                failures.iter().map(RowFailure::describe).collect(),
            ));
        }

        let options = PersistOptions {
            conflict_policy: self.config.import.conflict_policy,
            batch_mode: self.config.import.batch_mode,
            statuses: self.config.statuses.clone(),
            now: now(),
        };

        let outcome = self
            .db
            .with_conn_mut(|conn| persist_batch(conn, prepared, &options))
            .map_err(|err| {
                if let MaturityError::ImportRejected(violations) = &err {
                    self.events.emit(StoreEvent::ImportRejected {
                        batch_id: batch_id.clone(),
                        violations: violations.len(),
                    });
                }
                err
            })?;

        failures.extend(outcome.failures);
        failures.sort_by_key(|f| f.row_index);
        let skipped: Vec<SkippedEntity> = failures.into_iter().map(SkippedEntity::from).collect();

        for entity in &outcome.persisted {
            self.events.emit(StoreEvent::EntityImported {
                batch_id: batch_id.clone(),
                name: entity.name.clone(),
                action: entity.action,
            });
        }
        for skip in &skipped {
            self.events.emit(StoreEvent::EntitySkipped {
                batch_id: batch_id.clone(),
                row_index: skip.row_index,
                name: skip.name.clone(),
                kind: skip.kind,
                message: skip.message.clone(),
            });
        }
        self.events.emit(StoreEvent::StatisticsRecomputed {
            categories: outcome.categories,
        });
        self.events.emit(StoreEvent::ImportCompleted {
            batch_id: batch_id.clone(),
            persisted: outcome.persisted.len(),
            skipped: skipped.len(),
        });

        let report = ImportReport {
            batch_id,
            rows_in_source: dataset.len(),
            persisted: outcome.persisted,
            skipped,
            categories: outcome.categories,
        };

        info!(
            batch_id = %report.batch_id,
            rows = report.rows_in_source,
            persisted = report.entities_persisted(),
            skipped = report.entities_skipped(),
            "Import finished"
        );

        Ok(report)
    }

    /// Rebuild group statistics from the stored entities
    pub fn recompute_group_statistics(&self) -> Result<usize, MaturityError> {
        let statuses = self.config.statuses.clone();
        let categories = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let written = statistics::recompute_group_statistics(&tx, &statuses, &now())?;
            tx.commit()?;
            Ok(written)
        })?;
        self.events.emit(StoreEvent::StatisticsRecomputed { categories });
        Ok(categories)
    }

    /// Resolve and bind the column layout shared by every row of `dataset`.
    ///
    /// The layout is the union of all row keys, so a row lacking a criterion
    /// the others carry fails on that value instead of being scored on fewer
    /// criteria.
    pub fn dataset_schema(&self, dataset: &Dataset) -> Result<BoundSchema, MaturityError> {
        let resolved = resolve_required(dataset.labels(), &self.config.columns)?;
        bind(&resolved, &self.config.dimensions)
    }

    /// Aggregate one source row against the dataset layout
    pub fn prepare_row(&self, row: &SourceRow, schema: &BoundSchema) -> Result<NewEntity, MaturityError> {
        let config = &self.config;
        let metadata = row.metadata(&config.columns, &config.statuses)?;
        let values = row.criterion_values(schema, config.score_range)?;
        let scores = aggregate(&values, schema, &config.composite)?;

        let mut details = Vec::with_capacity(values.len());
        for dim in &schema.dimensions {
            for label in &dim.criteria {
                let score = values.get(label).copied().ok_or_else(|| {
                    MaturityError::Internal(format!("criterion '{}' lost during extraction", label))
                })?;
                details.push(DetailInput {
                    criterion_label: label.clone(),
                    dimension_index: dim.index,
                    score,
                });
            }
        }

        Ok(NewEntity {
            name: metadata.name,
            category: metadata.category,
            status: metadata.status,
            scores,
            details,
        })
    }
}

fn schema_message(err: &MaturityError) -> String {
    match err {
        MaturityError::Schema(message) => message.clone(),
        other => other.to_string(),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
