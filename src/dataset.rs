//! JSON dataset loading
//!
//! A dataset is a JSON array of objects, one per assessed entity. Keys are the
//! column labels of the source spreadsheet; key order is preserved.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use crate::config::{ColumnNames, ScoreRange, StatusLabels};
use crate::error::MaturityError;
use crate::resolver::BoundSchema;

/// One source row
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Zero-based position in the source
    pub index: usize,
    pub cells: Map<String, Value>,
}

/// Parsed dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub rows: Vec<SourceRow>,
}

/// Descriptive fields of an entity row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub name: String,
    pub category: String,
    pub status: String,
}

impl Dataset {
    /// Load a dataset file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MaturityError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let dataset = Self::from_json_str(&content)?;
        info!(path = %path.display(), rows = dataset.rows.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Parse a JSON array of row objects
    pub fn from_json_str(json: &str) -> Result<Self, MaturityError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(items) = value else {
            return Err(MaturityError::Schema("dataset must be a JSON array of objects".into()));
        };

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(cells) => rows.push(SourceRow { index, cells }),
                other => {
                    return Err(MaturityError::Schema(format!(
                        "row {} is not an object: {}",
                        index, other
                    )))
                }
            }
        }

        Ok(Self { rows })
    }

    /// Build from already-parsed row objects
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(index, cells)| SourceRow { index, cells })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Union of the column labels of every row, in order of first appearance
    pub fn labels(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .flat_map(SourceRow::labels)
            .filter(|label| seen.insert(*label))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SourceRow {
    /// Column labels in source order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Best-effort entity name for error reporting
    pub fn name_hint(&self, columns: &ColumnNames) -> Option<String> {
        match self.cells.get(&columns.name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    fn text(&self, column: &str) -> Result<String, MaturityError> {
        match self.cells.get(column) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::String(_)) | Some(Value::Null) | None => Err(MaturityError::InvalidValue {
                column: column.to_string(),
                reason: "value is empty".to_string(),
            }),
            Some(other) => Err(MaturityError::InvalidValue {
                column: column.to_string(),
                reason: format!("expected text, got {}", other),
            }),
        }
    }

    /// Extract name, category and status; the status must be a configured label
    pub fn metadata(
        &self,
        columns: &ColumnNames,
        statuses: &StatusLabels,
    ) -> Result<EntityMetadata, MaturityError> {
        let name = self.text(&columns.name)?;
        let category = self.text(&columns.category)?;
        let status = self.text(&columns.status)?;

        if !statuses.contains(&status) {
            return Err(MaturityError::InvalidValue {
                column: columns.status.clone(),
                reason: format!(
                    "'{}' is not one of '{}', '{}'",
                    status, statuses.active, statuses.inactive
                ),
            });
        }

        Ok(EntityMetadata { name, category, status })
    }

    /// Numeric values of every bound criterion, each within `range`
    pub fn criterion_values(
        &self,
        schema: &BoundSchema,
        range: ScoreRange,
    ) -> Result<BTreeMap<String, f64>, MaturityError> {
        let mut values = BTreeMap::new();

        for label in schema.criteria() {
            let value = match self.cells.get(label) {
                Some(Value::Number(n)) => n.as_f64().ok_or_else(|| MaturityError::InvalidValue {
                    column: label.to_string(),
                    reason: format!("{} is not representable as f64", n),
                })?,
                Some(Value::Null) | None => {
                    return Err(MaturityError::InvalidValue {
                        column: label.to_string(),
                        reason: "value is missing".to_string(),
                    })
                }
                Some(other) => {
                    return Err(MaturityError::InvalidValue {
                        column: label.to_string(),
                        reason: format!("expected a number, got {}", other),
                    })
                }
            };

            if !value.is_finite() || !range.contains(value) {
                return Err(MaturityError::InvalidValue {
                    column: label.to_string(),
                    reason: format!("{} is outside [{}, {}]", value, range.min, range.max),
                });
            }

            values.insert(label.to_string(), value);
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DimensionDef;
    use crate::resolver::{bind, resolve};

    fn schema() -> BoundSchema {
        bind(&resolve(["1.1", "1.2"]), &[DimensionDef::new(1, "Performance")]).unwrap()
    }

    #[test]
    fn test_parse_preserves_key_order() {
        let ds = Dataset::from_json_str(
            r#"[{"nome_startup":"A","2.1":1,"1.1":2,"setor":"Saúde","status":"Ativa"}]"#,
        )
        .unwrap();
        let labels: Vec<_> = ds.rows[0].labels().collect();
        assert_eq!(labels, vec!["nome_startup", "2.1", "1.1", "setor", "status"]);
    }

    #[test]
    fn test_non_array_rejected() {
        assert!(matches!(
            Dataset::from_json_str(r#"{"a":1}"#),
            Err(MaturityError::Schema(_))
        ));
        assert!(matches!(
            Dataset::from_json_str(r#"[1, 2]"#),
            Err(MaturityError::Schema(_))
        ));
    }

    #[test]
    fn test_metadata_validates_status() {
        let ds = Dataset::from_json_str(
            r#"[{"nome_startup":" Acme ","setor":"Saúde","status":"Zumbi"}]"#,
        )
        .unwrap();
        let row = &ds.rows[0];
        let err = row.metadata(&ColumnNames::default(), &StatusLabels::default()).unwrap_err();
        assert!(matches!(err, MaturityError::InvalidValue { ref column, .. } if column == "status"));
        assert_eq!(row.name_hint(&ColumnNames::default()).as_deref(), Some("Acme"));
    }

    #[test]
    fn test_criterion_values_rejects_text_missing_and_out_of_range() {
        let cases = [
            r#"[{"1.1": 2, "1.2": "4"}]"#,
            r#"[{"1.1": 2}]"#,
            r#"[{"1.1": 2, "1.2": null}]"#,
            r#"[{"1.1": 2, "1.2": 5.5}]"#,
            r#"[{"1.1": -0.1, "1.2": 1}]"#,
        ];
        for case in cases {
            let ds = Dataset::from_json_str(case).unwrap();
            let err = ds.rows[0].criterion_values(&schema(), ScoreRange::default()).unwrap_err();
            assert!(matches!(err, MaturityError::InvalidValue { .. }), "case {}", case);
        }
    }

    #[test]
    fn test_criterion_values_ok() {
        let ds = Dataset::from_json_str(r#"[{"1.1": 0, "1.2": 5, "note": "x"}]"#).unwrap();
        let values = ds.rows[0].criterion_values(&schema(), ScoreRange::default()).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["1.2"], 5.0);
    }

    #[test]
    fn test_dataset_labels_are_the_union_of_rows() {
        let ds = Dataset::from_json_str(r#"[{"a": 1, "1.1": 2}, {"1.2": 3, "a": 4}, {}]"#).unwrap();
        assert_eq!(ds.labels(), vec!["a", "1.1", "1.2"]);
    }
}
