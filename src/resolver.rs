//! Criterion schema resolution
//!
//! Splits a flat list of column labels into scored criteria and descriptive
//! metadata. A criterion label is `<group>.<token>` where `<group>` is a
//! decimal dimension index (`1.1`, `3.4`, `8.a`). Everything else is metadata.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::{ColumnNames, DimensionDef};
use crate::error::MaturityError;

static CRITERION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\.([^.\s]+)$").expect("criterion label pattern is valid")
});

/// Parse the dimension index of a criterion label, `None` for metadata labels
pub fn criterion_group(label: &str) -> Option<u32> {
    let caps = CRITERION_LABEL.captures(label)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Column classification of one dataset shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedSchema {
    /// Criterion labels in input order
    pub criteria: Vec<String>,
    /// Group index to its criterion labels, input order preserved
    pub groups: BTreeMap<u32, Vec<String>>,
    /// Non-criterion labels in input order
    pub metadata: Vec<String>,
}

impl ResolvedSchema {
    pub fn has_metadata(&self, label: &str) -> bool {
        self.metadata.iter().any(|m| m == label)
    }
}

/// Classify column labels. Never fails: malformed labels become metadata.
pub fn resolve<I, S>(labels: I) -> ResolvedSchema
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut schema = ResolvedSchema::default();

    for label in labels {
        let label = label.as_ref();
        match criterion_group(label) {
            Some(group) => {
                schema.criteria.push(label.to_string());
                schema.groups.entry(group).or_default().push(label.to_string());
            }
            None => schema.metadata.push(label.to_string()),
        }
    }

    debug!(
        criteria = schema.criteria.len(),
        groups = schema.groups.len(),
        metadata = schema.metadata.len(),
        "Resolved column schema"
    );

    schema
}

/// Resolve and require the identity, category and status columns
pub fn resolve_required<I, S>(labels: I, columns: &ColumnNames) -> Result<ResolvedSchema, MaturityError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let schema = resolve(labels);

    for (role, column) in [
        ("entity name", &columns.name),
        ("category", &columns.category),
        ("status", &columns.status),
    ] {
        if !schema.has_metadata(column) {
            return Err(MaturityError::Schema(format!(
                "missing required {} column '{}'",
                role, column
            )));
        }
    }

    Ok(schema)
}

/// A configured dimension together with the criteria found for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundDimension {
    pub index: u32,
    pub name: String,
    pub criteria: Vec<String>,
}

/// Criteria grouped onto the dimension catalog, in catalog order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundSchema {
    pub dimensions: Vec<BoundDimension>,
}

impl BoundSchema {
    pub fn dimension(&self, index: u32) -> Option<&BoundDimension> {
        self.dimensions.iter().find(|d| d.index == index)
    }

    /// Every bound criterion label
    pub fn criteria(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .flat_map(|d| d.criteria.iter().map(String::as_str))
    }
}

/// Bind resolved groups to the dimension catalog.
///
/// Every criterion group must be declared. Non-optional dimensions must have at
/// least one criterion; optional ones without criteria are left out.
pub fn bind(schema: &ResolvedSchema, catalog: &[DimensionDef]) -> Result<BoundSchema, MaturityError> {
    if let Some(undeclared) = schema
        .groups
        .keys()
        .find(|group| !catalog.iter().any(|d| d.index == **group))
    {
        return Err(MaturityError::Schema(format!(
            "criteria with prefix '{}.' do not belong to any configured dimension",
            undeclared
        )));
    }

    let mut dimensions = Vec::with_capacity(catalog.len());
    for def in catalog {
        match schema.groups.get(&def.index) {
            Some(criteria) => dimensions.push(BoundDimension {
                index: def.index,
                name: def.name.clone(),
                criteria: criteria.clone(),
            }),
            None if def.optional => {
                debug!(dimension = %def.name, "Optional dimension has no criteria");
            }
            None => {
                return Err(MaturityError::Schema(format!(
                    "dimension {} ('{}') has no criterion columns",
                    def.index, def.name
                )));
            }
        }
    }

    Ok(BoundSchema { dimensions })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<DimensionDef> {
        vec![DimensionDef::new(1, "Performance"), DimensionDef::new(2, "Viability")]
    }

    #[test]
    fn test_classifies_criteria_and_metadata() {
        let schema = resolve(["nome_startup", "1.1", "setor", "2.1", "1.2", "status", "2.2"]);
        assert_eq!(schema.criteria, vec!["1.1", "2.1", "1.2", "2.2"]);
        assert_eq!(schema.groups[&1], vec!["1.1", "1.2"]);
        assert_eq!(schema.groups[&2], vec!["2.1", "2.2"]);
        assert_eq!(schema.metadata, vec!["nome_startup", "setor", "status"]);
    }

    #[test]
    fn test_malformed_labels_are_metadata() {
        let schema = resolve(["abc", ".1", "1.", "x.1", "1.2.3", "1 .2", "12", "10.3"]);
        assert_eq!(schema.criteria, vec!["10.3"]);
        assert_eq!(schema.metadata.len(), 7);
        assert_eq!(schema.groups.keys().copied().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_multi_digit_group_and_token() {
        assert_eq!(criterion_group("12.a"), Some(12));
        assert_eq!(criterion_group("3.10"), Some(3));
        assert_eq!(criterion_group("abc"), None);
    }

    #[test]
    fn test_required_columns() {
        let columns = ColumnNames::default();
        let err = resolve_required(["setor", "status", "1.1"], &columns).unwrap_err();
        assert!(matches!(err, MaturityError::Schema(ref m) if m.contains("entity name")));

        let err = resolve_required(["nome_startup", "setor", "1.1"], &columns).unwrap_err();
        assert!(matches!(err, MaturityError::Schema(ref m) if m.contains("status")));

        let ok = resolve_required(["nome_startup", "setor", "status", "1.1"], &columns).unwrap();
        assert_eq!(ok.criteria, vec!["1.1"]);
    }

    #[test]
    fn test_bind_in_catalog_order() {
        let schema = resolve(["2.1", "1.1", "2.2"]);
        let bound = bind(&schema, &catalog()).unwrap();
        let names: Vec<_> = bound.dimensions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Performance", "Viability"]);
        assert_eq!(bound.dimension(2).unwrap().criteria, vec!["2.1", "2.2"]);
        assert_eq!(bound.criteria().count(), 3);
    }

    #[test]
    fn test_bind_rejects_missing_required_dimension() {
        let schema = resolve(["1.1"]);
        let err = bind(&schema, &catalog()).unwrap_err();
        assert!(matches!(err, MaturityError::Schema(ref m) if m.contains("Viability")));
    }

    #[test]
    fn test_bind_skips_missing_optional_dimension() {
        let mut catalog = catalog();
        catalog[1].optional = true;
        let bound = bind(&resolve(["1.1"]), &catalog).unwrap();
        assert_eq!(bound.dimensions.len(), 1);
        assert!(bound.dimension(2).is_none());
    }

    #[test]
    fn test_bind_rejects_undeclared_group() {
        let err = bind(&resolve(["1.1", "2.1", "9.1"]), &catalog()).unwrap_err();
        assert!(matches!(err, MaturityError::Schema(ref m) if m.contains("'9.'")));
    }
}
