//! Configuration for maturity-store
//!
//! The dimension catalog and composite definition live here rather than in
//! code so the same engine can score any `<group>.<criterion>` dataset.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::MaturityError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maturity-store")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the database and exports
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Database file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Metadata column names in the source dataset
    #[serde(default)]
    pub columns: ColumnNames,

    /// Lifecycle status labels (closed set)
    #[serde(default)]
    pub statuses: StatusLabels,

    /// Accepted criterion value range (inclusive)
    #[serde(default)]
    pub score_range: ScoreRange,

    /// Import behavior
    #[serde(default)]
    pub import: ImportConfig,

    /// Ordered dimension catalog
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<DimensionDef>,

    /// Composite score definition
    #[serde(default)]
    pub composite: CompositeDefinition,
}

/// Names of the metadata columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    #[serde(default = "default_name_column")]
    pub name: String,
    #[serde(default = "default_category_column")]
    pub category: String,
    #[serde(default = "default_status_column")]
    pub status: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: default_name_column(),
            category: default_category_column(),
            status: default_status_column(),
        }
    }
}

/// Labels used in the status column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabels {
    #[serde(default = "default_active_label")]
    pub active: String,
    #[serde(default = "default_inactive_label")]
    pub inactive: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            active: default_active_label(),
            inactive: default_inactive_label(),
        }
    }
}

impl StatusLabels {
    /// Whether `label` belongs to the closed status set
    pub fn contains(&self, label: &str) -> bool {
        label == self.active || label == self.inactive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_score_max")]
    pub max: f64,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 0.0, max: default_score_max() }
    }
}

impl ScoreRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// What to do when an imported entity name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Insert fails and the row is reported as skipped
    #[default]
    Fail,
    /// Upsert by name: scores and detail rows are overwritten
    Replace,
}

/// Transaction scope of an import batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Each entity is atomic; failing entities are skipped
    #[default]
    PerEntity,
    /// Any failure rolls back the whole batch
    AllOrNothing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub batch_mode: BatchMode,
}

/// One entry of the dimension catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDef {
    /// Numeric prefix of the criterion labels (`1` for `1.3`)
    pub index: u32,
    /// Display name stored in the dimension scores relation
    pub name: String,
    /// Optional dimensions may have no criteria in a dataset
    #[serde(default)]
    pub optional: bool,
}

impl DimensionDef {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self { index, name: name.into(), optional: false }
    }
}

/// Mean of a subset of dimensions, referenced by index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDefinition {
    #[serde(default = "default_composite_name")]
    pub name: String,
    #[serde(default = "default_composite_dimensions")]
    pub dimensions: Vec<u32>,
}

impl Default for CompositeDefinition {
    fn default() -> Self {
        Self {
            name: default_composite_name(),
            dimensions: default_composite_dimensions(),
        }
    }
}

fn default_database_file() -> String {
    "maturity.db".to_string()
}

fn default_name_column() -> String {
    "nome_startup".to_string()
}

fn default_category_column() -> String {
    "setor".to_string()
}

fn default_status_column() -> String {
    "status".to_string()
}

fn default_active_label() -> String {
    "Ativa".to_string()
}

fn default_inactive_label() -> String {
    "Inativa".to_string()
}

fn default_score_max() -> f64 {
    5.0
}

fn default_composite_name() -> String {
    "performance_viability".to_string()
}

fn default_composite_dimensions() -> Vec<u32> {
    vec![1, 2]
}

/// Reference catalog of the IoT maturity assessment
pub fn default_dimensions() -> Vec<DimensionDef> {
    vec![
        DimensionDef::new(1, "Grupo 1 - Performance Técnica"),
        DimensionDef::new(2, "Grupo 2 - Viabilidade Econômica"),
        DimensionDef::new(3, "Grupo 3 - Confiabilidade"),
        DimensionDef::new(4, "Grupo 4 - Usabilidade"),
        DimensionDef::new(5, "Grupo 5 - Eficiência Energética"),
        DimensionDef::new(6, "Grupo 6 - Robustez Física"),
        DimensionDef::new(7, "Grupo 7 - Conectividade"),
        DimensionDef::new(8, "Grupo 8 - Sustentabilidade"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            columns: ColumnNames::default(),
            statuses: StatusLabels::default(),
            score_range: ScoreRange::default(),
            import: ImportConfig::default(),
            dimensions: default_dimensions(),
            composite: CompositeDefinition::default(),
        }
    }
}

impl Config {
    /// Load config from file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MaturityError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| MaturityError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MaturityError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MaturityError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check catalog and composite consistency
    pub fn validate(&self) -> Result<(), MaturityError> {
        if self.dimensions.is_empty() {
            return Err(MaturityError::Config("dimension catalog is empty".into()));
        }

        let mut indices = HashSet::new();
        let mut names = HashSet::new();
        for dim in &self.dimensions {
            if !indices.insert(dim.index) {
                return Err(MaturityError::Config(format!(
                    "duplicate dimension index {}",
                    dim.index
                )));
            }
            if dim.name.trim().is_empty() || !names.insert(dim.name.as_str()) {
                return Err(MaturityError::Config(format!(
                    "dimension {} has an empty or duplicate name",
                    dim.index
                )));
            }
        }

        if self.composite.dimensions.is_empty() {
            return Err(MaturityError::Config(format!(
                "composite '{}' references no dimensions",
                self.composite.name
            )));
        }
        for index in &self.composite.dimensions {
            if !indices.contains(index) {
                return Err(MaturityError::Config(format!(
                    "composite '{}' references undeclared dimension {}",
                    self.composite.name, index
                )));
            }
        }

        if !(self.score_range.min < self.score_range.max) {
            return Err(MaturityError::Config(format!(
                "score range [{}, {}] is empty",
                self.score_range.min, self.score_range.max
            )));
        }

        if self.statuses.active == self.statuses.inactive {
            return Err(MaturityError::Config(
                "active and inactive status labels must differ".into(),
            ));
        }

        let cols = [&self.columns.name, &self.columns.category, &self.columns.status];
        if cols.iter().any(|c| c.trim().is_empty()) {
            return Err(MaturityError::Config("metadata column names must be non-empty".into()));
        }

        Ok(())
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get default export directory
    pub fn export_dir(&self) -> PathBuf {
        self.storage_dir.join("export")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// Look up a catalog entry by index
    pub fn dimension(&self, index: u32) -> Option<&DimensionDef> {
        self.dimensions.iter().find(|d| d.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.dimensions.len(), 8);
        assert_eq!(config.composite.dimensions, vec![1, 2]);
        assert_eq!(config.import.conflict_policy, ConflictPolicy::Fail);
    }

    #[test]
    fn test_parse_custom_catalog() {
        let toml_str = r#"
storage_dir = "/tmp/maturity"

[columns]
name = "product"

[statuses]
active = "Active"
inactive = "Inactive"

[import]
conflict_policy = "replace"
batch_mode = "all_or_nothing"

[[dimensions]]
index = 1
name = "Performance"

[[dimensions]]
index = 2
name = "Viability"
optional = true

[composite]
name = "perf_viab"
dimensions = [1, 2]
"#;
        let config: Config = toml::from_str(toml_str).expect("valid TOML");
        config.validate().unwrap();
        assert_eq!(config.columns.name, "product");
        assert_eq!(config.columns.category, "setor");
        assert_eq!(config.import.conflict_policy, ConflictPolicy::Replace);
        assert_eq!(config.import.batch_mode, BatchMode::AllOrNothing);
        assert!(config.dimension(2).unwrap().optional);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/maturity/maturity.db"));
    }

    #[test]
    fn test_composite_must_reference_catalog() {
        let mut config = Config::default();
        config.composite.dimensions = vec![1, 9];
        assert!(matches!(config.validate(), Err(MaturityError::Config(_))));
    }

    #[test]
    fn test_duplicate_dimension_index_rejected() {
        let mut config = Config::default();
        config.dimensions.push(DimensionDef::new(1, "Again"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.statuses.active = "Active".into();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.statuses.active, "Active");
        assert_eq!(loaded.dimensions, config.dimensions);
    }
}
