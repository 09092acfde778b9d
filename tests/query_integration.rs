//! Integration tests for the query façade, ad-hoc queries and export

use std::sync::Arc;

use maturity_store::config::DimensionDef;
use maturity_store::db::AdHocQuery;
use maturity_store::{export, AssessmentDb, Config, Dataset, MaturityError, Services};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Store seeded with three active entities whose composite scores are
/// [4.8, 4.8, 4.2] for names [B, A, C], plus one inactive entity
fn seeded() -> (Services, Config, TempDir) {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage_dir = temp.path().to_path_buf();
    config.dimensions = vec![DimensionDef::new(1, "Performance"), DimensionDef::new(2, "Viability")];

    let db = Arc::new(AssessmentDb::open(&config.database_path()).unwrap());
    let services = Services::new(db, Arc::new(config.clone()));

    let dataset = Dataset::from_json_str(
        &json!([
            {"nome_startup": "B", "setor": "Saúde", "status": "Ativa", "1.1": 4.8, "2.1": 4.8},
            {"nome_startup": "A", "setor": "Saúde", "status": "Ativa", "1.1": 4.8, "2.1": 4.8},
            {"nome_startup": "C", "setor": "Energia", "status": "Ativa", "1.1": 4.2, "2.1": 4.2},
            {"nome_startup": "D", "setor": "Energia", "status": "Inativa", "1.1": 1.0, "2.1": 2.0}
        ])
        .to_string(),
    )
    .unwrap();
    services.import.import_batch(&dataset).unwrap();

    (services, config, temp)
}

fn names(rows: Vec<maturity_store::db::EntityRow>) -> Vec<String> {
    rows.into_iter().map(|r| r.name).collect()
}

#[test]
fn test_ranking_tie_breaks_by_name() {
    let (services, _, _temp) = seeded();
    assert_eq!(names(services.query.list_by_status("Ativa").unwrap()), vec!["A", "B", "C"]);
    assert_eq!(names(services.query.top_k(2, Some("Ativa")).unwrap()), vec!["A", "B"]);
    assert_eq!(services.query.best_overall().unwrap().unwrap().entity.name, "A");
}

#[test]
fn test_status_and_category_lookups() {
    let (services, _, _temp) = seeded();

    assert_eq!(names(services.query.list_by_status("Inativa").unwrap()), vec!["D"]);
    assert!(matches!(services.query.list_by_status("Fechada"), Err(MaturityError::NotFound(_))));
    assert_eq!(names(services.query.list_by_category("Energia").unwrap()), vec!["C", "D"]);
    assert!(matches!(services.query.list_by_category("Agro"), Err(MaturityError::NotFound(_))));

    let best_inactive = services.query.best_with_status("Inativa").unwrap().unwrap();
    assert_eq!(best_inactive.entity.name, "D");
}

#[test]
fn test_empty_status_listing_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage_dir = temp.path().to_path_buf();
    let db = Arc::new(AssessmentDb::open(&config.database_path()).unwrap());
    let services = Services::new(db, Arc::new(config));

    assert!(services.query.list_by_status("Ativa").unwrap().is_empty());
    assert!(services.query.best_overall().unwrap().is_none());
    assert!(services.query.group_statistics(None).unwrap().is_empty());
}

#[test]
fn test_group_statistics_lookup() {
    let (services, _, _temp) = seeded();

    let all = services.query.group_statistics(None).unwrap();
    let categories: Vec<_> = all.iter().map(|s| s.category.as_str()).collect();
    assert_eq!(categories, vec!["Saúde", "Energia"]);

    assert!(matches!(
        services.query.group_statistics(Some("missing")),
        Err(MaturityError::NotFound(_))
    ));
}

#[test]
fn test_ad_hoc_group_by_with_having() {
    let (services, _, _temp) = seeded();
    let query = AdHocQuery::from_json_str(
        r#"{
            "relation": "entities",
            "group_by": ["category"],
            "aggregates": [
                {"func": "count", "alias": "n"},
                {"func": "avg", "column": "composite_score", "alias": "avg_composite"}
            ],
            "having": [{"alias": "n", "op": "ge", "value": 2}],
            "order_by": [{"column": "category"}]
        }"#,
    )
    .unwrap();

    let result = services.query.run_ad_hoc(&query).unwrap();
    assert_eq!(result.columns, vec!["category", "n", "avg_composite"]);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0][0], Value::from("Energia"));
    assert_eq!(result.rows[0][1], Value::from(2));
}

#[test]
fn test_ad_hoc_rejects_writes_and_unknown_columns() {
    let (services, _, _temp) = seeded();
    let before = services.db.stats().unwrap();

    let delete = AdHocQuery::from_json_str(r#"{"action": "delete", "relation": "entities"}"#).unwrap();
    assert!(matches!(services.query.run_ad_hoc(&delete), Err(MaturityError::ReadOnlyViolation(_))));

    let unknown =
        AdHocQuery::from_json_str(r#"{"relation": "entities", "columns": ["password"]}"#).unwrap();
    assert!(matches!(services.query.run_ad_hoc(&unknown), Err(MaturityError::InvalidInput(_))));

    assert_eq!(before, services.db.stats().unwrap());
}

#[test]
fn test_export_reports() {
    let (services, config, temp) = seeded();
    let dir = temp.path().join("reports");

    let summary = export::export_all(&services.db, &config, &dir).unwrap();
    assert_eq!(summary.files.len(), 7);

    let read = |name: &str| -> Value {
        serde_json::from_str(&std::fs::read_to_string(dir.join(name)).unwrap()).unwrap()
    };

    let ranking = read("ranking.json");
    let ranked: Vec<_> = ranking.as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
    assert_eq!(ranked, vec![json!("A"), json!("B"), json!("C")]);
    assert_eq!(ranking[1]["position"], 1);
    assert_eq!(ranking[2]["position"], 3);
    assert_eq!(ranking[2]["categoryPosition"], 1);

    let wide = read("entities_wide.json");
    assert_eq!(wide.as_array().unwrap().len(), 4);
    assert_eq!(wide[0]["dimensions"]["Performance"], 4.8);

    let summary = read("category_status_summary.json");
    assert_eq!(summary.as_array().unwrap().len(), 3);
    assert_eq!(read("detail_scores.json").as_array().unwrap().len(), 8);
}
