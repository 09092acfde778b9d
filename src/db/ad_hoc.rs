//! Structured ad-hoc queries
//!
//! Callers describe a read (relation, projection, filters, grouping, ordering)
//! as data. The descriptor is validated against a fixed column catalog and
//! compiled to parameterized SQL; caller text never reaches SQLite except as
//! bound parameters.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::MaturityError;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("identifier pattern is valid"));

/// Queryable relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Entities,
    /// Dimension scores joined with their entity
    DimensionScores,
    /// Detail scores joined with their entity
    DetailScores,
    GroupStatistics,
}

impl Relation {
    fn from_clause(self) -> &'static str {
        match self {
            Self::Entities => "entities e",
            Self::DimensionScores => "dimension_scores d JOIN entities e ON e.id = d.entity_id",
            Self::DetailScores => "detail_scores s JOIN entities e ON e.id = s.entity_id",
            Self::GroupStatistics => "group_statistics g",
        }
    }

    /// Logical column name to SQL expression
    fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Entities => &[
                ("name", "e.name"),
                ("category", "e.category"),
                ("status", "e.status"),
                ("global_score", "e.global_score"),
                ("composite_score", "e.composite_score"),
                ("created_at", "e.created_at"),
                ("updated_at", "e.updated_at"),
            ],
            Self::DimensionScores => &[
                ("entity_name", "e.name"),
                ("category", "e.category"),
                ("status", "e.status"),
                ("dimension_index", "d.dimension_index"),
                ("dimension", "d.dimension_name"),
                ("score", "d.score"),
            ],
            Self::DetailScores => &[
                ("entity_name", "e.name"),
                ("category", "e.category"),
                ("status", "e.status"),
                ("criterion", "s.criterion_label"),
                ("dimension_index", "s.dimension_index"),
                ("score", "s.score"),
            ],
            Self::GroupStatistics => &[
                ("category", "g.category"),
                ("total", "g.total"),
                ("active_count", "g.active_count"),
                ("inactive_count", "g.inactive_count"),
                ("mean", "g.mean"),
                ("median", "g.median"),
                ("min", "g.min"),
                ("max", "g.max"),
                ("updated_at", "g.updated_at"),
            ],
        }
    }

    fn column(self, name: &str) -> Result<&'static str, MaturityError> {
        self.columns()
            .iter()
            .find(|(logical, _)| *logical == name)
            .map(|(_, expr)| *expr)
            .ok_or_else(|| {
                MaturityError::InvalidInput(format!("unknown column '{}' for {:?}", name, self))
            })
    }
}

/// Requested statement kind. Only `select` is ever executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryAction {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Alter,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::In => "IN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    fn sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub func: AggregateFn,
    /// `None` only for `count` (counts rows)
    #[serde(default)]
    pub column: Option<String>,
    pub alias: String,
}

/// Filter on an aggregate alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HavingFilter {
    pub alias: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Projected column or aggregate alias
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// Declarative read over the normalized schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdHocQuery {
    #[serde(default)]
    pub action: QueryAction,
    pub relation: Relation,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(default)]
    pub having: Vec<HavingFilter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl AdHocQuery {
    /// Plain select of a relation
    pub fn select(relation: Relation) -> Self {
        Self {
            action: QueryAction::Select,
            relation,
            columns: vec![],
            filters: vec![],
            group_by: vec![],
            aggregates: vec![],
            having: vec![],
            order_by: vec![],
            limit: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, MaturityError> {
        serde_json::from_str(json)
            .map_err(|e| MaturityError::InvalidInput(format!("invalid query descriptor: {}", e)))
    }
}

/// Tabular query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdHocResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Compiled statement with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub columns: Vec<String>,
}

fn to_sql_value(value: &Value, context: &str) -> Result<SqlValue, MaturityError> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(MaturityError::InvalidInput(format!("{}: unsupported number {}", context, n)))
            }
        }
        other => Err(MaturityError::InvalidInput(format!(
            "{}: expected a string, number or boolean, got {}",
            context, other
        ))),
    }
}

fn push_predicate(
    expr: &str,
    op: FilterOp,
    value: &Value,
    context: &str,
    params: &mut Vec<SqlValue>,
) -> Result<String, MaturityError> {
    match op {
        FilterOp::In => {
            let Value::Array(items) = value else {
                return Err(MaturityError::InvalidInput(format!("{}: 'in' expects an array", context)));
            };
            if items.is_empty() {
                return Err(MaturityError::InvalidInput(format!("{}: 'in' list is empty", context)));
            }
            for item in items {
                params.push(to_sql_value(item, context)?);
            }
            let placeholders: Vec<_> = items.iter().map(|_| "?").collect();
            Ok(format!("{} IN ({})", expr, placeholders.join(", ")))
        }
        _ => {
            params.push(to_sql_value(value, context)?);
            Ok(format!("{} {} ?", expr, op.sql()))
        }
    }
}

/// Validate and compile a descriptor. Non-select actions are rejected here.
pub fn compile(query: &AdHocQuery) -> Result<CompiledQuery, MaturityError> {
    if query.action != QueryAction::Select {
        return Err(MaturityError::ReadOnlyViolation(format!(
            "ad-hoc queries are read-only; '{:?}' is not allowed",
            query.action
        )));
    }

    let relation = query.relation;
    let grouped = !query.group_by.is_empty() || !query.aggregates.is_empty();

    let mut aliases = HashSet::new();
    for agg in &query.aggregates {
        if !IDENTIFIER.is_match(&agg.alias) {
            return Err(MaturityError::InvalidInput(format!("invalid alias '{}'", agg.alias)));
        }
        if relation.column(&agg.alias).is_ok() || !aliases.insert(agg.alias.as_str()) {
            return Err(MaturityError::InvalidInput(format!(
                "alias '{}' collides with another output column",
                agg.alias
            )));
        }
    }

    for col in &query.group_by {
        relation.column(col)?;
    }

    let projection: Vec<&str> = if query.columns.is_empty() {
        if grouped {
            query.group_by.iter().map(String::as_str).collect()
        } else {
            relation.columns().iter().map(|(logical, _)| *logical).collect()
        }
    } else {
        query.columns.iter().map(String::as_str).collect()
    };

    let mut select_parts = Vec::new();
    let mut output_columns = Vec::new();
    for col in &projection {
        let expr = relation.column(col)?;
        if grouped && !query.group_by.iter().any(|g| g == col) {
            return Err(MaturityError::InvalidInput(format!(
                "column '{}' must appear in group_by when aggregating",
                col
            )));
        }
        select_parts.push(format!("{} AS \"{}\"", expr, col));
        output_columns.push(col.to_string());
    }

    let mut aggregate_exprs = Vec::with_capacity(query.aggregates.len());
    for agg in &query.aggregates {
        let arg = match (&agg.column, agg.func) {
            (Some(col), _) => relation.column(col)?.to_string(),
            (None, AggregateFn::Count) => "*".to_string(),
            (None, func) => {
                return Err(MaturityError::InvalidInput(format!(
                    "aggregate {:?} requires a column",
                    func
                )))
            }
        };
        let expr = format!("{}({})", agg.func.sql(), arg);
        select_parts.push(format!("{} AS \"{}\"", expr, agg.alias));
        output_columns.push(agg.alias.clone());
        aggregate_exprs.push((agg.alias.as_str(), expr));
    }

    if select_parts.is_empty() {
        return Err(MaturityError::InvalidInput("query projects no columns".into()));
    }

    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", select_parts.join(", "), relation.from_clause());

    if !query.filters.is_empty() {
        let mut conditions = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            let expr = relation.column(&filter.column)?;
            let context = format!("filter on '{}'", filter.column);
            conditions.push(push_predicate(expr, filter.op, &filter.value, &context, &mut params)?);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    if !query.group_by.is_empty() {
        let exprs = query
            .group_by
            .iter()
            .map(|col| relation.column(col))
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" GROUP BY ");
        sql.push_str(&exprs.join(", "));
    }

    if !query.having.is_empty() {
        let mut conditions = Vec::with_capacity(query.having.len());
        for having in &query.having {
            let (alias, expr) = aggregate_exprs
                .iter()
                .find(|(alias, _)| *alias == having.alias)
                .ok_or_else(|| {
                    MaturityError::InvalidInput(format!("having references unknown alias '{}'", having.alias))
                })?;
            let context = format!("having on '{}'", alias);
            conditions.push(push_predicate(expr, having.op, &having.value, &context, &mut params)?);
        }
        sql.push_str(" HAVING ");
        sql.push_str(&conditions.join(" AND "));
    }

    if !query.order_by.is_empty() {
        let mut terms = Vec::with_capacity(query.order_by.len());
        for order in &query.order_by {
            if !output_columns.iter().any(|c| *c == order.column) {
                return Err(MaturityError::InvalidInput(format!(
                    "order_by column '{}' is not in the output",
                    order.column
                )));
            }
            let direction = if order.descending { "DESC" } else { "ASC" };
            terms.push(format!("\"{}\" {}", order.column, direction));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::from(limit)));
    }

    Ok(CompiledQuery {
        sql,
        params,
        columns: output_columns,
    })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

/// Compile and run a descriptor against the store
pub fn run_ad_hoc(conn: &Connection, query: &AdHocQuery) -> Result<AdHocResult, MaturityError> {
    let compiled = compile(query)?;
    debug!(sql = %compiled.sql, params = compiled.params.len(), "Executing ad-hoc query");

    let mut stmt = conn.prepare(&compiled.sql)?;
    if !stmt.readonly() {
        return Err(MaturityError::ReadOnlyViolation(
            "compiled statement would modify the store".into(),
        ));
    }

    let width = compiled.columns.len();
    let mut rows = stmt.query(rusqlite::params_from_iter(compiled.params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(to_json(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(AdHocResult {
        columns: compiled.columns,
        rows: out,
    })
}
