use tracing::debug;

use super::aggregation::agg_function;
use super::alias::AliasMaker;
use super::executor::TableSchema;
use super::having::lower_having;
use super::plan::{AggCall, Expr, GroupKey, GroupKeyKind, RelationalPlan, SortKey, Stage};
use super::post_agg::find_unsupported;
use super::predicate::{lower_filter, FilterPredicate};
use super::render::{render_plan, union_all, validate_statement};
use super::time::{self, TimeError};
use crate::config::ConverterConfig;
use crate::model::{AggregationQuery, Interval, QueryKind, SortDirection};

/// The translated form of one query: a plan per interval slice and the
/// combined SQL text
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub plans: Vec<RelationalPlan>,
}

impl Statement {
    /// True when no slice intersects the requested intervals
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Translate a query into one relational plan per interval slice.
/// Any failure aborts the whole translation.
pub fn plan_query(
    query: &AggregationQuery,
    table: &TableSchema,
    config: &ConverterConfig,
) -> Result<Statement, PlanError> {
    let aliases = AliasMaker::new(config.alias_prefix.clone());

    if query.intervals.is_empty() {
        return Err(PlanError::NoIntervals);
    }
    for post_agg in &query.post_aggregations {
        if let Some(kind) = find_unsupported(post_agg) {
            return Err(PlanError::UnsupportedPostAggregation(kind));
        }
    }

    let buckets = time::bucket_expressions(&query.granularity, &table.timestamp_column)?;
    let filter = query.filter.as_ref().map(lower_filter).transpose()?;
    let projection = build_projection(query, table, filter.as_ref())?;

    let calls = query
        .aggregations
        .iter()
        .map(|agg| {
            Ok(AggCall {
                function: agg_function(agg)?,
                column: agg.field_name.clone(),
                name: aliases.apply(&agg.name),
            })
        })
        .collect::<Result<Vec<_>, PlanError>>()?;

    // Time buckets always precede dimensions
    let group_keys: Vec<GroupKey> = buckets
        .into_iter()
        .map(|(unit, expr)| GroupKey {
            expr,
            name: aliases.apply(unit.column_name()),
            kind: GroupKeyKind::Bucket(unit),
        })
        .chain(query.dimensions.iter().map(|dimension| GroupKey {
            expr: Expr::column(dimension),
            name: dimension.clone(),
            kind: GroupKeyKind::Dimension,
        }))
        .collect();

    let having = lower_having(query.having(), query, &aliases)?;
    let sort_keys = build_sort_keys(query, &group_keys, &aliases)?;
    let limit = match &query.kind {
        QueryKind::TopN { threshold, .. } => Some(*threshold),
        QueryKind::GroupBy { limit_spec, .. } => limit_spec.as_ref().and_then(|spec| spec.limit),
        QueryKind::TimeSeries => None,
    };

    let slices = match query.kind {
        QueryKind::TopN { .. } => time::slice_intervals(&query.granularity, &query.intervals)?,
        _ => vec![query.intervals.clone()],
    };

    let template = SliceTemplate {
        table,
        projection,
        filter: filter.map(|f| f.predicate),
        group_keys,
        calls,
        having,
        sort_keys,
        limit,
    };
    let plans: Vec<RelationalPlan> = slices
        .iter()
        .map(|intervals| template.instantiate(intervals))
        .collect();

    let statements = plans
        .iter()
        .map(render_plan)
        .collect::<Result<Vec<_>, _>>()?;
    let sql = union_all(&statements);
    if config.validate_sql && !plans.is_empty() {
        validate_statement(&sql)?;
    }

    debug!(
        query_type = query.kind.name(),
        table = %table.physical_name,
        slices = plans.len(),
        "Translated query:\n{}",
        sql
    );

    Ok(Statement { sql, plans })
}

/// Timestamp, aggregation inputs, filter dimensions, then grouping
/// dimensions; first occurrence wins
fn build_projection(
    query: &AggregationQuery,
    table: &TableSchema,
    filter: Option<&FilterPredicate>,
) -> Result<Vec<String>, PlanError> {
    let filter_dimensions = filter.map(|f| f.dimensions.as_slice()).unwrap_or_default();
    let candidates = std::iter::once(&table.timestamp_column)
        .chain(query.aggregations.iter().map(|agg| &agg.field_name))
        .chain(filter_dimensions)
        .chain(&query.dimensions);

    let mut columns: Vec<String> = Vec::new();
    for column in candidates {
        if columns.contains(column) {
            continue;
        }
        if !table.has_column(column) {
            return Err(PlanError::UnknownColumn {
                table: table.physical_name.clone(),
                column: column.clone(),
            });
        }
        columns.push(column.clone());
    }
    Ok(columns)
}

fn build_sort_keys(
    query: &AggregationQuery,
    group_keys: &[GroupKey],
    aliases: &AliasMaker,
) -> Result<Vec<SortKey>, PlanError> {
    match &query.kind {
        QueryKind::TopN { metric, .. } => Ok(vec![SortKey::descending(sort_column(
            query, metric, aliases,
        )?)]),
        QueryKind::GroupBy {
            limit_spec: Some(spec),
            ..
        } => {
            let mut keys = Vec::with_capacity(spec.columns.len() + group_keys.len());
            for column in &spec.columns {
                let name = sort_column(query, &column.name, aliases)?;
                keys.push(match column.direction {
                    SortDirection::Ascending => SortKey::ascending(name),
                    SortDirection::Descending => SortKey::descending(name),
                });
            }
            for key in group_keys {
                if !keys.iter().any(|k| k.column == key.name) {
                    keys.push(SortKey::ascending(key.name.clone()));
                }
            }
            Ok(keys)
        }
        _ => Ok(group_keys
            .iter()
            .map(|key| SortKey::ascending(key.name.clone()))
            .collect()),
    }
}

/// Output column a sort name refers to: an aggregation's alias or a dimension
fn sort_column(
    query: &AggregationQuery,
    name: &str,
    aliases: &AliasMaker,
) -> Result<String, PlanError> {
    if query.aggregation(name).is_some() {
        Ok(aliases.apply(name))
    } else if query.dimensions.iter().any(|d| d == name) {
        Ok(name.to_string())
    } else {
        Err(PlanError::UnknownSortColumn(name.to_string()))
    }
}

/// Stages shared by every slice; only the time filter differs
struct SliceTemplate<'a> {
    table: &'a TableSchema,
    projection: Vec<String>,
    filter: Option<Expr>,
    group_keys: Vec<GroupKey>,
    calls: Vec<AggCall>,
    having: Option<Expr>,
    sort_keys: Vec<SortKey>,
    limit: Option<usize>,
}

impl SliceTemplate<'_> {
    fn instantiate(&self, intervals: &[Interval]) -> RelationalPlan {
        let mut predicates = vec![time::time_filter(&self.table.timestamp_column, intervals)];
        if let Some(filter) = &self.filter {
            predicates.push(filter.clone());
        }

        let mut plan = RelationalPlan::new()
            .then(Stage::Scan {
                schema: self.table.schema.clone(),
                table: self.table.physical_name.clone(),
            })
            .then(Stage::Project {
                columns: self.projection.clone(),
            })
            .then(Stage::Filter {
                predicate: Expr::and(predicates),
            })
            .then(Stage::Aggregate {
                group_keys: self.group_keys.clone(),
                calls: self.calls.clone(),
            });
        if let Some(having) = &self.having {
            plan = plan.then(Stage::Filter {
                predicate: having.clone(),
            });
        }
        plan = plan.then(Stage::Sort {
            keys: self.sort_keys.clone(),
        });
        if let Some(count) = self.limit {
            plan = plan.then(Stage::Limit { count });
        }
        plan
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("Unsupported filter type: {0}")]
    UnsupportedFilter(&'static str),

    #[error("Filter '{0}' has no operands")]
    EmptyFilter(&'static str),

    #[error("Having clause '{0}' has no operands")]
    EmptyHaving(&'static str),

    #[error("Unsupported aggregation '{name}' of type {kind}")]
    UnsupportedAggregation { name: String, kind: String },

    #[error("Unsupported post-aggregation type: {0}")]
    UnsupportedPostAggregation(&'static str),

    #[error("Unknown aggregation: {0}")]
    UnknownAggregation(String),

    #[error("Column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Cannot sort by '{0}': not an aggregation or dimension")]
    UnknownSortColumn(String),

    #[error("Query has no intervals")]
    NoIntervals,

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),
}

impl PlanError {
    /// Whether the query asks for something this translator does not support
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            PlanError::Time(TimeError::UnsupportedGrain(_))
                | PlanError::UnsupportedFilter(_)
                | PlanError::UnsupportedAggregation { .. }
                | PlanError::UnsupportedPostAggregation(_)
        )
    }
}
