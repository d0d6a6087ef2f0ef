use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{FilterTree, Granularity, HavingTree, Interval, ModelError, PostAggregation};

/// A named aggregation over one input column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Protocol type, e.g. `longSum` or `doubleMax`
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(rename = "fieldName")]
    pub field_name: String,
}

impl Aggregation {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            field_name: field_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByColumn {
    pub name: String,
    pub direction: SortDirection,
}

impl OrderByColumn {
    pub fn new(name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }
}

/// Ordering and row limit of a group-by query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitSpec {
    pub columns: Vec<OrderByColumn>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    TimeSeries,
    GroupBy {
        having: Option<HavingTree>,
        limit_spec: Option<LimitSpec>,
    },
    TopN {
        metric: String,
        threshold: usize,
    },
}

impl QueryKind {
    /// Protocol `queryType` value
    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::TimeSeries => "timeseries",
            QueryKind::GroupBy { .. } => "groupBy",
            QueryKind::TopN { .. } => "topN",
        }
    }
}

/// A fully-resolved aggregation query
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub kind: QueryKind,
    pub table: String,
    pub granularity: Granularity,
    /// Insertion-ordered, without duplicates
    pub dimensions: Vec<String>,
    pub filter: Option<FilterTree>,
    pub aggregations: Vec<Aggregation>,
    pub post_aggregations: Vec<PostAggregation>,
    pub intervals: Vec<Interval>,
}

impl AggregationQuery {
    pub fn new(kind: QueryKind, table: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            kind,
            table: table.into(),
            granularity,
            dimensions: Vec::new(),
            filter: None,
            aggregations: Vec::new(),
            post_aggregations: Vec::new(),
            intervals: Vec::new(),
        }
    }

    pub fn timeseries(table: impl Into<String>, granularity: Granularity) -> Self {
        Self::new(QueryKind::TimeSeries, table, granularity)
    }

    pub fn group_by(table: impl Into<String>, granularity: Granularity) -> Self {
        Self::new(
            QueryKind::GroupBy {
                having: None,
                limit_spec: None,
            },
            table,
            granularity,
        )
    }

    pub fn top_n(
        table: impl Into<String>,
        granularity: Granularity,
        dimension: impl Into<String>,
        metric: impl Into<String>,
        threshold: usize,
    ) -> Self {
        Self::new(
            QueryKind::TopN {
                metric: metric.into(),
                threshold,
            },
            table,
            granularity,
        )
        .with_dimension(dimension)
    }

    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        let dimension = dimension.into();
        if !self.dimensions.contains(&dimension) {
            self.dimensions.push(dimension);
        }
        self
    }

    pub fn with_filter(mut self, filter: FilterTree) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn with_post_aggregation(mut self, post_aggregation: PostAggregation) -> Self {
        self.post_aggregations.push(post_aggregation);
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.intervals.push(interval);
        self
    }

    /// Has no effect unless this is a group-by query
    pub fn with_having(mut self, tree: HavingTree) -> Self {
        if let QueryKind::GroupBy { having, .. } = &mut self.kind {
            *having = Some(tree);
        }
        self
    }

    /// Has no effect unless this is a group-by query
    pub fn with_limit_spec(mut self, spec: LimitSpec) -> Self {
        if let QueryKind::GroupBy { limit_spec, .. } = &mut self.kind {
            *limit_spec = Some(spec);
        }
        self
    }

    pub fn having(&self) -> Option<&HavingTree> {
        match &self.kind {
            QueryKind::GroupBy { having, .. } => having.as_ref(),
            _ => None,
        }
    }

    pub fn limit_spec(&self) -> Option<&LimitSpec> {
        match &self.kind {
            QueryKind::GroupBy { limit_spec, .. } => limit_spec.as_ref(),
            _ => None,
        }
    }

    pub fn aggregation(&self, name: &str) -> Option<&Aggregation> {
        self.aggregations.iter().find(|agg| agg.name == name)
    }

    /// Check the structural invariants the decoder cannot express
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut names = HashSet::new();
        for agg in &self.aggregations {
            if !names.insert(agg.name.as_str()) {
                return Err(ModelError::DuplicateAggregation(agg.name.clone()));
            }
        }
        if self.intervals.is_empty() {
            return Err(ModelError::MissingField("intervals"));
        }
        if matches!(self.kind, QueryKind::TopN { .. }) && self.dimensions.len() != 1 {
            return Err(ModelError::MissingField("dimension"));
        }
        Ok(())
    }

    /// Decode a query from its protocol JSON form
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let query_type = value
            .get("queryType")
            .and_then(|v| v.as_str())
            .ok_or(ModelError::MissingField("queryType"))?
            .to_string();
        if !matches!(query_type.as_str(), "timeseries" | "groupBy" | "topN") {
            return Err(ModelError::UnsupportedQueryType(query_type));
        }

        let repr: QueryRepr = serde_json::from_value(value)?;
        let query = AggregationQuery::try_from(repr)?;
        query.validate()?;
        Ok(query)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataSourceRepr {
    Name(String),
    Table { name: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DimensionRepr {
    Name(String),
    Spec { dimension: String },
}

impl DimensionRepr {
    fn into_name(self) -> String {
        match self {
            DimensionRepr::Name(name) | DimensionRepr::Spec { dimension: name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetricRepr {
    Name(String),
    Spec { metric: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderByRepr {
    Name(String),
    Spec {
        dimension: String,
        #[serde(default)]
        direction: SortDirection,
    },
}

#[derive(Debug, Deserialize)]
struct LimitSpecRepr {
    #[serde(default)]
    columns: Vec<OrderByRepr>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IntervalsRepr {
    One(Interval),
    Many(Vec<Interval>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRepr {
    query_type: String,
    data_source: DataSourceRepr,
    granularity: Granularity,
    #[serde(default)]
    dimensions: Vec<DimensionRepr>,
    dimension: Option<DimensionRepr>,
    filter: Option<FilterTree>,
    #[serde(default)]
    aggregations: Vec<Aggregation>,
    #[serde(default)]
    post_aggregations: Vec<PostAggregation>,
    having: Option<HavingTree>,
    limit_spec: Option<LimitSpecRepr>,
    metric: Option<MetricRepr>,
    threshold: Option<usize>,
    intervals: IntervalsRepr,
}

impl TryFrom<QueryRepr> for AggregationQuery {
    type Error = ModelError;

    fn try_from(repr: QueryRepr) -> Result<Self, Self::Error> {
        let table = match repr.data_source {
            DataSourceRepr::Name(name) | DataSourceRepr::Table { name } => name,
        };

        let kind = match repr.query_type.as_str() {
            "timeseries" => QueryKind::TimeSeries,
            "groupBy" => QueryKind::GroupBy {
                having: repr.having,
                limit_spec: repr.limit_spec.map(|spec| LimitSpec {
                    columns: spec
                        .columns
                        .into_iter()
                        .map(|column| match column {
                            OrderByRepr::Name(name) => {
                                OrderByColumn::new(name, SortDirection::Ascending)
                            }
                            OrderByRepr::Spec {
                                dimension,
                                direction,
                            } => OrderByColumn::new(dimension, direction),
                        })
                        .collect(),
                    limit: spec.limit,
                }),
            },
            "topN" => {
                let metric = match repr.metric.ok_or(ModelError::MissingField("metric"))? {
                    MetricRepr::Name(metric) | MetricRepr::Spec { metric } => metric,
                };
                let threshold = repr.threshold.ok_or(ModelError::MissingField("threshold"))?;
                QueryKind::TopN { metric, threshold }
            }
            other => return Err(ModelError::UnsupportedQueryType(other.to_string())),
        };

        let mut query = AggregationQuery::new(kind, table, repr.granularity);
        for dimension in repr.dimension.into_iter().chain(repr.dimensions) {
            query = query.with_dimension(dimension.into_name());
        }
        query.filter = repr.filter;
        query.aggregations = repr.aggregations;
        query.post_aggregations = repr.post_aggregations;
        query.intervals = match repr.intervals {
            IntervalsRepr::One(interval) => vec![interval],
            IntervalsRepr::Many(intervals) => intervals,
        };
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Grain;

    #[test]
    fn test_decode_group_by() {
        let json = r#"{
            "queryType": "groupBy",
            "dataSource": "wikiticker",
            "granularity": "day",
            "dimensions": ["country", {"type": "default", "dimension": "page", "outputName": "page"}, "country"],
            "filter": {"type": "selector", "dimension": "isRobot", "value": "false"},
            "aggregations": [{"type": "longSum", "name": "clicks", "fieldName": "clicks"}],
            "having": {"type": "greaterThan", "aggregation": "clicks", "value": 10},
            "limitSpec": {
                "type": "default",
                "limit": 5,
                "columns": [{"dimension": "clicks", "direction": "descending"}, "page"]
            },
            "intervals": ["2020-01-01T00:00:00Z/2020-01-03T00:00:00Z"]
        }"#;
        let query = AggregationQuery::from_json(json).unwrap();

        assert_eq!(query.table, "wikiticker");
        assert_eq!(query.granularity.grain, Grain::Day);
        assert_eq!(query.dimensions, vec!["country", "page"]);
        assert_eq!(query.aggregations[0], Aggregation::new("longSum", "clicks", "clicks"));
        assert_eq!(query.having(), Some(&HavingTree::greater_than("clicks", 10.0)));

        let spec = query.limit_spec().unwrap();
        assert_eq!(spec.limit, Some(5));
        assert_eq!(
            spec.columns,
            vec![
                OrderByColumn::new("clicks", SortDirection::Descending),
                OrderByColumn::new("page", SortDirection::Ascending),
            ]
        );
    }

    #[test]
    fn test_decode_top_n() {
        let json = r#"{
            "queryType": "topN",
            "dataSource": {"type": "table", "name": "wikiticker"},
            "granularity": {"type": "period", "period": "P1D", "timeZone": "UTC"},
            "dimension": "page",
            "metric": {"type": "numeric", "metric": "edits"},
            "threshold": 5,
            "aggregations": [{"type": "longSum", "name": "edits", "fieldName": "count"}],
            "intervals": "2020-01-01T00:00:00Z/2020-01-04T00:00:00Z"
        }"#;
        let query = AggregationQuery::from_json(json).unwrap();

        assert_eq!(
            query.kind,
            QueryKind::TopN {
                metric: "edits".into(),
                threshold: 5
            }
        );
        assert_eq!(query.dimensions, vec!["page"]);
        assert_eq!(query.intervals.len(), 1);
    }

    #[test]
    fn test_unsupported_query_type() {
        let json = r#"{"queryType": "search", "dataSource": "t"}"#;
        let err = AggregationQuery::from_json(json).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedQueryType(kind) if kind == "search"));
    }

    #[test]
    fn test_duplicate_aggregation_names_rejected() {
        let query = AggregationQuery::timeseries("t", Granularity::utc(Grain::Hour))
            .with_aggregation(Aggregation::new("longSum", "x", "a"))
            .with_aggregation(Aggregation::new("doubleSum", "x", "b"))
            .with_interval("2020-01-01T00:00:00Z/2020-01-02T00:00:00Z".parse().unwrap());
        assert!(matches!(
            query.validate(),
            Err(ModelError::DuplicateAggregation(name)) if name == "x"
        ));
    }

    #[test]
    fn test_having_ignored_outside_group_by() {
        let query = AggregationQuery::timeseries("t", Granularity::utc(Grain::Hour))
            .with_having(HavingTree::greater_than("x", 1.0));
        assert!(query.having().is_none());
    }
}
