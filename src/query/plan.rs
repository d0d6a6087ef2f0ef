//! Relational plan IR
//!
//! One plan is built per interval slice:
//! `Scan -> Project -> Filter -> Aggregate -> [Filter (having)] -> Sort -> [Limit]`.
//! Aggregate output rows are laid out as dimension columns, then time-bucket
//! columns, then aggregate calls.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Calendar field extracted for a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Year,
    Month,
    /// ISO-8601 week of the week-based year
    Week,
    DayOfYear,
    Hour,
    Minute,
}

impl TimeUnit {
    /// Field name understood by `EXTRACT`
    pub fn sql_name(&self) -> &'static str {
        match self {
            TimeUnit::Year => "YEAR",
            TimeUnit::Month => "MONTH",
            TimeUnit::Week => "WEEK",
            TimeUnit::DayOfYear => "DOY",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Minute => "MINUTE",
        }
    }

    /// Logical output column name of the bucket
    pub fn column_name(&self) -> &'static str {
        match self {
            TimeUnit::Year => "$year",
            TimeUnit::Month => "$month",
            TimeUnit::Week => "$week",
            TimeUnit::DayOfYear => "$dayOfYear",
            TimeUnit::Hour => "$hour",
            TimeUnit::Minute => "$minute",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Scalar and boolean expressions over a row
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Literal),
    /// Calendar field of a timestamp, read in the given zone
    Extract {
        unit: TimeUnit,
        zone: Tz,
        expr: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Conjunction; a single operand is returned as is
    pub fn and(mut operands: Vec<Expr>) -> Self {
        if operands.len() == 1 {
            return operands.remove(0);
        }
        Expr::And(operands)
    }

    /// Disjunction; a single operand is returned as is
    pub fn or(mut operands: Vec<Expr>) -> Self {
        if operands.len() == 1 {
            return operands.remove(0);
        }
        Expr::Or(operands)
    }

    pub fn negate(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// Column names referenced by this expression, in first-occurrence order
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Literal(_) => {}
            Expr::Extract { expr, .. } | Expr::IsNull(expr) | Expr::Not(expr) => {
                expr.collect_columns(out)
            }
            Expr::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::And(operands) | Expr::Or(operands) => {
                for operand in operands {
                    operand.collect_columns(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunction {
    Sum,
    Min,
    Max,
}

impl AggFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunction::Sum => "SUM",
            AggFunction::Min => "MIN",
            AggFunction::Max => "MAX",
        }
    }
}

/// One aggregate call, e.g. `SUM("clicks") AS "__clicks"`
#[derive(Debug, Clone, PartialEq)]
pub struct AggCall {
    pub function: AggFunction,
    pub column: String,
    /// Output column name
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKeyKind {
    Bucket(TimeUnit),
    Dimension,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupKey {
    pub expr: Expr,
    /// Output column name
    pub name: String,
    pub kind: GroupKeyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
            nulls_first: true,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
            nulls_first: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Scan { schema: String, table: String },
    Project { columns: Vec<String> },
    /// Row filter before aggregation, having filter after it
    Filter { predicate: Expr },
    Aggregate {
        /// Time buckets first, then dimensions
        group_keys: Vec<GroupKey>,
        calls: Vec<AggCall>,
    },
    Sort { keys: Vec<SortKey> },
    Limit { count: usize },
}

/// Ordered list of stages for one interval slice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationalPlan {
    pub stages: Vec<Stage>,
}

impl RelationalPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Project { columns } => Some(columns.as_slice()),
            _ => None,
        })
    }

    pub fn aggregate(&self) -> Option<(&[GroupKey], &[AggCall])> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Aggregate { group_keys, calls } => Some((group_keys.as_slice(), calls.as_slice())),
            _ => None,
        })
    }

    pub fn sort_keys(&self) -> Option<&[SortKey]> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Sort { keys } => Some(keys.as_slice()),
            _ => None,
        })
    }

    pub fn limit(&self) -> Option<usize> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Limit { count } => Some(*count),
            _ => None,
        })
    }

    /// Output column names in row order: dimensions, buckets, aggregates
    pub fn output_columns(&self) -> Vec<String> {
        match self.aggregate() {
            Some((group_keys, calls)) => output_layout(group_keys, calls)
                .into_iter()
                .map(|column| match column {
                    OutputColumn::Key(key) => key.name.clone(),
                    OutputColumn::Call(call) => call.name.clone(),
                })
                .collect(),
            None => self.projection().map(|c| c.to_vec()).unwrap_or_default(),
        }
    }
}

/// A column of an aggregate's output row
#[derive(Debug, Clone, Copy)]
pub enum OutputColumn<'a> {
    Key(&'a GroupKey),
    Call(&'a AggCall),
}

/// Aggregate output order: dimension keys, bucket keys, then calls
pub fn output_layout<'a>(group_keys: &'a [GroupKey], calls: &'a [AggCall]) -> Vec<OutputColumn<'a>> {
    let dimensions = group_keys
        .iter()
        .filter(|key| key.kind == GroupKeyKind::Dimension);
    let buckets = group_keys
        .iter()
        .filter(|key| matches!(key.kind, GroupKeyKind::Bucket(_)));
    dimensions
        .chain(buckets)
        .map(OutputColumn::Key)
        .chain(calls.iter().map(OutputColumn::Call))
        .collect()
}
