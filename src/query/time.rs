//! Granularity handling: bucket expressions, bucket-start reconstruction,
//! time-range predicates and per-bucket interval slicing.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use std::collections::BTreeMap;

use super::plan::{CompareOp, Expr, Literal, TimeUnit};
use crate::model::{Grain, Granularity, Interval};

/// Cumulative bucket basis; a grain uses a prefix of it
pub const BUCKET_BASIS: [TimeUnit; 6] = [
    TimeUnit::Year,
    TimeUnit::Month,
    TimeUnit::Week,
    TimeUnit::DayOfYear,
    TimeUnit::Hour,
    TimeUnit::Minute,
];

#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error("Unsupported granularity: {0}")]
    UnsupportedGrain(Grain),

    #[error("Invalid bucket: {0}")]
    InvalidBucket(String),
}

/// Number of leading bucket columns a grain groups by
pub fn bucket_count(grain: Grain) -> Result<usize, TimeError> {
    match grain {
        Grain::Minute => Ok(6),
        Grain::Hour => Ok(5),
        Grain::Day => Ok(4),
        Grain::Week => Ok(3),
        Grain::Month => Ok(2),
        Grain::Year => Ok(1),
        Grain::Quarter => Err(TimeError::UnsupportedGrain(grain)),
    }
}

pub fn bucket_units(grain: Grain) -> Result<&'static [TimeUnit], TimeError> {
    Ok(&BUCKET_BASIS[..bucket_count(grain)?])
}

/// `EXTRACT` expressions for the grain's buckets, read in the granularity's zone
pub fn bucket_expressions(
    granularity: &Granularity,
    timestamp_column: &str,
) -> Result<Vec<(TimeUnit, Expr)>, TimeError> {
    Ok(bucket_units(granularity.grain)?
        .iter()
        .map(|unit| {
            let expr = Expr::Extract {
                unit: *unit,
                zone: granularity.zone,
                expr: Box::new(Expr::column(timestamp_column)),
            };
            (*unit, expr)
        })
        .collect())
}

/// Rebuild the UTC start of a bucket from its leading bucket values
pub fn bucket_start(granularity: &Granularity, values: &[i64]) -> Result<DateTime<Utc>, TimeError> {
    let count = bucket_count(granularity.grain)?;
    if values.len() != count {
        return Err(TimeError::InvalidBucket(format!(
            "expected {} bucket values, found {}",
            count,
            values.len()
        )));
    }

    let field = |idx: usize| -> Result<u32, TimeError> {
        u32::try_from(values[idx])
            .map_err(|_| TimeError::InvalidBucket(format!("{} out of range", values[idx])))
    };
    let year = i32::try_from(values[0])
        .map_err(|_| TimeError::InvalidBucket(format!("year {} out of range", values[0])))?;

    let date = match count {
        1 => NaiveDate::from_ymd_opt(year, 1, 1),
        2 => NaiveDate::from_ymd_opt(year, field(1)?, 1),
        3 => {
            let (month, week) = (field(1)?, field(2)?);
            // ISO week-year differs from the calendar year around New Year
            let week_year = if month == 12 && week == 1 {
                year + 1
            } else if month == 1 && week >= 52 {
                year - 1
            } else {
                year
            };
            NaiveDate::from_isoywd_opt(week_year, week, Weekday::Mon)
        }
        _ => NaiveDate::from_yo_opt(year, field(3)?),
    }
    .ok_or_else(|| TimeError::InvalidBucket(format!("{:?}", values)))?;

    let hour = if count >= 5 { field(4)? } else { 0 };
    let minute = if count >= 6 { field(5)? } else { 0 };
    let naive = date
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| TimeError::InvalidBucket(format!("{:?}", values)))?;

    localize(&granularity.zone, naive)
}

/// True when the timestamp column falls in any of the intervals
pub fn time_filter(timestamp_column: &str, intervals: &[Interval]) -> Expr {
    Expr::or(
        intervals
            .iter()
            .map(|interval| {
                Expr::and(vec![
                    Expr::compare(
                        CompareOp::GtEq,
                        Expr::column(timestamp_column),
                        Expr::Literal(Literal::Timestamp(interval.start)),
                    ),
                    Expr::compare(
                        CompareOp::Lt,
                        Expr::column(timestamp_column),
                        Expr::Literal(Literal::Timestamp(interval.end)),
                    ),
                ])
            })
            .collect(),
    )
}

/// Split intervals into one group per granularity bucket, in bucket order.
/// Each group holds the parts of the requested intervals falling in that bucket.
pub fn slice_intervals(
    granularity: &Granularity,
    intervals: &[Interval],
) -> Result<Vec<Vec<Interval>>, TimeError> {
    bucket_count(granularity.grain)?;

    let mut slices: BTreeMap<DateTime<Utc>, Vec<Interval>> = BTreeMap::new();
    for interval in intervals {
        if interval.is_empty() {
            continue;
        }
        let mut start = floor(granularity, interval.start)?;
        while start < interval.end {
            let end = next_bucket(granularity, start)?;
            let bucket = Interval { start, end };
            if let Some(part) = bucket.intersect(interval) {
                slices.entry(start).or_default().push(part);
            }
            start = end;
        }
    }
    Ok(slices.into_values().collect())
}

/// Start of the bucket containing `instant`
pub fn floor(granularity: &Granularity, instant: DateTime<Utc>) -> Result<DateTime<Utc>, TimeError> {
    let local = instant.with_timezone(&granularity.zone).naive_local();
    let date = local.date();
    let naive = match granularity.grain {
        Grain::Minute => date.and_hms_opt(local.hour(), local.minute(), 0),
        Grain::Hour => date.and_hms_opt(local.hour(), 0, 0),
        Grain::Day => date.and_hms_opt(0, 0, 0),
        Grain::Week => (date - Duration::days(i64::from(date.weekday().num_days_from_monday())))
            .and_hms_opt(0, 0, 0),
        Grain::Month => date.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        Grain::Year => {
            NaiveDate::from_ymd_opt(date.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        Grain::Quarter => return Err(TimeError::UnsupportedGrain(granularity.grain)),
    }
    .ok_or_else(|| TimeError::InvalidBucket(local.to_string()))?;
    localize(&granularity.zone, naive)
}

fn next_bucket(granularity: &Granularity, start: DateTime<Utc>) -> Result<DateTime<Utc>, TimeError> {
    let local = start.with_timezone(&granularity.zone).naive_local();
    let naive = match granularity.grain {
        Grain::Minute => Some(local + Duration::minutes(1)),
        Grain::Hour => Some(local + Duration::hours(1)),
        Grain::Day => Some(local + Duration::days(1)),
        Grain::Week => Some(local + Duration::weeks(1)),
        Grain::Month => {
            let (year, month) = if local.month() == 12 {
                (local.year() + 1, 1)
            } else {
                (local.year(), local.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        Grain::Year => {
            NaiveDate::from_ymd_opt(local.year() + 1, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        Grain::Quarter => return Err(TimeError::UnsupportedGrain(granularity.grain)),
    }
    .ok_or_else(|| TimeError::InvalidBucket(local.to_string()))?;

    let next = localize(&granularity.zone, naive)?;
    // A wall-clock step can land on the same instant across a DST fold
    if next <= start {
        return Ok(start + Duration::hours(1));
    }
    Ok(next)
}

/// Resolve a wall-clock time in `zone` to UTC. Ambiguous times take the
/// earlier instant; times inside a gap move forward an hour.
fn localize(zone: &Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>, TimeError> {
    let resolved = match zone.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => zone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest(),
    };
    resolved
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| TimeError::InvalidBucket(format!("{} does not exist in {}", naive, zone.name())))
}
