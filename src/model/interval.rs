use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::ModelError;
use crate::data::{format_timestamp, parse_timestamp};

/// Half-open UTC range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ModelError> {
        if end < start {
            return Err(ModelError::InvalidInterval(format!(
                "{} ends before it starts",
                Interval { start, end }
            )));
        }
        Ok(Self { start, end })
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end
    }

    /// Overlap of two intervals, if they share any instant
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Interval { start, end })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

impl FromStr for Interval {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| ModelError::InvalidInterval(s.to_string()))?;
        let start =
            parse_timestamp(start.trim()).ok_or_else(|| ModelError::InvalidInterval(s.to_string()))?;
        let end =
            parse_timestamp(end.trim()).ok_or_else(|| ModelError::InvalidInterval(s.to_string()))?;
        Interval::new(start, end)
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_interval() {
        let interval: Interval = "2020-01-01T00:00:00Z/2020-01-03T00:00:00Z".parse().unwrap();
        assert_eq!(interval.start, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(interval.end, Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(
            interval.to_string(),
            "2020-01-01T00:00:00.000Z/2020-01-03T00:00:00.000Z"
        );
    }

    #[test]
    fn test_parse_interval_without_zone() {
        let interval: Interval = "2012-01-01T00:00:00.000/2012-01-03T00:00:00.000"
            .parse()
            .unwrap();
        assert_eq!(interval.start, Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_reversed_interval_rejected() {
        let result: Result<Interval, _> = "2020-01-03T00:00:00Z/2020-01-01T00:00:00Z".parse();
        assert!(matches!(result, Err(ModelError::InvalidInterval(_))));
    }

    #[test]
    fn test_intersect() {
        let a: Interval = "2020-01-01T00:00:00Z/2020-01-03T00:00:00Z".parse().unwrap();
        let b: Interval = "2020-01-02T00:00:00Z/2020-01-05T00:00:00Z".parse().unwrap();
        let c: Interval = "2020-01-03T00:00:00Z/2020-01-05T00:00:00Z".parse().unwrap();

        let overlap = a.intersect(&b).unwrap();
        assert_eq!(overlap.start, b.start);
        assert_eq!(overlap.end, a.end);
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn test_serde_string_form() {
        let interval: Interval =
            serde_json::from_str("\"2020-01-01T00:00:00Z/2020-01-02T00:00:00Z\"").unwrap();
        let json = serde_json::to_string(&interval).unwrap();
        assert_eq!(json, "\"2020-01-01T00:00:00.000Z/2020-01-02T00:00:00.000Z\"");
    }
}
