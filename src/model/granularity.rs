use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ModelError;

/// Named time-bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grain {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Grain {
    pub fn name(&self) -> &'static str {
        match self {
            Grain::Minute => "minute",
            Grain::Hour => "hour",
            Grain::Day => "day",
            Grain::Week => "week",
            Grain::Month => "month",
            Grain::Quarter => "quarter",
            Grain::Year => "year",
        }
    }

    /// ISO-8601 period for this grain
    pub fn period(&self) -> &'static str {
        match self {
            Grain::Minute => "PT1M",
            Grain::Hour => "PT1H",
            Grain::Day => "P1D",
            Grain::Week => "P1W",
            Grain::Month => "P1M",
            Grain::Quarter => "P3M",
            Grain::Year => "P1Y",
        }
    }

    fn from_period(period: &str) -> Option<Self> {
        match period.to_ascii_uppercase().as_str() {
            "PT1M" => Some(Grain::Minute),
            "PT1H" => Some(Grain::Hour),
            "P1D" => Some(Grain::Day),
            "P1W" => Some(Grain::Week),
            "P1M" => Some(Grain::Month),
            "P3M" => Some(Grain::Quarter),
            "P1Y" => Some(Grain::Year),
            _ => None,
        }
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Grain {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minute" => Ok(Grain::Minute),
            "hour" => Ok(Grain::Hour),
            "day" => Ok(Grain::Day),
            "week" => Ok(Grain::Week),
            "month" => Ok(Grain::Month),
            "quarter" => Ok(Grain::Quarter),
            "year" => Ok(Grain::Year),
            _ => Grain::from_period(s).ok_or_else(|| ModelError::InvalidGranularity(s.to_string())),
        }
    }
}

/// A grain together with the zone its buckets are aligned in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GranularityRepr", into = "GranularityRepr")]
pub struct Granularity {
    pub grain: Grain,
    pub zone: Tz,
}

impl Granularity {
    pub fn new(grain: Grain, zone: Tz) -> Self {
        Self { grain, zone }
    }

    pub fn utc(grain: Grain) -> Self {
        Self::new(grain, Tz::UTC)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.grain, self.zone.name())
    }
}

/// Wire forms: `"day"` or `{"type": "period", "period": "P1D", "timeZone": "UTC"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GranularityRepr {
    Simple(String),
    Period {
        #[serde(rename = "type")]
        kind: String,
        period: String,
        #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
        time_zone: Option<String>,
    },
}

impl TryFrom<GranularityRepr> for Granularity {
    type Error = ModelError;

    fn try_from(repr: GranularityRepr) -> Result<Self, Self::Error> {
        match repr {
            GranularityRepr::Simple(name) => Ok(Granularity::utc(name.parse()?)),
            GranularityRepr::Period {
                kind,
                period,
                time_zone,
            } => {
                if kind != "period" {
                    return Err(ModelError::InvalidGranularity(kind));
                }
                let grain = Grain::from_period(&period)
                    .ok_or_else(|| ModelError::InvalidGranularity(period.clone()))?;
                let zone = match time_zone {
                    Some(name) => name
                        .parse::<Tz>()
                        .map_err(|_| ModelError::InvalidTimeZone(name.clone()))?,
                    None => Tz::UTC,
                };
                Ok(Granularity::new(grain, zone))
            }
        }
    }
}

impl From<Granularity> for GranularityRepr {
    fn from(granularity: Granularity) -> Self {
        if granularity.zone == Tz::UTC {
            GranularityRepr::Simple(granularity.grain.name().to_string())
        } else {
            GranularityRepr::Period {
                kind: "period".to_string(),
                period: granularity.grain.period().to_string(),
                time_zone: Some(granularity.zone.name().to_string()),
            }
        }
    }
}
