//! Timestamp utilities
//!
//! Crossing times are naive local plaza times. Record files carry either
//! ISO-8601 timestamps or the toll-system export form `10/05/2020 08.35.10.000`.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serializer};

use crate::{Error, Result};

/// Accepted timestamp layouts, tried in order
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H.%M.%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a crossing timestamp
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| Error::InvalidInput(format!("Unrecognized timestamp: {:?}", value)))
}

/// Convert whole minutes to a duration
pub fn minutes_to_duration(minutes: u32) -> Duration {
    Duration::minutes(i64::from(minutes))
}

/// Serialize a crossing timestamp as ISO-8601
pub fn serialize_timestamp<S>(value: &NaiveDateTime, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&value.format("%Y-%m-%dT%H:%M:%S%.f"))
}

/// Deserialize a crossing timestamp in any accepted layout
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}
