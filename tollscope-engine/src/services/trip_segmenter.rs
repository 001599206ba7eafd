//! Trip segmentation
//!
//! Cuts one closure (a single vehicle's crossings) into trips. Crossings are
//! ordered by time and each interior crossing is tested against three break
//! rules: the direction zone changed, the previous crossing was at an exit
//! node, or the gap since the previous crossing exceeds the trip timeout.
//!
//! Trip ids come from a [`TripSequence`] owned by the caller, shared across
//! every closure of a batch so numbering is globally monotonic.

use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::{Serialize, Serializer};
use tollscope_common::TransactionRecord;

use crate::config::TripSettings;

/// Zone reported for location codes with no recognised direction token
pub const UNKNOWN_ZONE: &str = "unknown";

/// Monotonic trip id generator
///
/// The first id handed out is `1` unless the sequence resumes from an
/// earlier batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripSequence {
    last: u64,
}

impl TripSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume numbering after `last_trip_id`
    pub fn starting_after(last_trip_id: u64) -> Self {
        Self { last: last_trip_id }
    }

    /// Open a new trip and return its id
    pub fn next_trip(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Id of the most recently opened trip, `None` before the first
    pub fn current(&self) -> Option<u64> {
        (self.last > 0).then_some(self.last)
    }
}

/// One crossing with its segmentation attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentedRecord {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub direction_zone: String,
    /// Gap from the previous crossing in the closure, zero for the first
    #[serde(serialize_with = "serialize_seconds")]
    pub time_delta: Duration,
    pub directional_change: bool,
    pub break_trip: bool,
    pub trip_id: u64,
}

fn serialize_seconds<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.num_milliseconds() as f64 / 1000.0)
}

/// Applies the break rules to a closure
#[derive(Debug, Clone)]
pub struct TripSegmenter {
    trip_timeout: Duration,
    exit_nodes: HashSet<String>,
    direction_tokens: Vec<String>,
}

impl TripSegmenter {
    pub fn new(settings: &TripSettings) -> Self {
        Self {
            trip_timeout: settings.trip_timeout,
            exit_nodes: settings.exit_nodes.clone(),
            direction_tokens: settings.direction_tokens.clone(),
        }
    }

    /// Direction zone: the first configured token the location code starts with
    pub fn direction_zone<'s>(&'s self, location_code: &str) -> &'s str {
        let code = location_code.trim_start();
        self.direction_tokens
            .iter()
            .find(|token| code.starts_with(token.as_str()))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_ZONE)
    }

    /// Whether a crossing at this location ends the trip it belongs to
    ///
    /// The exit set is matched against the crossing's zone, and also against
    /// its full location code so single plazas can be named.
    fn is_exit(&self, location_code: &str, zone: &str) -> bool {
        self.exit_nodes.contains(location_code) || self.exit_nodes.contains(zone)
    }

    /// Segment one closure into trips
    ///
    /// Records are ordered by timestamp (stable, so equal timestamps keep the
    /// order given). The first record opens a new trip from `sequence`; an
    /// interior record `i` (`0 < i < n - 1`) opens another when
    ///
    /// `directional_change[i] || exit(i - 1) || time_delta[i] > trip_timeout`
    ///
    /// The last record is never evaluated and always continues the current
    /// trip, and closures of one or two records form a single trip.
    pub fn segment(
        &self,
        mut records: Vec<TransactionRecord>,
        sequence: &mut TripSequence,
    ) -> Vec<SegmentedRecord> {
        records.sort_by_key(|r| r.timestamp);
        let n = records.len();

        let zones: Vec<String> = records
            .iter()
            .map(|r| self.direction_zone(&r.location_code).to_string())
            .collect();

        let mut segmented = Vec::with_capacity(n);
        let mut previous: Option<(NaiveDateTime, String)> = None;
        let mut trip_id = 0;

        for (i, record) in records.into_iter().enumerate() {
            let (time_delta, directional_change, after_exit) = match &previous {
                None => (Duration::zero(), false, false),
                Some((timestamp, location)) => (
                    record.timestamp - *timestamp,
                    zones[i] != zones[i - 1],
                    self.is_exit(location, &zones[i - 1]),
                ),
            };

            let interior = i > 0 && i + 1 < n;
            let break_trip = interior
                && (directional_change || after_exit || time_delta > self.trip_timeout);

            if i == 0 || break_trip {
                trip_id = sequence.next_trip();
            }

            previous = Some((record.timestamp, record.location_code.clone()));
            segmented.push(SegmentedRecord {
                record,
                direction_zone: zones[i].clone(),
                time_delta,
                directional_change,
                break_trip,
                trip_id,
            });
        }

        segmented
    }
}
