//! Batch trip building
//!
//! Drives closure resolution and segmentation over a whole record table:
//! seed a closure from the first unassigned row, segment it, append the
//! result, retire the closure's rows, repeat until nothing is left.
//!
//! Closures are resolved over the residual pool only (rows not yet assigned),
//! so every transaction appears in the output exactly once even though the
//! plate-variant relation is not symmetric. Output trip ids depend on row
//! order of the input table; the same table and the same starting
//! [`TripSequence`] always reproduce the same ids.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tollscope_common::human_time::format_duration;
use tollscope_common::time::serialize_timestamp;
use tollscope_common::{RecordTable, TransactionRecord};
use tracing::{debug, info};

use super::related_resolver::{ClosureSet, RelatedTransactionResolver};
use super::trip_segmenter::{SegmentedRecord, TripSegmenter, TripSequence};
use crate::config::TripSettings;

/// Rows not yet assigned to a trip, visited in table order
#[derive(Debug, Clone)]
pub struct ResidualPool {
    assigned: Vec<bool>,
    cursor: usize,
    remaining: usize,
}

impl ResidualPool {
    pub fn new(rows: usize) -> Self {
        Self {
            assigned: vec![false; rows],
            cursor: 0,
            remaining: rows,
        }
    }

    /// First unassigned row in table order
    pub fn next_seed(&mut self) -> Option<usize> {
        while self.cursor < self.assigned.len() {
            if !self.assigned[self.cursor] {
                return Some(self.cursor);
            }
            self.cursor += 1;
        }
        None
    }

    /// Retire a closure's rows
    pub fn retire(&mut self, closure: &ClosureSet) {
        for &row in closure.rows() {
            if let Some(slot) = self.assigned.get_mut(row) {
                if !*slot {
                    *slot = true;
                    self.remaining -= 1;
                }
            }
        }
    }

    /// Assignment flags indexed by row
    pub fn assigned(&self) -> &[bool] {
        &self.assigned
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

/// Output of one batch run
#[derive(Debug, Clone, Default)]
pub struct TripBuildOutput {
    /// Segmented rows, closure by closure, time-ordered within a closure
    pub rows: Vec<SegmentedRecord>,
    pub closures: usize,
    pub trips: usize,
}

/// Runs the residual-pool loop over one table
pub struct TripBuilder<'a> {
    resolver: RelatedTransactionResolver<'a>,
    segmenter: TripSegmenter,
}

impl<'a> TripBuilder<'a> {
    pub fn new(table: &'a RecordTable, settings: &TripSettings) -> Self {
        Self {
            resolver: RelatedTransactionResolver::new(table),
            segmenter: TripSegmenter::new(settings),
        }
    }

    /// Assign every record of the table to a trip
    ///
    /// **Algorithm:**
    /// 1. Take the first unassigned row as seed
    /// 2. Resolve its closure over unassigned rows
    /// 3. Order the closure by (timestamp, row) and segment it with `sequence`
    /// 4. Retire the closure's rows; repeat until the pool is empty
    ///
    /// Each pass retires at least the seed, so the loop terminates.
    pub fn build(&self, sequence: &mut TripSequence) -> TripBuildOutput {
        let table = self.resolver.table();
        let mut pool = ResidualPool::new(table.len());
        let mut output = TripBuildOutput {
            rows: Vec::with_capacity(table.len()),
            ..TripBuildOutput::default()
        };
        let first_trip = sequence.current().unwrap_or(0);

        while let Some(seed) = pool.next_seed() {
            let closure = self.resolver.resolve_row(seed, pool.assigned());

            let mut rows = closure.rows().to_vec();
            rows.sort_by_key(|&row| (table.records()[row].timestamp, row));
            let records: Vec<TransactionRecord> = rows
                .iter()
                .map(|&row| table.records()[row].clone())
                .collect();

            let segmented = self.segmenter.segment(records, sequence);
            debug!(
                seed_row = seed,
                records = segmented.len(),
                first_trip = segmented.first().map(|r| r.trip_id),
                last_trip = segmented.last().map(|r| r.trip_id),
                "Segmented closure"
            );

            output.rows.extend(segmented);
            output.closures += 1;
            pool.retire(&closure);
        }

        output.trips = (sequence.current().unwrap_or(0) - first_trip) as usize;

        info!(
            records = output.rows.len(),
            closures = output.closures,
            trips = output.trips,
            "Trip build complete"
        );

        output
    }
}

/// One trip, summarized from its segmented rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripSummary {
    pub trip_id: u64,
    pub record_count: usize,
    pub entry_location: String,
    pub exit_location: String,
    pub direction_zone: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub started_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_timestamp")]
    pub ended_at: NaiveDateTime,
    /// Elapsed time, human-readable
    pub elapsed: String,
    /// Ordered location codes, e.g. `["SB01", "SB02", "SB03"]`
    pub path: Vec<String>,
}

impl TripSummary {
    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }
}

/// Summarize trips in order of first appearance
///
/// Rows of one trip are contiguous in builder output.
pub fn summarize_trips(rows: &[SegmentedRecord]) -> Vec<TripSummary> {
    let mut summaries: Vec<TripSummary> = Vec::new();

    for row in rows {
        match summaries.last_mut() {
            Some(summary) if summary.trip_id == row.trip_id => {
                summary.record_count += 1;
                summary.exit_location = row.record.location_code.clone();
                summary.ended_at = row.record.timestamp;
                summary.path.push(row.record.location_code.clone());
            }
            _ => summaries.push(TripSummary {
                trip_id: row.trip_id,
                record_count: 1,
                entry_location: row.record.location_code.clone(),
                exit_location: row.record.location_code.clone(),
                direction_zone: row.direction_zone.clone(),
                started_at: row.record.timestamp,
                ended_at: row.record.timestamp,
                elapsed: String::new(),
                path: vec![row.record.location_code.clone()],
            }),
        }
    }

    for summary in &mut summaries {
        summary.elapsed = format_duration(summary.duration());
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tollscope_common::records::TagId;

    fn at(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 10, 5)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            + Duration::minutes(minute)
    }

    fn crossing(id: i64, minute: i64, location: &str, plate: Option<&str>, tag: Option<TagId>) -> TransactionRecord {
        TransactionRecord {
            transaction_id: id,
            timestamp: at(minute),
            location_code: location.to_string(),
            transponder_id: tag,
            plate: plate.map(str::to_string),
        }
    }

    #[test]
    fn test_residual_pool_order() {
        let table = RecordTable::from_records(vec![
            crossing(1, 0, "NB01", Some("AAA"), None),
            crossing(2, 0, "NB01", Some("XYZ"), None),
        ])
        .unwrap();
        let resolver = RelatedTransactionResolver::new(&table);
        let mut pool = ResidualPool::new(2);

        assert_eq!(pool.next_seed(), Some(0));
        pool.retire(&resolver.resolve_row(0, pool.assigned()));
        assert_eq!(pool.remaining(), 1);
        assert_eq!(pool.next_seed(), Some(1));
        pool.retire(&resolver.resolve_row(1, pool.assigned()));
        assert!(pool.is_empty());
        assert_eq!(pool.next_seed(), None);
    }

    #[test]
    fn test_two_vehicles_two_trips_each() {
        let table = RecordTable::from_records(vec![
            crossing(10, 0, "SB01", Some("KLM"), Some(5)),
            crossing(20, 1, "NB01", Some("XYZ"), None),
            crossing(11, 10, "SB02", None, Some(5)),
            crossing(21, 12, "NB02", Some("XYZ"), None),
            crossing(12, 90, "SB03", Some("KLM"), None),
            crossing(22, 14, "NB03", Some("XYZ"), None),
            crossing(13, 95, "SB04", Some("KLM"), Some(5)),
            crossing(23, 200, "NB04", Some("XYZ"), None),
        ])
        .unwrap();

        let builder = TripBuilder::new(&table, &TripSettings::default());
        let mut sequence = TripSequence::new();
        let output = builder.build(&mut sequence);

        let ids: Vec<(i64, u64)> = output
            .rows
            .iter()
            .map(|r| (r.record.transaction_id, r.trip_id))
            .collect();
        assert_eq!(
            ids,
            vec![
                (10, 1),
                (11, 1),
                (12, 2),
                (13, 2),
                (20, 3),
                (21, 3),
                (22, 3),
                (23, 3),
            ]
        );
        assert_eq!(output.closures, 2);
        assert_eq!(output.trips, 3);
    }

    #[test]
    fn test_asymmetric_variants_emit_each_row_once() {
        // Seed "O" first: its closure cannot reach "D", which then seeds alone
        let table = RecordTable::from_records(vec![
            crossing(1, 0, "NB01", Some("O"), None),
            crossing(2, 5, "NB02", Some("D"), None),
        ])
        .unwrap();

        let output = TripBuilder::new(&table, &TripSettings::default()).build(&mut TripSequence::new());
        let ids: Vec<i64> = output.rows.iter().map(|r| r.record.transaction_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(output.closures, 2);
    }

    #[test]
    fn test_sequence_resumes_across_batches() {
        let table = RecordTable::from_records(vec![crossing(1, 0, "NB01", Some("ABC"), None)]).unwrap();
        let mut sequence = TripSequence::starting_after(100);
        let output = TripBuilder::new(&table, &TripSettings::default()).build(&mut sequence);
        assert_eq!(output.rows[0].trip_id, 101);
        assert_eq!(output.trips, 1);
    }

    #[test]
    fn test_empty_table() {
        let table = RecordTable::default();
        let output = TripBuilder::new(&table, &TripSettings::default()).build(&mut TripSequence::new());
        assert!(output.rows.is_empty());
        assert_eq!(output.closures, 0);
    }

    #[test]
    fn test_summarize_trips() {
        let table = RecordTable::from_records(vec![
            crossing(1, 0, "SB01", Some("KLM"), None),
            crossing(2, 4, "SB02", Some("KLM"), None),
            crossing(3, 9, "SB03", Some("KLM"), None),
        ])
        .unwrap();
        let output = TripBuilder::new(&table, &TripSettings::default()).build(&mut TripSequence::new());
        let summaries = summarize_trips(&output.rows);

        assert_eq!(summaries.len(), 1);
        let trip = &summaries[0];
        assert_eq!(trip.trip_id, 1);
        assert_eq!(trip.record_count, 3);
        assert_eq!(trip.entry_location, "SB01");
        assert_eq!(trip.exit_location, "SB03");
        assert_eq!(trip.direction_zone, "SB");
        assert_eq!(trip.path, vec!["SB01", "SB02", "SB03"]);
        assert_eq!(trip.duration(), Duration::minutes(9));
        assert_eq!(trip.elapsed, "9:00");
    }
}
