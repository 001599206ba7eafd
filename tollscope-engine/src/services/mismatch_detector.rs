//! AVI mismatch detection
//!
//! Walks a record table in row order against a [`ConfidenceDictionary`] and
//! flags crossings whose plate is tied to a confirmed tag but whose tag read
//! differs or is missing. Such a crossing is most likely a tag the AVI reader
//! failed to see, and the dictionary's tag is reported as the missed tag.
//!
//! Row order matters: a pairing only counts as confirmed after enough matching
//! reads earlier in the stream.

use serde::Serialize;
use tollscope_common::records::TagId;
use tollscope_common::{RecordTable, Result, TransactionRecord};
use tracing::{debug, info};

use super::confidence_dictionary::{ConfidenceDictionary, DictionaryEntry};
use super::plate_expander;
use crate::config::{validate_read_threshold, AviSettings};

/// Mismatch outcome for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MismatchFlag {
    pub transaction_id: i64,
    pub mismatch: bool,
    /// Dictionary tag for the plate; `None` unless `mismatch` is true and the
    /// entry holds a tag
    pub missed_tag_id: Option<TagId>,
}

/// A record with its mismatch outcome attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedRecord {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub mismatch: bool,
    pub missed_tag_id: Option<TagId>,
}

/// Flags for every row of one table, in row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MismatchReport {
    pub flags: Vec<MismatchFlag>,
}

impl MismatchReport {
    pub fn flagged_count(&self) -> usize {
        self.flags.iter().filter(|f| f.mismatch).count()
    }

    pub fn flagged(&self) -> impl Iterator<Item = &MismatchFlag> {
        self.flags.iter().filter(|f| f.mismatch)
    }

    /// Attach flags to the table rows they were computed from
    pub fn annotate(&self, table: &RecordTable) -> Vec<AnnotatedRecord> {
        table
            .records()
            .iter()
            .zip(&self.flags)
            .map(|(record, flag)| AnnotatedRecord {
                record: record.clone(),
                mismatch: flag.mismatch,
                missed_tag_id: flag.missed_tag_id,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MismatchDetector {
    read_threshold: u32,
    exact_plates: bool,
}

impl MismatchDetector {
    /// # Errors
    ///
    /// `InvalidInput` when `read_threshold` is below 1.
    pub fn new(read_threshold: i64, exact_plates: bool) -> Result<Self> {
        Ok(Self {
            read_threshold: validate_read_threshold(read_threshold)?,
            exact_plates,
        })
    }

    pub fn from_settings(settings: &AviSettings) -> Self {
        Self {
            read_threshold: settings.read_threshold,
            exact_plates: settings.exact_plates,
        }
    }

    pub fn read_threshold(&self) -> u32 {
        self.read_threshold
    }

    /// Update the dictionary from the table and flag mismatches
    ///
    /// **Per row, per candidate plate** (the plate read, plus its OCR
    /// variants when matching is not exact):
    /// - unknown plate: seeded with this row's tag read (even when there is
    ///   none) and zero reads, dynamic mode only
    /// - known plate, same tag read: read count incremented
    /// - known plate, different or missing tag read: flagged when the stored
    ///   read count has reached the threshold
    ///
    /// Rows without a plate read are never flagged.
    pub fn detect(&self, table: &RecordTable, dictionary: &mut ConfidenceDictionary) -> MismatchReport {
        let mut report = MismatchReport {
            flags: Vec::with_capacity(table.len()),
        };
        let mut seeded = 0usize;

        for record in table.records() {
            let triggered = match record.plate_read() {
                Some(plate) => self.check_row(plate, record.transponder_id, dictionary, &mut seeded),
                None => None,
            };
            report.flags.push(MismatchFlag {
                transaction_id: record.transaction_id,
                mismatch: triggered.is_some(),
                missed_tag_id: triggered.and_then(|entry| entry.tag_id),
            });
        }

        info!(
            rows = table.len(),
            flagged = report.flagged_count(),
            seeded,
            dictionary_size = dictionary.len(),
            mode = ?dictionary.mode(),
            "Mismatch detection complete"
        );

        report
    }

    fn check_row(
        &self,
        plate: &str,
        tag: Option<TagId>,
        dictionary: &mut ConfidenceDictionary,
        seeded: &mut usize,
    ) -> Option<DictionaryEntry> {
        let candidates = if self.exact_plates {
            vec![plate.to_string()]
        } else {
            plate_expander::lookup_order(plate)
        };

        let mut missed = None;
        for candidate in &candidates {
            match dictionary.get_mut(candidate) {
                Some(entry) if tag.is_some() && entry.tag_id == tag => {
                    entry.read_count += 1;
                }
                Some(entry) => {
                    if entry.read_count >= self.read_threshold && missed.is_none() {
                        debug!(
                            plate = %candidate,
                            expected_tag = ?entry.tag_id,
                            observed_tag = ?tag,
                            read_count = entry.read_count,
                            "Plate read without its confirmed tag"
                        );
                        missed = Some(*entry);
                    }
                }
                None => {
                    if dictionary.seed(candidate, tag) {
                        *seeded += 1;
                    }
                }
            }
        }
        missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn table(rows: &[(i64, Option<TagId>, Option<&str>)]) -> RecordTable {
        let base = NaiveDate::from_ymd_opt(2020, 10, 5)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        RecordTable::from_records(
            rows.iter()
                .enumerate()
                .map(|(i, &(id, tag, plate))| TransactionRecord {
                    transaction_id: id,
                    timestamp: base + Duration::minutes(i as i64),
                    location_code: "SB01".to_string(),
                    transponder_id: tag,
                    plate: plate.map(str::to_string),
                })
                .collect(),
        )
        .unwrap()
    }

    fn flags(report: &MismatchReport) -> Vec<bool> {
        report.flags.iter().map(|f| f.mismatch).collect()
    }

    #[test]
    fn test_threshold_reached_after_six_matches() {
        let mut rows: Vec<(i64, Option<TagId>, Option<&str>)> =
            (1..=6).map(|id| (id, Some(123), Some("ABC"))).collect();
        rows.push((7, Some(321), Some("ABC")));
        let t = table(&rows);

        let detector = MismatchDetector::new(5, true).unwrap();
        let mut dict = ConfidenceDictionary::dynamic();
        let report = detector.detect(&t, &mut dict);

        assert_eq!(flags(&report), vec![false, false, false, false, false, false, true]);
        assert_eq!(report.flags[6].missed_tag_id, Some(123));
        assert!(report.flags[..6].iter().all(|f| f.missed_tag_id.is_none()));
        assert_eq!(dict.get("ABC"), Some(&DictionaryEntry { tag_id: Some(123), read_count: 5 }));
    }

    #[test]
    fn test_below_threshold_never_flags() {
        let t = table(&[(1, Some(217), Some("DF")), (2, Some(298), Some("DF"))]);
        let detector = MismatchDetector::new(5, true).unwrap();
        let report = detector.detect(&t, &mut ConfidenceDictionary::dynamic());
        assert_eq!(report.flagged_count(), 0);
    }

    #[test]
    fn test_missing_tag_flags_confirmed_plate() {
        let t = table(&[
            (1, Some(55), Some("XYZ")),
            (2, Some(55), Some("XYZ")),
            (3, Some(55), Some("XYZ")),
            (4, None, Some("XYZ")),
        ]);
        let detector = MismatchDetector::new(2, true).unwrap();
        let report = detector.detect(&t, &mut ConfidenceDictionary::dynamic());
        assert_eq!(flags(&report), vec![false, false, false, true]);
        assert_eq!(report.flags[3].missed_tag_id, Some(55));
    }

    #[test]
    fn test_tagless_first_sighting_seeds_unconfirmable_entry() {
        let mut rows: Vec<(i64, Option<TagId>, Option<&str>)> = vec![(1, None, Some("ABC"))];
        rows.extend((2..=7).map(|id| (id, Some(123), Some("ABC"))));
        rows.push((8, Some(321), Some("ABC")));
        let t = table(&rows);

        let detector = MismatchDetector::new(5, true).unwrap();
        let mut dict = ConfidenceDictionary::dynamic();
        let report = detector.detect(&t, &mut dict);

        assert_eq!(dict.get("ABC"), Some(&DictionaryEntry { tag_id: None, read_count: 0 }));
        assert_eq!(report.flagged_count(), 0);
    }

    #[test]
    fn test_missing_tag_never_confirms_tagless_entry() {
        let mut dict = ConfidenceDictionary::fixed([("XYZ", DictionaryEntry { tag_id: None, read_count: 0 })]);
        let t = table(&[(1, None, Some("XYZ")), (2, None, Some("XYZ"))]);
        let report = MismatchDetector::new(1, true).unwrap().detect(&t, &mut dict);
        assert_eq!(report.flagged_count(), 0);
        assert_eq!(dict.get("XYZ").unwrap().read_count, 0);
    }

    #[test]
    fn test_confirmed_tagless_entry_flags_without_missed_tag() {
        let mut dict = ConfidenceDictionary::fixed([("XYZ", DictionaryEntry { tag_id: None, read_count: 9 })]);
        let t = table(&[(1, Some(5), Some("XYZ"))]);
        let report = MismatchDetector::new(5, true).unwrap().detect(&t, &mut dict);
        assert!(report.flags[0].mismatch);
        assert_eq!(report.flags[0].missed_tag_id, None);
    }

    #[test]
    fn test_rows_without_plate_pass_through() {
        let t = table(&[(1, Some(5), None), (2, None, Some(" "))]);
        let detector = MismatchDetector::new(1, true).unwrap();
        let mut dict = ConfidenceDictionary::dynamic();
        let report = detector.detect(&t, &mut dict);
        assert_eq!(flags(&report), vec![false, false]);
        assert!(dict.is_empty());
    }

    #[test]
    fn test_static_dictionary_flags_first_sighting() {
        let mut dict = ConfidenceDictionary::fixed([("ZB", DictionaryEntry { tag_id: Some(3854), read_count: 8 })]);
        let t = table(&[(1, None, Some("ZB")), (2, Some(1), Some("NEW"))]);
        let detector = MismatchDetector::new(5, true).unwrap();
        let report = detector.detect(&t, &mut dict);

        assert_eq!(flags(&report), vec![true, false]);
        assert_eq!(report.flags[0].missed_tag_id, Some(3854));
        assert!(dict.get("NEW").is_none());
    }

    #[test]
    fn test_static_dictionary_still_counts_confirmations() {
        let mut dict = ConfidenceDictionary::fixed([("ZB", DictionaryEntry { tag_id: Some(3854), read_count: 4 })]);
        let t = table(&[(1, Some(3854), Some("ZB")), (2, None, Some("ZB"))]);
        let report = MismatchDetector::new(5, true).unwrap().detect(&t, &mut dict);
        assert_eq!(flags(&report), vec![false, true]);
        assert_eq!(dict.get("ZB").unwrap().read_count, 5);
    }

    #[test]
    fn test_variant_matching_catches_misread_plate() {
        let mut dict = ConfidenceDictionary::fixed([("AB1", DictionaryEntry { tag_id: Some(9), read_count: 10 })]);
        // "4B1" is an OCR variant of "AB1"
        let t = table(&[(1, None, Some("4B1"))]);

        let exact = MismatchDetector::new(5, true).unwrap().detect(&t, &mut dict.clone());
        assert_eq!(exact.flagged_count(), 0);

        let fuzzy = MismatchDetector::new(5, false).unwrap().detect(&t, &mut dict);
        assert_eq!(fuzzy.flagged_count(), 1);
        assert_eq!(fuzzy.flags[0].missed_tag_id, Some(9));
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(MismatchDetector::new(0, true).is_err());
    }

    #[test]
    fn test_annotate_preserves_rows() {
        let t = table(&[(1, Some(5), Some("A")), (2, None, Some("B"))]);
        let report = MismatchDetector::new(1, true)
            .unwrap()
            .detect(&t, &mut ConfidenceDictionary::dynamic());
        let annotated = report.annotate(&t);
        assert_eq!(annotated.len(), 2);
        assert_eq!(annotated[1].record.transaction_id, 2);
        assert!(!annotated[1].mismatch);
    }
}
