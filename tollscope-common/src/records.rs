//! Transaction record model
//!
//! Records arrive from the ingestion side already normalized: one row per lane
//! crossing with a unique transaction id, a timestamp, the plaza location code
//! and whatever identity evidence the lane captured (transponder read, plate
//! read, both or neither).
//!
//! Records are immutable once loaded. Downstream components attach derived
//! fields in their own output types and never rewrite these.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::time::{deserialize_timestamp, serialize_timestamp};
use crate::{Error, Result};

/// Transponder (AVI tag) identifier as read at the lane
pub type TagId = i64;

/// One lane crossing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique across the whole table
    pub transaction_id: i64,

    /// Crossing time
    #[serde(
        rename = "datetime",
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: NaiveDateTime,

    /// Plaza code with a leading direction token, e.g. "SB03"
    pub location_code: String,

    /// Tag read, if the AVI reader saw one
    #[serde(default)]
    pub transponder_id: Option<TagId>,

    /// Plate read from the lane image, if any
    #[serde(default)]
    pub plate: Option<String>,
}

impl TransactionRecord {
    /// Plate value usable as identity evidence
    ///
    /// Blank plate reads carry no identity and are reported as `None`.
    pub fn plate_read(&self) -> Option<&str> {
        self.plate
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }
}

/// Validated, ordered set of transaction records
///
/// Row order is significant: the trip builder seeds closures in row order and
/// the mismatch detector updates its dictionary in row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    records: Vec<TransactionRecord>,
}

impl RecordTable {
    /// Build a table, rejecting duplicate transaction ids
    pub fn from_records(records: Vec<TransactionRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.transaction_id) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate transaction_id {}",
                    record.transaction_id
                )));
            }
        }
        Ok(Self { records })
    }

    /// Parse a JSON array of records
    ///
    /// A record missing one of the required fields is a validation failure,
    /// not a decoding failure.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let records: Vec<TransactionRecord> = serde_json::from_str(content).map_err(|e| {
            if e.is_data() {
                Error::InvalidInput(format!("Malformed record table: {}", e))
            } else {
                Error::Json(e)
            }
        })?;
        Self::from_records(records)
    }

    /// Load a JSON array of records from disk
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), rows = table.len(), "Loaded record table");
        Ok(table)
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at a row position
    pub fn row(&self, index: usize) -> Option<&TransactionRecord> {
        self.records.get(index)
    }

    /// Earliest and latest crossing times, `None` for an empty table
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.records.first()?.timestamp;
        Some(self.records.iter().fold((first, first), |(lo, hi), r| {
            (lo.min(r.timestamp), hi.max(r.timestamp))
        }))
    }

    /// Rows with `start <= timestamp < end`, keeping row order
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> RecordTable {
        RecordTable {
            records: self
                .records
                .iter()
                .filter(|r| r.timestamp >= start && r.timestamp < end)
                .cloned()
                .collect(),
        }
    }
}
