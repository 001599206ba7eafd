//! Related transaction resolution
//!
//! Gathers every record that belongs to one vehicle's activity, starting from a
//! seed crossing: any record sharing a plate variant or a non-null transponder
//! id with a record already gathered joins the closure, until a fixed point.
//!
//! Lookups go through an [`IdentityIndex`] built once per table, so each
//! expansion step is a hash lookup instead of a table scan.

use std::collections::{HashMap, HashSet};

use tollscope_common::records::TagId;
use tollscope_common::{Error, RecordTable, Result, TransactionRecord};
use tracing::debug;

use super::plate_expander;

/// Plate and transponder lookup over one record table
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_plate: HashMap<String, Vec<usize>>,
    by_tag: HashMap<TagId, Vec<usize>>,
    by_transaction: HashMap<i64, usize>,
}

impl IdentityIndex {
    /// Index every row; row lists keep table order
    pub fn build(table: &RecordTable) -> Self {
        let mut index = Self::default();
        for (row, record) in table.records().iter().enumerate() {
            if let Some(plate) = record.plate_read() {
                index.by_plate.entry(plate.to_string()).or_default().push(row);
            }
            if let Some(tag) = record.transponder_id {
                index.by_tag.entry(tag).or_default().push(row);
            }
            index.by_transaction.insert(record.transaction_id, row);
        }
        index
    }

    /// Rows whose plate read equals `plate` exactly
    pub fn rows_with_plate(&self, plate: &str) -> &[usize] {
        self.by_plate.get(plate).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows whose transponder read equals `tag`
    pub fn rows_with_tag(&self, tag: TagId) -> &[usize] {
        self.by_tag.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row position of a transaction id
    pub fn row_of(&self, transaction_id: i64) -> Option<usize> {
        self.by_transaction.get(&transaction_id).copied()
    }
}

/// Seed-rooted set of transitively linked rows
///
/// Rows are kept in discovery order, seed first. A closure is built for one
/// segmentation step and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureSet {
    rows: Vec<usize>,
    members: HashSet<usize>,
}

impl ClosureSet {
    fn seeded(seed_row: usize) -> Self {
        Self {
            rows: vec![seed_row],
            members: HashSet::from([seed_row]),
        }
    }

    fn merge(&mut self, rows: &[usize], excluded: &[bool]) {
        for &row in rows {
            if excluded.get(row).copied().unwrap_or(false) {
                continue;
            }
            if self.members.insert(row) {
                self.rows.push(row);
            }
        }
    }

    /// Row positions in discovery order
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn seed_row(&self) -> usize {
        self.rows[0]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_row(&self, row: usize) -> bool {
        self.members.contains(&row)
    }

    /// Member records, in discovery order
    pub fn records<'t>(&self, table: &'t RecordTable) -> Vec<&'t TransactionRecord> {
        self.rows.iter().filter_map(|&row| table.row(row)).collect()
    }

    /// Member transaction ids, in discovery order
    pub fn transaction_ids(&self, table: &RecordTable) -> Vec<i64> {
        self.records(table).iter().map(|r| r.transaction_id).collect()
    }
}

/// Resolves closures over one record table
pub struct RelatedTransactionResolver<'a> {
    table: &'a RecordTable,
    index: IdentityIndex,
}

impl<'a> RelatedTransactionResolver<'a> {
    pub fn new(table: &'a RecordTable) -> Self {
        Self {
            table,
            index: IdentityIndex::build(table),
        }
    }

    pub fn table(&self) -> &'a RecordTable {
        self.table
    }

    /// Resolve the closure of a seed transaction over the whole table
    ///
    /// # Errors
    ///
    /// `NotFound` when the seed transaction id is not in the table.
    pub fn resolve(&self, seed_transaction_id: i64) -> Result<ClosureSet> {
        let seed_row = self.index.row_of(seed_transaction_id).ok_or_else(|| {
            Error::NotFound(format!("transaction_id {} not in table", seed_transaction_id))
        })?;
        Ok(self.resolve_row(seed_row, &[]))
    }

    /// Resolve the closure of a seed row, ignoring rows flagged in `excluded`
    ///
    /// `excluded` is indexed by row position; rows past its end are eligible.
    /// The seed itself is always a member.
    ///
    /// **Algorithm:**
    /// A cursor walks the growing closure list. For the record under the
    /// cursor, every not-yet-seen variant of its plate and its not-yet-seen
    /// transponder id pull in all matching eligible rows. The walk ends when
    /// the cursor reaches the end of the list, i.e. the last pass added
    /// nothing new.
    pub fn resolve_row(&self, seed_row: usize, excluded: &[bool]) -> ClosureSet {
        let mut closure = ClosureSet::seeded(seed_row);
        let mut seen_plates: HashSet<String> = HashSet::new();
        let mut seen_tags: HashSet<TagId> = HashSet::new();
        let mut cursor = 0;

        while cursor < closure.rows.len() {
            let row = closure.rows[cursor];
            let Some(record) = self.table.row(row) else {
                cursor += 1;
                continue;
            };

            if let Some(plate) = record.plate_read() {
                for variant in plate_expander::lookup_order(plate) {
                    if seen_plates.contains(&variant) {
                        continue;
                    }
                    closure.merge(self.index.rows_with_plate(&variant), excluded);
                    seen_plates.insert(variant);
                }
            }

            if let Some(tag) = record.transponder_id {
                if seen_tags.insert(tag) {
                    closure.merge(self.index.rows_with_tag(tag), excluded);
                }
            }

            cursor += 1;
        }

        debug!(
            seed_row,
            closure_size = closure.len(),
            plates = seen_plates.len(),
            tags = seen_tags.len(),
            "Resolved closure"
        );

        closure
    }
}
