/*!
Merges the partial rows of a survey export into one row per participant.

Survey tools split a session into several rows when a participant resumes it
later. All these rows share a link identifier (the key). This crate folds them
back into one record per key, and sets aside the rows that were marked as test
submissions through a sentinel value in one of the two boundary identifiers.

```
use row_reconciler::*;

let header: Vec<String> = ["LinkID", "Q99_1", "SONA_end", "Duration (in seconds)", "email"]
    .iter()
    .map(|s| s.to_string())
    .collect();
let row = |n: usize, fields: &[&str]| RawRecord {
    row: n,
    fields: fields.iter().map(|s| s.to_string()).collect(),
};
let records = vec![
    row(4, &["L1", "42", "", "30", ""]),
    row(5, &["L1", "", "42", "45", "a@x.com,old"]),
];

let res = reconcile(&header, records, &ReconcileConfig::default())?;
assert_eq!(res.value(Partition::Accepted, "L1", "Duration (in seconds)"), Some("75"));
assert_eq!(res.value(Partition::Accepted, "L1", "email"), Some("a@x.com"));
# Ok::<(), ReconcileError>(())
```
*/

mod config;
use log::{debug, info, warn};

use std::collections::{HashMap, HashSet};

pub use crate::config::*;

// **** Private structures ****

/// The columns of the roles, resolved once against the header.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct ColumnIndices {
    key: usize,
    duration: usize,
    contact: usize,
    begin_id: usize,
    end_id: usize,
}

impl ColumnIndices {
    fn resolve(header: &[String], config: &ReconcileConfig) -> Result<ColumnIndices, ReconcileError> {
        let find = |role: ColumnRole, column: &String| {
            column_index(header, column).ok_or_else(|| ReconcileError::MissingColumn {
                role,
                column: column.clone(),
            })
        };
        Ok(ColumnIndices {
            key: find(ColumnRole::Key, &config.key_column)?,
            duration: find(ColumnRole::Duration, &config.duration_column)?,
            contact: find(ColumnRole::Contact, &config.contact_column)?,
            begin_id: find(ColumnRole::BeginId, &config.begin_id_column)?,
            end_id: find(ColumnRole::EndId, &config.end_id_column)?,
        })
    }

    fn policy(&self, idx: usize) -> FieldPolicy {
        // The contact role takes precedence if both roles point to the same column.
        if idx == self.contact {
            FieldPolicy::FirstTokenOfList
        } else if idx == self.duration {
            FieldPolicy::NumericAccumulate
        } else {
            FieldPolicy::FirstNonEmpty
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum FieldPolicy {
    FirstNonEmpty,
    // Last qualifying value wins, cut at the first comma.
    FirstTokenOfList,
    NumericAccumulate,
}

const LIST_DELIMITER: char = ',';

// **** Public structures ****

/// The merged row for one key. The values follow the order of the header.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReconciledRecord {
    values: Vec<String>,
}

impl ReconciledRecord {
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).map(|s| s.as_str())
    }
}

/// The records of one partition, in order of first appearance of their key.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PartitionRecords {
    positions: HashMap<String, usize>,
    entries: Vec<(String, ReconciledRecord)>,
}

impl PartitionRecords {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ReconciledRecord> {
        self.positions.get(key).map(|pos| &self.entries[*pos].1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReconciledRecord)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut ReconciledRecord> {
        match self.positions.get(key) {
            Some(pos) => Some(&mut self.entries[*pos].1),
            None => None,
        }
    }

    fn insert(&mut self, key: String, record: ReconciledRecord) {
        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push((key, record));
    }
}

/// The outcome of a run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Reconciliation {
    pub header: Vec<String>,
    pub accepted: PartitionRecords,
    pub rejected: PartitionRecords,
    /// Header names that appear more than once. Lookups by name use the first one.
    pub duplicate_header_names: Vec<String>,
    pub boundary_mismatches: Vec<BoundaryMismatch>,
    pub stats: ReconcileStats,
}

impl Reconciliation {
    pub fn partition(&self, partition: Partition) -> &PartitionRecords {
        match partition {
            Partition::Accepted => &self.accepted,
            Partition::Rejected => &self.rejected,
        }
    }

    /// The merged value of a column for a key, looking up the column by name.
    pub fn value(&self, partition: Partition, key: &str, column: &str) -> Option<&str> {
        let idx = column_index(&self.header, column)?;
        self.partition(partition).get(key)?.get(idx)
    }
}

/// The position of a column in the header. The first match wins.
pub fn column_index(header: &[String], column: &str) -> Option<usize> {
    header.iter().position(|name| name == column)
}

/// The names that appear more than once in the header, in order of first appearance.
pub fn duplicate_header_names(header: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut res: Vec<String> = Vec::new();
    for name in header.iter() {
        if !seen.insert(name.as_str()) && !res.contains(name) {
            res.push(name.clone());
        }
    }
    res
}

/// Classifies a row as a test submission if either boundary identifier is the sentinel value.
pub fn classify(fields: &[String], begin_id: usize, end_id: usize, test_id: &str) -> Partition {
    let is_test = |idx: usize| fields.get(idx).map(|s| s == test_id).unwrap_or(false);
    if is_test(begin_id) || is_test(end_id) {
        Partition::Rejected
    } else {
        Partition::Accepted
    }
}

/// Folds the rows of an export, one at a time, into their partition.
///
/// ```
/// use row_reconciler::*;
///
/// let header: Vec<String> = ["LinkID", "Q99_1", "SONA_end", "Duration (in seconds)", "email"]
///     .iter()
///     .map(|s| s.to_string())
///     .collect();
/// let mut rec = Reconciler::new(&header, &ReconcileConfig::default())?;
/// let fields: Vec<String> = ["L1", "123456", "", "12", ""].iter().map(|s| s.to_string()).collect();
/// assert_eq!(rec.add_record(4, fields)?, Partition::Rejected);
/// let res = rec.finish();
/// assert!(res.accepted.is_empty());
/// # Ok::<(), ReconcileError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Reconciler {
    header: Vec<String>,
    columns: ColumnIndices,
    test_id: String,
    check_boundary_mismatch: bool,
    duplicate_header_names: Vec<String>,
    accepted: PartitionRecords,
    rejected: PartitionRecords,
    boundary_mismatches: Vec<BoundaryMismatch>,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Resolves the columns of all the roles. Fails before looking at any row if one is missing.
    pub fn new(header: &[String], config: &ReconcileConfig) -> Result<Reconciler, ReconcileError> {
        let columns = ColumnIndices::resolve(header, config)?;
        debug!("Reconciler::new: columns: {:?}", columns);

        let duplicate_header_names = duplicate_header_names(header);
        if !duplicate_header_names.is_empty() {
            warn!(
                "The following header names are not unique, the merged data may be misaligned: {:?}",
                duplicate_header_names
            );
        }

        Ok(Reconciler {
            header: header.to_vec(),
            columns,
            test_id: config.test_id.clone(),
            check_boundary_mismatch: config.check_boundary_mismatch,
            duplicate_header_names,
            accepted: PartitionRecords::default(),
            rejected: PartitionRecords::default(),
            boundary_mismatches: Vec::new(),
            stats: ReconcileStats::default(),
        })
    }

    pub fn duplicate_header_names(&self) -> &[String] {
        &self.duplicate_header_names
    }

    /// Adds one row, seeding a new record or merging into the existing record for its key.
    ///
    /// `row` is the line number of the row in the source, for error reporting.
    pub fn add_record(&mut self, row: usize, fields: Vec<String>) -> Result<Partition, ReconcileError> {
        if fields.len() != self.header.len() {
            return Err(ReconcileError::MalformedRow {
                row,
                expected: self.header.len(),
                found: fields.len(),
            });
        }

        let cols = self.columns;
        let partition = classify(&fields, cols.begin_id, cols.end_id, &self.test_id);
        let key = fields[cols.key].clone();
        debug!("add_record: row {} key {:?} -> {:?}", row, key, partition);

        let mismatch = if self.check_boundary_mismatch {
            self.boundary_mismatch(row, &key, &fields)
        } else {
            None
        };

        let target = match partition {
            Partition::Accepted => &mut self.accepted,
            Partition::Rejected => &mut self.rejected,
        };
        match target.get_mut(&key) {
            Some(record) => merge_record(record, &fields, &cols, &self.header, row, &key)?,
            None => target.insert(key, ReconciledRecord { values: fields }),
        }

        // Only rows that made it into a record are counted.
        self.stats.rows_read += 1;
        match partition {
            Partition::Accepted => self.stats.accepted_rows += 1,
            Partition::Rejected => self.stats.rejected_rows += 1,
        }
        if let Some(m) = mismatch {
            warn!(
                "row {}: key {:?}: beginning identifier {:?} does not match end identifier {:?}",
                m.row, m.key, m.begin, m.end
            );
            self.boundary_mismatches.push(m);
        }
        Ok(partition)
    }

    fn boundary_mismatch(&self, row: usize, key: &str, fields: &[String]) -> Option<BoundaryMismatch> {
        let begin = &fields[self.columns.begin_id];
        let end = &fields[self.columns.end_id];
        if !begin.is_empty() && !end.is_empty() && begin != end {
            Some(BoundaryMismatch {
                row,
                key: key.to_string(),
                begin: begin.clone(),
                end: end.clone(),
            })
        } else {
            None
        }
    }

    pub fn finish(self) -> Reconciliation {
        info!(
            "Reconciled {} rows: {} participants ({} rows), {} test submissions ({} rows)",
            self.stats.rows_read,
            self.accepted.len(),
            self.stats.accepted_rows,
            self.rejected.len(),
            self.stats.rejected_rows
        );
        Reconciliation {
            header: self.header,
            accepted: self.accepted,
            rejected: self.rejected,
            duplicate_header_names: self.duplicate_header_names,
            boundary_mismatches: self.boundary_mismatches,
            stats: self.stats,
        }
    }
}

/// Runs the reconciliation over all the rows of an export.
///
/// Arguments:
/// * `header` the names of the columns
/// * `records` the rows, in file order
/// * `config` the names of the columns with a special role
pub fn reconcile<I>(
    header: &[String],
    records: I,
    config: &ReconcileConfig,
) -> Result<Reconciliation, ReconcileError>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut rec = Reconciler::new(header, config)?;
    for r in records {
        rec.add_record(r.row, r.fields)?;
    }
    Ok(rec.finish())
}

fn merge_record(
    record: &mut ReconciledRecord,
    fields: &[String],
    cols: &ColumnIndices,
    header: &[String],
    row: usize,
    key: &str,
) -> Result<(), ReconcileError> {
    // The sum is checked before touching any field, a failed row leaves the record as it was.
    let mut duration_total = match cols.policy(cols.duration) {
        FieldPolicy::NumericAccumulate => {
            let idx = cols.duration;
            let total = add_integers(&record.values[idx], &fields[idx]).map_err(|value| {
                ReconcileError::DurationParse {
                    row,
                    key: key.to_string(),
                    column: header[idx].clone(),
                    value,
                }
            })?;
            Some(total)
        }
        _ => None,
    };

    for (idx, (current, incoming)) in record.values.iter_mut().zip(fields.iter()).enumerate() {
        match cols.policy(idx) {
            FieldPolicy::FirstNonEmpty => {
                if current.is_empty() {
                    *current = incoming.clone();
                }
            }
            FieldPolicy::FirstTokenOfList => {
                if incoming.chars().count() > 1 {
                    *current = first_token(incoming).to_string();
                } else if current.is_empty() {
                    *current = incoming.clone();
                }
            }
            FieldPolicy::NumericAccumulate => {
                if let Some(total) = duration_total.take() {
                    *current = total;
                }
            }
        }
    }
    Ok(())
}

fn first_token(s: &str) -> &str {
    s.split(LIST_DELIMITER).next().unwrap_or(s)
}

// On failure, returns the value that could not be added.
fn add_integers(current: &str, incoming: &str) -> Result<String, String> {
    let parse = |s: &str| s.trim().parse::<i64>().map_err(|_| s.to_string());
    let a = parse(current)?;
    let b = parse(incoming)?;
    a.checked_add(b)
        .map(|x| x.to_string())
        .ok_or_else(|| incoming.to_string())
}
