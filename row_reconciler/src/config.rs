// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// A raw row of the export, as read by the caller.
///
/// The fields are positionally aligned with the header.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawRecord {
    /// The line number in the source file (1-based), used in error messages.
    pub row: usize,
    pub fields: Vec<String>,
}

// ******** Output data structures *********

/// The bucket a row lands in after looking at its boundary identifiers.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Partition {
    Accepted,
    /// At least one boundary identifier carries the sentinel test value.
    Rejected,
}

/// A boundary identifier pair that does not agree on the same row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BoundaryMismatch {
    pub row: usize,
    pub key: String,
    pub begin: String,
    pub end: String,
}

/// Counters collected during one run.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct ReconcileStats {
    pub rows_read: usize,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
}

/// Errors that prevent the reconciliation from completing successfully.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ReconcileError {
    /// A column required by one of the roles is not in the header.
    MissingColumn { role: ColumnRole, column: String },
    /// The row does not have as many fields as the header.
    MalformedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// A duration value could not be read as an integer.
    DurationParse {
        row: usize,
        key: String,
        column: String,
        value: String,
    },
}

impl Error for ReconcileError {}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::MissingColumn { role, column } => {
                write!(f, "{} column {:?} not found in the header", role, column)
            }
            ReconcileError::MalformedRow {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {}: expected {} fields (header length), found {}",
                row, expected, found
            ),
            ReconcileError::DurationParse {
                row,
                key,
                column,
                value,
            } => write!(
                f,
                "row {} (key {:?}): cannot add {:?} in column {:?} as an integer",
                row, key, value, column
            ),
        }
    }
}

// ********* Configuration **********

/// The semantic role given to a column of the export.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ColumnRole {
    /// The link identifier shared by all the partial rows of a participant.
    Key,
    Duration,
    Contact,
    /// The identifier entered at the beginning of a session.
    BeginId,
    /// The identifier entered at the end of a session.
    EndId,
}

impl Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnRole::Key => "key",
            ColumnRole::Duration => "duration",
            ColumnRole::Contact => "contact",
            ColumnRole::BeginId => "beginning identifier",
            ColumnRole::EndId => "end identifier",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReconcileConfig {
    pub key_column: String,
    pub duration_column: String,
    pub contact_column: String,
    pub begin_id_column: String,
    pub end_id_column: String,
    /// Rows where either boundary identifier equals this value are test submissions.
    pub test_id: String,
    /// Reports rows where the two boundary identifiers differ.
    pub check_boundary_mismatch: bool,
}

impl ReconcileConfig {
    pub const DEFAULT_KEY_COLUMN: &'static str = "LinkID";
    pub const DEFAULT_DURATION_COLUMN: &'static str = "Duration (in seconds)";
    pub const DEFAULT_CONTACT_COLUMN: &'static str = "email";
    pub const DEFAULT_BEGIN_ID_COLUMN: &'static str = "Q99_1";
    pub const DEFAULT_END_ID_COLUMN: &'static str = "SONA_end";
    pub const DEFAULT_TEST_ID: &'static str = "123456";
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            key_column: Self::DEFAULT_KEY_COLUMN.to_string(),
            duration_column: Self::DEFAULT_DURATION_COLUMN.to_string(),
            contact_column: Self::DEFAULT_CONTACT_COLUMN.to_string(),
            begin_id_column: Self::DEFAULT_BEGIN_ID_COLUMN.to_string(),
            end_id_column: Self::DEFAULT_END_ID_COLUMN.to_string(),
            test_id: Self::DEFAULT_TEST_ID.to_string(),
            check_boundary_mismatch: false,
        }
    }
}
