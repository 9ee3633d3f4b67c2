//! Error types for result assembly
//!
//! Errors fall into four families that callers are expected to treat
//! differently:
//!
//! - **Malformed input**: a fragment or request that cannot be ingested
//! - **Structural inconsistency**: data that contradicts the block/table model
//! - **Invariant violation**: resolved domains that still overlap (fatal)
//! - **Caller errors**: unknown columns, out-of-range indices, bad parameters
//!
//! Timeouts are reported separately so "not enough time" is never confused
//! with "the data is contradictory".

use crate::types::{format_timestamp, TimeRange, Timestamp, ValueType};
use thiserror::Error;

/// Main error type for the assembly pipeline
#[derive(Error, Debug)]
pub enum Error {
    // === Malformed input ===
    /// Fragment failed validation at ingestion
    #[error("Malformed fragment for source '{source_name}': {reason}")]
    MalformedFragment {
        /// Source name carried by the offending fragment
        source_name: String,
        /// What was wrong with it
        reason: String,
    },

    /// Fragment carries a value type the column model does not support
    #[error("Unsupported value type {value_type} for source '{source_name}'")]
    UnsupportedType {
        /// Source name carried by the offending fragment
        source_name: String,
        /// The rejected wire tag
        value_type: ValueType,
    },

    /// Sampling clock parameters are invalid
    #[error("Invalid sampling clock: {0}")]
    InvalidClock(String),

    /// Query domain is invalid
    #[error("Invalid query domain: {0}")]
    InvalidDomain(String),

    // === Structural inconsistency ===
    /// A block already holds a column for this source
    #[error("Duplicate source '{source_name}' in block starting at {}", format_timestamp(.block_start))]
    DuplicateSource {
        /// Source name inserted twice
        source_name: String,
        /// Start instant of the target block
        block_start: Timestamp,
    },

    /// A column length disagrees with its block's row count
    #[error(
        "Column '{source_name}' in block starting at {} has {actual} values, expected {expected}",
        format_timestamp(.block_start)
    )]
    InconsistentColumnSize {
        /// Source name of the bad column
        source_name: String,
        /// Start instant of the block
        block_start: Timestamp,
        /// Row count of the block
        expected: usize,
        /// Actual column length
        actual: usize,
    },

    /// The same source is carried with different value types
    #[error("Source '{source_name}' has type {actual}, previously seen as {expected}")]
    ColumnTypeConflict {
        /// Source name
        source_name: String,
        /// Type seen first
        expected: ValueType,
        /// Conflicting type
        actual: ValueType,
    },

    // === Invariant violation ===
    /// Two resolved regions still intersect after collision resolution
    #[error("Domain collision between {first} and {second}")]
    DomainCollision {
        /// Earlier region
        first: TimeRange,
        /// Later region that intersects it
        second: TimeRange,
    },

    // === Caller errors ===
    /// Unknown column name
    #[error("No such column: {0}")]
    NoSuchColumn(String),

    /// Row or column index out of range
    #[error("{kind} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// "row" or "column"
        kind: &'static str,
        /// Requested index
        index: usize,
        /// Valid length
        len: usize,
    },

    /// Internal logic reached a state it must never be in
    #[error("Illegal state: {0}")]
    IllegalState(String),

    // === Runtime ===
    /// Assembly did not finish within its time limit; partial results were discarded
    #[error("Assembly incomplete after {elapsed_ms}ms: {completed}/{total} sub-queries finished")]
    Timeout {
        /// Elapsed time when the limit fired
        elapsed_ms: u64,
        /// Sub-queries that completed
        completed: usize,
        /// Sub-queries issued
        total: usize,
    },

    /// Push attempted after the hand-off buffer stopped accepting
    #[error("Fragment buffer is no longer accepting fragments")]
    BufferInactive,

    /// Channel closed unexpectedly
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Fragment stream failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// Background task panicked or was aborted
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a malformed-fragment error
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedFragment {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a row index error
    pub fn row_out_of_bounds(index: usize, len: usize) -> Self {
        Error::IndexOutOfBounds {
            kind: "row",
            index,
            len,
        }
    }

    /// Create a column index error
    pub fn column_out_of_bounds(index: usize, len: usize) -> Self {
        Error::IndexOutOfBounds {
            kind: "column",
            index,
            len,
        }
    }

    /// True if the assembly ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// True for data-contract faults and invariant violations
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::DuplicateSource { .. }
                | Error::InconsistentColumnSize { .. }
                | Error::ColumnTypeConflict { .. }
                | Error::DomainCollision { .. }
        )
    }

    /// True for malformed fragments, clocks and domains
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Error::MalformedFragment { .. }
                | Error::UnsupportedType { .. }
                | Error::InvalidClock(_)
                | Error::InvalidDomain(_)
        )
    }

    /// True for local, recoverable usage errors
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::NoSuchColumn(_) | Error::IndexOutOfBounds { .. } | Error::IllegalState(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
