//! Correlated blocks: fragments sharing one time axis

use std::collections::BTreeMap;

use crate::clock::TimeAxis;
use crate::error::{Error, Result};
use crate::fragment::RawFragment;
use crate::table::Column;
use crate::types::{TimeRange, Timestamp};

/// Columns from every fragment whose time axis is structurally identical
///
/// Source names are unique within a block and every column holds exactly
/// `sample_count()` values. Blocks order by the start of their axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedBlock {
    axis: TimeAxis,
    columns: BTreeMap<String, Column>,
}

impl CorrelatedBlock {
    /// Create an empty block for a time axis
    pub fn new(axis: TimeAxis) -> Self {
        Self {
            axis,
            columns: BTreeMap::new(),
        }
    }

    /// Create a block seeded with one fragment
    pub fn from_fragment(fragment: RawFragment) -> Result<Self> {
        let mut block = Self::new(fragment.axis.clone());
        block.insert_fragment(fragment)?;
        Ok(block)
    }

    /// The shared time axis
    pub fn axis(&self) -> &TimeAxis {
        &self.axis
    }

    /// First sample instant
    pub fn start(&self) -> Timestamp {
        self.axis.start()
    }

    /// Closed interval covered by the block
    pub fn range(&self) -> TimeRange {
        self.axis.range()
    }

    /// Number of rows
    pub fn sample_count(&self) -> usize {
        self.axis.sample_count()
    }

    /// Number of sources (columns)
    pub fn source_count(&self) -> usize {
        self.columns.len()
    }

    /// True if a column exists for `source`
    pub fn contains_source(&self, source: &str) -> bool {
        self.columns.contains_key(source)
    }

    /// Source names in order
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Column for a source
    pub fn column(&self, source: &str) -> Option<&Column> {
        self.columns.get(source)
    }

    /// (name, column) pairs in name order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, col)| (name.as_str(), col))
    }

    /// Materialise the sample instants
    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.axis.to_vec()
    }

    /// Add a fragment's values as a new column
    ///
    /// The fragment's axis must equal the block's axis. Fails with
    /// `DuplicateSource` if the source already has a column; the block is
    /// left unchanged on any failure.
    pub fn insert_fragment(&mut self, fragment: RawFragment) -> Result<()> {
        if fragment.axis != self.axis {
            return Err(Error::IllegalState(format!(
                "fragment for '{}' on {} routed to block on {}",
                fragment.source, fragment.axis, self.axis
            )));
        }
        let source = fragment.source.clone();
        if self.columns.contains_key(&source) {
            return Err(Error::DuplicateSource {
                source_name: source,
                block_start: self.start(),
            });
        }
        let column = Column::from_fragment(fragment)?;
        self.insert_column(source, column)
    }

    /// Add a named column
    pub fn insert_column(&mut self, source: String, column: Column) -> Result<()> {
        if column.len() != self.sample_count() {
            return Err(Error::InconsistentColumnSize {
                source_name: source,
                block_start: self.start(),
                expected: self.sample_count(),
                actual: column.len(),
            });
        }
        if self.columns.contains_key(&source) {
            return Err(Error::DuplicateSource {
                source_name: source,
                block_start: self.start(),
            });
        }
        self.columns.insert(source, column);
        Ok(())
    }

    /// Approximate memory footprint in bytes
    pub fn memory_size(&self) -> usize {
        self.columns
            .iter()
            .map(|(name, col)| name.len() + col.memory_size())
            .sum()
    }

    /// Split into axis and columns
    pub fn into_parts(self) -> (TimeAxis, BTreeMap<String, Column>) {
        (self.axis, self.columns)
    }
}
