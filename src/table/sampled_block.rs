//! Sampled blocks: materialised table pages
//!
//! A page is built once, either directly from a correlated block (timestamps
//! from its axis, columns moved over) or from a super-domain, in which case
//! the timestamp axis is the sorted union of every contributing block's
//! instants and each source is null wherever no contributing block sampled
//! it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::column::Column;
use super::{DataTable, NULL_VALUE};
use crate::correlation::CorrelatedBlock;
use crate::error::{Error, Result};
use crate::resolution::{ResolvedBlock, SuperDomain};
use crate::types::{TimeRange, Timestamp, Value, ValueType};

/// Ordered timestamps plus uniquely named, equally long columns
#[derive(Debug, Clone, PartialEq)]
pub struct SampledBlock {
    timestamps: Vec<Timestamp>,
    /// Column names in sorted order
    names: Vec<String>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl SampledBlock {
    /// Build a page from sorted timestamps and named columns
    pub fn new(timestamps: Vec<Timestamp>, columns: BTreeMap<String, Column>) -> Result<Self> {
        if timestamps.is_empty() {
            return Err(Error::IllegalState(
                "sampled block without timestamps".to_string(),
            ));
        }
        if let Some(w) = timestamps.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::IllegalState(format!(
                "sampled block timestamps not strictly increasing at {} -> {}",
                w[0], w[1]
            )));
        }
        let (names, columns): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let block = Self {
            timestamps,
            names,
            columns,
            index,
        };
        block.verify()?;
        Ok(block)
    }

    /// Build a page directly from a correlated block
    pub fn from_correlated_block(block: CorrelatedBlock) -> Result<Self> {
        let (axis, columns) = block.into_parts();
        Self::new(axis.to_vec(), columns)
    }

    /// Build a page over the unified timestamp axis of a super-domain
    ///
    /// Where two contributing blocks sample the same source at the same
    /// instant, the earlier block's value is kept.
    pub fn from_super_domain(domain: SuperDomain) -> Result<Self> {
        let blocks = domain.into_blocks();

        let mut unified: Vec<Timestamp> = blocks.iter().flat_map(|b| b.timestamps()).collect();
        unified.sort_unstable();
        unified.dedup();
        let row_count = unified.len();

        let mut columns: BTreeMap<String, Column> = BTreeMap::new();
        let mut shadowed = 0usize;

        for block in blocks {
            // Unified row of each of this block's samples
            let rows = block
                .timestamps()
                .iter()
                .map(|ts| {
                    unified.binary_search(ts).map_err(|_| {
                        Error::IllegalState(format!("timestamp {} missing from unified axis", ts))
                    })
                })
                .collect::<Result<Vec<usize>>>()?;

            let (_, block_columns) = block.into_parts();
            for (name, column) in block_columns {
                let target = columns
                    .entry(name.clone())
                    .or_insert_with(|| Column::nulls(column.value_type, row_count));
                if target.value_type != column.value_type {
                    return Err(Error::ColumnTypeConflict {
                        source_name: name,
                        expected: target.value_type,
                        actual: column.value_type,
                    });
                }
                for (value, &row) in column.values.into_iter().zip(rows.iter()) {
                    if value.is_null() {
                        continue;
                    }
                    let slot = &mut target.values[row];
                    if slot.is_null() {
                        *slot = value;
                    } else {
                        shadowed += 1;
                    }
                }
            }
        }

        if shadowed > 0 {
            debug!(
                shadowed,
                range = %domain_range(&unified),
                "Kept earlier values where super-domain blocks sampled the same instant"
            );
        }

        Self::new(unified, columns)
    }

    /// Build a page from either kind of resolved region
    pub fn from_resolved(resolved: ResolvedBlock) -> Result<Self> {
        match resolved {
            ResolvedBlock::Single(block) => Self::from_correlated_block(block),
            ResolvedBlock::Super(domain) => Self::from_super_domain(domain),
        }
    }

    /// Append an all-null column for `name` unless one exists
    ///
    /// Returns false, changing nothing, if the page already has the column.
    pub fn insert_null_time_series(&mut self, name: &str, value_type: ValueType) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        let pos = self.names.partition_point(|n| n.as_str() < name);
        self.names.insert(pos, name.to_string());
        self.columns
            .insert(pos, Column::nulls(value_type, self.timestamps.len()));
        self.rebuild_index();
        true
    }

    /// Check the row/column consistency invariant
    pub fn verify(&self) -> Result<()> {
        if self.index.len() != self.names.len() || self.names.len() != self.columns.len() {
            return Err(Error::IllegalState(format!(
                "block starting at {} has duplicate column names",
                self.start()
            )));
        }
        for (name, column) in self.names.iter().zip(&self.columns) {
            if column.len() != self.timestamps.len() {
                return Err(Error::InconsistentColumnSize {
                    source_name: name.clone(),
                    block_start: self.start(),
                    expected: self.timestamps.len(),
                    actual: column.len(),
                });
            }
        }
        Ok(())
    }

    /// First timestamp
    pub fn start(&self) -> Timestamp {
        self.timestamps.first().copied().unwrap_or_default()
    }

    /// Last timestamp
    pub fn end(&self) -> Timestamp {
        self.timestamps.last().copied().unwrap_or_default()
    }

    /// Closed range covered by the page
    pub fn range(&self) -> TimeRange {
        TimeRange::new_unchecked(self.start(), self.end())
    }

    /// Timestamp vector
    pub fn timestamp_slice(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Column for a source, if present
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// True if the page carries `name`
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// (name, column) pairs in name order
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    /// Value of source `name` at local row `row`, null if the page lacks it
    pub fn value_or_null(&self, row: usize, name: &str) -> Result<&Value> {
        if row >= self.timestamps.len() {
            return Err(Error::row_out_of_bounds(row, self.timestamps.len()));
        }
        Ok(self
            .column(name)
            .map(|c| &c.values[row])
            .unwrap_or(&NULL_VALUE))
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
    }
}

fn domain_range(unified: &[Timestamp]) -> TimeRange {
    TimeRange::new_unchecked(
        unified.first().copied().unwrap_or_default(),
        unified.last().copied().unwrap_or_default(),
    )
}

impl DataTable for SampledBlock {
    fn row_count(&self) -> usize {
        self.timestamps.len()
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, col: usize) -> Result<&str> {
        self.names
            .get(col)
            .map(String::as_str)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.names.len()))
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    fn column_type(&self, col: usize) -> Result<ValueType> {
        self.columns
            .get(col)
            .map(|c| c.value_type)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))
    }

    fn timestamp(&self, row: usize) -> Result<Timestamp> {
        self.timestamps
            .get(row)
            .copied()
            .ok_or_else(|| Error::row_out_of_bounds(row, self.timestamps.len()))
    }

    fn value(&self, row: usize, col: usize) -> Result<&Value> {
        let column = self
            .columns
            .get(col)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))?;
        column
            .values
            .get(row)
            .ok_or_else(|| Error::row_out_of_bounds(row, self.timestamps.len()))
    }

    fn column_data(&self, col: usize) -> Result<Arc<[Value]>> {
        self.columns
            .get(col)
            .map(|c| Arc::from(c.values.as_slice()))
            .ok_or_else(|| Error::column_out_of_bounds(col, self.columns.len()))
    }

    fn timestamps(&self) -> Vec<Timestamp> {
        self.timestamps.clone()
    }
}
