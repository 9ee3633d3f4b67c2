//! Random-access result tables
//!
//! Three concrete tables implement one [`DataTable`] contract:
//!
//! - [`SampledBlock`]: one materialised page (timestamps + named columns)
//! - [`AggregateTable`]: a lazily indexed view over the ordered pages of a
//!   [`SampledAggregate`], resolving global rows to (page, local row)
//! - [`StaticTable`]: a fully flattened copy, cheapest for repeated
//!   full-column access
//!
//! # Architecture
//!
//! ```text
//! ResolvedBlock ──► SampledBlock ──┐
//! ResolvedBlock ──► SampledBlock ──┼──► SampledAggregate ──► AggregateTable ──► StaticTable
//! ResolvedBlock ──► SampledBlock ──┘     (disjoint pages)      (paged view)      (flattened)
//! ```

pub mod aggregate;
pub mod aggregate_table;
pub mod column;
pub mod sampled_block;
pub mod static_table;

pub use aggregate::SampledAggregate;
pub use aggregate_table::AggregateTable;
pub use column::Column;
pub use sampled_block::SampledBlock;
pub use static_table::{StaticTable, TableFormat};

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Timestamp, Value, ValueType};

/// Shared null returned for sources a page does not carry
pub(crate) static NULL_VALUE: Value = Value::Null;

/// Random-access table contract
///
/// Indices are zero-based. Out-of-range indices fail with
/// `IndexOutOfBounds` and unknown names with `NoSuchColumn`; nothing is
/// clamped.
pub trait DataTable {
    /// Number of rows
    fn row_count(&self) -> usize;

    /// Number of columns (timestamps excluded)
    fn column_count(&self) -> usize;

    /// Name of column `col`
    fn column_name(&self, col: usize) -> Result<&str>;

    /// Index of the column called `name`
    fn column_index(&self, name: &str) -> Result<usize>;

    /// Declared type of column `col`
    fn column_type(&self, col: usize) -> Result<ValueType>;

    /// Timestamp of row `row`
    fn timestamp(&self, row: usize) -> Result<Timestamp>;

    /// Value at (`row`, `col`)
    fn value(&self, row: usize, col: usize) -> Result<&Value>;

    /// Full column `col`
    fn column_data(&self, col: usize) -> Result<Arc<[Value]>>;

    /// True if the table has no rows
    fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Column names in index order
    fn column_names(&self) -> Vec<String> {
        (0..self.column_count())
            .filter_map(|c| self.column_name(c).ok().map(str::to_string))
            .collect()
    }

    /// Value at `row` in the column called `name`
    fn value_by_name(&self, row: usize, name: &str) -> Result<&Value> {
        let col = self.column_index(name)?;
        self.value(row, col)
    }

    /// All values of row `row` in column order
    fn row_values(&self, row: usize) -> Result<Vec<Value>> {
        if row >= self.row_count() {
            return Err(Error::row_out_of_bounds(row, self.row_count()));
        }
        (0..self.column_count())
            .map(|col| self.value(row, col).cloned())
            .collect()
    }

    /// Full column called `name`
    fn column_data_by_name(&self, name: &str) -> Result<Arc<[Value]>> {
        let col = self.column_index(name)?;
        self.column_data(col)
    }

    /// All timestamps in row order
    fn timestamps(&self) -> Vec<Timestamp> {
        (0..self.row_count())
            .filter_map(|row| self.timestamp(row).ok())
            .collect()
    }
}
