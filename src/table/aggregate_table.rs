//! Paged random-access view over a sampled aggregate
//!
//! Global row `r` lives on the page whose first global row is the greatest
//! one not exceeding `r`. Page starts are kept as a prefix-sum vector so the
//! lookup is a binary search. Full columns are concatenated on first request
//! and cached.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::aggregate::SampledAggregate;
use super::sampled_block::SampledBlock;
use super::static_table::StaticTable;
use super::{DataTable, NULL_VALUE};
use crate::error::{Error, Result};
use crate::types::{Timestamp, Value, ValueType};

/// Read-only table view over the pages of one aggregate
#[derive(Debug)]
pub struct AggregateTable {
    aggregate: Arc<SampledAggregate>,
    names: Vec<String>,
    types: Vec<ValueType>,
    name_index: HashMap<String, usize>,
    /// First global row of each page
    page_starts: Vec<usize>,
    row_count: usize,
    column_cache: RwLock<HashMap<usize, Arc<[Value]>>>,
}

impl AggregateTable {
    /// Index an aggregate for random access
    pub fn new(aggregate: Arc<SampledAggregate>) -> Self {
        let (names, types): (Vec<String>, Vec<ValueType>) = aggregate
            .source_types()
            .map(|(name, value_type)| (name.to_string(), value_type))
            .unzip();
        let name_index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        let mut page_starts = Vec::with_capacity(aggregate.block_count());
        let mut row_count = 0;
        for block in aggregate.blocks() {
            page_starts.push(row_count);
            row_count += block.row_count();
        }

        Self {
            aggregate,
            names,
            types,
            name_index,
            page_starts,
            row_count,
            column_cache: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying aggregate
    pub fn aggregate(&self) -> &Arc<SampledAggregate> {
        &self.aggregate
    }

    /// Number of pages
    pub fn page_count(&self) -> usize {
        self.page_starts.len()
    }

    /// Page holding global row `row`
    pub fn page_of_row(&self, row: usize) -> Result<usize> {
        self.locate(row).map(|(page, _)| page)
    }

    /// Resolve a global row to (page index, local row)
    fn locate(&self, row: usize) -> Result<(usize, usize)> {
        if row >= self.row_count {
            return Err(Error::row_out_of_bounds(row, self.row_count));
        }
        let page = self.page_starts.partition_point(|&start| start <= row) - 1;
        Ok((page, row - self.page_starts[page]))
    }

    fn page(&self, page: usize) -> Result<&SampledBlock> {
        self.aggregate.blocks().get(page).ok_or_else(|| {
            Error::IllegalState(format!(
                "page {} missing from aggregate of {} pages",
                page,
                self.aggregate.block_count()
            ))
        })
    }

    /// Copy every row and column into a flat table
    pub fn to_static_table(&self) -> Result<StaticTable> {
        StaticTable::from_table(self)
    }

    /// Release the aggregate and every cache
    ///
    /// The table is empty afterwards. Calling again is a no-op.
    pub fn clear(&mut self) {
        if self.names.is_empty() && self.page_starts.is_empty() {
            return;
        }
        debug!(
            rows = self.row_count,
            pages = self.page_starts.len(),
            "Clearing aggregate table"
        );
        self.column_cache.write().clear();
        self.aggregate.clear_cache();
        self.aggregate = Arc::new(SampledAggregate::empty());
        self.names.clear();
        self.types.clear();
        self.name_index.clear();
        self.page_starts.clear();
        self.row_count = 0;
    }
}

impl DataTable for AggregateTable {
    fn row_count(&self) -> usize {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.names.len()
    }

    fn column_name(&self, col: usize) -> Result<&str> {
        self.names
            .get(col)
            .map(String::as_str)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.names.len()))
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.name_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    fn column_type(&self, col: usize) -> Result<ValueType> {
        self.types
            .get(col)
            .copied()
            .ok_or_else(|| Error::column_out_of_bounds(col, self.types.len()))
    }

    fn timestamp(&self, row: usize) -> Result<Timestamp> {
        let (page, local) = self.locate(row)?;
        self.page(page)?.timestamp(local)
    }

    fn value(&self, row: usize, col: usize) -> Result<&Value> {
        let name = self
            .names
            .get(col)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.names.len()))?;
        let (page, local) = self.locate(row)?;
        match self.page(page)?.column(name) {
            Some(column) => Ok(column.values.get(local).unwrap_or(&NULL_VALUE)),
            None => Ok(&NULL_VALUE),
        }
    }

    fn column_data(&self, col: usize) -> Result<Arc<[Value]>> {
        if let Some(cached) = self.column_cache.read().get(&col) {
            return Ok(cached.clone());
        }
        let name = self
            .names
            .get(col)
            .ok_or_else(|| Error::column_out_of_bounds(col, self.names.len()))?;
        let series = self.aggregate.time_series(name)?;
        self.column_cache.write().insert(col, series.clone());
        Ok(series)
    }

    fn timestamps(&self) -> Vec<Timestamp> {
        self.aggregate.timestamps().to_vec()
    }
}
