//! Sampled aggregate: the ordered, disjoint pages of one result
//!
//! Every page carries every source of the aggregate, padded with null
//! columns where it had none, so a source's full time-series is the
//! concatenation of its page columns. Derived sequences are built on first
//! use and cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::sampled_block::SampledBlock;
use super::DataTable;
use crate::error::{Error, Result};
use crate::resolution::{verify_disjoint, ResolvedBlock};
use crate::types::{TimeRange, Timestamp, Value, ValueType};

/// Ordered sequence of time-disjoint sampled blocks
#[derive(Debug, Default)]
pub struct SampledAggregate {
    blocks: Vec<SampledBlock>,
    /// Union of all sources with their declared types
    sources: BTreeMap<String, ValueType>,
    sample_count: usize,
    timestamps_cache: RwLock<Option<Arc<[Timestamp]>>>,
    series_cache: RwLock<HashMap<String, Arc<[Value]>>>,
}

impl SampledAggregate {
    /// Aggregate with no pages
    pub fn empty() -> Self {
        Self::default()
    }

    /// Materialise resolved regions into pages and aggregate them
    pub fn from_resolved(resolved: Vec<ResolvedBlock>) -> Result<Self> {
        let blocks = resolved
            .into_iter()
            .map(SampledBlock::from_resolved)
            .collect::<Result<Vec<_>>>()?;
        Self::from_blocks(blocks)
    }

    /// Aggregate pages, sorting them and padding missing sources
    ///
    /// Fails with `DomainCollision` if two pages overlap and with
    /// `ColumnTypeConflict` if a source is declared with two types.
    pub fn from_blocks(mut blocks: Vec<SampledBlock>) -> Result<Self> {
        blocks.sort_by_key(SampledBlock::start);
        verify_disjoint(blocks.iter().map(SampledBlock::range))?;

        let mut sources: BTreeMap<String, ValueType> = BTreeMap::new();
        for block in &blocks {
            for (name, column) in block.columns() {
                match sources.get(name) {
                    Some(&declared) if declared != column.value_type => {
                        return Err(Error::ColumnTypeConflict {
                            source_name: name.to_string(),
                            expected: declared,
                            actual: column.value_type,
                        });
                    }
                    Some(_) => {}
                    None => {
                        sources.insert(name.to_string(), column.value_type);
                    }
                }
            }
        }

        let mut padded = 0usize;
        for block in &mut blocks {
            for (name, &value_type) in &sources {
                if block.insert_null_time_series(name, value_type) {
                    padded += 1;
                }
            }
            block.verify()?;
        }

        let sample_count: usize = blocks.iter().map(DataTable::row_count).sum();
        debug!(
            pages = blocks.len(),
            sources = sources.len(),
            samples = sample_count,
            padded_columns = padded,
            "Built sampled aggregate"
        );

        Ok(Self {
            blocks,
            sources,
            sample_count,
            timestamps_cache: RwLock::new(None),
            series_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Total rows across all pages
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Number of distinct sources
    pub fn column_count(&self) -> usize {
        self.sources.len()
    }

    /// Source names in sorted order
    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// (name, declared type) pairs in name order
    pub fn source_types(&self) -> impl Iterator<Item = (&str, ValueType)> {
        self.sources.iter().map(|(name, &t)| (name.as_str(), t))
    }

    /// Declared type of a source
    pub fn column_type(&self, name: &str) -> Result<ValueType> {
        self.sources
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    /// True if any page carries the source
    pub fn contains_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Pages in start order
    pub fn blocks(&self) -> &[SampledBlock] {
        &self.blocks
    }

    /// Number of pages
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// True if there are no pages
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Closed range from the first page's start to the last page's end
    pub fn range(&self) -> Option<TimeRange> {
        let first = self.blocks.first()?;
        let last = self.blocks.last()?;
        Some(TimeRange::new_unchecked(first.start(), last.end()))
    }

    /// Concatenated timestamps of all pages
    pub fn timestamps(&self) -> Arc<[Timestamp]> {
        if let Some(cached) = self.timestamps_cache.read().as_ref() {
            return cached.clone();
        }
        let mut cache = self.timestamps_cache.write();
        cache
            .get_or_insert_with(|| {
                trace!(samples = self.sample_count, "Materialising aggregate timestamps");
                self.blocks
                    .iter()
                    .flat_map(|b| b.timestamp_slice().iter().copied())
                    .collect()
            })
            .clone()
    }

    /// Full time-series of one source across all pages
    pub fn time_series(&self, name: &str) -> Result<Arc<[Value]>> {
        if let Some(cached) = self.series_cache.read().get(name) {
            return Ok(cached.clone());
        }
        if !self.contains_source(name) {
            return Err(Error::NoSuchColumn(name.to_string()));
        }

        let mut series = Vec::with_capacity(self.sample_count);
        for block in &self.blocks {
            let column = block.column(name).ok_or_else(|| {
                Error::IllegalState(format!(
                    "page starting at {} lacks padded column {}",
                    block.start(),
                    name
                ))
            })?;
            series.extend(column.values.iter().cloned());
        }
        let series: Arc<[Value]> = series.into();

        let mut cache = self.series_cache.write();
        Ok(cache.entry(name.to_string()).or_insert(series).clone())
    }

    /// Drop every cached derived sequence
    pub fn clear_cache(&self) {
        *self.timestamps_cache.write() = None;
        self.series_cache.write().clear();
    }
}
