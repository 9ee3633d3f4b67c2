//! Raw data correlator
//!
//! Groups fragments into [`CorrelatedBlock`]s keyed by structurally equal
//! time axes. Blocks built from different axes are never merged here, even
//! when their time ranges overlap; that is the resolver's job.
//!
//! Batches whose column count exceeds the configured pivot size are inserted
//! on a bounded rayon pool. Every fragment maps to exactly one block, so
//! groups never share a block and the result is identical to serial
//! insertion.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use super::block::CorrelatedBlock;
use crate::clock::TimeAxis;
use crate::config::CorrelationConfig;
use crate::error::{Error, Result};
use crate::fragment::RawFragment;

/// Counters describing the correlator's work since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// Fragments inserted
    pub fragments_processed: u64,
    /// Encoded bytes of inserted fragments
    pub bytes_processed: u64,
    /// Blocks currently held
    pub block_count: usize,
    /// Batches that took the parallel path
    pub parallel_batches: u64,
}

/// Correlates raw fragments into time-ordered blocks
pub struct RawDataCorrelator {
    config: CorrelationConfig,
    /// Time-ordered set of blocks
    blocks: BTreeMap<TimeAxis, CorrelatedBlock>,
    /// Insertion pool, built on first parallel batch
    pool: Option<Arc<rayon::ThreadPool>>,
    fragments_processed: u64,
    bytes_processed: u64,
    parallel_batches: u64,
}

impl RawDataCorrelator {
    /// Create a correlator
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            blocks: BTreeMap::new(),
            pool: None,
            fragments_processed: 0,
            bytes_processed: 0,
            parallel_batches: 0,
        }
    }

    /// Insert one fragment into the block sharing its time axis
    ///
    /// Creates the block if none exists. Fails with `DuplicateSource` if the
    /// block already has a column for the fragment's source.
    pub fn process(&mut self, fragment: RawFragment) -> Result<()> {
        fragment.validate()?;
        let bytes = fragment.serialized_size as u64;

        match self.blocks.get_mut(&fragment.axis) {
            Some(block) => block.insert_fragment(fragment)?,
            None => {
                let block = CorrelatedBlock::from_fragment(fragment)?;
                self.blocks.insert(block.axis().clone(), block);
            }
        }

        self.fragments_processed += 1;
        self.bytes_processed += bytes;
        Ok(())
    }

    /// Insert a batch of fragments
    ///
    /// The whole batch is validated first; a malformed fragment rejects the
    /// batch before any block is touched. A structural failure (duplicate
    /// source) rejects only the offending fragment; every other fragment is
    /// still inserted and the first failure in time order is returned.
    pub fn process_batch(&mut self, fragments: Vec<RawFragment>) -> Result<()> {
        if fragments.is_empty() {
            return Ok(());
        }
        for fragment in &fragments {
            fragment.validate()?;
        }

        let column_count = fragments.len();
        let mut groups: BTreeMap<TimeAxis, Vec<RawFragment>> = BTreeMap::new();
        for fragment in fragments {
            groups.entry(fragment.axis.clone()).or_default().push(fragment);
        }

        // Detach target blocks so each group owns its block exclusively
        let work: Vec<(CorrelatedBlock, Vec<RawFragment>)> = groups
            .into_iter()
            .map(|(axis, group)| {
                let block = self
                    .blocks
                    .remove(&axis)
                    .unwrap_or_else(|| CorrelatedBlock::new(axis));
                (block, group)
            })
            .collect();

        let parallel = self.config.concurrency_enabled && column_count > self.config.pivot_size;
        let results: Vec<(CorrelatedBlock, u64, u64, Option<Error>)> = if parallel {
            let pool = self.pool()?;
            self.parallel_batches += 1;
            pool.install(|| work.into_par_iter().map(insert_group).collect())
        } else {
            work.into_iter().map(insert_group).collect()
        };

        debug!(
            columns = column_count,
            groups = results.len(),
            parallel,
            "Correlated fragment batch"
        );

        let mut first_error = None;
        for (block, inserted, bytes, error) in results {
            self.fragments_processed += inserted;
            self.bytes_processed += bytes;
            if block.source_count() > 0 {
                self.blocks.insert(block.axis().clone(), block);
            }
            if first_error.is_none() {
                first_error = error;
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Time-ordered view of the current blocks
    pub fn correlated_set(&self) -> impl Iterator<Item = &CorrelatedBlock> {
        self.blocks.values()
    }

    /// Hand the time-ordered blocks over and leave the correlator empty
    ///
    /// Counters are kept until `reset`.
    pub fn take_correlated_set(&mut self) -> Vec<CorrelatedBlock> {
        std::mem::take(&mut self.blocks).into_values().collect()
    }

    /// Consume the correlator, yielding its time-ordered blocks
    pub fn into_correlated_set(self) -> Vec<CorrelatedBlock> {
        self.blocks.into_values().collect()
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Encoded bytes processed since the last reset
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Current counters
    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            fragments_processed: self.fragments_processed,
            bytes_processed: self.bytes_processed,
            block_count: self.blocks.len(),
            parallel_batches: self.parallel_batches,
        }
    }

    /// Clear all blocks and counters for reuse on another request
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.fragments_processed = 0;
        self.bytes_processed = 0;
        self.parallel_batches = 0;
    }

    fn pool(&mut self) -> Result<Arc<rayon::ThreadPool>> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_threads.max(1))
            .thread_name(|i| format!("correlator-{}", i))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build correlator pool: {}", e)))?;
        let pool = Arc::new(pool);
        self.pool = Some(pool.clone());
        Ok(pool)
    }
}

impl Default for RawDataCorrelator {
    fn default() -> Self {
        Self::new(CorrelationConfig::default())
    }
}

/// Insert one axis group into its block, keeping the first failure
fn insert_group(
    (mut block, group): (CorrelatedBlock, Vec<RawFragment>),
) -> (CorrelatedBlock, u64, u64, Option<Error>) {
    let mut inserted = 0;
    let mut bytes = 0;
    let mut first_error = None;
    for fragment in group {
        let size = fragment.serialized_size as u64;
        match block.insert_fragment(fragment) {
            Ok(()) => {
                inserted += 1;
                bytes += size;
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    (block, inserted, bytes, first_error)
}
