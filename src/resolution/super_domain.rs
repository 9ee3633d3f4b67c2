//! Super-domains: groups of time-overlapping correlated blocks

use std::collections::BTreeSet;

use crate::correlation::CorrelatedBlock;
use crate::types::{TimeRange, Timestamp};

/// Two or more correlated blocks whose time ranges intersect
///
/// The range is the union of every contributing block's closed range.
/// Blocks are kept in start-time order and none is ever dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperDomain {
    range: TimeRange,
    blocks: Vec<CorrelatedBlock>,
}

impl SuperDomain {
    /// Start a domain from two colliding blocks
    pub fn new(first: CorrelatedBlock, second: CorrelatedBlock) -> Self {
        let mut domain = Self {
            range: first.range(),
            blocks: Vec::with_capacity(2),
        };
        domain.blocks.push(first);
        domain.push(second);
        domain
    }

    /// Add a block that collides with the domain
    pub fn push(&mut self, block: CorrelatedBlock) {
        self.range = self.range.union(&block.range());
        self.blocks.push(block);
    }

    /// Union of the contributing blocks' ranges
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// First instant
    pub fn start(&self) -> Timestamp {
        self.range.start
    }

    /// Contributing blocks in start order
    pub fn blocks(&self) -> &[CorrelatedBlock] {
        &self.blocks
    }

    /// Number of contributing blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Union of all contributing sources
    pub fn source_names(&self) -> BTreeSet<&str> {
        self.blocks.iter().flat_map(|b| b.source_names()).collect()
    }

    /// Release the contributing blocks
    pub fn into_blocks(self) -> Vec<CorrelatedBlock> {
        self.blocks
    }
}

/// Output of collision resolution: a lone block or a merged domain
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedBlock {
    /// A block that collides with nothing
    Single(CorrelatedBlock),
    /// Blocks that must be reconciled onto one timestamp axis
    Super(SuperDomain),
}

impl ResolvedBlock {
    /// Closed range covered
    pub fn range(&self) -> TimeRange {
        match self {
            ResolvedBlock::Single(block) => block.range(),
            ResolvedBlock::Super(domain) => domain.range(),
        }
    }

    /// First instant
    pub fn start(&self) -> Timestamp {
        self.range().start
    }

    /// True for merged domains
    pub fn is_super_domain(&self) -> bool {
        matches!(self, ResolvedBlock::Super(_))
    }
}
