//! Domain collision resolver
//!
//! Scans time-ordered correlated blocks and merges every chain of
//! pairwise-overlapping blocks into a [`SuperDomain`]. Blocks that overlap
//! nothing pass through untouched, so the common disjoint case pays no
//! reconciliation cost.

use tracing::{debug, warn};

use super::super_domain::{ResolvedBlock, SuperDomain};
use crate::correlation::CorrelatedBlock;
use crate::error::{Error, Result};
use crate::types::TimeRange;

/// Counters from the last resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Blocks received
    pub blocks_in: usize,
    /// Blocks passed through alone
    pub single_blocks: usize,
    /// Super-domains produced
    pub super_domains: usize,
    /// Blocks absorbed into super-domains
    pub merged_blocks: usize,
}

/// Resolves time-domain collisions between correlated blocks
#[derive(Debug, Default)]
pub struct DomainCollisionResolver {
    stats: ResolverStats,
}

/// Region being accumulated during the scan
struct Pending {
    range: TimeRange,
    blocks: Vec<CorrelatedBlock>,
}

impl Pending {
    fn new(block: CorrelatedBlock) -> Self {
        Self {
            range: block.range(),
            blocks: vec![block],
        }
    }
}

impl DomainCollisionResolver {
    /// Create a resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters from the last call to `resolve`
    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Produce pairwise-disjoint regions in start order
    ///
    /// Input is expected in start order (as the correlator yields it) and is
    /// re-sorted if not. Fails with `DomainCollision` if any two produced
    /// regions still intersect.
    pub fn resolve(&mut self, mut blocks: Vec<CorrelatedBlock>) -> Result<Vec<ResolvedBlock>> {
        self.stats = ResolverStats {
            blocks_in: blocks.len(),
            ..Default::default()
        };
        if !blocks.windows(2).all(|w| w[0].start() <= w[1].start()) {
            warn!("Correlated blocks arrived out of start order; sorting");
            blocks.sort_by_key(|b| b.start());
        }

        let mut resolved = Vec::new();
        let mut current: Option<Pending> = None;

        for block in blocks {
            match current.as_mut() {
                Some(pending) if pending.range.intersects(&block.range()) => {
                    pending.range = pending.range.union(&block.range());
                    pending.blocks.push(block);
                }
                _ => {
                    if let Some(done) = current.take() {
                        resolved.push(self.finish(done)?);
                    }
                    current = Some(Pending::new(block));
                }
            }
        }
        if let Some(done) = current.take() {
            resolved.push(self.finish(done)?);
        }

        verify_disjoint(resolved.iter().map(ResolvedBlock::range))?;
        Ok(resolved)
    }

    fn finish(&mut self, pending: Pending) -> Result<ResolvedBlock> {
        let mut blocks = pending.blocks.into_iter();
        match (blocks.next(), blocks.next()) {
            (Some(first), None) => {
                self.stats.single_blocks += 1;
                Ok(ResolvedBlock::Single(first))
            }
            (Some(first), Some(second)) => {
                let mut domain = SuperDomain::new(first, second);
                for block in blocks {
                    domain.push(block);
                }
                self.stats.super_domains += 1;
                self.stats.merged_blocks += domain.block_count();
                debug!(
                    range = %domain.range(),
                    blocks = domain.block_count(),
                    "Merged colliding blocks into super-domain"
                );
                Ok(ResolvedBlock::Super(domain))
            }
            (None, _) => Err(Error::IllegalState(
                "pending region without blocks".to_string(),
            )),
        }
    }
}

/// Check that consecutive ranges are strictly ordered and disjoint
pub fn verify_disjoint(ranges: impl IntoIterator<Item = TimeRange>) -> Result<()> {
    let mut previous: Option<TimeRange> = None;
    for range in ranges {
        if let Some(prev) = previous {
            if prev.intersects(&range) || range.start < prev.start {
                return Err(Error::DomainCollision {
                    first: prev,
                    second: range,
                });
            }
        }
        previous = Some(range);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SamplingClock;
    use crate::fragment::RawFragment;
    use crate::types::{Value, ValueType};

    fn block(source: &str, start: i64, period: i64, count: usize) -> CorrelatedBlock {
        let clock = SamplingClock::new(start, period, count).unwrap();
        let values = vec![Value::Int(1); count];
        CorrelatedBlock::from_fragment(RawFragment::with_clock(
            source,
            ValueType::Int,
            values,
            clock,
        ))
        .unwrap()
    }

    #[test]
    fn test_disjoint_blocks_pass_through() {
        let mut resolver = DomainCollisionResolver::new();
        let out = resolver
            .resolve(vec![block("A", 0, 10, 3), block("B", 100, 10, 3)])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| !r.is_super_domain()));
        assert_eq!(resolver.stats().single_blocks, 2);
    }

    #[test]
    fn test_overlap_forms_super_domain() {
        let mut resolver = DomainCollisionResolver::new();
        let out = resolver
            .resolve(vec![block("A", 0, 10, 3), block("B", 15, 10, 2)])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_super_domain());
        assert_eq!(out[0].range(), TimeRange::new_unchecked(0, 25));
    }

    #[test]
    fn test_transitive_chain_is_one_domain() {
        // A overlaps B, B overlaps C, A does not overlap C
        let mut resolver = DomainCollisionResolver::new();
        let out = resolver
            .resolve(vec![
                block("A", 0, 10, 2),
                block("B", 5, 10, 2),
                block("C", 14, 10, 2),
                block("D", 100, 10, 1),
            ])
            .unwrap();
        assert_eq!(out.len(), 2);
        match &out[0] {
            ResolvedBlock::Super(domain) => assert_eq!(domain.block_count(), 3),
            other => panic!("expected super-domain, got {:?}", other),
        }
        assert_eq!(resolver.stats().merged_blocks, 3);
    }

    #[test]
    fn test_touching_endpoints_collide() {
        let mut resolver = DomainCollisionResolver::new();
        let out = resolver
            .resolve(vec![block("A", 0, 10, 2), block("B", 10, 10, 2)])
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut resolver = DomainCollisionResolver::new();
        let out = resolver
            .resolve(vec![block("B", 100, 10, 3), block("A", 0, 10, 3)])
            .unwrap();
        assert_eq!(out[0].start(), 0);
        assert_eq!(out[1].start(), 100);
    }

    #[test]
    fn test_verify_disjoint_detects_collision() {
        let err = verify_disjoint(vec![
            TimeRange::new_unchecked(0, 10),
            TimeRange::new_unchecked(5, 20),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DomainCollision { .. }));
        assert!(verify_disjoint(vec![
            TimeRange::new_unchecked(0, 10),
            TimeRange::new_unchecked(11, 20),
        ])
        .is_ok());
    }
}
