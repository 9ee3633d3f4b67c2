//! Request decomposer
//!
//! Computes how many sub-requests an oversized domain needs along each axis
//! and builds them. Sub-domains are independent values; the input domain is
//! never modified.

use tracing::debug;

use super::domain::QueryDomain;
use super::params::{DecompositionParameters, DecompositionPolicy, DecompositionStrategy};
use crate::config::{AssemblyConfig, DecompositionConfig};
use crate::error::{Error, Result};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Splits query domains by source count and time range
#[derive(Debug, Clone)]
pub struct RequestDecomposer {
    enabled: bool,
    max_sources: usize,
    /// Maximum sub-request duration in nanoseconds
    max_duration: i64,
    policy: DecompositionPolicy,
    /// Largest grid the preferred policy will issue
    grid_limit: usize,
}

impl RequestDecomposer {
    /// Create a decomposer from its configuration section
    ///
    /// Without a grid limit the preferred policy never selects GRID.
    pub fn new(config: &DecompositionConfig) -> Self {
        let max_duration = i64::try_from(config.max_duration_ms)
            .unwrap_or(i64::MAX)
            .saturating_mul(NANOS_PER_MILLI);
        Self {
            enabled: config.enabled,
            max_sources: config.max_sources.max(1),
            max_duration: max_duration.max(1),
            policy: config.policy,
            grid_limit: 0,
        }
    }

    /// Create a decomposer whose grid limit is the stream limit
    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(&config.decomposition).with_grid_limit(config.streams.max_streams)
    }

    /// Set the largest grid the preferred policy may select
    pub fn with_grid_limit(mut self, limit: usize) -> Self {
        self.grid_limit = limit;
        self
    }

    /// Configured policy
    pub fn policy(&self) -> DecompositionPolicy {
        self.policy
    }

    /// Compute split counts and strategy for a domain
    pub fn parameters(
        &self,
        domain: &QueryDomain,
        policy: DecompositionPolicy,
    ) -> DecompositionParameters {
        let horizontal = domain.source_count().div_ceil(self.max_sources).max(1);
        let duration = domain.duration();
        let vertical = (duration / self.max_duration
            + i64::from(duration % self.max_duration != 0))
        .max(1);
        let vertical = usize::try_from(vertical).unwrap_or(usize::MAX);

        let strategy = match (horizontal > 1, vertical > 1) {
            (false, false) => DecompositionStrategy::None,
            (true, false) => DecompositionStrategy::Horizontal,
            (false, true) => DecompositionStrategy::Vertical,
            (true, true) => match policy {
                DecompositionPolicy::Default => DecompositionStrategy::Grid,
                DecompositionPolicy::Preferred => {
                    if horizontal.saturating_mul(vertical) <= self.grid_limit {
                        DecompositionStrategy::Grid
                    } else if horizontal >= vertical {
                        return DecompositionParameters {
                            strategy: DecompositionStrategy::Horizontal,
                            horizontal,
                            vertical: 1,
                        };
                    } else {
                        return DecompositionParameters {
                            strategy: DecompositionStrategy::Vertical,
                            horizontal: 1,
                            vertical,
                        };
                    }
                }
            },
        };

        DecompositionParameters {
            strategy,
            horizontal,
            vertical,
        }
    }

    /// Build the sub-domains described by `params`
    pub fn decompose(
        &self,
        domain: &QueryDomain,
        params: &DecompositionParameters,
    ) -> Result<Vec<QueryDomain>> {
        params.validate()?;
        let sub_domains = match params.strategy {
            DecompositionStrategy::None => vec![domain.clone()],
            DecompositionStrategy::Horizontal => {
                self.decompose_horizontal(domain, params.horizontal)?
            }
            DecompositionStrategy::Vertical => self.decompose_vertical(domain, params.vertical)?,
            DecompositionStrategy::Grid => {
                self.decompose_grid(domain, params.horizontal, params.vertical)?
            }
        };
        debug!(
            %domain,
            %params,
            sub_domains = sub_domains.len(),
            "Decomposed request"
        );
        Ok(sub_domains)
    }

    /// Decompose with the configured policy, or not at all if disabled
    pub fn decompose_auto(&self, domain: &QueryDomain) -> Result<Vec<QueryDomain>> {
        if !self.enabled {
            return Ok(vec![domain.clone()]);
        }
        let params = self.parameters(domain, self.policy);
        self.decompose(domain, &params)
    }

    /// Split the source list into contiguous groups of `ceil(n / count)`
    ///
    /// The last group holds the remainder, so fewer than `count` groups may
    /// result.
    pub fn decompose_horizontal(
        &self,
        domain: &QueryDomain,
        count: usize,
    ) -> Result<Vec<QueryDomain>> {
        if count == 0 {
            return Err(Error::IllegalState(
                "horizontal split into zero groups".to_string(),
            ));
        }
        let group_size = domain.source_count().div_ceil(count).max(1);
        Ok(domain
            .sources()
            .chunks(group_size)
            .map(|group| domain.with_sources(group.to_vec()))
            .collect())
    }

    /// Split the time range into `count` contiguous equal intervals
    ///
    /// The integer-division remainder goes to the last interval.
    pub fn decompose_vertical(
        &self,
        domain: &QueryDomain,
        count: usize,
    ) -> Result<Vec<QueryDomain>> {
        let duration = domain.duration();
        let splits = i64::try_from(count).unwrap_or(i64::MAX);
        if count == 0 || splits > duration {
            return Err(Error::IllegalState(format!(
                "cannot split {}ns into {} intervals",
                duration, count
            )));
        }
        let step = duration / splits;
        Ok((0..splits)
            .map(|i| {
                let begin = domain.begin() + i * step;
                let end = if i == splits - 1 {
                    domain.end()
                } else {
                    begin + step
                };
                domain.with_range(begin, end)
            })
            .collect())
    }

    /// Source groups outer, time splits inner
    pub fn decompose_grid(
        &self,
        domain: &QueryDomain,
        horizontal: usize,
        vertical: usize,
    ) -> Result<Vec<QueryDomain>> {
        let mut sub_domains = Vec::with_capacity(horizontal.saturating_mul(vertical));
        for group in self.decompose_horizontal(domain, horizontal)? {
            sub_domains.extend(self.decompose_vertical(&group, vertical)?);
        }
        Ok(sub_domains)
    }
}

impl Default for RequestDecomposer {
    fn default() -> Self {
        Self::new(&DecompositionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const MINUTE: i64 = 60 * 1_000_000_000;

    fn decomposer(max_sources: usize, max_minutes: u64, policy: DecompositionPolicy) -> RequestDecomposer {
        RequestDecomposer::new(&DecompositionConfig {
            enabled: true,
            max_sources,
            max_duration_ms: max_minutes * 60_000,
            policy,
        })
    }

    fn sources(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("pv:{:04}", i)).collect()
    }

    #[test]
    fn test_grid_scenario() {
        let d = decomposer(100, 20, DecompositionPolicy::Default);
        let domain = QueryDomain::new(sources(250), 0, 60 * MINUTE).unwrap();
        let params = d.parameters(&domain, DecompositionPolicy::Default);
        assert_eq!(params.strategy, DecompositionStrategy::Grid);
        assert_eq!((params.horizontal, params.vertical), (3, 3));

        let subs = d.decompose(&domain, &params).unwrap();
        assert_eq!(subs.len(), 9);
        let mut seen = HashSet::new();
        for sub in &subs {
            assert!(sub.source_count() <= 100);
            assert!(sub.duration() <= 20 * MINUTE);
            for s in sub.sources() {
                seen.insert(s.clone());
            }
        }
        assert_eq!(seen.len(), 250);
        // Each source group covers the hour exactly once
        for group in subs.chunks(3) {
            assert_eq!(group[0].begin(), 0);
            assert_eq!(group[0].end(), group[1].begin());
            assert_eq!(group[1].end(), group[2].begin());
            assert_eq!(group[2].end(), 60 * MINUTE);
        }
    }

    #[test]
    fn test_single_axis_strategies() {
        let d = decomposer(100, 20, DecompositionPolicy::Default);
        let small = QueryDomain::new(sources(10), 0, 10 * MINUTE).unwrap();
        assert_eq!(
            d.parameters(&small, DecompositionPolicy::Default),
            DecompositionParameters::none()
        );

        let wide = QueryDomain::new(sources(101), 0, 10 * MINUTE).unwrap();
        let params = d.parameters(&wide, DecompositionPolicy::Default);
        assert_eq!(params.strategy, DecompositionStrategy::Horizontal);
        assert_eq!(params.horizontal, 2);

        let long = QueryDomain::new(sources(10), 0, 20 * MINUTE + 1).unwrap();
        let params = d.parameters(&long, DecompositionPolicy::Default);
        assert_eq!(params.strategy, DecompositionStrategy::Vertical);
        assert_eq!(params.vertical, 2);
    }

    #[test]
    fn test_preferred_policy() {
        let domain = QueryDomain::new(sources(250), 0, 60 * MINUTE).unwrap();

        let d = decomposer(100, 20, DecompositionPolicy::Preferred);
        let params = d.parameters(&domain, DecompositionPolicy::Preferred);
        assert_eq!(params.strategy, DecompositionStrategy::Horizontal);
        assert_eq!((params.horizontal, params.vertical), (3, 1));

        let d = d.with_grid_limit(9);
        let params = d.parameters(&domain, DecompositionPolicy::Preferred);
        assert_eq!(params.strategy, DecompositionStrategy::Grid);

        let long = QueryDomain::new(sources(150), 0, 100 * MINUTE).unwrap();
        let params = decomposer(100, 20, DecompositionPolicy::Preferred)
            .parameters(&long, DecompositionPolicy::Preferred);
        assert_eq!(params.strategy, DecompositionStrategy::Vertical);
        assert_eq!((params.horizontal, params.vertical), (1, 5));
    }

    #[test]
    fn test_preferred_grid_limit_follows_max_streams() {
        let domain = QueryDomain::new(sources(250), 0, 60 * MINUTE).unwrap();
        let mut config = crate::config::AssemblyConfig::default();
        config.decomposition.max_sources = 100;
        config.decomposition.max_duration_ms = 20 * 60 * 1_000;

        config.streams.max_streams = 8;
        let params = RequestDecomposer::from_config(&config)
            .parameters(&domain, DecompositionPolicy::Preferred);
        assert_eq!(params.strategy, DecompositionStrategy::Horizontal);

        config.streams.max_streams = 9;
        let params = RequestDecomposer::from_config(&config)
            .parameters(&domain, DecompositionPolicy::Preferred);
        assert_eq!(params.strategy, DecompositionStrategy::Grid);
        assert_eq!(params.sub_domain_count(), 9);
    }

    #[test]
    fn test_vertical_remainder_goes_last() {
        let d = RequestDecomposer::default();
        let domain = QueryDomain::new(["a"], 0, 10).unwrap();
        let subs = d.decompose_vertical(&domain, 3).unwrap();
        let ranges: Vec<_> = subs.iter().map(|s| (s.begin(), s.end())).collect();
        assert_eq!(ranges, vec![(0, 3), (3, 6), (6, 10)]);
    }

    #[test]
    fn test_horizontal_groups() {
        let d = RequestDecomposer::default();
        let domain = QueryDomain::new(sources(10), 0, 10).unwrap();
        let subs = d.decompose_horizontal(&domain, 3).unwrap();
        let sizes: Vec<_> = subs.iter().map(|s| s.source_count()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(subs[0].sources()[0], "pv:0000");
        assert_eq!(subs[2].sources()[1], "pv:0009");
    }

    #[test]
    fn test_mismatched_parameters_rejected() {
        let d = RequestDecomposer::default();
        let domain = QueryDomain::new(sources(4), 0, 100).unwrap();
        let params = DecompositionParameters {
            strategy: DecompositionStrategy::Horizontal,
            horizontal: 2,
            vertical: 2,
        };
        assert!(matches!(
            d.decompose(&domain, &params),
            Err(Error::IllegalState(_))
        ));
        assert!(d.decompose_vertical(&domain, 0).is_err());
        assert!(d.decompose_vertical(&domain, 101).is_err());
    }

    #[test]
    fn test_disabled_returns_domain() {
        let d = RequestDecomposer::new(&DecompositionConfig {
            enabled: false,
            max_sources: 1,
            max_duration_ms: 1,
            policy: DecompositionPolicy::Default,
        });
        let domain = QueryDomain::new(sources(5), 0, 100 * MINUTE).unwrap();
        assert_eq!(d.decompose_auto(&domain).unwrap(), vec![domain]);
    }
}
