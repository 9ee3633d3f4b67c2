//! Sampling clocks and time axes
//!
//! A [`SamplingClock`] describes a uniform timestamp sequence
//! `start + i * period` for `i` in `[0, count)`. A [`TimeAxis`] is either a
//! clock or an explicit list of timestamps; it is the key the correlator
//! groups fragments by.
//!
//! # Example
//!
//! ```rust
//! use archive_assembly::clock::SamplingClock;
//!
//! let clock = SamplingClock::new(1_000, 500, 3).unwrap();
//! let ts: Vec<i64> = clock.timestamps().collect();
//! assert_eq!(ts, vec![1_000, 1_500, 2_000]);
//!
//! // The sequence can be restarted any number of times
//! assert_eq!(clock.timestamps().count(), 3);
//! ```

use crate::error::{Error, Result};
use crate::types::{TimeRange, Timestamp};
use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;

/// Uniform sampling clock: start instant, period, sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplingClock {
    start: Timestamp,
    period: i64,
    count: usize,
}

impl SamplingClock {
    /// Create a clock, rejecting `count == 0`, `period <= 0` and sequences
    /// whose last timestamp would overflow
    pub fn new(start: Timestamp, period: i64, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidClock("sample count must be >= 1".to_string()));
        }
        if period <= 0 {
            return Err(Error::InvalidClock(format!(
                "sampling period must be > 0, got {}ns",
                period
            )));
        }
        let last = i64::try_from(count - 1)
            .ok()
            .and_then(|n| n.checked_mul(period))
            .and_then(|span| start.checked_add(span));
        if last.is_none() {
            return Err(Error::InvalidClock(format!(
                "{} samples of {}ns from {} overflow the timestamp range",
                count, period, start
            )));
        }
        Ok(Self {
            start,
            period,
            count,
        })
    }

    /// First sample instant
    #[inline]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Sampling period in nanoseconds
    #[inline]
    pub fn period(&self) -> i64 {
        self.period
    }

    /// Number of samples
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Last sample instant
    pub fn end(&self) -> Timestamp {
        // bounded by the overflow check in `new`
        self.start + (self.count as i64 - 1) * self.period
    }

    /// Closed interval covered by the samples
    pub fn range(&self) -> TimeRange {
        TimeRange::new_unchecked(self.start, self.end())
    }

    /// Timestamp of sample `index`, if in range
    pub fn timestamp_at(&self, index: usize) -> Option<Timestamp> {
        (index < self.count).then(|| self.start + index as i64 * self.period)
    }

    /// Fresh iterator over the sample instants
    pub fn timestamps(&self) -> ClockTimestamps {
        ClockTimestamps {
            clock: *self,
            next: 0,
        }
    }
}

impl fmt::Display for SamplingClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clock(start={}, period={}ns, count={})",
            crate::types::format_timestamp(self.start),
            self.period,
            self.count
        )
    }
}

/// Lazy iterator over a clock's timestamps
#[derive(Debug, Clone)]
pub struct ClockTimestamps {
    clock: SamplingClock,
    next: usize,
}

impl Iterator for ClockTimestamps {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Self::Item> {
        let ts = self.clock.timestamp_at(self.next)?;
        self.next += 1;
        Some(ts)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.clock.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ClockTimestamps {}

impl FusedIterator for ClockTimestamps {}

/// Time axis of a fragment or block
///
/// Orders by first timestamp, then structurally, so a `BTreeMap` keyed by
/// `TimeAxis` iterates blocks in start-time order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeAxis {
    /// Uniform sampling clock
    Clock(SamplingClock),
    /// Explicit, strictly increasing timestamps
    Timestamps(Vec<Timestamp>),
}

impl TimeAxis {
    /// Build an explicit axis, rejecting empty or non-increasing lists
    pub fn explicit(timestamps: Vec<Timestamp>) -> Result<Self> {
        if timestamps.is_empty() {
            return Err(Error::InvalidClock(
                "explicit timestamp list is empty".to_string(),
            ));
        }
        if let Some(w) = timestamps.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidClock(format!(
                "explicit timestamps not strictly increasing at {} -> {}",
                w[0], w[1]
            )));
        }
        Ok(TimeAxis::Timestamps(timestamps))
    }

    /// First sample instant
    pub fn start(&self) -> Timestamp {
        match self {
            TimeAxis::Clock(clock) => clock.start(),
            // never empty once constructed through `explicit`
            TimeAxis::Timestamps(ts) => ts.first().copied().unwrap_or_default(),
        }
    }

    /// Last sample instant
    pub fn end(&self) -> Timestamp {
        match self {
            TimeAxis::Clock(clock) => clock.end(),
            TimeAxis::Timestamps(ts) => ts.last().copied().unwrap_or_default(),
        }
    }

    /// Number of samples
    pub fn sample_count(&self) -> usize {
        match self {
            TimeAxis::Clock(clock) => clock.count(),
            TimeAxis::Timestamps(ts) => ts.len(),
        }
    }

    /// Closed interval covered by the samples
    pub fn range(&self) -> TimeRange {
        TimeRange::new_unchecked(self.start(), self.end())
    }

    /// Materialise the sample instants
    pub fn to_vec(&self) -> Vec<Timestamp> {
        match self {
            TimeAxis::Clock(clock) => clock.timestamps().collect(),
            TimeAxis::Timestamps(ts) => ts.clone(),
        }
    }

    /// Re-validate an axis that may have been built directly
    pub fn validate(&self) -> Result<()> {
        match self {
            TimeAxis::Clock(clock) => {
                SamplingClock::new(clock.start, clock.period, clock.count).map(|_| ())
            }
            TimeAxis::Timestamps(ts) => {
                if ts.is_empty() {
                    return Err(Error::InvalidClock(
                        "explicit timestamp list is empty".to_string(),
                    ));
                }
                if ts.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::InvalidClock(
                        "explicit timestamps not strictly increasing".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl From<SamplingClock> for TimeAxis {
    fn from(clock: SamplingClock) -> Self {
        TimeAxis::Clock(clock)
    }
}

impl Ord for TimeAxis {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start()
            .cmp(&other.start())
            .then_with(|| match (self, other) {
                (TimeAxis::Clock(a), TimeAxis::Clock(b)) => (a.period, a.count)
                    .cmp(&(b.period, b.count)),
                (TimeAxis::Clock(_), TimeAxis::Timestamps(_)) => Ordering::Less,
                (TimeAxis::Timestamps(_), TimeAxis::Clock(_)) => Ordering::Greater,
                (TimeAxis::Timestamps(a), TimeAxis::Timestamps(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for TimeAxis {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimeAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeAxis::Clock(clock) => write!(f, "{}", clock),
            TimeAxis::Timestamps(ts) => write!(
                f,
                "timestamps(start={}, count={})",
                crate::types::format_timestamp(self.start()),
                ts.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NANOS_PER_SECOND;

    #[test]
    fn test_clock_validation() {
        assert!(SamplingClock::new(0, 1, 0).is_err());
        assert!(SamplingClock::new(0, 0, 3).is_err());
        assert!(SamplingClock::new(0, -5, 3).is_err());
        assert!(SamplingClock::new(i64::MAX - 10, 10, 3).is_err());
        assert!(SamplingClock::new(0, 1, 1).is_ok());
    }

    #[test]
    fn test_clock_timestamps() {
        let clock = SamplingClock::new(10, NANOS_PER_SECOND, 3).unwrap();
        let ts: Vec<_> = clock.timestamps().collect();
        assert_eq!(ts, vec![10, 10 + NANOS_PER_SECOND, 10 + 2 * NANOS_PER_SECOND]);
        assert_eq!(clock.end(), 10 + 2 * NANOS_PER_SECOND);
        assert_eq!(clock.timestamps().len(), 3);
        assert_eq!(clock.timestamp_at(3), None);
    }

    #[test]
    fn test_clock_equality_is_structural() {
        let a = SamplingClock::new(0, 100, 5).unwrap();
        let b = SamplingClock::new(0, 100, 5).unwrap();
        let c = SamplingClock::new(0, 100, 6).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_explicit_axis_validation() {
        assert!(TimeAxis::explicit(vec![]).is_err());
        assert!(TimeAxis::explicit(vec![1, 1]).is_err());
        assert!(TimeAxis::explicit(vec![3, 2]).is_err());
        let axis = TimeAxis::explicit(vec![1, 5, 9]).unwrap();
        assert_eq!(axis.range(), TimeRange::new_unchecked(1, 9));
        assert_eq!(axis.sample_count(), 3);
    }

    #[test]
    fn test_axis_ordering_by_start() {
        let late = TimeAxis::Clock(SamplingClock::new(50, 1, 2).unwrap());
        let early = TimeAxis::explicit(vec![10, 20]).unwrap();
        let same_start = TimeAxis::Clock(SamplingClock::new(10, 5, 2).unwrap());
        let mut axes = vec![late.clone(), early.clone(), same_start.clone()];
        axes.sort();
        assert_eq!(axes, vec![same_start, early, late]);
    }
}
