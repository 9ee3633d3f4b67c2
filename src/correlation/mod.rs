//! Raw data correlation
//!
//! Fragments arriving in any order from any number of streams are grouped by
//! time axis into [`CorrelatedBlock`]s. Two sources sampled by identical
//! clocks always land in the same block regardless of arrival order.
//!
//! # Example
//!
//! ```rust
//! use archive_assembly::clock::SamplingClock;
//! use archive_assembly::correlation::RawDataCorrelator;
//! use archive_assembly::fragment::RawFragment;
//! use archive_assembly::types::{Value, ValueType};
//!
//! let clock = SamplingClock::new(0, 1_000_000_000, 3).unwrap();
//! let values = vec![Value::Double(1.0), Value::Double(2.0), Value::Double(3.0)];
//!
//! let mut correlator = RawDataCorrelator::default();
//! correlator.process(RawFragment::with_clock("X", ValueType::Double, values.clone(), clock)).unwrap();
//! correlator.process(RawFragment::with_clock("Y", ValueType::Double, values, clock)).unwrap();
//!
//! let block = correlator.correlated_set().next().unwrap();
//! assert_eq!(block.sample_count(), 3);
//! assert_eq!(block.source_count(), 2);
//! ```

pub mod block;
pub mod correlator;

pub use block::CorrelatedBlock;
pub use correlator::{CorrelatorStats, RawDataCorrelator};
