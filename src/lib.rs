//! Archive Assembly - client-side result assembly for time-series archives
//!
//! An archive answers a query with a stream of raw fragments: one source's
//! values over one sampling clock. This library turns those fragments back
//! into a single randomly addressable table:
//! - Correlation of fragments sharing a time axis into blocks
//! - Resolution of time-domain collisions between blocks into super-domains
//! - Paged aggregate tables with lazy column materialisation
//! - Decomposition of oversized requests into parallel sub-requests
//! - Time-bounded parallel fetching with soft or hard cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod fragment;
pub mod types;

/// Assembly counters and snapshots
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Grouping of fragments into time-axis blocks
pub mod correlation;

/// Merging of blocks whose time ranges collide
pub mod resolution;

/// Sampled blocks, aggregates and the random-access table contract
pub mod table;

/// Splitting of oversized requests into sub-requests
pub mod decomposition;

/// Parallel fetch, correlation and table building under a time limit
pub mod assembly;

// Re-export main types
pub use assembly::{FragmentSource, InMemoryFragmentSource, QueryAssembler};
pub use clock::{SamplingClock, TimeAxis};
pub use config::AssemblyConfig;
pub use decomposition::{QueryDomain, RequestDecomposer};
pub use error::{Error, Result};
pub use fragment::RawFragment;
pub use table::{AggregateTable, DataTable, StaticTable};
pub use types::{TimeRange, Timestamp, Value, ValueType};
