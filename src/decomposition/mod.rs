//! Data request decomposition
//!
//! An oversized request (many sources, long range) is split into independent
//! sub-requests so several fetch streams can feed one aggregate:
//!
//! - HORIZONTAL: contiguous groups of the source list, same range
//! - VERTICAL: contiguous time intervals, same sources
//! - GRID: every source group crossed with every time interval
//!
//! # Example
//!
//! ```rust
//! use archive_assembly::config::DecompositionConfig;
//! use archive_assembly::decomposition::{
//!     DecompositionPolicy, DecompositionStrategy, QueryDomain, RequestDecomposer,
//! };
//!
//! let decomposer = RequestDecomposer::new(&DecompositionConfig {
//!     enabled: true,
//!     max_sources: 2,
//!     max_duration_ms: 1_000,
//!     policy: DecompositionPolicy::Default,
//! });
//! let domain = QueryDomain::new(["a", "b", "c"], 0, 500_000_000).unwrap();
//! let params = decomposer.parameters(&domain, DecompositionPolicy::Default);
//! assert_eq!(params.strategy, DecompositionStrategy::Horizontal);
//! assert_eq!(decomposer.decompose(&domain, &params).unwrap().len(), 2);
//! ```

pub mod decomposer;
pub mod domain;
pub mod params;

pub use decomposer::RequestDecomposer;
pub use domain::QueryDomain;
pub use params::{DecompositionParameters, DecompositionPolicy, DecompositionStrategy};
