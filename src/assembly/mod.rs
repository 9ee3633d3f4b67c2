//! Parallel request assembly
//!
//! Ties the pipeline together: a request is decomposed, each sub-request is
//! fetched by a worker into a bounded [`FragmentBuffer`], a single task
//! correlates what arrives, and the result is resolved into an
//! [`AggregateTable`](crate::table::AggregateTable).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use archive_assembly::assembly::{InMemoryFragmentSource, QueryAssembler};
//! use archive_assembly::clock::SamplingClock;
//! use archive_assembly::config::AssemblyConfig;
//! use archive_assembly::decomposition::QueryDomain;
//! use archive_assembly::fragment::RawFragment;
//! use archive_assembly::table::DataTable;
//! use archive_assembly::types::{Value, ValueType};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let clock = SamplingClock::new(0, 10, 2).unwrap();
//! let source = InMemoryFragmentSource::new(vec![RawFragment::with_clock(
//!     "pv:temp",
//!     ValueType::Double,
//!     vec![Value::Double(20.5), Value::Double(21.0)],
//!     clock,
//! )]);
//! let assembler = QueryAssembler::new(AssemblyConfig::default(), Arc::new(source)).unwrap();
//! let domain = QueryDomain::new(["pv:temp"], 0, 1_000).unwrap();
//!
//! let table = assembler.assemble(&domain).await.unwrap();
//! assert_eq!(table.row_count(), 2);
//! # }
//! ```

pub mod assembler;
pub mod buffer;
pub mod source;
mod worker;

pub use assembler::QueryAssembler;
pub use buffer::{BufferPoll, FragmentBuffer};
pub use source::{FragmentSource, FragmentStream, InMemoryFragmentSource};

pub use crate::config::CancelMode;
