//! Time-domain collision resolution
//!
//! Blocks built from different sampling clocks can still overlap in time.
//! Resolution isolates exactly the overlapping regions as
//! [`SuperDomain`]s and guarantees that the regions it returns are sorted
//! and pairwise disjoint.

pub mod resolver;
pub mod super_domain;

pub use resolver::{verify_disjoint, DomainCollisionResolver, ResolverStats};
pub use super_domain::{ResolvedBlock, SuperDomain};
