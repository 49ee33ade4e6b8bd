//! Keyed connection cache
//!
//! This module holds the pool's key → entry map ordered by recency of use,
//! the two eviction passes that run against it, and the statistics types
//! exposed for diagnostics.

mod cache;
mod stats;

#[cfg(test)]
mod tests;

pub(crate) use cache::{Lookup, PoolCache, PoolEntry};
pub use stats::{EntrySnapshot, PoolStats};
