//! Response caching.
//!
//! This module provides an in-memory cache that:
//! - Stores JSON values per key with an individual time-to-live
//! - Treats expired entries as absent and evicts them on read
//! - Bounds memory with a least-recently-used capacity
//! - Sweeps expired entries periodically from a background task

mod sweeper;
mod ttl;

pub use sweeper::Sweeper;
pub use ttl::{CacheEntry, TtlCache};
