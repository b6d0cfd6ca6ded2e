//! Short-lived in-memory response cache.
//!
//! This module provides:
//! - A TTL cache with per-entry absolute expiry and self-evicting reads
//! - Deterministic query keys for pull request and label requests
//! - Result wrappers recording whether data came from the cache or the network

mod key;
mod traits;
mod ttl;

pub use key::{normalize_repositories, QueryKey};
pub use traits::{CacheResult, CacheSource};
pub use ttl::TtlCache;
