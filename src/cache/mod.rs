//! Caching layer.
//!
//! - [`key`](derive_cache_key) derives deterministic output cache keys
//! - [`CacheStore`] is the storage capability, with [`MemoryCacheStore`] as
//!   the in-process backend
//! - [`ResponseCache`] is the cache-aside gateway with origin and output scopes

mod gateway;
mod key;
mod store;

pub use gateway::{
    CacheStatus, ResponseCache, CACHE_STATUS_HEADER, DEFAULT_ORIGIN_TTL, DEFAULT_OUTPUT_TTL,
};
pub use key::{
    canonical_tag, canonical_url, derive_cache_key, transforms_digest, KEY_DELIMITER,
    NO_TRANSFORMS,
};
pub use store::{CacheEntry, CacheStore, MemoryCacheStore, DEFAULT_CACHE_CAPACITY};
