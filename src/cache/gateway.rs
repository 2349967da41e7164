//! Two-scope response cache.
//!
//! Origin bytes and transformed output share one [`CacheStore`] but live in
//! separate key namespaces with separate TTLs:
//!
//! | Scope  | Key                         | TTL     | Depends on transforms |
//! |--------|-----------------------------|---------|-----------------------|
//! | origin | canonical forward URL       | long    | no                    |
//! | output | derived composite cache key | shorter | yes                   |
//!
//! Both scopes tag entries with the canonical source URL, so a single
//! [`ResponseCache::purge`] invalidates the raw bytes and every variant.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use tracing::debug;
use url::Url;

use super::key::{canonical_tag, canonical_url};
use super::store::{CacheEntry, CacheStore};

/// Response header carrying the cache status marker.
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// Default TTL for origin bytes: 1 day.
pub const DEFAULT_ORIGIN_TTL: Duration = Duration::from_secs(86_400);

/// Default TTL for transformed output: 1 hour.
pub const DEFAULT_OUTPUT_TTL: Duration = Duration::from_secs(3_600);

const ORIGIN_SCOPE: &str = "origin:";
const OUTPUT_SCOPE: &str = "output:";

/// Result of a cache read, reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Cache-aside gateway over a shared store.
///
/// There is no request coalescing: concurrent misses on the same key each
/// fetch and transform independently and each write the result.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    origin_ttl: Duration,
    output_ttl: Duration,
}

impl ResponseCache {
    /// Create a gateway with default TTLs.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            origin_ttl: DEFAULT_ORIGIN_TTL,
            output_ttl: DEFAULT_OUTPUT_TTL,
        }
    }

    /// Set the TTL for origin bytes.
    pub fn with_origin_ttl(mut self, ttl: Duration) -> Self {
        self.origin_ttl = ttl;
        self
    }

    /// Set the TTL for transformed output.
    pub fn with_output_ttl(mut self, ttl: Duration) -> Self {
        self.output_ttl = ttl;
        self
    }

    pub fn origin_ttl(&self) -> Duration {
        self.origin_ttl
    }

    pub fn output_ttl(&self) -> Duration {
        self.output_ttl
    }

    /// Look up raw origin bytes for a forward URL.
    pub async fn get_origin(&self, forward_url: &Url) -> Option<CacheEntry> {
        let key = origin_key(forward_url);
        let entry = self.store.get(&key).await;
        debug!(key = %key, hit = entry.is_some(), "origin cache lookup");
        entry
    }

    /// Store raw origin bytes, independent of any requested transform.
    pub async fn set_origin(&self, forward_url: &Url, bytes: Bytes, headers: HeaderMap) {
        let entry =
            CacheEntry::new(bytes, headers, self.origin_ttl).with_tag(canonical_tag(forward_url));
        self.store.set(&origin_key(forward_url), entry).await;
    }

    /// Look up transformed output by derived cache key.
    pub async fn get_output(&self, cache_key: &str) -> (Option<CacheEntry>, CacheStatus) {
        let entry = self.store.get(&output_key(cache_key)).await;
        let status = if entry.is_some() {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        };
        debug!(key = %cache_key, status = status.as_str(), "output cache lookup");
        (entry, status)
    }

    /// Store transformed output, tagged by the source URL.
    pub async fn set_output(
        &self,
        cache_key: &str,
        forward_url: &Url,
        bytes: Bytes,
        headers: HeaderMap,
    ) {
        let entry =
            CacheEntry::new(bytes, headers, self.output_ttl).with_tag(canonical_tag(forward_url));
        self.store.set(&output_key(cache_key), entry).await;
    }

    /// Purge origin bytes and every output variant of a source URL.
    pub async fn purge(&self, url: &Url) -> usize {
        let removed = self.store.purge_tag(&canonical_tag(url)).await;
        debug!(url = %url, removed, "purged cache tag");
        removed
    }
}

fn origin_key(forward_url: &Url) -> String {
    format!("{ORIGIN_SCOPE}{}", canonical_url(forward_url))
}

fn output_key(cache_key: &str) -> String {
    format!("{OUTPUT_SCOPE}{cache_key}")
}
