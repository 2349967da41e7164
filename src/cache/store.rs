//! Key/value cache store.
//!
//! [`CacheStore`] is the storage capability the response cache is built on:
//! `get`, `set` with tags and a TTL, and purge-by-tag. [`MemoryCacheStore`]
//! is the in-process implementation; other backends plug in through the
//! trait.
//!
//! # Size-Based Eviction
//!
//! The memory store tracks the total size of cached bodies in bytes and
//! evicts least-recently-used entries when the capacity is exceeded.
//!
//! # Expiry
//!
//! Each entry carries its own TTL. Expired entries are dropped lazily on the
//! next read of their key, or when evicted.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use lru::LruCache;
use tokio::sync::RwLock;

/// Default cache capacity: 256MB
pub const DEFAULT_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached response body with its headers.
///
/// Entries are never mutated after being written; a later `set` on the same
/// key replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: Bytes,
    pub headers: HeaderMap,
    pub tags: Vec<String>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(bytes: Bytes, headers: HeaderMap, ttl: Duration) -> Self {
        Self {
            bytes,
            headers,
            tags: Vec::new(),
            ttl,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Storage capability behind the response cache.
///
/// Implementations must be safe to share across request tasks. No
/// single-writer guarantee is required: two concurrent `set` calls on the
/// same key may both succeed, the last one wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store an entry under `key` for `entry.ttl`.
    async fn set(&self, key: &str, entry: CacheEntry);

    /// Remove every entry carrying `tag`, returning how many were removed.
    async fn purge_tag(&self, tag: &str) -> usize;
}

// =============================================================================
// Memory Store
// =============================================================================

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

struct Inner {
    entries: LruCache<String, StoredEntry>,
    tags: HashMap<String, HashSet<String>>,
    current_size: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let stored = self.entries.pop(key)?;
        self.forget(key, &stored);
        Some(stored)
    }

    /// Drop size accounting and tag index references for an entry that has
    /// already left the LRU.
    fn forget(&mut self, key: &str, stored: &StoredEntry) {
        self.current_size = self.current_size.saturating_sub(stored.entry.bytes.len());
        for tag in &stored.entry.tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }
}

/// In-memory LRU store with TTL and tag purge.
///
/// # Example
///
/// ```
/// use pixel_proxy::cache::{CacheEntry, CacheStore, MemoryCacheStore};
/// use bytes::Bytes;
/// use http::HeaderMap;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let store = MemoryCacheStore::new();
///
///     let body = Bytes::from_static(b"body");
///     let entry = CacheEntry::new(body, HeaderMap::new(), Duration::from_secs(60))
///         .with_tag("http://localhost/cat.jpg");
///     store.set("key", entry).await;
///
///     assert!(store.get("key").await.is_some());
///     assert_eq!(store.purge_tag("http://localhost/cat.jpg").await, 1);
///     assert!(store.get("key").await.is_none());
/// }
/// ```
pub struct MemoryCacheStore {
    inner: RwLock<Inner>,

    /// Maximum total size in bytes
    max_size: usize,
}

impl MemoryCacheStore {
    /// Create a store with default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a store with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a store with specified byte capacity and maximum entries.
    ///
    /// A zero `max_entries` is treated as one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(max_entries),
                tags: HashMap::new(),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Check if a live entry exists without updating LRU order.
    pub async fn contains(&self, key: &str) -> bool {
        let inner = self.inner.read().await;
        inner
            .entries
            .peek(key)
            .is_some_and(|stored| stored.expires_at > Instant::now())
    }

    /// Remove an entry directly.
    pub async fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.write().await;
        inner.remove(key).map(|stored| stored.entry)
    }

    /// Remove all entries.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.tags.clear();
        inner.current_size = 0;
    }

    /// Number of stored entries (including not yet collected expired ones).
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Current total size of stored bodies in bytes.
    pub async fn size(&self) -> usize {
        self.inner.read().await.current_size
    }

    /// Maximum total size in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.write().await;

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(stored) if stored.expires_at > Instant::now() => {
                return Some(stored.entry.clone());
            }
            Some(_) => true,
        };

        if expired {
            inner.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, entry: CacheEntry) {
        let data_size = entry.bytes.len();

        // Zero TTL means "do not cache"; oversized bodies would evict everything
        if entry.ttl.is_zero() || data_size > self.max_size {
            return;
        }

        let expires_at = Instant::now() + entry.ttl;
        let mut inner = self.inner.write().await;

        // Replacing a key: drop the old entry's size and tags first
        inner.remove(key);

        for tag in &entry.tags {
            inner
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }

        let stored = StoredEntry { entry, expires_at };
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), stored) {
            // Entry-count eviction
            inner.forget(&evicted_key, &evicted);
        }
        inner.current_size += data_size;

        // Evict entries until we're under capacity
        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((evicted_key, evicted)) => inner.forget(&evicted_key, &evicted),
                None => break,
            }
        }
    }

    async fn purge_tag(&self, tag: &str) -> usize {
        let mut inner = self.inner.write().await;
        let Some(keys) = inner.tags.remove(tag) else {
            return 0;
        };

        keys.iter()
            .filter(|key| inner.remove(key).is_some())
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================
