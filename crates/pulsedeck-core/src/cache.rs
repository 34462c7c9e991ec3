//! Stale-while-revalidate cache over a shared key/value namespace.
//!
//! Entries are stored as JSON `{"data": ..., "timestamp": <epoch-ms>,
//! "ttl": <ms>}` under a namespace prefix, so the backing store can be shared
//! with unrelated data. Expiry is advisory: a bare [`SwrCache::read`] returns
//! whatever is stored even past its TTL, which lets recovery paths fall back
//! to the last known good value. The composite [`SwrCache::fetch`] is what
//! consumers normally call.
//!
//! Storage failures (quota, corruption, backend I/O) are absorbed and logged;
//! the cache degrades to "always fetch fresh" instead of propagating them.
//!
//! # Example
//!
//! ```rust,ignore
//! let cache = SwrCache::new(Arc::new(MemoryBackend::new()));
//!
//! // Served from cache while fresh; served stale + refreshed in the
//! // background once expired; loaded (and written through) when absent.
//! let overview: SystemOverview = cache
//!     .fetch("dashboard:overview", cache.config().default_ttl, || async {
//!         api.system_overview().await.map_err(Into::into)
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::storage::KvBackend;

/// Namespace prefix prepended to every cache key.
pub const DEFAULT_PREFIX: &str = "pulsedeck:";

/// Default TTL for general entries (dashboard overview, host lists).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default TTL for per-host detail entries.
pub const HOST_DETAIL_TTL: Duration = Duration::from_secs(180);

/// Cache policy knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace prefix; everything under it belongs to this cache.
    pub prefix: String,
    /// TTL for general entries.
    pub default_ttl: Duration,
    /// TTL for per-host detail entries.
    pub host_detail_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            default_ttl: DEFAULT_TTL,
            host_detail_ttl: HOST_DETAIL_TTL,
        }
    }
}

impl CacheConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_host_detail_ttl(mut self, ttl: Duration) -> Self {
        self.host_detail_ttl = ttl;
        self
    }
}

/// Serialized form of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    data: Value,
    /// Epoch milliseconds at write time.
    timestamp: u64,
    /// Milliseconds until the entry counts as expired.
    ttl: u64,
}

impl StoredEntry {
    fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) > self.ttl
    }
}

/// Per-entry row of [`CacheStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    /// Full storage key, including the namespace prefix.
    pub key: String,
    pub age_ms: u64,
    pub ttl_ms: u64,
    pub size_bytes: usize,
    pub expired: bool,
}

/// Read-only introspection of the cache namespace.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub items: Vec<EntryStats>,
}

/// Stale-while-revalidate cache over an injected [`KvBackend`].
///
/// Cheap to clone; clones share the same backend and clock.
#[derive(Clone)]
pub struct SwrCache {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl SwrCache {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_config(backend, CacheConfig::default())
    }

    pub fn with_config(backend: Arc<dyn KvBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the clock. Tests use this with a manually advanced clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    /// Load and decode the raw entry for a key, absorbing every failure.
    async fn load_entry(&self, key: &str) -> Option<StoredEntry> {
        let storage_key = self.storage_key(key);
        match self.backend.get(&storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(key = %storage_key, error = %err, "corrupt cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key = %storage_key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Read the stored value for a key, if any.
    ///
    /// Expiry is advisory here: an expired entry is still returned. Callers
    /// that care about freshness check [`SwrCache::stats`] or use
    /// [`SwrCache::fetch`].
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.load_entry(key).await?;
        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "cache entry no longer decodes, treating as miss");
                None
            }
        }
    }

    /// Unconditionally create or overwrite an entry with the current timestamp.
    ///
    /// Storage failures are logged and swallowed.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, error = %err, "value not serializable, cache write skipped");
                return;
            }
        };
        let entry = StoredEntry {
            data,
            timestamp: self.clock.now_ms(),
            ttl: ttl.as_millis() as u64,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "entry not serializable, cache write skipped");
                return;
            }
        };
        if let Err(err) = self.backend.set(&self.storage_key(key), &raw).await {
            warn!(key, error = %err, "cache write failed");
        }
    }

    /// Composite read: serve from cache, refreshing as needed.
    ///
    /// - live entry: returned directly, `loader` is not invoked;
    /// - expired entry: returned immediately, `loader` runs in the background
    ///   and overwrites the entry on success (failures keep the stale value);
    /// - no entry: `loader` is awaited, its result written through and
    ///   returned. Only this path can fail, with [`CacheError::Load`].
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let now = self.clock.now_ms();
        if let Some(entry) = self.load_entry(key).await {
            let expired = entry.is_expired(now);
            match serde_json::from_value::<T>(entry.data) {
                Ok(value) => {
                    if !expired {
                        debug!(key, "cache hit");
                        return Ok(value);
                    }
                    debug!(key, "serving stale entry, revalidating in background");
                    self.spawn_revalidate(key, ttl, loader());
                    return Ok(value);
                }
                Err(err) => {
                    warn!(key, error = %err, "cache entry no longer decodes, refetching");
                }
            }
        }

        debug!(key, "cache miss");
        let fresh = loader().await.map_err(CacheError::Load)?;
        self.write(key, &fresh, ttl).await;
        Ok(fresh)
    }

    /// Run an already-started loader to completion and write the result back.
    ///
    /// Fire-and-forget: the refresh completes and writes even if the caller
    /// that triggered it is gone by then.
    fn spawn_revalidate<T, Fut>(&self, key: &str, ttl: Duration, fut: Fut)
    where
        T: Serialize + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let cache = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            match fut.await {
                Ok(value) => cache.write(&key, &value, ttl).await,
                Err(err) => {
                    warn!(key = %key, error = %err, "background refresh failed, stale entry kept");
                }
            }
        });
    }

    /// Remove a single entry regardless of its expiry state.
    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.backend.remove(&self.storage_key(key)).await {
            warn!(key, error = %err, "cache invalidation failed");
        }
    }

    /// Remove every entry in the namespace, optionally scoped to a key prefix
    /// inside it. Foreign keys outside the namespace are never touched.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate_all(&self, prefix: Option<&str>) -> usize {
        let scan = match prefix {
            Some(p) => format!("{}{}", self.config.prefix, p),
            None => self.config.prefix.clone(),
        };
        let keys = match self.backend.keys_with_prefix(&scan).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "cache scan failed, nothing invalidated");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys {
            if self.backend.remove(&key).await.is_ok() {
                removed += 1;
            }
        }
        debug!(removed, "cache entries invalidated");
        removed
    }

    /// Remove every expired entry in the namespace and report how many.
    ///
    /// Maintenance only: expired-but-unread entries are otherwise harmless.
    /// Entries that no longer parse are removed as well.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let keys = match self.backend.keys_with_prefix(&self.config.prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "cache scan failed, cleanup skipped");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys {
            let expired = match self.backend.get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str::<StoredEntry>(&raw) {
                    Ok(entry) => entry.is_expired(now),
                    Err(_) => true,
                },
                Ok(None) | Err(_) => false,
            };
            if expired && self.backend.remove(&key).await.is_ok() {
                removed += 1;
            }
        }
        debug!(removed, "expired cache entries removed");
        removed
    }

    /// Snapshot of every entry in the namespace.
    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let keys = match self.backend.keys_with_prefix(&self.config.prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "cache scan failed, stats empty");
                return CacheStats::default();
            }
        };
        let mut stats = CacheStats::default();
        for key in keys {
            let raw = match self.backend.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) | Err(_) => continue,
            };
            stats.total_bytes += raw.len();
            let item = match serde_json::from_str::<StoredEntry>(&raw) {
                Ok(entry) => EntryStats {
                    key,
                    age_ms: entry.age_ms(now),
                    ttl_ms: entry.ttl,
                    size_bytes: raw.len(),
                    expired: entry.is_expired(now),
                },
                Err(_) => EntryStats {
                    key,
                    age_ms: 0,
                    ttl_ms: 0,
                    size_bytes: raw.len(),
                    expired: true,
                },
            };
            stats.items.push(item);
        }
        stats.entries = stats.items.len();
        stats
    }
}
