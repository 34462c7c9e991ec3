//! Cache-backed view of the metrics API.
//!
//! Routes every read through the stale-while-revalidate cache under this
//! application's key namespace: dashboard-wide reads under `dashboard:*`
//! with the general TTL, per-host detail under `host:*` with the shorter
//! detail TTL. Push-channel invalidation messages map straight onto
//! [`CachedApi::handle_invalidation`].

use tracing::debug;

use pulsedeck_client::ApiClient;
use pulsedeck_core::error::CacheError;
use pulsedeck_core::SwrCache;
use pulsedeck_types::{HostMetrics, SystemOverview};

/// Metrics API reads with stale-while-revalidate caching.
#[derive(Clone)]
pub struct CachedApi {
    api: ApiClient,
    cache: SwrCache,
}

impl CachedApi {
    pub fn new(api: ApiClient, cache: SwrCache) -> Self {
        Self { api, cache }
    }

    /// The underlying cache, for maintenance and introspection.
    pub fn cache(&self) -> &SwrCache {
        &self.cache
    }

    /// Dashboard overview, cached under `dashboard:overview`.
    pub async fn system_overview(&self) -> Result<SystemOverview, CacheError> {
        let api = self.api.clone();
        let ttl = self.cache.config().default_ttl;
        self.cache
            .fetch("dashboard:overview", ttl, move || async move {
                api.system_overview().await.map_err(anyhow::Error::from)
            })
            .await
    }

    /// Known hostnames, cached under `dashboard:hostnames`.
    pub async fn system_hostnames(&self) -> Result<Vec<String>, CacheError> {
        let api = self.api.clone();
        let ttl = self.cache.config().default_ttl;
        self.cache
            .fetch("dashboard:hostnames", ttl, move || async move {
                api.system_hostnames().await.map_err(anyhow::Error::from)
            })
            .await
    }

    /// Per-host detail, cached under `host:<hostname>:<hours>`.
    pub async fn host_metrics(
        &self,
        hostname: &str,
        hours: u32,
    ) -> Result<HostMetrics, CacheError> {
        let api = self.api.clone();
        let host = hostname.to_string();
        let key = format!("host:{hostname}:{hours}");
        let ttl = self.cache.config().host_detail_ttl;
        self.cache
            .fetch(&key, ttl, move || async move {
                api.host_metrics(&host, hours)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await
    }

    /// Drop the entries a server-side invalidation message names.
    pub async fn handle_invalidation(&self, cache_keys: &[String]) {
        for key in cache_keys {
            debug!(key = %key, "server-requested invalidation");
            self.cache.invalidate(key).await;
        }
    }
}
