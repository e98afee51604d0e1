use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::key::CacheKey;
use crate::store::CacheStore;

/// Read-through cache for tenant-scoped views.
///
/// The cache is never the source of truth: a store that fails or holds an
/// undecodable value degrades to calling the loader.
#[derive(Clone)]
pub struct TenantCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl TenantCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        TenantCache { store, default_ttl }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the cached value for `key`, or run `loader` and cache its
    /// result for `ttl` (the default TTL when `None`). Loader errors are
    /// returned as-is and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    tracing::trace!(key = %key, "cache hit");
                    return Ok(value);
                }
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "dropping undecodable cache entry");
                    if let Err(err) = self.store.remove(key.as_str()).await {
                        tracing::warn!(key = %key, error = %err, "cache remove failed");
                    }
                }
            },
            Ok(None) => tracing::trace!(key = %key, "cache miss"),
            Err(err) => tracing::warn!(key = %key, error = %err, "cache read failed, loading"),
        }

        let value = loader().await?;
        match serde_json::to_vec(&value) {
            Ok(encoded) => {
                let ttl = ttl.unwrap_or(self.default_ttl);
                if let Err(err) = self.store.set(key.as_str(), Bytes::from(encoded), ttl).await {
                    tracing::warn!(key = %key, error = %err, "cache write failed");
                }
            }
            Err(err) => tracing::warn!(key = %key, error = %err, "value not cacheable"),
        }
        Ok(value)
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(err) = self.store.remove(key.as_str()).await {
            tracing::warn!(key = %key, error = %err, "cache remove failed");
        }
    }
}
