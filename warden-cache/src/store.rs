use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

use crate::error::CacheError;

/// Pluggable cache backend: get/set with TTL and prefix bulk delete over
/// opaque string keys.
///
/// Implement this to put the tenant cache on Redis, Memcached, etc.
pub trait CacheStore: Send + Sync + 'static {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, CacheError>> + Send + 'a>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;

    fn remove<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;

    /// Remove every key starting with `prefix`; returns how many were removed.
    fn remove_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>>;
}

/// In-memory cache store backed by `DashMap`.
///
/// Each entry stores `(value, inserted_at, ttl)` and is lazily evicted on
/// access.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<DashMap<String, (Bytes, Instant, Duration)>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .iter()
            .filter(|e| e.value().1.elapsed() < e.value().2)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .get(key)
            .is_some_and(|e| e.value().1.elapsed() < e.value().2)
    }

    /// Make every operation fail until turned off.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

impl CacheStore for InMemoryStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            if let Some(entry) = self.inner.get(key) {
                let (val, inserted, ttl) = entry.value();
                if inserted.elapsed() < *ttl {
                    return Ok(Some(val.clone()));
                }
                drop(entry);
                self.inner.remove(key);
            }
            Ok(None)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            self.inner.insert(key.to_string(), (value, Instant::now(), ttl));
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            self.inner.remove(key);
            Ok(())
        })
    }

    fn remove_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            let mut removed = 0;
            self.inner.retain(|k, _| {
                let keep = !k.starts_with(prefix);
                removed += usize::from(!keep);
                keep
            });
            Ok(removed)
        })
    }
}
