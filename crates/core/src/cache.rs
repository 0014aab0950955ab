//! Per-user TTL caches over the control plane
//!
//! `TtlCache` backs the two data-plane caches (rules: 60 s, config: 300 s).
//! Guarantees:
//! - **Single-flight**: under concurrent misses for one key, at most one
//!   upstream fetch is in flight; the other callers wait and reuse it.
//! - **Stale-on-error**: when a refresh fails, the last-known value is
//!   served if one exists; otherwise the caller-provided default, with a
//!   warning either way. Failures are not cached, so recovery is immediate.
//!
//! The data plane never writes through these caches; control-plane
//! mutations propagate by TTL expiry.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default TTL for the per-user rules cache
pub const RULES_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default TTL for the per-user config cache
pub const CONFIG_CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry<T> {
    value: T,
    fetched_at: Instant,
}

/// TTL cache keyed by user id with single-flight refresh.
pub struct TtlCache<T: Clone> {
    ttl: Duration,
    entries: DashMap<String, CacheEntry<T>>,
    /// Per-key fetch guards so only one worker populates a missing key
    guards: DashMap<String, Arc<Mutex<()>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            guards: DashMap::new(),
        }
    }

    fn fresh_value(&self, key: &str) -> Option<T> {
        self.entries.get(key).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    fn stale_value(&self, key: &str) -> Option<T> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn guard_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.guards
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return the cached value for `key`, fetching through `fetch` when the
    /// entry is missing or expired. `default` is used only when the fetch
    /// fails and no previous value exists.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        default: impl FnOnce() -> T,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        if let Some(value) = self.fresh_value(key) {
            return value;
        }

        // Take the per-key guard; the dashmap ref is dropped before awaiting
        let guard = self.guard_for(key);
        let _held = guard.lock().await;

        // Another waiter may have refreshed while we queued on the guard
        if let Some(value) = self.fresh_value(key) {
            return value;
        }

        match fetch().await {
            Ok(value) => {
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                value
            }
            Err(e) => {
                if let Some(stale) = self.stale_value(key) {
                    tracing::warn!(key, "Upstream fetch failed, serving stale value: {}", e);
                    stale
                } else {
                    tracing::warn!(key, "Upstream fetch failed, serving default: {}", e);
                    default()
                }
            }
        }
    }

    /// Drop the entry for a key (test and admin use)
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
