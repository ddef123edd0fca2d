//! Namespaced key/value cache
//!
//! Backs three unrelated concerns that share one store:
//! - the per-user role memo (`user-role` namespace),
//! - one-shot signal flags read by the policy auto-loader,
//! - the token denylist.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AppResult;

/// Namespaces and fixed keys
pub mod ns {
    /// Memoized role ids per user id
    pub const USER_ROLE: &str = "user-role";
    /// Role signals
    pub const ROLE: &str = "role";
    /// Set when a role leaves the enforced set (deleted or disabled)
    pub const KEY_ROLE_DELETED: &str = "deleted";
    /// Menu signals
    pub const MENU: &str = "menu";
    /// Set when the menu/action/resource graph changes
    pub const KEY_MENU_CHANGED: &str = "changed";
    /// Destroyed tokens, keyed by the raw token string
    pub const JWT_REVOKED: &str = "jwt-revoked";
}

/// Cached role ids for a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCache {
    pub role_ids: Vec<String>,
}

#[async_trait]
pub trait Cacher: Send + Sync {
    /// Store a value; `None` ttl never expires
    async fn set(&self, ns: &str, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    async fn get(&self, ns: &str, key: &str) -> AppResult<Option<String>>;

    /// Remove and return a value in one step, so only one caller observes it
    async fn get_and_delete(&self, ns: &str, key: &str) -> AppResult<Option<String>>;

    async fn exists(&self, ns: &str, key: &str) -> AppResult<bool>;

    async fn delete(&self, ns: &str, key: &str) -> AppResult<()>;

    /// Drop expired entries. Stores that expire keys themselves keep the default.
    async fn sweep(&self) -> AppResult<usize> {
        Ok(0)
    }

    /// Release the underlying resource
    async fn close(&self) -> AppResult<()>;
}

/// Periodically sweep `cache` until `shutdown` is cancelled
pub fn spawn_sweeper(
    cache: Arc<dyn Cacher>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = cache.sweep().await {
                        tracing::warn!("Cache sweep failed: {}", e);
                    }
                }
            }
        }
    })
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process cache on a sharded map. Expired entries are dropped when touched
/// or by [`MemoryCache::purge_expired`].
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(ns: &str, key: &str) -> String {
        format!("{}:{}", ns, key)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cacher for MemoryCache {
    async fn set(&self, ns: &str, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.insert(Self::full_key(ns, key), entry);
        Ok(())
    }

    async fn get(&self, ns: &str, key: &str) -> AppResult<Option<String>> {
        let full_key = Self::full_key(ns, key);
        if let Some(entry) = self.entries.get(&full_key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove_if(&full_key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn get_and_delete(&self, ns: &str, key: &str) -> AppResult<Option<String>> {
        match self.entries.remove(&Self::full_key(ns, key)) {
            Some((_, entry)) if !entry.is_expired() => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    async fn exists(&self, ns: &str, key: &str) -> AppResult<bool> {
        Ok(self.get(ns, key).await?.is_some())
    }

    async fn delete(&self, ns: &str, key: &str) -> AppResult<()> {
        self.entries.remove(&Self::full_key(ns, key));
        Ok(())
    }

    async fn sweep(&self) -> AppResult<usize> {
        Ok(self.purge_expired())
    }

    async fn close(&self) -> AppResult<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let cache = MemoryCache::new();
        cache.set("a", "k", "1", None).await.unwrap();
        cache.set("b", "k", "2", None).await.unwrap();

        assert_eq!(cache.get("a", "k").await.unwrap().as_deref(), Some("1"));
        assert_eq!(cache.get("b", "k").await.unwrap().as_deref(), Some("2"));

        cache.delete("a", "k").await.unwrap();
        assert!(!cache.exists("a", "k").await.unwrap());
        assert!(cache.exists("b", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_and_delete_fires_once() {
        let cache = MemoryCache::new();
        cache.set(ns::ROLE, ns::KEY_ROLE_DELETED, "1", None).await.unwrap();
        // Setting again is idempotent
        cache.set(ns::ROLE, ns::KEY_ROLE_DELETED, "1", None).await.unwrap();

        assert!(cache.get_and_delete(ns::ROLE, ns::KEY_ROLE_DELETED).await.unwrap().is_some());
        assert!(cache.get_and_delete(ns::ROLE, ns::KEY_ROLE_DELETED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("ns", "short", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        cache.set("ns", "long", "v", None).await.unwrap();
        assert!(cache.exists("ns", "short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.exists("ns", "short").await.unwrap());
        assert!(cache.get_and_delete("ns", "short").await.unwrap().is_none());
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("ns", "a", "v", Some(Duration::from_millis(1))).await.unwrap();
        cache.set("ns", "b", "v", Some(Duration::from_millis(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let memory = Arc::new(MemoryCache::new());
        memory.set("ns", "a", "v", Some(Duration::from_millis(1))).await.unwrap();
        let cache: Arc<dyn Cacher> = memory.clone();

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(cache, Duration::from_millis(5), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(memory.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_clears() {
        let cache = MemoryCache::new();
        cache.set("ns", "a", "v", None).await.unwrap();
        cache.close().await.unwrap();
        assert!(cache.is_empty());
    }
}
