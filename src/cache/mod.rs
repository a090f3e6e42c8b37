pub mod error;
pub mod static_cache;

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::{
    channel::{Channel, ChannelKey},
    config::CacheConfig,
    telem::{Series, TimeRange},
};

pub use error::CacheError;
pub use static_cache::{CacheEntry, DirtyRead, GcResult, InsertionPlan, StaticCache};

pub type CacheLock = Arc<RwLock<StaticCache>>;

/// Registry of per-channel caches, created on first use
pub struct CacheManager {
    stale_after: Duration,
    /// channel key -> cache
    caches: Mutex<HashMap<ChannelKey, CacheLock>>,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            caches: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, channel: &Channel) -> CacheLock {
        let mut caches = self.caches.lock().await;
        caches
            .entry(channel.key)
            .or_insert_with(|| {
                debug!(key = channel.key, name = %channel.name, "creating cache");
                Arc::new(RwLock::new(StaticCache::new(
                    channel.clone(),
                    self.stale_after,
                )))
            })
            .clone()
    }

    pub async fn get(&self, key: ChannelKey) -> Option<CacheLock> {
        self.caches.lock().await.get(&key).cloned()
    }

    pub async fn write(&self, key: ChannelKey, series: Vec<Series>) -> Result<(), CacheError> {
        let cache = self.get(key).await.ok_or(CacheError::UnknownChannel(key))?;
        cache.write().await.write(series)
    }

    pub async fn dirty_read(
        &self,
        key: ChannelKey,
        range: TimeRange,
    ) -> Result<DirtyRead, CacheError> {
        let cache = self.get(key).await.ok_or(CacheError::UnknownChannel(key))?;
        let read = cache.read().await.dirty_read(range);
        Ok(read)
    }

    /// Runs gc on every channel. Never called automatically.
    pub async fn gc(&self) -> GcResult {
        let caches: Vec<CacheLock> = self.caches.lock().await.values().cloned().collect();
        let mut res = GcResult::default();
        for cache in caches {
            res += cache.write().await.gc();
        }
        debug!(
            purged_count = res.purged_count,
            purged_bytes = res.purged_bytes,
            "gc complete"
        );
        res
    }

    pub async fn close_channel(&self, key: ChannelKey) {
        if let Some(cache) = self.caches.lock().await.remove(&key) {
            cache.write().await.close();
        }
    }

    pub async fn close(&self) {
        let caches: Vec<CacheLock> = self.caches.lock().await.drain().map(|(_, c)| c).collect();
        for cache in caches {
            cache.write().await.close();
        }
    }

    pub async fn len(&self) -> usize {
        self.caches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.caches.lock().await.is_empty()
    }
}
