//! In-process cache with per-key expiry, for development without Valkey and for tests.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

type Entries = HashMap<String, (String, Instant)>;

#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock is never held across an await point.
    fn lock(&self) -> CacheResult<MutexGuard<'_, Entries>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::BackendCommand("memory cache lock poisoned".to_string()))?;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(entries)
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.lock()?.get(key).map(|(v, _)| v.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.lock()?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let mut entries = self.lock()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn take_string(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.lock()?.remove(key).map(|(v, _)| v))
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        Ok(u64::from(self.lock()?.remove(key).is_some()))
    }
}
