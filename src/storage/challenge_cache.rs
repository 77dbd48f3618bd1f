// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for outstanding one-time codes.
//!
//! Each entry carries its own expiry. Expired entries are dropped lazily on
//! read; the LRU bound keeps a flood of challenge requests from growing the
//! map without limit (the oldest outstanding code is evicted first).

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::{ChallengeStore, StorageError, StorageResult};

/// Default number of outstanding challenges kept in memory.
pub const DEFAULT_CHALLENGE_CAPACITY: usize = 10_000;

/// Cached entry: code + absolute expiry.
struct ChallengeEntry {
    code: String,
    expires_at: Instant,
}

/// In-process challenge store.
pub struct MemoryChallengeStore {
    cache: Mutex<LruCache<String, ChallengeEntry>>,
}

impl MemoryChallengeStore {
    /// Create a new store holding at most `capacity` outstanding codes.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries currently held (including not-yet-evicted expired ones).
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> StorageResult<std::sync::MutexGuard<'_, LruCache<String, ChallengeEntry>>> {
        self.cache
            .lock()
            .map_err(|_| StorageError::Backend("challenge cache lock poisoned".to_string()))
    }
}

impl Default for MemoryChallengeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHALLENGE_CAPACITY)
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn put(&self, key: &str, code: &str, ttl: Duration) -> StorageResult<()> {
        let mut cache = self.lock()?;
        cache.put(
            key.to_string(),
            ChallengeEntry {
                code: code.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<String> {
        let mut cache = self.lock()?;
        if let Some(entry) = cache.get(key) {
            if Instant::now() < entry.expires_at {
                return Ok(entry.code.clone());
            }
            // Expired
            cache.pop(key);
        }
        Err(StorageError::NotFound(format!("challenge for {key}")))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let mut cache = self.lock()?;
        cache.pop(key);
        Ok(())
    }

    async fn consume(&self, key: &str, code: &str) -> StorageResult<bool> {
        let mut cache = self.lock()?;
        let Some(entry) = cache.peek(key) else {
            return Ok(false);
        };
        if Instant::now() >= entry.expires_at {
            cache.pop(key);
            return Ok(false);
        }
        if entry.code != code {
            return Ok(false);
        }
        cache.pop(key);
        Ok(true)
    }
}
