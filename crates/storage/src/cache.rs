//! Response cache
//!
//! Keeps the last-known-good server response for each caller-chosen key so
//! screens can render while offline. Entries never expire and the latest write
//! wins. Every entry is persisted in the key-value store; a bounded LRU layer
//! in memory serves hot reads without touching disk.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use thiserror::Error;

use crate::kv::{KvError, KvStore};

/// Key prefix for cache entries in the key-value store
pub const CACHE_PREFIX: &str = "cache:";

/// Cache error types
#[derive(Debug, Error)]
pub enum CacheError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// KV store error
    #[error("KV store error: {0}")]
    Kv(#[from] KvError),

    /// Invalid cache key
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory
    pub memory_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { memory_entries: 256 }
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of entries kept in memory
    pub fn memory_entries(mut self, max: usize) -> Self {
        self.memory_entries = max;
        self
    }
}

/// Persistent cache of last-known-good responses
pub struct ResponseCache {
    kv: KvStore,
    memory: Mutex<LruCache<String, Value>>,
}

impl ResponseCache {
    /// Create a cache backed by `kv`
    pub fn new(kv: KvStore, config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.memory_entries).unwrap_or(NonZeroUsize::MIN);

        Self { kv, memory: Mutex::new(LruCache::new(capacity)) }
    }

    fn storage_key(key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("cache key must not be empty".to_string()));
        }
        Ok(format!("{CACHE_PREFIX}{key}"))
    }

    /// Get the cached value for `key`
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        if let Some(value) = self.memory.lock().get(key).cloned() {
            return Ok(Some(serde_json::from_value(value)?));
        }

        let stored: Option<Value> = self.kv.get(&Self::storage_key(key)?)?;
        match stored {
            Some(value) => {
                self.memory.lock().put(key.to_string(), value.clone());
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, replacing any previous entry
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let storage_key = Self::storage_key(key)?;
        let value = serde_json::to_value(value)?;
        self.kv.set(&storage_key, &value)?;
        self.memory.lock().put(key.to_string(), value);
        Ok(())
    }

    /// Remove the entry for `key`
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.memory.lock().pop(key);
        Ok(self.kv.remove(&Self::storage_key(key)?)?)
    }

    /// Check whether an entry exists for `key`
    pub fn contains(&self, key: &str) -> Result<bool> {
        if self.memory.lock().contains(key) {
            return Ok(true);
        }
        Ok(self.kv.contains(&Self::storage_key(key)?)?)
    }

    /// List all cached keys
    pub fn keys(&self) -> Result<Vec<String>> {
        let keys = self.kv.keys_with_prefix(CACHE_PREFIX)?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(CACHE_PREFIX).map(str::to_string))
            .collect())
    }

    /// Remove every cached entry
    pub fn clear(&self) -> Result<usize> {
        self.memory.lock().clear();
        Ok(self.kv.remove_prefix(CACHE_PREFIX)?)
    }

    /// Number of entries currently held in memory
    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }
}
