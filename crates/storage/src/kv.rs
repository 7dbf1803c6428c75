//! Key-value store for local persistence
//!
//! This module provides a type-safe key-value store using sled. Values are
//! stored as JSON. Multi-key writes go through [`KvBatch`], which is applied in a
//! single sled transaction.

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use std::sync::Arc;
use thiserror::Error;

/// Key-value store error types
#[derive(Debug, Error)]
pub enum KvError {
    /// Sled database error
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid key
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for key-value operations
pub type Result<T> = std::result::Result<T, KvError>;

/// Key-value store configuration
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Database path
    pub path: String,
    /// Cache capacity in bytes
    pub cache_capacity: u64,
    /// Enable compression
    pub use_compression: bool,
    /// Flush interval in milliseconds (None for flushing only on demand)
    pub flush_every_ms: Option<u64>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: "brannvern_kv.db".to_string(),
            cache_capacity: 16 * 1024 * 1024, // 16MB
            use_compression: true,
            flush_every_ms: Some(500),
        }
    }
}

impl KvConfig {
    /// Create a new configuration with a custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set cache capacity in bytes
    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Enable or disable compression
    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }

    /// Set flush interval in milliseconds
    pub fn flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }
}

enum BatchOp {
    Set(String, Vec<u8>),
    Remove(String),
    SetIfPresent(String, Vec<u8>),
    MoveIfPresent { from: String, to: String, value: Vec<u8> },
}

/// A set of writes applied atomically by [`KvStore::apply`]
///
/// Conditional operations see the store as it is when the batch is applied,
/// so an entry removed by someone else in the meantime is not brought back.
#[derive(Default)]
pub struct KvBatch {
    ops: Vec<BatchOp>,
}

impl KvBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write of `value` under `key`
    pub fn set<T>(&mut self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.ops.push(BatchOp::Set(key.to_string(), serde_json::to_vec(value)?));
        Ok(())
    }

    /// Queue a write of `value` under `key` that only happens if `key` exists
    pub fn set_if_present<T>(&mut self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.ops.push(BatchOp::SetIfPresent(key.to_string(), serde_json::to_vec(value)?));
        Ok(())
    }

    /// Queue removal of `from` and a write of `value` under `to`, both
    /// skipped if `from` does not exist
    pub fn move_if_present<T>(&mut self, from: &str, to: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.ops.push(BatchOp::MoveIfPresent {
            from: from.to_string(),
            to: to.to_string(),
            value: serde_json::to_vec(value)?,
        });
        Ok(())
    }

    /// Queue removal of `key`
    pub fn remove(&mut self, key: &str) {
        self.ops.push(BatchOp::Remove(key.to_string()));
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether no operation has been queued
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Key-value store implementation
#[derive(Clone)]
pub struct KvStore {
    db: Arc<Db>,
}

impl KvStore {
    /// Create a new key-value store with configuration
    pub fn new(config: KvConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .use_compression(config.use_compression)
            .flush_every_ms(config.flush_every_ms)
            .open()?;

        tracing::debug!(path = %config.path, "opened key-value store");

        Ok(Self { db: Arc::new(db) })
    }

    /// Create an in-memory key-value store (for testing)
    pub fn in_memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a value by key
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => {
                let value: T = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a value by key
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        if key.is_empty() {
            return Err(KvError::InvalidKey("key must not be empty".to_string()));
        }
        let bytes = serde_json::to_vec(value)?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Remove a value by key
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    /// Get all keys with a given prefix, in key order
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            if let Ok(key_str) = String::from_utf8(key.to_vec()) {
                keys.push(key_str);
            }
        }

        Ok(keys)
    }

    /// Get all values under a prefix, in key order
    ///
    /// Fails on the first value that cannot be decoded as `T`.
    pub fn scan_prefix<T>(&self, prefix: &str) -> Result<Vec<(String, T)>>
    where
        T: DeserializeOwned,
    {
        let mut entries = Vec::new();

        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            let Ok(key_str) = String::from_utf8(key.to_vec()) else {
                continue;
            };
            let decoded: T = serde_json::from_slice(&value)?;
            entries.push((key_str, decoded));
        }

        Ok(entries)
    }

    /// Count keys under a prefix
    pub fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let mut count = 0;
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove every key under a prefix, returning how many were removed
    pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.keys_with_prefix(prefix)?;
        let mut batch = KvBatch::new();
        for key in &keys {
            batch.remove(key);
        }
        self.apply(batch)?;
        Ok(keys.len())
    }

    /// Apply a batch of writes atomically
    pub fn apply(&self, batch: KvBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.db
            .transaction(|tx| {
                for op in &batch.ops {
                    match op {
                        BatchOp::Set(key, value) => {
                            tx.insert(key.as_bytes(), value.as_slice())?;
                        }
                        BatchOp::Remove(key) => {
                            tx.remove(key.as_bytes())?;
                        }
                        BatchOp::SetIfPresent(key, value) => {
                            if tx.get(key.as_bytes())?.is_some() {
                                tx.insert(key.as_bytes(), value.as_slice())?;
                            }
                        }
                        BatchOp::MoveIfPresent { from, to, value } => {
                            if tx.remove(from.as_bytes())?.is_some() {
                                tx.insert(to.as_bytes(), value.as_slice())?;
                            }
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<sled::Error>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) | TransactionError::Storage(e) => KvError::Database(e),
            })
    }

    /// Generate a monotonically increasing identifier
    ///
    /// Identifiers are unique for the lifetime of the database, including
    /// across restarts.
    pub fn generate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
