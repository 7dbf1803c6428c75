//! Storage layer for Brannvern
//!
//! This crate provides the local key-value substrate used by the offline
//! layer and the response cache built on top of it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod kv;

pub use cache::{CacheConfig, CacheError, ResponseCache};
pub use kv::{KvBatch, KvConfig, KvError, KvStore};
