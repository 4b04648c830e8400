//! Key-value store adapters
//!
//! The index persists everything through [`KvStore`], a string-keyed blob
//! store with batched, asynchronous operations. Failures are returned as-is;
//! adapters never retry.

mod memory;
mod rocks;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use memory::MemoryKv;
pub use rocks::RocksKv;

/// A stored value
pub type Blob = Value;

/// Asynchronous string-keyed blob store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the given keys; absent keys are simply missing from the result
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Blob>>;

    /// Write every entry in one batch
    async fn set(&self, items: HashMap<String, Blob>) -> Result<()>;

    /// Delete the given keys; absent keys are ignored
    async fn remove(&self, keys: &[String]) -> Result<()>;

    /// Delete everything
    async fn clear(&self) -> Result<()>;

    /// Bytes currently occupied, measured as key length plus JSON length
    async fn bytes_in_use(&self) -> Result<u64>;
}

/// Size a key/value pair is charged against the byte budget
pub(crate) fn entry_size(key: &str, value: &Blob) -> u64 {
    (key.len() + value.to_string().len()) as u64
}
