//! RocksDB-backed key-value store
//!
//! Persistent storage using RocksDB with LZ4 compression. Values are kept as
//! JSON bytes so the byte accounting matches the in-memory adapter.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};

use super::{Blob, KvStore};
use crate::error::{Error, Result};

/// Adapter failures carry the engine's message verbatim
fn store_error(e: rocksdb::Error) -> Error {
    Error::store(e.into_string())
}

/// RocksDB key-value store
pub struct RocksKv {
    db: Arc<DB>,
}

impl RocksKv {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path).map_err(store_error)?;

        log::info!("RocksKv opened at: {}", path.display());

        Ok(Self { db: Arc::new(db) })
    }

    fn all_keys(&self) -> Result<Vec<Box<[u8]>>> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item.map_err(store_error)?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[async_trait]
impl KvStore for RocksKv {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Blob>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.db.get(key.as_bytes()).map_err(store_error)? else {
                continue;
            };
            // Gracefully handle deserialization errors
            match serde_json::from_slice::<Blob>(&bytes) {
                Ok(value) => {
                    found.insert(key.clone(), value);
                }
                Err(e) => {
                    log::warn!("Failed to deserialize {}: {}. Skipping.", key, e);
                }
            }
        }
        Ok(found)
    }

    async fn set(&self, items: HashMap<String, Blob>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in &items {
            batch.put(key.as_bytes(), serde_json::to_vec(value)?);
        }
        self.db.write(batch).map_err(store_error)?;
        self.db.flush().map_err(store_error)?;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for key in keys {
            batch.delete(key.as_bytes());
        }
        self.db.write(batch).map_err(store_error)?;
        self.db.flush().map_err(store_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut batch = WriteBatch::default();
        for key in self.all_keys()? {
            batch.delete(key);
        }
        self.db.write(batch).map_err(store_error)?;
        self.db.flush().map_err(store_error)?;
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<u64> {
        let mut total = 0u64;
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(store_error)?;
            total += (key.len() + value.len()) as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_roundtrip_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let kv = RocksKv::open(temp_dir.path()).unwrap();
            kv.set(HashMap::from([
                ("projects".to_string(), json!([{"pk": 0, "name": "default"}])),
                ("0:0".to_string(), json!({"starred": true})),
            ]))
            .await
            .unwrap();
        }

        let kv = RocksKv::open(temp_dir.path()).unwrap();
        let got = kv
            .get(&["0:0".to_string(), "0:1".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["0:0"], json!({"starred": true}));
    }

    #[tokio::test]
    async fn test_remove_clear_and_usage() {
        let temp_dir = TempDir::new().unwrap();
        let kv = RocksKv::open(temp_dir.path()).unwrap();

        kv.set(HashMap::from([
            ("a".to_string(), json!("x")),
            ("b".to_string(), json!("y")),
        ]))
        .await
        .unwrap();
        // key (1 byte) + "\"x\"" (3 bytes), twice
        assert_eq!(kv.bytes_in_use().await.unwrap(), 8);

        kv.remove(&["a".to_string()]).await.unwrap();
        assert_eq!(kv.bytes_in_use().await.unwrap(), 4);

        kv.clear().await.unwrap();
        assert_eq!(kv.bytes_in_use().await.unwrap(), 0);
        assert!(kv.get(&["b".to_string()]).await.unwrap().is_empty());
    }

    #[test]
    fn test_engine_failure_is_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let _held = RocksKv::open(temp_dir.path()).unwrap();

        // the first handle holds the lock file
        let err = RocksKv::open(temp_dir.path()).err().unwrap();
        assert!(matches!(err, Error::Store(_)), "got {:?}", err);
    }
}
