//! In-process key-value store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{entry_size, Blob, KvStore};
use crate::error::{Error, Result};

#[derive(Default)]
struct Inner {
    data: HashMap<String, Blob>,
    fail_get: Option<String>,
    fail_set: Option<String>,
    fail_remove: Option<String>,
}

/// Non-persistent store backed by a `HashMap`
///
/// Each `fail_next_*` hook makes the next call of that operation fail once
/// with the given message, without touching the data.
#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `get` fail with `msg`
    pub fn fail_next_get(&self, msg: impl Into<String>) {
        self.inner.lock().fail_get = Some(msg.into());
    }

    /// Make the next `set` fail with `msg`
    pub fn fail_next_set(&self, msg: impl Into<String>) {
        self.inner.lock().fail_set = Some(msg.into());
    }

    /// Make the next `remove` fail with `msg`
    pub fn fail_next_remove(&self, msg: impl Into<String>) {
        self.inner.lock().fail_remove = Some(msg.into());
    }

    /// Snapshot of a single entry
    pub fn peek(&self, key: &str) -> Option<Blob> {
        self.inner.lock().data.get(key).cloned()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Blob>> {
        let mut inner = self.inner.lock();
        if let Some(msg) = inner.fail_get.take() {
            return Err(Error::Store(msg));
        }
        Ok(keys
            .iter()
            .filter_map(|k| inner.data.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, items: HashMap<String, Blob>) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(msg) = inner.fail_set.take() {
            return Err(Error::Store(msg));
        }
        inner.data.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(msg) = inner.fail_remove.take() {
            return Err(Error::Store(msg));
        }
        for key in keys {
            inner.data.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner.lock().data.clear();
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner.data.iter().map(|(k, v)| entry_size(k, v)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(ks: &[&str]) -> Vec<String> {
        ks.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let kv = MemoryKv::new();
        kv.set(HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!({"x": true})),
        ]))
        .await
        .unwrap();

        let got = kv.get(&keys(&["a", "b", "missing"])).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got["a"], json!(1));

        kv.remove(&keys(&["a", "missing"])).await.unwrap();
        assert!(kv.peek("a").is_none());
        assert_eq!(kv.len(), 1);

        kv.clear().await.unwrap();
        assert!(kv.is_empty());
        assert_eq!(kv.bytes_in_use().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let kv = MemoryKv::new();
        kv.fail_next_set("quota exceeded");
        let err = kv
            .set(HashMap::from([("a".to_string(), json!(1))]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(ref m) if m == "quota exceeded"));
        assert!(kv.is_empty());

        kv.set(HashMap::from([("a".to_string(), json!(1))]))
            .await
            .unwrap();
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_bytes_in_use() {
        let kv = MemoryKv::new();
        kv.set(HashMap::from([("key".to_string(), json!("value"))]))
            .await
            .unwrap();
        assert_eq!(kv.bytes_in_use().await.unwrap(), 3 + 7);
    }
}
