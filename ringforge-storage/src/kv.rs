//! Prefix-scannable key -> document store - spec.md §4's "KV Store" and
//! the design-note on prefix scans in spec.md §9.

use async_trait::async_trait;
use ringforge_core::{RingForgeResult, StorageError};
use std::sync::Arc;

/// A prefix-scannable key -> JSON document store. Backs DM queues, threads,
/// escalations, announcements, notifications, and business rules.
///
/// Implementations must produce a total lexical order over keys so that
/// `list_prefix` results can be reverse-iterated and bounded without loading
/// the full universe - spec.md §9's design note on scalable prefix scans.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> RingForgeResult<Option<String>>;

    async fn put(&self, key: &str, value: String) -> RingForgeResult<()>;

    async fn delete(&self, key: &str) -> RingForgeResult<()>;

    /// All entries whose key starts with `prefix`, ascending lexical order.
    async fn list_prefix(&self, prefix: &str) -> RingForgeResult<Vec<(String, String)>>;
}

/// Convenience: the last `limit` entries under `prefix`, ascending order,
/// optionally filtered to keys strictly less than `before` (lexical compare,
/// matching the timestamp-prefixed keys used by threads/announcements).
pub async fn list_prefix_tail(
    store: &dyn KvStore,
    prefix: &str,
    limit: usize,
    before: Option<&str>,
) -> RingForgeResult<Vec<(String, String)>> {
    let mut all = store.list_prefix(prefix).await?;
    if let Some(before) = before {
        all.retain(|(k, _)| k.as_str() < before);
    }
    if all.len() > limit {
        all = all.split_off(all.len() - limit);
    }
    Ok(all)
}

pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> RingForgeResult<Option<T>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(raw) => {
            let value = serde_json::from_str(&raw).map_err(|e| {
                ringforge_core::RingForgeError::Storage(StorageError::Serialization {
                    reason: e.to_string(),
                })
            })?;
            Ok(Some(value))
        }
    }
}

pub async fn put_json<T: serde::Serialize + Sync>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> RingForgeResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| {
        ringforge_core::RingForgeError::Storage(StorageError::Serialization { reason: e.to_string() })
    })?;
    store.put(key, raw).await
}

/// Simple in-process `KvStore`, backed by a `BTreeMap` behind a mutex so
/// prefix scans come back in lexical order for free.
pub struct InMemoryKvStore {
    inner: parking_lot::Mutex<std::collections::BTreeMap<String, String>>,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self { inner: parking_lot::Mutex::new(std::collections::BTreeMap::new()) }
    }
}

impl InMemoryKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> RingForgeResult<Option<String>> {
        Ok(self.inner.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> RingForgeResult<()> {
        self.inner.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> RingForgeResult<()> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> RingForgeResult<Vec<(String, String)>> {
        let guard = self.inner.lock();
        Ok(guard
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Per-key mutual exclusion for the read-modify-write cycles spec.md §5
/// requires on shared KV keys (thread counters, escalation indexes,
/// notification lists).
#[derive(Default)]
pub struct KeyLocks {
    locks: dashmap::DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`. Concurrent callers for the
    /// same key serialize; callers for different keys never block each
    /// other.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;
        f().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_scan_is_lexically_ordered() {
        let store = InMemoryKvStore::new();
        store.put("thr_msg:t1:0003:m3", "c".into()).await.unwrap();
        store.put("thr_msg:t1:0001:m1", "a".into()).await.unwrap();
        store.put("thr_msg:t1:0002:m2", "b".into()).await.unwrap();
        store.put("thr_msg:t2:0001:m4", "d".into()).await.unwrap();

        let got = store.list_prefix("thr_msg:t1:").await.unwrap();
        let keys: Vec<_> = got.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec!["thr_msg:t1:0001:m1", "thr_msg:t1:0002:m2", "thr_msg:t1:0003:m3"]
        );
    }

    #[tokio::test]
    async fn tail_respects_before_and_limit() {
        let store = InMemoryKvStore::new();
        for i in 1..=5 {
            store.put(&format!("k:{i:04}"), i.to_string()).await.unwrap();
        }
        let tail = list_prefix_tail(store.as_ref(), "k:", 2, Some("k:0004")).await.unwrap();
        let keys: Vec<_> = tail.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["k:0002", "k:0003"]);
    }

    #[tokio::test]
    async fn delete_removes_the_key() {
        let store = InMemoryKvStore::new();
        store.put("a", "1".into()).await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
