//! In-memory record store

use crate::traits::{Store, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-memory [`Store`] backed by a concurrent map.
///
/// Reads share the lock; every write holds it for exactly one record operation.
/// Contents are lost when the process exits.
pub struct MemoryStore<V> {
    records: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<V> Clone for MemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, key: &str, value: V) -> StorageResult<()> {
        let mut records = self.records.write().await;
        records.insert(key.to_string(), value);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        apply: &mut (dyn for<'r> FnMut(&'r mut V) + Send),
    ) -> StorageResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(key) {
            Some(record) => {
                apply(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<Option<V>> {
        let mut records = self.records.write().await;
        Ok(records.remove(key))
    }

    async fn scan(&self) -> StorageResult<Vec<(String, V)>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn len(&self) -> StorageResult<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store: MemoryStore<u32> = MemoryStore::new();
        store.put("a", 1).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(1));
        assert_eq!(store.get("missing").await.unwrap(), None);

        assert_eq!(store.delete("a").await.unwrap(), Some(1));
        assert_eq!(store.delete("a").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_key_is_noop() {
        let store: MemoryStore<u32> = MemoryStore::new();
        let mut called = false;
        let found = store
            .update("ghost", &mut |_: &mut u32| {
                called = true;
            })
            .await
            .unwrap();
        assert!(!found);
        assert!(!called);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let store: MemoryStore<u64> = MemoryStore::new();
        store.put("counter", 0).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.update("counter", &mut |n: &mut u64| *n += 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("counter").await.unwrap(), Some(800));
    }

    #[tokio::test]
    async fn test_scan_returns_snapshot() {
        let store: MemoryStore<String> = MemoryStore::new();
        store.put("x", "1".to_string()).await.unwrap();
        store.put("y", "2".to_string()).await.unwrap();

        let mut all = store.scan().await.unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let store: Arc<dyn Store<u8>> = Arc::new(MemoryStore::new());
        store.put("k", 7).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_update_through_trait_object_mutates_record() {
        let store: Arc<dyn Store<Vec<String>>> = Arc::new(MemoryStore::new());
        store.put("log", Vec::new()).await.unwrap();

        let entry = "first".to_string();
        let found = store
            .update("log", &mut |lines: &mut Vec<String>| lines.push(entry.clone()))
            .await
            .unwrap();

        assert!(found);
        assert_eq!(store.get("log").await.unwrap(), Some(vec!["first".to_string()]));
    }
}
