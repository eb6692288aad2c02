use super::{StorageError, StorageProvider};
use crate::model::Parameter;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Operation counts, for asserting how much work a flow did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounters {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub conflicts: u64,
    /// Largest number of items held at once.
    pub high_water_mark: usize,
}

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<String, String>,
    counters: StoreCounters,
}

/// Process-local store with the same conditional semantics as the shared one.
#[derive(Debug, Default)]
pub struct InMemoryStorageProvider {
    inner: Mutex<Inner>,
}

impl InMemoryStorageProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an item directly, bypassing conditions and counters.
    pub fn seed(&self, path: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.lock();
        inner.items.insert(path.into(), value.into());
        inner.counters.high_water_mark = inner.counters.high_water_mark.max(inner.items.len());
    }

    /// Copy of every stored item.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().items.clone()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.lock().items.get(path).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    #[must_use]
    pub fn counters(&self) -> StoreCounters {
        self.lock().counters
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn put(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
        ignore_if_exists: bool,
    ) -> Result<(), StorageError> {
        let path = parameter.storage_full_path(prefix);
        let mut inner = self.lock();
        if inner.items.contains_key(&path) {
            inner.counters.conflicts += 1;
            return if ignore_if_exists {
                Ok(())
            } else {
                Err(StorageError::Conflict { path })
            };
        }
        inner.items.insert(path, value.to_string());
        inner.counters.writes += 1;
        inner.counters.high_water_mark = inner.counters.high_water_mark.max(inner.items.len());
        Ok(())
    }

    async fn delete(
        &self,
        prefix: &str,
        parameter: &Parameter,
        expected_value: &str,
    ) -> Result<bool, StorageError> {
        let path = parameter.storage_full_path(prefix);
        let mut inner = self.lock();
        if inner.items.get(&path).map(String::as_str) != Some(expected_value) {
            return Ok(false);
        }
        inner.items.remove(&path);
        inner.counters.deletes += 1;
        Ok(true)
    }

    async fn get_value_by_key(
        &self,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<Option<String>, StorageError> {
        let path = parameter.storage_full_path(prefix);
        let mut inner = self.lock();
        inner.counters.reads += 1;
        Ok(inner.items.get(&path).cloned())
    }

    async fn get_key_by_parameter_and_value(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
    ) -> Result<Option<String>, StorageError> {
        let scan_prefix = parameter.storage_scan_prefix(prefix);
        let mut inner = self.lock();
        inner.counters.reads += 1;
        Ok(inner
            .items
            .range(scan_prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&scan_prefix))
            .find(|(_, stored)| stored.as_str() == value)
            .map(|(key, _)| key.clone()))
    }

    async fn get_keys_by_parameter(
        &self,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<Vec<String>, StorageError> {
        let scan_prefix = parameter.storage_scan_prefix(prefix);
        let mut inner = self.lock();
        inner.counters.reads += 1;
        Ok(inner
            .items
            .range(scan_prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&scan_prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn exists(&self, prefix: &str, parameter: &Parameter) -> Result<bool, StorageError> {
        let path = parameter.storage_full_path(prefix);
        let mut inner = self.lock();
        inner.counters.reads += 1;
        Ok(inner.items.contains_key(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(name: &str) -> Parameter {
        Parameter::construct("bsycorp.com", &format!("secret.bsycorp.com/{name}"), "kind=DYNAMIC,type=RANDOM,size=128")
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_conflict_and_ignore() {
        let store = InMemoryStorageProvider::new();
        let parameter = secret("common.key");
        store.put("local", &parameter, "first", false).await.unwrap();

        let err = store.put("local", &parameter, "second", false).await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");

        store.put("local", &parameter, "third", true).await.unwrap();
        assert_eq!(
            store.get_value_by_key("local", &parameter).await.unwrap().as_deref(),
            Some("first"),
            "first written value must win"
        );
        assert_eq!(store.counters().conflicts, 2);
    }

    #[tokio::test]
    async fn test_delete_requires_matching_value() {
        let store = InMemoryStorageProvider::new();
        let parameter = secret("common.key");
        store.put("local", &parameter, "pod-a", false).await.unwrap();
        assert!(!store.delete("local", &parameter, "pod-b").await.unwrap());
        assert!(store.exists("local", &parameter).await.unwrap());
        assert!(store.delete("local", &parameter, "pod-a").await.unwrap());
        assert!(!store.exists("local", &parameter).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_value_is_none() {
        let store = InMemoryStorageProvider::new();
        assert_eq!(store.get_value_by_key("local", &secret("absent")).await.unwrap(), None);
    }
}
