// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StateStore, StoreKey};
use crate::error::StoreError;

/// Single-process store used when no cluster backend is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StoreKey, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store partitioned"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.write().await.insert(key.clone(), value);
        Ok(())
    }

    async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn contains_key(&self, key: &StoreKey) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn compare_and_swap(
        &self,
        key: &StoreKey,
        expected: Option<Vec<u8>>,
        replacement: Option<Vec<u8>>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        if entries.get(key) != expected.as_ref() {
            return Ok(false);
        }
        match replacement {
            Some(value) => entries.insert(key.clone(), value),
            None => entries.remove(key),
        };
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove_cycle() {
        let store = MemoryStore::new();
        let key = StoreKey::new("ns", "a");

        assert_eq!(store.get(&key).await.unwrap(), None);
        store.put(&key, b"one".to_vec()).await.unwrap();
        assert!(store.contains_key(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(b"one".to_vec()));

        store.remove(&key).await.unwrap();
        assert!(!store.contains_key(&key).await.unwrap());
        store.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn put_if_absent_keeps_first_writer() {
        let store = MemoryStore::new();
        let key = StoreKey::new("ns", "b");

        assert!(store.put_if_absent(&key, b"first".to_vec()).await.unwrap());
        assert!(!store.put_if_absent(&key, b"second".to_vec()).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn compare_and_swap_requires_the_expected_value() {
        let store = MemoryStore::new();
        let key = StoreKey::new("ns", "d");
        store.put(&key, b"v1".to_vec()).await.unwrap();

        assert!(!store
            .compare_and_swap(&key, Some(b"v0".to_vec()), Some(b"v2".to_vec()))
            .await
            .unwrap());
        assert!(store
            .compare_and_swap(&key, Some(b"v1".to_vec()), Some(b"v2".to_vec()))
            .await
            .unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(b"v2".to_vec()));

        assert!(!store.compare_and_swap(&key, None, None).await.unwrap());
        assert!(store
            .compare_and_swap(&key, Some(b"v2".to_vec()), None)
            .await
            .unwrap());
        assert!(!store.contains_key(&key).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        let key = StoreKey::new("ns", "c");
        store.put(&key, b"x".to_vec()).await.unwrap();
        store.set_unavailable(true);

        assert!(matches!(
            store.get(&key).await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.contains_key(&key).await.is_err());
        assert!(store.put(&key, b"y".to_vec()).await.is_err());
        assert!(store.remove(&key).await.is_err());

        store.set_unavailable(false);
        assert_eq!(store.get(&key).await.unwrap(), Some(b"x".to_vec()));
    }
}
