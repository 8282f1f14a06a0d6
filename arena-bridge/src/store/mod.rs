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

//! Cluster-wide key/value store contract.
//!
//! Operations are linearizable per key and nothing more: there is no
//! multi-key transaction, so every consumer treats what it reads as advisory.

mod dynamo;
mod memory;

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreError;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

/// Logical key, rendered as `"{namespace}/{entity_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(namespace: &str, entity_id: impl fmt::Display) -> Self {
        Self(format!("{namespace}/{entity_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError>;

    async fn remove(&self, key: &StoreKey) -> Result<(), StoreError>;

    async fn contains_key(&self, key: &StoreKey) -> Result<bool, StoreError>;

    /// Replaces the value only while it still equals `expected` (`None` means
    /// absent). A `replacement` of `None` deletes the key. Returns whether the
    /// swap happened.
    async fn compare_and_swap(
        &self,
        key: &StoreKey,
        expected: Option<Vec<u8>>,
        replacement: Option<Vec<u8>>,
    ) -> Result<bool, StoreError>;

    /// Writes only when the key is absent. Returns whether the write happened.
    async fn put_if_absent(&self, key: &StoreKey, value: Vec<u8>) -> Result<bool, StoreError> {
        self.compare_and_swap(key, None, Some(value)).await
    }
}
