// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::storage::{ObjectStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-process object store, shared between contenders in tests the same
/// way a bucket is shared between processes in production.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::Internal("store lock poisoned".to_string()))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::Internal("store lock poisoned".to_string()))?;
        Ok(objects.get(key).cloned())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::Internal("store lock poisoned".to_string()))?;
        objects.remove(key);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::Internal("store lock poisoned".to_string()))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
