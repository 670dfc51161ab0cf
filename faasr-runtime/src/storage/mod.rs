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

pub mod fs;
pub mod memory;
pub mod s3;

use crate::model::DataStoreConfig;
use async_trait::async_trait;
use bytes::Bytes;
use faasr_common::SafeDisplay;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("object store error: {0}")]
    Internal(String),
}

impl SafeDisplay for StorageError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

/// The object-store capability the runtime core is written against. Keys
/// are `/`-separated paths within a single bucket-like namespace.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Deleting an absent key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// All keys starting with `prefix`, in lexicographic order.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Opens object stores for the data-store entries named in the payload.
#[async_trait]
pub trait ObjectStoreFactory: Send + Sync {
    async fn open(&self, config: &DataStoreConfig) -> Result<Arc<dyn ObjectStore>, StorageError>;
}
