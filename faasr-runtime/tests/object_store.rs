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

use faasr_runtime::storage::fs::FileSystemObjectStore;
use faasr_runtime::storage::memory::InMemoryObjectStore;
use faasr_runtime::storage::ObjectStore;
use std::sync::Arc;
use tempfile::TempDir;

test_r::enable!();

pub trait GetObjectStore {
    fn get_object_store(&self) -> Arc<dyn ObjectStore>;
}

pub struct MemoryTest {
    store: Arc<InMemoryObjectStore>,
}

impl GetObjectStore for MemoryTest {
    fn get_object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }
}

pub async fn make_memory() -> MemoryTest {
    MemoryTest {
        store: Arc::new(InMemoryObjectStore::new()),
    }
}

pub struct FsTest {
    _dir: TempDir,
    store: Arc<FileSystemObjectStore>,
}

impl GetObjectStore for FsTest {
    fn get_object_store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }
}

pub async fn make_fs() -> FsTest {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = Arc::new(
        FileSystemObjectStore::new(dir.path())
            .await
            .expect("Failed to create file system store"),
    );
    FsTest { _dir: dir, store }
}

macro_rules! test_object_store {
    ( $name:ident, $init:expr ) => {
        mod $name {
            use crate::GetObjectStore;
            use assert2::check;
            use bytes::Bytes;
            use test_r::test;

            #[test]
            async fn get_put_get() {
                let test = $init().await;
                let storage = test.get_object_store();

                let missing = storage.get_object("run/data").await.unwrap();
                storage
                    .put_object("run/data", Bytes::from("test-data"))
                    .await
                    .unwrap();
                let found = storage.get_object("run/data").await.unwrap();

                check!(missing == None);
                check!(found == Some(Bytes::from("test-data")));
            }

            #[test]
            async fn put_overwrites() {
                let test = $init().await;
                let storage = test.get_object_store();

                storage
                    .put_object("run/data", Bytes::from("one"))
                    .await
                    .unwrap();
                storage
                    .put_object("run/data", Bytes::from("two"))
                    .await
                    .unwrap();

                check!(storage.get_object("run/data").await.unwrap() == Some(Bytes::from("two")));
            }

            #[test]
            async fn delete_is_idempotent() {
                let test = $init().await;
                let storage = test.get_object_store();

                storage
                    .put_object("run/data", Bytes::from("test-data"))
                    .await
                    .unwrap();
                storage.delete_object("run/data").await.unwrap();
                check!(storage.get_object("run/data").await.unwrap() == None);

                // deleting an absent key must not fail
                storage.delete_object("run/data").await.unwrap();
            }

            #[test]
            async fn list_filters_by_prefix_in_order() {
                let test = $init().await;
                let storage = test.get_object_store();

                for key in ["runs/a/2", "runs/a/1", "runs/b/3", "other/x"] {
                    storage.put_object(key, Bytes::new()).await.unwrap();
                }

                let under_a = storage.list_objects("runs/a/").await.unwrap();
                check!(under_a == vec!["runs/a/1".to_string(), "runs/a/2".to_string()]);

                let all = storage.list_objects("").await.unwrap();
                check!(
                    all == vec![
                        "other/x".to_string(),
                        "runs/a/1".to_string(),
                        "runs/a/2".to_string(),
                        "runs/b/3".to_string(),
                    ]
                );

                let none = storage.list_objects("missing/").await.unwrap();
                check!(none.is_empty());
            }
        }
    };
}

test_object_store!(memory, crate::make_memory);
test_object_store!(fs, crate::make_fs);
