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

use crate::config::DebugConfig;
use crate::model::S3Credentials;
use crate::payload::{Payload, PayloadError};
use crate::service::logs::WorkflowLog;
use crate::storage::{ObjectStore, ObjectStoreFactory, StorageError};
use bytes::Bytes;
use faasr_common::SafeDisplay;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum FileServiceError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("local file not found: {0}")]
    LocalFileNotFound(String),
    #[error("remote file not found: {0}")]
    RemoteFileNotFound(String),
    #[error("file system error: {0}")]
    Io(String),
}

impl SafeDisplay for FileServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            Self::Payload(inner) => inner.to_safe_string(),
            Self::Storage(inner) => inner.to_safe_string(),
            _ => self.to_string(),
        }
    }
}

/// The object-store services exposed to the user function: file transfer
/// to and from named data stores, folder listing, run-log appends and
/// credential lookup.
pub struct FileService {
    payload: Arc<RwLock<Payload>>,
    stores: Arc<dyn ObjectStoreFactory>,
    log: Arc<WorkflowLog>,
    debug: DebugConfig,
}

impl FileService {
    pub fn new(
        payload: Arc<RwLock<Payload>>,
        stores: Arc<dyn ObjectStoreFactory>,
        log: Arc<WorkflowLog>,
        debug: DebugConfig,
    ) -> Self {
        Self {
            payload,
            stores,
            log,
            debug,
        }
    }

    pub async fn log(&self, message: &str) -> Result<(), StorageError> {
        info!("{message}");
        self.log.append(message).await
    }

    pub async fn put_file(
        &self,
        server_name: &str,
        local_folder: &str,
        local_file: &str,
        remote_folder: &str,
        remote_file: &str,
    ) -> Result<(), FileServiceError> {
        let remote_path = join_remote(remote_folder, remote_file);
        let local_path = resolve_local(local_folder, local_file);
        if !local_path.exists() {
            return Err(FileServiceError::LocalFileNotFound(
                local_path.display().to_string(),
            ));
        }

        if self.debug.use_local_file_system {
            let target = self.debug.local_file_system_dir.join(&remote_path);
            info!("writing {local_file} to {remote_path} inside of local bucket");
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|error| FileServiceError::Io(error.to_string()))?;
            }
            tokio::fs::copy(&local_path, &target)
                .await
                .map_err(|error| FileServiceError::Io(error.to_string()))?;
            return Ok(());
        }

        let store = self.open_store(server_name).await?;
        let data = tokio::fs::read(&local_path)
            .await
            .map_err(|error| FileServiceError::Io(error.to_string()))?;
        store.put_object(&remote_path, Bytes::from(data)).await?;
        Ok(())
    }

    pub async fn get_file(
        &self,
        server_name: &str,
        local_folder: &str,
        local_file: &str,
        remote_folder: &str,
        remote_file: &str,
    ) -> Result<(), FileServiceError> {
        let remote_path = join_remote(remote_folder, remote_file);
        let store = self.open_store(server_name).await?;
        let data = store
            .get_object(&remote_path)
            .await?
            .ok_or(FileServiceError::RemoteFileNotFound(remote_path))?;

        let local_path = resolve_local(local_folder, local_file);
        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|error| FileServiceError::Io(error.to_string()))?;
            }
        }
        tokio::fs::write(&local_path, &data)
            .await
            .map_err(|error| FileServiceError::Io(error.to_string()))?;
        Ok(())
    }

    pub async fn delete_file(
        &self,
        server_name: &str,
        remote_folder: &str,
        remote_file: &str,
    ) -> Result<(), FileServiceError> {
        let remote_path = join_remote(remote_folder, remote_file);
        let store = self.open_store(server_name).await?;
        store.delete_object(&remote_path).await?;
        Ok(())
    }

    pub async fn get_folder_list(
        &self,
        server_name: &str,
        prefix: &str,
    ) -> Result<Vec<String>, FileServiceError> {
        let store = self.open_store(server_name).await?;
        Ok(store.list_objects(prefix).await?)
    }

    pub async fn get_s3_creds(&self, server_name: &str) -> Result<S3Credentials, FileServiceError> {
        let payload = self.payload.read().await;
        Ok(payload.s3_credentials(Some(server_name))?)
    }

    async fn open_store(&self, server_name: &str) -> Result<Arc<dyn ObjectStore>, FileServiceError> {
        let config = {
            let payload = self.payload.read().await;
            payload.data_store(Some(server_name))?.clone()
        };
        Ok(self.stores.open(&config).await?)
    }
}

/// Collapses runs of `/` and strips trailing `/`, so that user-supplied
/// folder and file names cannot produce duplicated separators.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let mut out = String::with_capacity(trimmed.len());
    let mut previous_was_slash = false;
    for c in trimmed.chars() {
        if c == '/' {
            if !previous_was_slash {
                out.push(c);
            }
            previous_was_slash = true;
        } else {
            out.push(c);
            previous_was_slash = false;
        }
    }
    out
}

fn join_remote(folder: &str, file: &str) -> String {
    let folder = normalize(folder);
    let file = normalize(file);
    if folder.is_empty() || folder == "." {
        file
    } else {
        normalize(&format!("{folder}/{file}"))
    }
}

/// A `local_file` that carries directory components wins over the default
/// folder, so paths relative to the working directory keep working.
fn resolve_local(folder: &str, file: &str) -> PathBuf {
    let file_path = Path::new(file);
    let has_components = file_path
        .parent()
        .map(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(false);
    if folder == "." && has_components {
        file_path.to_path_buf()
    } else if folder == "." {
        PathBuf::from(normalize(file))
    } else {
        Path::new(&normalize(folder)).join(normalize(file))
    }
}

#[cfg(test)]
mod tests {
    use super::{join_remote, normalize, resolve_local};
    use assert2::check;
    use std::path::PathBuf;
    use test_r::test;

    #[test]
    fn normalize_collapses_duplicate_separators() {
        check!(normalize("//remote/folder//") == "/remote/folder");
        check!(normalize("file_name/") == "file_name");
        check!(normalize("a/b") == "a/b");
    }

    #[test]
    fn remote_paths_skip_the_default_folder() {
        check!(join_remote(".", "out.csv") == "out.csv");
        check!(join_remote("results//", "/out.csv") == "results/out.csv");
        check!(join_remote("results", "out.csv") == "results/out.csv");
    }

    #[test]
    fn local_file_with_directories_overrides_the_folder() {
        check!(resolve_local(".", "data/in.csv") == PathBuf::from("data/in.csv"));
        check!(resolve_local(".", "in.csv") == PathBuf::from("in.csv"));
        check!(resolve_local("inputs", "in.csv") == PathBuf::from("inputs/in.csv"));
    }
}
