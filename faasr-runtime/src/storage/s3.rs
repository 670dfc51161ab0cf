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

use crate::model::DataStoreConfig;
use crate::storage::{ObjectStore, ObjectStoreFactory, StorageError};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// S3-compatible object store for one bucket, addressed by the credentials
/// carried in a payload data-store entry.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &DataStoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone().unwrap_or_default(),
            config.secret_key.clone().unwrap_or_default(),
            None,
            None,
            "faasr-data-store",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone().unwrap_or_default()))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    fn sdk_error<E: std::fmt::Debug, R: std::fmt::Debug>(
        operation: &str,
        error: SdkError<E, R>,
    ) -> StorageError {
        match &error {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                StorageError::Unavailable(format!("{operation}: {error:?}"))
            }
            _ => StorageError::Internal(format!("{operation}: {error:?}")),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        debug!("PutObject {}/{}", self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|error| Self::sdk_error("PutObject", error))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        debug!("GetObject {}/{}", self.bucket, key);
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => {
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|error| StorageError::Internal(format!("GetObject: {error}")))?;
                Ok(Some(data.into_bytes()))
            }
            Err(SdkError::ServiceError(error)) if error.err().is_no_such_key() => Ok(None),
            Err(error) => Err(Self::sdk_error("GetObject", error)),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        debug!("DeleteObject {}/{}", self.bucket, key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| Self::sdk_error("DeleteObject", error))?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        debug!("ListObjectsV2 {}/{}*", self.bucket, prefix);
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|error| Self::sdk_error("ListObjectsV2", error))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}

pub struct S3ObjectStoreFactory;

#[async_trait]
impl ObjectStoreFactory for S3ObjectStoreFactory {
    async fn open(&self, config: &DataStoreConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(Arc::new(S3ObjectStore::new(config)))
    }
}
