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

use crate::model::{
    ComputeServerConfig, DataStoreConfig, FunctionSpec, Rank, S3Credentials, WorkflowDocument,
};
use faasr_common::SafeDisplay;
use std::collections::BTreeSet;
use url::Url;

/// The in-memory view of the workflow document for one invocation.
///
/// All mutation goes through setters which record the touched top-level
/// field, so the override set is maintained at the point of mutation
/// instead of being diffed against the original at serialization time.
#[derive(Debug, Clone)]
pub struct Payload {
    document: WorkflowDocument,
    overwritten: BTreeSet<&'static str>,
    url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid data server name: {0}")]
    UnknownDataStore(String),
    #[error("missing key in S3 data store: {0}")]
    MissingCredentials(&'static str),
    #[error("invalid rank value: {0}")]
    InvalidRank(String),
}

impl SafeDisplay for PayloadError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

impl Payload {
    pub fn new(document: WorkflowDocument) -> Self {
        Self {
            document,
            overwritten: BTreeSet::new(),
            url: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Remembers the origin URL of a payload fetched over HTTP; passed by
    /// reference to providers that cannot take the document by value.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn document(&self) -> &WorkflowDocument {
        &self.document
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn function_invoke(&self) -> &str {
        &self.document.function_invoke
    }

    pub fn invocation_id(&self) -> &str {
        &self.document.invocation_id
    }

    pub fn log_root(&self) -> &str {
        &self.document.faasr_log
    }

    pub fn function_spec(&self, name: &str) -> Result<&FunctionSpec, PayloadError> {
        self.document
            .function_list
            .get(name)
            .ok_or_else(|| PayloadError::UnknownFunction(name.to_string()))
    }

    pub fn current_function_spec(&self) -> Result<&FunctionSpec, PayloadError> {
        self.function_spec(&self.document.function_invoke)
    }

    pub fn compute_server(&self, name: &str) -> Option<&ComputeServerConfig> {
        self.document.compute_servers.get(name)
    }

    pub fn set_function_invoke(&mut self, name: &str) {
        self.document.function_invoke = name.to_string();
        self.overwritten.insert("FunctionInvoke");
    }

    pub fn set_rank(&mut self, function: &str, rank: &Rank) -> Result<(), PayloadError> {
        let spec = self
            .document
            .function_list
            .get_mut(function)
            .ok_or_else(|| PayloadError::UnknownFunction(function.to_string()))?;
        spec.rank = Some(rank.to_string());
        self.overwritten.insert("FunctionList");
        Ok(())
    }

    /// This node's shard within its fan-out group; `1/1` when the node was
    /// not dispatched as part of a ranked group.
    pub fn current_rank(&self) -> Result<Rank, PayloadError> {
        match &self.current_function_spec()?.rank {
            Some(rank) => rank
                .parse()
                .map_err(|_| PayloadError::InvalidRank(rank.clone())),
            None => Ok(Rank { index: 1, count: 1 }),
        }
    }

    /// Deep copy of the document, safe to hand out for serialization.
    pub fn get_complete_workflow(&self) -> WorkflowDocument {
        self.document.clone()
    }

    /// The top-level fields changed since load, as a JSON object. This is
    /// what providers taking the payload by URL apply over the fetched
    /// original.
    pub fn overwritten_fields(
        &self,
    ) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        let document = serde_json::to_value(&self.document)?;
        let mut fields = serde_json::Map::new();
        if let serde_json::Value::Object(all) = document {
            for (key, value) in all {
                if self.overwritten.contains(key.as_str()) {
                    fields.insert(key, value);
                }
            }
        }
        Ok(fields)
    }

    pub fn data_store(&self, name: Option<&str>) -> Result<&DataStoreConfig, PayloadError> {
        let name = name
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.document.default_data_store);
        self.document
            .data_stores
            .get(name)
            .ok_or_else(|| PayloadError::UnknownDataStore(name.to_string()))
    }

    pub fn default_data_store(&self) -> Result<&DataStoreConfig, PayloadError> {
        self.data_store(None)
    }

    /// Credential lookup by store name (default store when `name` is empty
    /// or absent). Keys are withheld for anonymous stores.
    pub fn s3_credentials(&self, name: Option<&str>) -> Result<S3Credentials, PayloadError> {
        let store = self.data_store(name)?;
        let anonymous = store.is_anonymous();
        let (access_key, secret_key) = if anonymous {
            (None, None)
        } else {
            let access_key = store
                .access_key
                .clone()
                .ok_or(PayloadError::MissingCredentials("AccessKey"))?;
            let secret_key = store
                .secret_key
                .clone()
                .ok_or(PayloadError::MissingCredentials("SecretKey"))?;
            (Some(access_key), Some(secret_key))
        };
        Ok(S3Credentials {
            bucket: store.bucket.clone(),
            region: store.region.clone(),
            endpoint: store.endpoint.clone(),
            access_key,
            secret_key,
            anonymous,
        })
    }
}
