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

use crate::payload::Payload;
use crate::storage::{ObjectStore, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::error;

/// Append-only run log of one invocation, kept as a single object in the
/// store. The key is fixed at construction: lines emitted while a
/// successor is being dispatched still belong to the node that emitted
/// them.
pub struct WorkflowLog {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl WorkflowLog {
    pub fn new(store: Arc<dyn ObjectStore>, payload: &Payload) -> Self {
        let key = format!(
            "{}/{}/{}.txt",
            payload.log_root(),
            payload.invocation_id(),
            payload.function_invoke()
        );
        Self { store, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append is read-modify-write; the backing store has no append
    /// primitive.
    pub async fn append(&self, message: &str) -> Result<(), StorageError> {
        let mut log = match self.store.get_object(&self.key).await? {
            Some(existing) => existing.to_vec(),
            None => Vec::new(),
        };
        log.extend_from_slice(message.as_bytes());
        if !message.ends_with('\n') {
            log.push(b'\n');
        }
        self.store.put_object(&self.key, Bytes::from(log)).await
    }

    /// For call sites where a failing log write must not mask the primary
    /// outcome (trigger dispatch, lock release).
    pub async fn append_best_effort(&self, message: &str) {
        if let Err(err) = self.append(message).await {
            error!("failed to append to the run log: {err}");
        }
    }
}
