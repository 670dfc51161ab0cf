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
use crate::service::logs::WorkflowLog;
use crate::storage::{ObjectStore, StorageError};
use bytes::Bytes;
use faasr_common::SafeDisplay;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const MAX_CNT: u32 = 4;
const MAX_WAIT: u32 = 13;

/// Mutual exclusion between concurrently arriving instances of the same
/// node, realized over the shared object store with a two-phase
/// flag-then-lock scheme. The store offers no compare-and-swap; ties are
/// resolved by list-after-write visibility of the flags, and liveness is
/// protected by the bounded retry budget rather than by flag cleanup.
pub struct LockService {
    store: Arc<dyn ObjectStore>,
    log: Arc<WorkflowLog>,
    spin_unit: Duration,
}

/// Identifies the lock for one `(InvocationID, FunctionInvoke)` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockScope {
    pub log_root: String,
    pub invocation_id: String,
    pub function: String,
}

impl LockScope {
    pub fn for_payload(payload: &Payload) -> Self {
        Self {
            log_root: payload.log_root().to_string(),
            invocation_id: payload.invocation_id().to_string(),
            function: payload.function_invoke().to_string(),
        }
    }

    pub fn flag_prefix(&self) -> String {
        format!(
            "{}/{}/{}/flag/",
            self.log_root, self.invocation_id, self.function
        )
    }

    pub fn flag_key(&self, nonce: i32) -> String {
        format!("{}{nonce}", self.flag_prefix())
    }

    /// The `./` between the function id and `lock` is byte-for-byte part of
    /// the on-store compatibility contract.
    pub fn lock_key(&self) -> String {
        format!(
            "{}/{}/{}./lock",
            self.log_root, self.invocation_id, self.function
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LockError {
    #[error("failed to upload flag: {0}")]
    StoreUnavailable(String),
    #[error("lock acquire timeout")]
    Timeout,
}

impl SafeDisplay for LockError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RsmOutcome {
    Acquired,
    LockHeld,
    FlagContention,
}

impl LockService {
    pub fn new(store: Arc<dyn ObjectStore>, log: Arc<WorkflowLog>) -> Self {
        Self {
            store,
            log,
            spin_unit: Duration::from_secs(1),
        }
    }

    /// Shrinks the backoff unit; the schedule itself (powers of two,
    /// saturation, retry budget) is not configurable.
    pub fn with_spin_unit(mut self, spin_unit: Duration) -> Self {
        self.spin_unit = spin_unit;
        self
    }

    /// Spins over `rsm` attempts with exponential backoff (`2^cnt` units,
    /// saturating at `2^4`) until the lock is acquired or the retry budget
    /// of 13 backoffs is exhausted.
    pub async fn acquire(&self, scope: &LockScope) -> Result<(), LockError> {
        let mut cnt: u32 = 0;
        loop {
            match self.rsm(scope).await? {
                RsmOutcome::Acquired => return Ok(()),
                RsmOutcome::LockHeld => debug!("lock for {} is held, spinning", scope.function),
                RsmOutcome::FlagContention => {
                    debug!("flag contention for {}, backing off", scope.function)
                }
            }
            self.backoff(&mut cnt).await?;
        }
    }

    async fn backoff(&self, cnt: &mut u32) -> Result<(), LockError> {
        tokio::time::sleep(self.spin_unit * (1u32 << (*cnt).min(MAX_CNT))).await;
        *cnt += 1;
        if *cnt > MAX_WAIT {
            let message = r#"{"faasr_acquire":"Lock Acquire Timeout"}"#;
            error!("{message}");
            self.log.append_best_effort(message).await;
            Err(LockError::Timeout)
        } else {
            Ok(())
        }
    }

    /// A single attempt of the two-phase protocol:
    ///
    /// 1. write our flag (a fresh nonce per attempt; failing to write it is
    ///    fatal, the store is gone),
    /// 2. list the flag prefix; any key other than our own is a live
    ///    contender (including stale flags of crashed attempts and listings
    ///    that do not include our own write yet), so withdraw and retry,
    /// 3. alone: if the lock object already exists a previous holder is
    ///    active, withdraw and spin,
    /// 4. otherwise write the lock with our nonce as its body and remove
    ///    the flag.
    async fn rsm(&self, scope: &LockScope) -> Result<RsmOutcome, LockError> {
        let nonce: i32 = rand::rng().random_range(1..=i32::MAX);
        let flag_key = scope.flag_key(nonce);

        if let Err(err) = self.store.put_object(&flag_key, Bytes::new()).await {
            let message = format!(r#"{{"faasr_lock":"failed to upload flag -- {err}"}}"#);
            error!("{message}");
            self.log.append_best_effort(&message).await;
            return Err(LockError::StoreUnavailable(err.to_string()));
        }

        if self.anyone_else_interested(scope, &flag_key).await? {
            self.withdraw_flag(&flag_key).await;
            return Ok(RsmOutcome::FlagContention);
        }

        let lock_key = scope.lock_key();
        let lock_exists = !self
            .store
            .list_objects(&lock_key)
            .await
            .map_err(|err| LockError::StoreUnavailable(err.to_string()))?
            .is_empty();
        if lock_exists {
            self.withdraw_flag(&flag_key).await;
            return Ok(RsmOutcome::LockHeld);
        }

        self.store
            .put_object(&lock_key, Bytes::from(nonce.to_string()))
            .await
            .map_err(|err| LockError::StoreUnavailable(err.to_string()))?;
        self.withdraw_flag(&flag_key).await;
        Ok(RsmOutcome::Acquired)
    }

    /// True unless our own flag is the only one under the prefix. A listing
    /// that does not show our own flag yet counts as contention too.
    async fn anyone_else_interested(
        &self,
        scope: &LockScope,
        flag_key: &str,
    ) -> Result<bool, LockError> {
        let pool = self
            .store
            .list_objects(&scope.flag_prefix())
            .await
            .map_err(|err| LockError::StoreUnavailable(err.to_string()))?;
        Ok(!(pool.len() == 1 && pool[0] == flag_key))
    }

    async fn withdraw_flag(&self, flag_key: &str) {
        if let Err(err) = self.store.delete_object(flag_key).await {
            warn!("failed to withdraw flag {flag_key}: {err}");
        }
    }

    /// Best-effort: the lock object is deleted; a failure is logged, never
    /// raised, and deleting an already-released lock is a no-op.
    pub async fn release(&self, scope: &LockScope) {
        if let Err(err) = self.store.delete_object(&scope.lock_key()).await {
            let message = format!(r#"{{"faasr_lock":"failed to release lock -- {err}"}}"#);
            error!("{message}");
            self.log.append_best_effort(&message).await;
        }
    }

    /// The current holder's nonce, read from the lock body.
    pub async fn holder(&self, scope: &LockScope) -> Result<Option<String>, StorageError> {
        Ok(self
            .store
            .get_object(&scope.lock_key())
            .await?
            .map(|body| String::from_utf8_lossy(&body).to_string()))
    }
}
