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
use crate::drivers::{DriverError, InvocationDriver};
use crate::model::{ComputeServerConfig, FaaSType, InvokeNextEntry, Rank, TriggerRef};
use crate::payload::Payload;
use crate::service::lock::{LockError, LockScope, LockService};
use crate::service::logs::WorkflowLog;
use faasr_common::SafeDisplay;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("InvokeNext contains conditionals but function did not return a value")]
    MissingConditionValue,
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("transport error: {0}")]
    TransportFatal(String),
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl SafeDisplay for SchedulerError {
    fn to_safe_string(&self) -> String {
        match self {
            Self::Lock(inner) => inner.to_safe_string(),
            _ => self.to_string(),
        }
    }
}

/// Computes the successor set of the finished node and dispatches one
/// trigger per successor shard to the provider the successor lives on.
pub struct Scheduler {
    payload: Arc<RwLock<Payload>>,
    log: Arc<WorkflowLog>,
    lock: Arc<LockService>,
    drivers: HashMap<FaaSType, Arc<dyn InvocationDriver>>,
    debug: DebugConfig,
}

impl Scheduler {
    pub fn new(
        payload: Arc<RwLock<Payload>>,
        log: Arc<WorkflowLog>,
        lock: Arc<LockService>,
        drivers: HashMap<FaaSType, Arc<dyn InvocationDriver>>,
        debug: DebugConfig,
    ) -> Self {
        Self {
            payload,
            log,
            lock,
            drivers,
            debug,
        }
    }

    /// Triggers the next nodes of the DAG, gated by the user function's
    /// return value where `InvokeNext` is conditional. Successors are
    /// dispatched in declared order; a failing successor does not prevent
    /// the remaining ones (except for the OpenWhisk transport contract,
    /// which aborts the whole set).
    pub async fn trigger(
        &self,
        return_value: Option<serde_json::Value>,
    ) -> Result<(), SchedulerError> {
        let (current, entries) = {
            let payload = self.payload.read().await;
            let current = payload.function_invoke().to_string();
            let entries = payload
                .current_function_spec()
                .map_err(|_| SchedulerError::UnknownFunction(current.clone()))?
                .invoke_next
                .clone();
            (current, entries)
        };

        if entries.is_empty() {
            let message = format!(r#"{{"faasr_trigger":"no triggers for {current}"}}"#);
            info!("{message}");
            self.log.append_best_effort(&message).await;
            return Ok(());
        }

        let has_conditionals = entries
            .iter()
            .any(|entry| matches!(entry, InvokeNextEntry::Conditional(_)));
        if has_conditionals && return_value.is_none() {
            let message = r#"{"faasr_trigger":"ERROR -- InvokeNext contains conditionals but function did not return a value"}"#;
            error!("{message}");
            self.log.append_best_effort(message).await;
            return Err(SchedulerError::MissingConditionValue);
        }

        for entry in entries {
            match entry {
                InvokeNextEntry::Function(reference) => self.dispatch(&reference).await?,
                InvokeNextEntry::Conditional(branches) => {
                    let value = return_value
                        .as_ref()
                        .ok_or(SchedulerError::MissingConditionValue)?;
                    // An absent branch for this return value dispatches nothing
                    if let Some(targets) = branches.get(&condition_key(value)) {
                        for reference in &targets.0 {
                            self.dispatch(reference).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Dispatches one successor reference, fanning `name(K)` out into `K`
    /// ranked invocations in ascending order.
    pub async fn dispatch(&self, reference: &TriggerRef) -> Result<(), SchedulerError> {
        let name = &reference.name;
        let count = reference.rank;

        {
            let mut payload = self.payload.write().await;
            payload.set_function_invoke(name);
        }

        let (server, predecessors) = {
            let payload = self.payload.read().await;
            let spec = match payload.function_spec(name) {
                Ok(spec) => spec,
                Err(_) => {
                    let message =
                        format!(r#"{{"faasr_trigger":"invalid function reference: {name}"}}"#);
                    error!("{message}");
                    self.log.append_best_effort(&message).await;
                    return Ok(());
                }
            };
            let server_name = spec.faas_server.clone();
            match payload.compute_server(&server_name) {
                Some(server) => (
                    server.clone(),
                    payload.document().predecessor_count(name),
                ),
                None => {
                    let message =
                        format!(r#"{{"faasr_trigger":"invalid server name: {server_name}"}}"#);
                    error!("{message}");
                    self.log.append_best_effort(&message).await;
                    return Ok(());
                }
            }
        };

        if self.debug.skip_real_triggers {
            warn!("DEBUG MODE -- SKIPPING REAL TRIGGERS");
        }

        for index in 1..=count {
            if count > 1 {
                let rank = Rank { index, count };
                let mut payload = self.payload.write().await;
                payload
                    .set_rank(name, &rank)
                    .map_err(|_| SchedulerError::UnknownFunction(name.clone()))?;
            }

            if self.debug.skip_real_triggers {
                let mut message = format!("SIMULATED TRIGGER: {name}");
                if count > 1 {
                    message.push_str(&format!(".{index}"));
                }
                info!("{message}");
                self.log.append_best_effort(&message).await;
                continue;
            }

            // Fan-in: concurrent predecessors of a join serialize on the lock
            // scoped to the successor they are about to start
            if predecessors > 1 {
                let scope = {
                    let payload = self.payload.read().await;
                    LockScope::for_payload(&payload)
                };
                self.lock.acquire(&scope).await?;
                let result = self.invoke(&server, name).await;
                self.lock.release(&scope).await;
                result?;
            } else {
                self.invoke(&server, name).await?;
            }
        }
        Ok(())
    }

    async fn invoke(&self, server: &ComputeServerConfig, name: &str) -> Result<(), SchedulerError> {
        let driver = match self.drivers.get(&server.faas_type()) {
            Some(driver) => driver.clone(),
            None => {
                let message = format!(
                    r#"{{"faasr_trigger":"no driver registered for {}"}}"#,
                    server.faas_type()
                );
                error!("{message}");
                self.log.append_best_effort(&message).await;
                return Ok(());
            }
        };

        let payload = self.payload.read().await;
        match driver.invoke(server, name, &payload).await {
            Ok(()) => Ok(()),
            Err(DriverError::TransportFatal(message)) => {
                Err(SchedulerError::TransportFatal(message))
            }
            Err(err) => {
                // Already reported to the run log by the driver; the next
                // successor still gets its attempt
                error!("trigger for {name} failed: {err}");
                Ok(())
            }
        }
    }
}

/// Key of the conditional branch selected by a return value: JSON strings
/// select by their content, everything else by its JSON rendering
/// (`true`, `false`, `3`, `null`).
pub fn condition_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::condition_key;
    use assert2::check;
    use serde_json::json;
    use test_r::test;

    #[test]
    fn condition_keys_are_stringified_json() {
        check!(condition_key(&json!(true)) == "true");
        check!(condition_key(&json!(false)) == "false");
        check!(condition_key(&json!(3)) == "3");
        check!(condition_key(&json!("done")) == "done");
        check!(condition_key(&json!(null)) == "null");
    }
}
