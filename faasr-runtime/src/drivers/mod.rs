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

pub mod github;
pub mod lambda;
pub mod openwhisk;

use crate::model::{ComputeServerConfig, FaaSType};
use crate::payload::Payload;
use crate::service::logs::WorkflowLog;
use async_trait::async_trait;
use faasr_common::SafeDisplay;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// The compute server entry does not match this driver's provider.
    #[error("misconfigured compute server: expected a {0} entry")]
    Misconfigured(FaaSType),
    /// Logged and skipped; the remaining successors still get dispatched.
    #[error("{0}")]
    Transient(String),
    /// Aborts the whole dispatch; only the OpenWhisk driver produces this
    /// (preserved provider contract).
    #[error("{0}")]
    TransportFatal(String),
}

impl SafeDisplay for DriverError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

/// One invocation attempt against a single provider; implementations are
/// keyed by the compute server's `FaaSType`.
#[async_trait]
pub trait InvocationDriver: Send + Sync {
    fn faas_type(&self) -> FaaSType;

    async fn invoke(
        &self,
        server: &ComputeServerConfig,
        function: &str,
        payload: &Payload,
    ) -> Result<(), DriverError>;
}

pub fn default_drivers(
    invoke_timeout: Duration,
    log: Arc<WorkflowLog>,
) -> HashMap<FaaSType, Arc<dyn InvocationDriver>> {
    let drivers: Vec<Arc<dyn InvocationDriver>> = vec![
        Arc::new(openwhisk::OpenWhiskDriver::new(
            invoke_timeout,
            log.clone(),
        )),
        Arc::new(lambda::LambdaDriver::new(invoke_timeout, log.clone())),
        Arc::new(github::GitHubActionsDriver::new(invoke_timeout, log)),
    ];
    drivers
        .into_iter()
        .map(|driver| (driver.faas_type(), driver))
        .collect()
}
