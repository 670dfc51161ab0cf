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

use crate::drivers::{DriverError, InvocationDriver};
use crate::model::{ComputeServerConfig, FaaSType, LambdaServerConfig};
use crate::payload::Payload;
use crate::service::logs::WorkflowLog;
use async_trait::async_trait;
use aws_sdk_lambda::config::timeout::TimeoutConfig;
use aws_sdk_lambda::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_lambda::primitives::Blob;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Invokes a Lambda-compatible function with the complete workflow
/// document as its payload. All failures are logged and non-fatal; the
/// remaining successors still get their attempts.
pub struct LambdaDriver {
    invoke_timeout: Duration,
    log: Arc<WorkflowLog>,
}

impl LambdaDriver {
    pub fn new(invoke_timeout: Duration, log: Arc<WorkflowLog>) -> Self {
        Self {
            invoke_timeout,
            log,
        }
    }

    fn client(&self, server: &LambdaServerConfig) -> aws_sdk_lambda::Client {
        let credentials = Credentials::new(
            server.access_key.clone(),
            server.secret_key.clone(),
            None,
            None,
            "faasr-compute-server",
        );
        let config = aws_sdk_lambda::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(server.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.invoke_timeout)
                    .build(),
            )
            .build();
        aws_sdk_lambda::Client::from_conf(config)
    }
}

/// The provider reports success through a 2xx `StatusCode`.
pub fn is_success_status(status_code: i32) -> bool {
    status_code.to_string().starts_with('2')
}

#[async_trait]
impl InvocationDriver for LambdaDriver {
    fn faas_type(&self) -> FaaSType {
        FaaSType::Lambda
    }

    async fn invoke(
        &self,
        server: &ComputeServerConfig,
        function: &str,
        payload: &Payload,
    ) -> Result<(), DriverError> {
        let ComputeServerConfig::Lambda(server) = server else {
            return Err(DriverError::Misconfigured(FaaSType::Lambda));
        };
        let invoked = payload.function_invoke().to_string();

        let body = serde_json::to_vec(&payload.get_complete_workflow())
            .map_err(|err| DriverError::Transient(format!("payload serialization: {err}")))?;

        let response = self
            .client(server)
            .invoke()
            .function_name(function)
            .payload(Blob::new(body))
            .send()
            .await;

        match response {
            Ok(response) if is_success_status(response.status_code()) => {
                let message =
                    format!(r#"{{"faasr_trigger":"Successfully invoked: {invoked}"}}"#);
                info!("{message}");
                self.log.append_best_effort(&message).await;
                Ok(())
            }
            Ok(response) => {
                let function_error = response
                    .function_error()
                    .unwrap_or("no response from AWS")
                    .to_string();
                let message = format!(
                    r#"{{"faasr_trigger":"Error invoking function: {invoked} -- error: {function_error}"}}"#
                );
                error!("{message}");
                self.log.append_best_effort(&message).await;
                Err(DriverError::Transient(message))
            }
            Err(err) => {
                let message = format!(
                    r#"{{"faasr_trigger":"Error invoking function: {invoked} -- {err}"}}"#
                );
                error!("{message}");
                self.log.append_best_effort(&message).await;
                Err(DriverError::Transient(message))
            }
        }
    }
}
