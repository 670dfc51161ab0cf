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
use crate::model::{ComputeServerConfig, FaaSType, OpenWhiskServerConfig};
use crate::payload::Payload;
use crate::service::logs::WorkflowLog;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Fires a non-blocking action invocation against an OpenWhisk-compatible
/// deployment, carrying the complete workflow document as the action body.
pub struct OpenWhiskDriver {
    invoke_timeout: Duration,
    log: Arc<WorkflowLog>,
}

impl OpenWhiskDriver {
    pub fn new(invoke_timeout: Duration, log: Arc<WorkflowLog>) -> Self {
        Self {
            invoke_timeout,
            log,
        }
    }
}

/// `https://` is prepended when the configured endpoint carries no scheme.
pub fn action_url(server: &OpenWhiskServerConfig, function: &str) -> String {
    let endpoint = if server.endpoint.starts_with("http") {
        server.endpoint.clone()
    } else {
        format!("https://{}", server.endpoint)
    };
    format!(
        "{endpoint}/api/v1/namespaces/{}/actions/{function}?blocking=false&result=false",
        server.namespace
    )
}

/// TLS verification is on unless `SSL` is the literal string `"false"`
/// (case-insensitive); absent or empty means on.
pub fn tls_verification_enabled(server: &OpenWhiskServerConfig) -> bool {
    match server.ssl.as_deref() {
        None | Some("") => true,
        Some(value) => !value.eq_ignore_ascii_case("false"),
    }
}

#[async_trait]
impl InvocationDriver for OpenWhiskDriver {
    fn faas_type(&self) -> FaaSType {
        FaaSType::OpenWhisk
    }

    async fn invoke(
        &self,
        server: &ComputeServerConfig,
        function: &str,
        payload: &Payload,
    ) -> Result<(), DriverError> {
        let ComputeServerConfig::OpenWhisk(server) = server else {
            return Err(DriverError::Misconfigured(FaaSType::OpenWhisk));
        };
        let invoked = payload.function_invoke().to_string();

        let Some((user, pass)) = server.api_key.split_once(':') else {
            let message = format!(
                r#"{{"faasr_trigger":"OpenWhisk: invalid API key for {invoked} -- expected user:pass"}}"#
            );
            error!("{message}");
            self.log.append_best_effort(&message).await;
            return Err(DriverError::Transient(message));
        };

        let body = serde_json::to_string(&payload.get_complete_workflow())
            .map_err(|err| DriverError::Transient(format!("payload serialization: {err}")))?;

        let client = reqwest::Client::builder()
            .timeout(self.invoke_timeout)
            .danger_accept_invalid_certs(!tls_verification_enabled(server))
            .build()
            .map_err(|err| DriverError::Transient(format!("client construction: {err}")))?;

        let response = client
            .post(action_url(server, function))
            .basic_auth(user, Some(pass))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        match response {
            Ok(response)
                if response.status() == StatusCode::OK
                    || response.status() == StatusCode::ACCEPTED =>
            {
                let message = format!(
                    r#"{{"faasr_trigger":"OpenWhisk: Successfully invoked {invoked}"}}"#
                );
                info!("{message}");
                self.log.append_best_effort(&message).await;
                Ok(())
            }
            Ok(response) => {
                let message = format!(
                    r#"{{"faasr_trigger":"OpenWhisk: Error invoking {invoked} -- status code: {}"}}"#,
                    response.status().as_u16()
                );
                error!("{message}");
                self.log.append_best_effort(&message).await;
                Err(DriverError::Transient(message))
            }
            // Transport failures abort the whole dispatch for this provider,
            // unlike the other drivers
            Err(err) => {
                let message = format!(
                    r#"{{"faasr_trigger":"OpenWhisk: Error invoking {invoked} -- connection error"}}"#
                );
                error!("{message}");
                self.log.append_best_effort(&message).await;
                Err(DriverError::TransportFatal(err.to_string()))
            }
        }
    }
}
