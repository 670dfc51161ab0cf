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
use crate::model::{ComputeServerConfig, FaaSType, GitHubActionsServerConfig};
use crate::payload::Payload;
use crate::service::logs::WorkflowLog;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Triggers a `workflow_dispatch` event on the repository hosting the next
/// node. The payload travels by URL, not by value: dispatch inputs are
/// size-limited, so only the override set and the payload's origin URL are
/// sent.
pub struct GitHubActionsDriver {
    invoke_timeout: Duration,
    client: reqwest::Client,
    log: Arc<WorkflowLog>,
}

impl GitHubActionsDriver {
    pub fn new(invoke_timeout: Duration, log: Arc<WorkflowLog>) -> Self {
        Self {
            invoke_timeout,
            client: reqwest::Client::new(),
            log,
        }
    }

    async fn report(&self, message: &str) {
        error!("{message}");
        self.log.append_best_effort(message).await;
    }
}

/// The dispatched workflow file is `<function>.yml` unless the function
/// name already carries a workflow extension.
pub fn workflow_file_name(function: &str) -> String {
    if function.ends_with(".yml") || function.ends_with(".yaml") {
        function.to_string()
    } else {
        format!("{function}.yml")
    }
}

pub fn dispatch_url(server: &GitHubActionsServerConfig, workflow_file: &str) -> String {
    format!(
        "https://api.github.com/repos/{}/{}/actions/workflows/{workflow_file}/dispatches",
        server.user_name, server.action_repo_name
    )
}

pub fn dispatch_body(
    server: &GitHubActionsServerConfig,
    payload: &Payload,
) -> Result<serde_json::Value, DriverError> {
    let overwritten = payload
        .overwritten_fields()
        .map_err(|err| DriverError::Transient(format!("override serialization: {err}")))?;
    let overwritten_json = serde_json::to_string(&overwritten)
        .map_err(|err| DriverError::Transient(format!("override serialization: {err}")))?;
    let payload_url = payload
        .url()
        .map(|url| url.to_string())
        .unwrap_or_default();
    Ok(json!({
        "ref": server.branch,
        "inputs": {
            "OVERWRITTEN": overwritten_json,
            "PAYLOAD_URL": payload_url,
        }
    }))
}

#[async_trait]
impl InvocationDriver for GitHubActionsDriver {
    fn faas_type(&self) -> FaaSType {
        FaaSType::GitHubActions
    }

    async fn invoke(
        &self,
        server: &ComputeServerConfig,
        function: &str,
        payload: &Payload,
    ) -> Result<(), DriverError> {
        let ComputeServerConfig::GitHubActions(server) = server else {
            return Err(DriverError::Misconfigured(FaaSType::GitHubActions));
        };
        let invoked = payload.function_invoke().to_string();
        let repo = format!("{}/{}", server.user_name, server.action_repo_name);
        let workflow_file = workflow_file_name(function);
        let body = dispatch_body(server, payload)?;

        let response = self
            .client
            .post(dispatch_url(server, &workflow_file))
            .timeout(self.invoke_timeout)
            .header("Authorization", format!("token {}", server.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let message = format!(
                    r#"{{"faasr_trigger":"GitHub Action: unknown error when invoking {function} -- {err}"}}"#
                );
                self.report(&message).await;
                return Err(DriverError::Transient(message));
            }
        };

        match response.status() {
            StatusCode::NO_CONTENT => {
                let message = format!(
                    r#"{{"faasr_trigger":"GitHub Action: Successfully invoked: {invoked}"}}"#
                );
                info!("{message}");
                self.log.append_best_effort(&message).await;
                Ok(())
            }
            StatusCode::UNAUTHORIZED => {
                let message = r#"{"faasr_trigger":"GitHub Action: Authentication failed, check the credentials"}"#.to_string();
                self.report(&message).await;
                Err(DriverError::Transient(message))
            }
            StatusCode::NOT_FOUND => {
                let message = format!(
                    r#"{{"faasr_trigger":"GitHub Action: Cannot find the destination, check the repo name: {repo} and workflow name: {workflow_file}"}}"#
                );
                self.report(&message).await;
                Err(DriverError::Transient(message))
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let provider_message = provider_message(response).await;
                let message = match provider_message {
                    Some(provider_message) => format!(
                        r#"{{"faasr_trigger":"GitHub Action: Cannot find the destination -- {provider_message}"}}"#
                    ),
                    None => format!(
                        r#"{{"faasr_trigger":"GitHub Action: Cannot find the destination -- check ref {}"}}"#,
                        server.branch
                    ),
                };
                self.report(&message).await;
                Err(DriverError::Transient(message))
            }
            _ => {
                let provider_message = provider_message(response).await;
                let message = match provider_message {
                    Some(provider_message) => format!(
                        r#"{{"faasr_trigger":"GitHub Action: error when invoking function -- {provider_message}"}}"#
                    ),
                    None => format!(
                        r#"{{"faasr_trigger":"GitHub Action: unknown error when invoking {function}"}}"#
                    ),
                };
                self.report(&message).await;
                Err(DriverError::Transient(message))
            }
        }
    }
}

async fn provider_message(response: reqwest::Response) -> Option<String> {
    let body: serde_json::Value = response.json().await.ok()?;
    body.get("message")
        .and_then(|message| message.as_str())
        .map(str::to_string)
}
