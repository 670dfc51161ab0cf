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

use crate::api::ApiTags;
use crate::service::logs::WorkflowLog;
use crate::service::procedures::{ProcedureId, ProcedureRegistry};
use faasr_common::SafeDisplay;
use poem_openapi::param::Query;
use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// What the user function left behind: its return value for conditional
/// successor selection and its terminal error state. Consumed by the
/// scheduler after the user process finished.
#[derive(Debug, Default)]
pub struct InvocationOutcome {
    pub result: Option<serde_json::Value>,
    pub error: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct RpcRequest {
    #[serde(rename = "ProcedureID")]
    #[oai(rename = "ProcedureID")]
    pub procedure_id: String,
    #[serde(rename = "Arguments")]
    #[oai(rename = "Arguments")]
    pub arguments: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct RpcResponse {
    #[serde(rename = "Success")]
    #[oai(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Data")]
    #[oai(rename = "Data")]
    pub data: Option<serde_json::Value>,
    #[serde(rename = "Message")]
    #[oai(rename = "Message")]
    pub message: Option<String>,
}

impl RpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ReturnRequest {
    #[serde(rename = "FunctionResult")]
    #[oai(rename = "FunctionResult")]
    pub function_result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ExitRequest {
    #[serde(rename = "Error")]
    #[oai(rename = "Error")]
    pub error: Option<bool>,
    #[serde(rename = "Message")]
    #[oai(rename = "Message")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct ReturnStatus {
    #[serde(rename = "FunctionResult")]
    #[oai(rename = "FunctionResult")]
    pub function_result: Option<serde_json::Value>,
    #[serde(rename = "Error")]
    #[oai(rename = "Error")]
    pub error: bool,
    #[serde(rename = "Message")]
    #[oai(rename = "Message")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Object)]
pub struct EchoResponse {
    pub message: String,
}

/// The loopback RPC surface of one invocation. Procedure calls run against
/// the registry; `/return` and `/exit` collect the user function's
/// terminal state, `/get-return` hands it to the scheduler and `/echo`
/// answers the readiness probe.
pub struct RpcApi {
    pub procedures: Arc<ProcedureRegistry>,
    pub log: Arc<WorkflowLog>,
    pub outcome: Arc<RwLock<InvocationOutcome>>,
}

#[OpenApi(prefix_path = "/", tag = ApiTags::Rpc)]
impl RpcApi {
    #[oai(path = "/action", method = "post", operation_id = "action")]
    async fn action(&self, request: Json<RpcRequest>) -> Json<RpcResponse> {
        info!(r#"{{"Processing request": "{}"}}"#, request.0.procedure_id);
        let arguments = request.0.arguments.unwrap_or(serde_json::Value::Null);

        let procedure: ProcedureId = match request.0.procedure_id.parse() {
            Ok(procedure) => procedure,
            Err(err) => {
                // Unknown procedures poison the invocation: the error state
                // is recorded so the caller aborts after the user process
                let message = format!(r#"{{"faasr_server":"ERROR -- {err}"}}"#);
                error!("{message}");
                self.log.append_best_effort(&message).await;
                self.record_error(err.to_safe_string()).await;
                return Json(RpcResponse::failure(err.to_safe_string()));
            }
        };

        match self.procedures.dispatch(procedure, arguments).await {
            Ok(data) => Json(RpcResponse::success(data)),
            Err(err) => {
                let message = format!(
                    r#"{{"faasr_server":"ERROR -- failed to invoke {} -- {}"}}"#,
                    procedure.name(),
                    err.to_safe_string()
                );
                error!("{message}");
                self.log.append_best_effort(&message).await;
                self.record_error(err.to_safe_string()).await;
                Json(RpcResponse::failure(err.to_safe_string()))
            }
        }
    }

    #[oai(path = "/return", method = "post", operation_id = "record_return")]
    async fn record_return(&self, request: Json<ReturnRequest>) -> Json<RpcResponse> {
        let mut outcome = self.outcome.write().await;
        outcome.result = request.0.function_result;
        Json(RpcResponse::success(serde_json::Value::Null))
    }

    #[oai(path = "/exit", method = "post", operation_id = "record_exit")]
    async fn record_exit(&self, request: Json<ExitRequest>) -> Json<RpcResponse> {
        if request.0.error.unwrap_or(false) {
            self.record_error(request.0.message.unwrap_or_default())
                .await;
        }
        Json(RpcResponse::success(serde_json::Value::Null))
    }

    #[oai(path = "/get-return", method = "get", operation_id = "get_return")]
    async fn get_return(&self) -> Json<ReturnStatus> {
        let outcome = self.outcome.read().await;
        Json(ReturnStatus {
            function_result: outcome.result.clone(),
            error: outcome.error,
            message: outcome.message.clone(),
        })
    }

    /// Readiness probe; reflects the message back.
    #[oai(path = "/echo", method = "get", operation_id = "echo")]
    async fn echo(&self, message: Query<Option<String>>) -> Json<EchoResponse> {
        Json(EchoResponse {
            message: message.0.unwrap_or_default(),
        })
    }
}

impl RpcApi {
    async fn record_error(&self, message: String) {
        let mut outcome = self.outcome.write().await;
        outcome.error = true;
        outcome.message = Some(message);
    }
}
