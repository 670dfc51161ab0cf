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

use crate::payload::{Payload, PayloadError};
use crate::service::files::{FileService, FileServiceError};
use faasr_common::SafeDisplay;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The closed set of procedures the sidecar accepts from the user process.
/// Names on the wire carry the `faasr_` prefix of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureId {
    Log,
    PutFile,
    GetFile,
    DeleteFile,
    GetFolderList,
    Rank,
    GetS3Creds,
}

impl ProcedureId {
    pub fn name(&self) -> &'static str {
        match self {
            ProcedureId::Log => "faasr_log",
            ProcedureId::PutFile => "faasr_put_file",
            ProcedureId::GetFile => "faasr_get_file",
            ProcedureId::DeleteFile => "faasr_delete_file",
            ProcedureId::GetFolderList => "faasr_get_folder_list",
            ProcedureId::Rank => "faasr_rank",
            ProcedureId::GetS3Creds => "faasr_get_s3_creds",
        }
    }
}

impl FromStr for ProcedureId {
    type Err = ProcedureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faasr_log" => Ok(ProcedureId::Log),
            "faasr_put_file" => Ok(ProcedureId::PutFile),
            "faasr_get_file" => Ok(ProcedureId::GetFile),
            "faasr_delete_file" => Ok(ProcedureId::DeleteFile),
            "faasr_get_folder_list" => Ok(ProcedureId::GetFolderList),
            "faasr_rank" => Ok(ProcedureId::Rank),
            "faasr_get_s3_creds" => Ok(ProcedureId::GetS3Creds),
            other => Err(ProcedureError::InvalidProcedure(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcedureError {
    #[error("{0} is not a valid FaaSr function call")]
    InvalidProcedure(String),
    #[error("invalid arguments for {procedure}: {message}")]
    InvalidArguments {
        procedure: &'static str,
        message: String,
    },
    #[error(transparent)]
    File(#[from] FileServiceError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl SafeDisplay for ProcedureError {
    fn to_safe_string(&self) -> String {
        match self {
            Self::File(inner) => inner.to_safe_string(),
            Self::Payload(inner) => inner.to_safe_string(),
            _ => self.to_string(),
        }
    }
}

fn default_folder() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
struct LogArgs {
    log_message: String,
}

#[derive(Debug, Deserialize)]
struct TransferArgs {
    local_file: String,
    remote_file: String,
    #[serde(default)]
    server_name: String,
    #[serde(default = "default_folder")]
    local_folder: String,
    #[serde(default = "default_folder")]
    remote_folder: String,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    remote_file: String,
    #[serde(default)]
    server_name: String,
    #[serde(default = "default_folder")]
    remote_folder: String,
}

#[derive(Debug, Deserialize)]
struct FolderListArgs {
    #[serde(default)]
    faasr_prefix: String,
    #[serde(default)]
    server_name: String,
}

#[derive(Debug, Deserialize)]
struct CredsArgs {
    #[serde(default)]
    server_name: String,
}

/// Dispatches the sidecar's procedure calls to their typed handlers. The
/// mapping is total over `ProcedureId`: resolving the name already
/// rejected everything outside the closed set.
pub struct ProcedureRegistry {
    payload: Arc<RwLock<Payload>>,
    files: Arc<FileService>,
}

impl ProcedureRegistry {
    pub fn new(payload: Arc<RwLock<Payload>>, files: Arc<FileService>) -> Self {
        Self { payload, files }
    }

    pub async fn dispatch(
        &self,
        procedure: ProcedureId,
        arguments: Value,
    ) -> Result<Value, ProcedureError> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        match procedure {
            ProcedureId::Log => {
                let args: LogArgs = parse_args(procedure.name(), arguments)?;
                self.files
                    .log(&args.log_message)
                    .await
                    .map_err(FileServiceError::from)?;
                Ok(json!({}))
            }
            ProcedureId::PutFile => {
                let args: TransferArgs = parse_args(procedure.name(), arguments)?;
                self.files
                    .put_file(
                        &args.server_name,
                        &args.local_folder,
                        &args.local_file,
                        &args.remote_folder,
                        &args.remote_file,
                    )
                    .await?;
                Ok(json!({}))
            }
            ProcedureId::GetFile => {
                let args: TransferArgs = parse_args(procedure.name(), arguments)?;
                self.files
                    .get_file(
                        &args.server_name,
                        &args.local_folder,
                        &args.local_file,
                        &args.remote_folder,
                        &args.remote_file,
                    )
                    .await?;
                Ok(json!({}))
            }
            ProcedureId::DeleteFile => {
                let args: DeleteArgs = parse_args(procedure.name(), arguments)?;
                self.files
                    .delete_file(&args.server_name, &args.remote_folder, &args.remote_file)
                    .await?;
                Ok(json!({}))
            }
            ProcedureId::GetFolderList => {
                let args: FolderListArgs = parse_args(procedure.name(), arguments)?;
                let folder_list = self
                    .files
                    .get_folder_list(&args.server_name, &args.faasr_prefix)
                    .await?;
                Ok(json!({ "folder_list": folder_list }))
            }
            ProcedureId::Rank => {
                let payload = self.payload.read().await;
                let rank = payload.current_rank()?;
                Ok(json!({ "rank": rank.to_string() }))
            }
            ProcedureId::GetS3Creds => {
                let args: CredsArgs = parse_args(procedure.name(), arguments)?;
                let creds = self.files.get_s3_creds(&args.server_name).await?;
                Ok(json!({ "s3_creds": creds }))
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(
    procedure: &'static str,
    arguments: Value,
) -> Result<T, ProcedureError> {
    serde_json::from_value(arguments).map_err(|error| ProcedureError::InvalidArguments {
        procedure,
        message: error.to_string(),
    })
}
