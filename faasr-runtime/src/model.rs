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

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The workflow document as carried between invocations. Field names are a
/// wire contract shared with the other runtime implementations; unknown
/// fields are preserved so that re-serialized payloads stay complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(rename = "FunctionInvoke")]
    pub function_invoke: String,
    #[serde(rename = "InvocationID")]
    pub invocation_id: String,
    #[serde(rename = "FaaSrLog")]
    pub faasr_log: String,
    #[serde(rename = "FunctionList")]
    pub function_list: HashMap<String, FunctionSpec>,
    #[serde(rename = "ComputeServers")]
    pub compute_servers: HashMap<String, ComputeServerConfig>,
    #[serde(rename = "DataStores")]
    pub data_stores: HashMap<String, DataStoreConfig>,
    #[serde(rename = "DefaultDataStore")]
    pub default_data_store: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowDocument {
    /// Number of nodes whose `InvokeNext` references the given node,
    /// counting conditional branches. More than one predecessor makes the
    /// node a join, which is what the lock service serializes.
    pub fn predecessor_count(&self, function: &str) -> usize {
        self.function_list
            .values()
            .filter(|spec| {
                spec.invoke_next.iter().any(|entry| match entry {
                    InvokeNextEntry::Function(reference) => reference.name == function,
                    InvokeNextEntry::Conditional(branches) => branches
                        .values()
                        .flat_map(|targets| targets.0.iter())
                        .any(|reference| reference.name == function),
                })
            })
            .count()
    }

    /// Checks the document's referential invariants: every successor
    /// reference resolves to a node and every node's server resolves to a
    /// compute server entry.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for (name, spec) in &self.function_list {
            if !self.compute_servers.contains_key(&spec.faas_server) {
                errors.push(format!(
                    "function {name} refers to unknown compute server {}",
                    spec.faas_server
                ));
            }
            for reference in spec.successor_refs() {
                if !self.function_list.contains_key(&reference.name) {
                    errors.push(format!(
                        "function {name} invokes unknown function {}",
                        reference.name
                    ));
                }
            }
        }
        if !self.data_stores.contains_key(&self.default_data_store) {
            errors.push(format!(
                "default data store {} is not in DataStores",
                self.default_data_store
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    #[serde(rename = "FaaSServer")]
    pub faas_server: String,
    #[serde(
        rename = "InvokeNext",
        default,
        deserialize_with = "deserialize_invoke_next"
    )]
    pub invoke_next: Vec<InvokeNextEntry>,
    /// Assigned at dispatch time for fan-out shards, never authored.
    #[serde(rename = "Rank", default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FunctionSpec {
    pub fn successor_refs(&self) -> Vec<&TriggerRef> {
        self.invoke_next
            .iter()
            .flat_map(|entry| match entry {
                InvokeNextEntry::Function(reference) => vec![reference],
                InvokeNextEntry::Conditional(branches) => branches
                    .values()
                    .flat_map(|targets| targets.0.iter())
                    .collect(),
            })
            .collect()
    }
}

/// A single element of `InvokeNext`: either a plain successor reference or
/// a conditional mapping from the stringified return value to one or more
/// references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokeNextEntry {
    Function(TriggerRef),
    Conditional(HashMap<String, TriggerRefs>),
}

/// One or more successor references; accepts both a single string and a
/// sequence on the wire, always serializes as a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRefs(pub Vec<TriggerRef>);

impl Serialize for TriggerRefs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TriggerRefs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Many(Vec<TriggerRef>),
            One(TriggerRef),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Many(references) => TriggerRefs(references),
            Repr::One(reference) => TriggerRefs(vec![reference]),
        })
    }
}

fn deserialize_invoke_next<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<InvokeNextEntry>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Many(Vec<InvokeNextEntry>),
        One(InvokeNextEntry),
    }
    Ok(match Repr::deserialize(deserializer)? {
        Repr::Many(entries) => entries,
        Repr::One(entry) => vec![entry],
    })
}

/// A parsed successor reference: `name` invokes a single instance,
/// `name(K)` fans out into `K` ranked instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerRef {
    pub name: String,
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid successor reference: {0}")]
pub struct InvalidTriggerRef(pub String);

impl FromStr for TriggerRef {
    type Err = InvalidTriggerRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('(') {
            Some((name, rest)) => {
                let digits = rest
                    .strip_suffix(')')
                    .ok_or_else(|| InvalidTriggerRef(s.to_string()))?;
                let rank: u32 = digits
                    .parse()
                    .map_err(|_| InvalidTriggerRef(s.to_string()))?;
                if name.is_empty() || name.contains(')') || rank == 0 {
                    Err(InvalidTriggerRef(s.to_string()))
                } else {
                    Ok(TriggerRef {
                        name: name.to_string(),
                        rank,
                    })
                }
            }
            None => {
                if s.is_empty() || s.contains(')') {
                    Err(InvalidTriggerRef(s.to_string()))
                } else {
                    Ok(TriggerRef {
                        name: s.to_string(),
                        rank: 1,
                    })
                }
            }
        }
    }
}

impl Display for TriggerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.rank > 1 {
            write!(f, "{}({})", self.name, self.rank)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl Serialize for TriggerRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TriggerRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A `"k/N"` fan-out shard label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    pub index: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rank value: {0}")]
pub struct InvalidRank(pub String);

impl FromStr for Rank {
    type Err = InvalidRank;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, count) = s.split_once('/').ok_or_else(|| InvalidRank(s.to_string()))?;
        let index: u32 = index.parse().map_err(|_| InvalidRank(s.to_string()))?;
        let count: u32 = count.parse().map_err(|_| InvalidRank(s.to_string()))?;
        if index == 0 || count == 0 || index > count {
            Err(InvalidRank(s.to_string()))
        } else {
            Ok(Rank { index, count })
        }
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaaSType {
    OpenWhisk,
    Lambda,
    GitHubActions,
}

impl Display for FaaSType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FaaSType::OpenWhisk => write!(f, "OpenWhisk"),
            FaaSType::Lambda => write!(f, "Lambda"),
            FaaSType::GitHubActions => write!(f, "GitHubActions"),
        }
    }
}

/// Per-provider compute server entry, dispatched on the `FaaSType` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "FaaSType")]
pub enum ComputeServerConfig {
    OpenWhisk(OpenWhiskServerConfig),
    Lambda(LambdaServerConfig),
    GitHubActions(GitHubActionsServerConfig),
}

impl ComputeServerConfig {
    pub fn faas_type(&self) -> FaaSType {
        match self {
            ComputeServerConfig::OpenWhisk(_) => FaaSType::OpenWhisk,
            ComputeServerConfig::Lambda(_) => FaaSType::Lambda,
            ComputeServerConfig::GitHubActions(_) => FaaSType::GitHubActions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenWhiskServerConfig {
    #[serde(rename = "Endpoint")]
    pub endpoint: String,
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "API.key")]
    pub api_key: String,
    #[serde(rename = "SSL", default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaServerConfig {
    #[serde(rename = "AccessKey")]
    pub access_key: String,
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubActionsServerConfig {
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "UserName")]
    pub user_name: String,
    #[serde(rename = "ActionRepoName")]
    pub action_repo_name: String,
    #[serde(rename = "Branch")]
    pub branch: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    #[serde(rename = "Endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(rename = "Region", default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "AccessKey", default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(rename = "SecretKey", default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// String-typed on the wire; anything but a case-insensitive "true"
    /// counts as non-anonymous.
    #[serde(rename = "Anonymous", default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DataStoreConfig {
    pub fn is_anonymous(&self) -> bool {
        matches!(self.anonymous.as_deref(), Some(value) if value.eq_ignore_ascii_case("true"))
    }
}

/// Credentials for a named data store, as handed to the user function
/// through the `faasr_get_s3_creds` procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Credentials {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub anonymous: bool,
}
