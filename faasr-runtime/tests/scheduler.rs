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

use assert2::check;
use async_trait::async_trait;
use faasr_runtime::bootstrap::Services;
use faasr_runtime::config::{DebugConfig, RuntimeConfig};
use faasr_runtime::drivers::default_drivers;
use faasr_runtime::model::DataStoreConfig;
use faasr_runtime::payload::Payload;
use faasr_runtime::service::lock::LockService;
use faasr_runtime::service::logs::WorkflowLog;
use faasr_runtime::service::scheduler::{Scheduler, SchedulerError};
use faasr_runtime::storage::memory::InMemoryObjectStore;
use faasr_runtime::storage::{ObjectStore, ObjectStoreFactory, StorageError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

test_r::enable!();

struct StaticStoreFactory(Arc<InMemoryObjectStore>);

#[async_trait]
impl ObjectStoreFactory for StaticStoreFactory {
    async fn open(&self, _: &DataStoreConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(self.0.clone())
    }
}

fn dry_run_config() -> RuntimeConfig {
    RuntimeConfig {
        debug: DebugConfig {
            skip_real_triggers: true,
            ..DebugConfig::default()
        },
        ..RuntimeConfig::default()
    }
}

async fn services(payload: serde_json::Value) -> (Services, Arc<InMemoryObjectStore>) {
    let store = Arc::new(InMemoryObjectStore::new());
    let payload = Payload::from_json(&payload.to_string()).unwrap();
    let services = Services::with_stores(
        &dry_run_config(),
        payload,
        Arc::new(StaticStoreFactory(store.clone())),
    )
    .await
    .unwrap();
    (services, store)
}

async fn log_lines(services: &Services) -> Vec<String> {
    match services.store.get_object(services.log.key()).await.unwrap() {
        Some(data) => String::from_utf8(data.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

fn fan_out_payload() -> serde_json::Value {
    json!({
        "FunctionInvoke": "A",
        "InvocationID": "inv-1",
        "FaaSrLog": "faasr",
        "FunctionList": {
            "A": {"FaaSServer": "ow1", "InvokeNext": ["B", "C(3)"]},
            "B": {"FaaSServer": "ow1", "InvokeNext": []},
            "C": {"FaaSServer": "lam1", "InvokeNext": []}
        },
        "ComputeServers": {
            "ow1": {
                "FaaSType": "OpenWhisk",
                "Endpoint": "ow.example.com",
                "Namespace": "guest",
                "API.key": "user:pass"
            },
            "lam1": {
                "FaaSType": "Lambda",
                "AccessKey": "a",
                "SecretKey": "s",
                "Region": "us-east-1"
            }
        },
        "DataStores": {"minio": {"Bucket": "faasr"}},
        "DefaultDataStore": "minio"
    })
}

fn conditional_payload() -> serde_json::Value {
    json!({
        "FunctionInvoke": "A",
        "InvocationID": "inv-1",
        "FaaSrLog": "faasr",
        "FunctionList": {
            "A": {"FaaSServer": "lam1", "InvokeNext": [{"true": "B", "false": ["C", "D"]}]},
            "B": {"FaaSServer": "lam1", "InvokeNext": []},
            "C": {"FaaSServer": "lam1", "InvokeNext": []},
            "D": {"FaaSServer": "lam1", "InvokeNext": []}
        },
        "ComputeServers": {
            "lam1": {
                "FaaSType": "Lambda",
                "AccessKey": "a",
                "SecretKey": "s",
                "Region": "us-east-1"
            }
        },
        "DataStores": {"minio": {"Bucket": "faasr"}},
        "DefaultDataStore": "minio"
    })
}

#[test_r::test]
async fn fan_out_dispatches_in_declared_order_with_ascending_ranks() {
    let (services, _) = services(fan_out_payload()).await;
    services.scheduler.trigger(None).await.unwrap();

    check!(
        log_lines(&services).await
            == vec![
                "SIMULATED TRIGGER: B".to_string(),
                "SIMULATED TRIGGER: C.1".to_string(),
                "SIMULATED TRIGGER: C.2".to_string(),
                "SIMULATED TRIGGER: C.3".to_string(),
            ]
    );
}

#[test_r::test]
async fn fan_out_assigns_the_final_rank_to_the_payload() {
    let (services, _) = services(fan_out_payload()).await;
    services.scheduler.trigger(None).await.unwrap();

    let payload = services.payload.read().await;
    check!(payload.function_invoke() == "C");
    check!(payload.function_spec("C").unwrap().rank.as_deref() == Some("3/3"));

    let overwritten = payload.overwritten_fields().unwrap();
    check!(overwritten.contains_key("FunctionInvoke"));
    check!(overwritten.contains_key("FunctionList"));
}

#[test_r::test]
async fn conditional_true_selects_the_true_branch() {
    let (services, _) = services(conditional_payload()).await;
    services.scheduler.trigger(Some(json!(true))).await.unwrap();

    check!(log_lines(&services).await == vec!["SIMULATED TRIGGER: B".to_string()]);
}

#[test_r::test]
async fn conditional_false_selects_the_false_branch_in_order() {
    let (services, _) = services(conditional_payload()).await;
    services
        .scheduler
        .trigger(Some(json!(false)))
        .await
        .unwrap();

    check!(
        log_lines(&services).await
            == vec![
                "SIMULATED TRIGGER: C".to_string(),
                "SIMULATED TRIGGER: D".to_string(),
            ]
    );
}

#[test_r::test]
async fn conditional_without_return_value_is_fatal() {
    let (services, _) = services(conditional_payload()).await;
    let result = services.scheduler.trigger(None).await;

    check!(matches!(result, Err(SchedulerError::MissingConditionValue)));
    let lines = log_lines(&services).await;
    check!(lines.len() == 1);
    check!(lines[0].contains("InvokeNext contains conditionals"));
}

#[test_r::test]
async fn conditional_with_unmatched_key_dispatches_nothing() {
    let (services, _) = services(conditional_payload()).await;
    services
        .scheduler
        .trigger(Some(json!("neither")))
        .await
        .unwrap();

    check!(log_lines(&services).await.is_empty());
}

#[test_r::test]
async fn no_successors_logs_and_returns() {
    let mut payload = fan_out_payload();
    payload["FunctionInvoke"] = json!("B");
    let (services, _) = services(payload).await;
    services.scheduler.trigger(None).await.unwrap();

    check!(
        log_lines(&services).await
            == vec![r#"{"faasr_trigger":"no triggers for B"}"#.to_string()]
    );
}

#[test_r::test]
async fn mixed_conditional_and_unconditional_successors_keep_declared_order() {
    let mut payload = conditional_payload();
    payload["FunctionList"]["A"]["InvokeNext"] =
        json!(["C", {"true": "B", "false": []}, "D"]);
    let (services, _) = services(payload).await;
    services.scheduler.trigger(Some(json!(true))).await.unwrap();

    check!(
        log_lines(&services).await
            == vec![
                "SIMULATED TRIGGER: C".to_string(),
                "SIMULATED TRIGGER: B".to_string(),
                "SIMULATED TRIGGER: D".to_string(),
            ]
    );
}

#[test_r::test]
async fn finish_triggers_with_the_recorded_return_value() {
    let (services, _) = services(conditional_payload()).await;
    {
        let mut outcome = services.outcome.write().await;
        outcome.result = Some(json!(true));
    }
    services.finish().await.unwrap();

    check!(log_lines(&services).await == vec!["SIMULATED TRIGGER: B".to_string()]);
}

#[test_r::test]
async fn finish_fails_when_the_user_function_signaled_an_error() {
    let (services, _) = services(conditional_payload()).await;
    {
        let mut outcome = services.outcome.write().await;
        outcome.error = true;
        outcome.message = Some("user code exploded".to_string());
    }
    let result = services.finish().await;

    check!(result.is_err());
    let lines = log_lines(&services).await;
    check!(lines.len() == 1);
    check!(lines[0].contains("user function signaled an error -- user code exploded"));
}

// Referential mistakes that only surface at dispatch time (the document
// validation at bootstrap would reject them) are exercised against a
// hand-wired scheduler.
async fn raw_scheduler(payload: serde_json::Value) -> (Scheduler, Arc<InMemoryObjectStore>, Arc<WorkflowLog>) {
    let store = Arc::new(InMemoryObjectStore::new());
    let payload = Payload::from_json(&payload.to_string()).unwrap();
    let log = Arc::new(WorkflowLog::new(store.clone(), &payload));
    let lock = Arc::new(LockService::new(store.clone(), log.clone()).with_spin_unit(Duration::from_millis(1)));
    let payload = Arc::new(RwLock::new(payload));
    let scheduler = Scheduler::new(
        payload,
        log.clone(),
        lock,
        default_drivers(Duration::from_secs(1), log.clone()),
        DebugConfig {
            skip_real_triggers: true,
            ..DebugConfig::default()
        },
    );
    (scheduler, store, log)
}

#[test_r::test]
async fn invalid_server_skips_the_successor_but_not_the_rest() {
    let mut payload = fan_out_payload();
    payload["FunctionList"]["B"]["FaaSServer"] = json!("nope");
    let (scheduler, store, log) = raw_scheduler(payload).await;

    scheduler.trigger(None).await.unwrap();

    let lines = String::from_utf8(
        store
            .get_object(log.key())
            .await
            .unwrap()
            .unwrap()
            .to_vec(),
    )
    .unwrap();
    check!(lines.contains(r#"{"faasr_trigger":"invalid server name: nope"}"#));
    check!(lines.contains("SIMULATED TRIGGER: C.1"));
    check!(lines.contains("SIMULATED TRIGGER: C.3"));
    check!(!lines.contains("SIMULATED TRIGGER: B"));
}

#[test_r::test]
async fn dangling_successor_reference_is_logged_and_skipped() {
    let mut payload = fan_out_payload();
    payload["FunctionList"]["A"]["InvokeNext"] = json!(["ghost", "C"]);
    let (scheduler, store, log) = raw_scheduler(payload).await;

    scheduler.trigger(None).await.unwrap();

    let lines = String::from_utf8(
        store
            .get_object(log.key())
            .await
            .unwrap()
            .unwrap()
            .to_vec(),
    )
    .unwrap();
    check!(lines.contains(r#"{"faasr_trigger":"invalid function reference: ghost"}"#));
    check!(lines.contains("SIMULATED TRIGGER: C"));
}
