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
use faasr_runtime::api;
use faasr_runtime::bootstrap::Services;
use faasr_runtime::config::RuntimeConfig;
use faasr_runtime::model::DataStoreConfig;
use faasr_runtime::payload::Payload;
use faasr_runtime::storage::memory::InMemoryObjectStore;
use faasr_runtime::storage::{ObjectStore, ObjectStoreFactory, StorageError};
use poem::test::TestClient;
use poem::Route;
use serde_json::{json, Value};
use std::sync::Arc;
use test_r::test;

test_r::enable!();

struct StaticStoreFactory(Arc<InMemoryObjectStore>);

#[async_trait]
impl ObjectStoreFactory for StaticStoreFactory {
    async fn open(&self, _: &DataStoreConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(self.0.clone())
    }
}

fn payload_json() -> Value {
    json!({
        "FunctionInvoke": "compute",
        "InvocationID": "inv-9",
        "FaaSrLog": "faasr",
        "FunctionList": {
            "compute": {"FaaSServer": "lam", "InvokeNext": [], "Rank": "2/3"}
        },
        "ComputeServers": {
            "lam": {"FaaSType": "Lambda", "AccessKey": "a", "SecretKey": "s", "Region": "us-east-1"}
        },
        "DataStores": {
            "minio": {
                "Bucket": "faasr",
                "Endpoint": "http://localhost:9000",
                "Region": "us-east-1",
                "AccessKey": "minio",
                "SecretKey": "secret"
            }
        },
        "DefaultDataStore": "minio"
    })
}

async fn rpc_client() -> (TestClient<Route>, Services, Arc<InMemoryObjectStore>) {
    let store = Arc::new(InMemoryObjectStore::new());
    let payload = Payload::from_json(&payload_json().to_string()).unwrap();
    let services = Services::with_stores(
        &RuntimeConfig::default(),
        payload,
        Arc::new(StaticStoreFactory(store.clone())),
    )
    .await
    .unwrap();

    let app = Route::new().nest("/", api::make_open_api_service(&services));
    (TestClient::new(app), services, store)
}

async fn call_action(client: &TestClient<Route>, body: Value) -> Value {
    let response = client.post("/action").body_json(&body).send().await;
    response.assert_status_is_ok();
    response.json().await.value().deserialize()
}

#[test]
async fn echo_reflects_the_readiness_message() {
    let (client, _, _) = rpc_client().await;

    let response = client.get("/echo").query("message", &"echo").send().await;
    response.assert_status_is_ok();
    let body: Value = response.json().await.value().deserialize();
    check!(body == json!({"message": "echo"}));
}

#[test]
async fn rank_reports_the_current_shard() {
    let (client, _, _) = rpc_client().await;

    let body = call_action(&client, json!({"ProcedureID": "faasr_rank"})).await;
    check!(body["Success"] == json!(true));
    check!(body["Data"]["rank"] == json!("2/3"));
}

#[test]
async fn return_value_round_trips_through_get_return() {
    let (client, _, _) = rpc_client().await;

    let response = client
        .post("/return")
        .body_json(&json!({"FunctionResult": {"answer": 42}}))
        .send()
        .await;
    response.assert_status_is_ok();

    let response = client.get("/get-return").send().await;
    response.assert_status_is_ok();
    let body: Value = response.json().await.value().deserialize();
    check!(body["FunctionResult"] == json!({"answer": 42}));
    check!(body["Error"] == json!(false));
    check!(body["Message"] == json!(null));
}

#[test]
async fn exit_with_error_is_recorded() {
    let (client, _, _) = rpc_client().await;

    let response = client
        .post("/exit")
        .body_json(&json!({"Error": true, "Message": "boom"}))
        .send()
        .await;
    response.assert_status_is_ok();

    let response = client.get("/get-return").send().await;
    let body: Value = response.json().await.value().deserialize();
    check!(body["Error"] == json!(true));
    check!(body["Message"] == json!("boom"));
}

#[test]
async fn unknown_procedure_is_rejected_and_poisons_the_invocation() {
    let (client, services, _) = rpc_client().await;

    let body = call_action(&client, json!({"ProcedureID": "faasr_selfdestruct"})).await;
    check!(body["Success"] == json!(false));

    let response = client.get("/get-return").send().await;
    let status: Value = response.json().await.value().deserialize();
    check!(status["Error"] == json!(true));

    let log = services
        .store
        .get_object(services.log.key())
        .await
        .unwrap()
        .expect("run log missing");
    let log = String::from_utf8(log.to_vec()).unwrap();
    check!(log.contains("faasr_selfdestruct is not a valid FaaSr function call"));
}

#[test]
async fn log_appends_to_the_run_log_object() {
    let (client, services, _) = rpc_client().await;

    let body = call_action(
        &client,
        json!({"ProcedureID": "faasr_log", "Arguments": {"log_message": "hello from user code"}}),
    )
    .await;
    check!(body["Success"] == json!(true));

    let log = services
        .store
        .get_object(services.log.key())
        .await
        .unwrap()
        .expect("run log missing");
    check!(services.log.key() == "faasr/inv-9/compute.txt");
    check!(String::from_utf8(log.to_vec()).unwrap() == "hello from user code\n");
}

#[test]
async fn files_round_trip_through_the_store() {
    let (client, _, store) = rpc_client().await;
    let dir = tempfile::tempdir().unwrap();

    let input = dir.path().join("input.txt");
    tokio::fs::write(&input, "payload bytes").await.unwrap();

    let body = call_action(
        &client,
        json!({"ProcedureID": "faasr_put_file", "Arguments": {
            "local_file": input.display().to_string(),
            "remote_file": "out.txt",
            "remote_folder": "results"
        }}),
    )
    .await;
    check!(body["Success"] == json!(true));
    check!(
        store.get_object("results/out.txt").await.unwrap()
            == Some(bytes::Bytes::from("payload bytes"))
    );

    let listing = call_action(
        &client,
        json!({"ProcedureID": "faasr_get_folder_list", "Arguments": {"faasr_prefix": "results"}}),
    )
    .await;
    check!(listing["Data"]["folder_list"] == json!(["results/out.txt"]));

    let output = dir.path().join("fetched.txt");
    let body = call_action(
        &client,
        json!({"ProcedureID": "faasr_get_file", "Arguments": {
            "local_file": output.display().to_string(),
            "remote_file": "out.txt",
            "remote_folder": "results"
        }}),
    )
    .await;
    check!(body["Success"] == json!(true));
    check!(tokio::fs::read_to_string(&output).await.unwrap() == "payload bytes");

    let body = call_action(
        &client,
        json!({"ProcedureID": "faasr_delete_file", "Arguments": {
            "remote_file": "out.txt",
            "remote_folder": "results"
        }}),
    )
    .await;
    check!(body["Success"] == json!(true));
    check!(store.get_object("results/out.txt").await.unwrap() == None);
}

#[test]
async fn failed_procedure_reports_but_keeps_serving() {
    let (client, _, _) = rpc_client().await;

    let body = call_action(
        &client,
        json!({"ProcedureID": "faasr_get_file", "Arguments": {
            "local_file": "never.txt",
            "remote_file": "missing.txt"
        }}),
    )
    .await;
    check!(body["Success"] == json!(false));
    check!(body["Message"]
        .as_str()
        .unwrap()
        .contains("remote file not found"));

    // the server keeps serving after a procedure failure
    let response = client.get("/echo").query("message", &"still-up").send().await;
    response.assert_status_is_ok();
    let echo: Value = response.json().await.value().deserialize();
    check!(echo == json!({"message": "still-up"}));

    let response = client.get("/get-return").send().await;
    let status: Value = response.json().await.value().deserialize();
    check!(status["Error"] == json!(true));
}

#[test]
async fn sidecar_serves_on_an_ephemeral_loopback_port() {
    let store = Arc::new(InMemoryObjectStore::new());
    let payload = Payload::from_json(&payload_json().to_string()).unwrap();
    let config = RuntimeConfig {
        rpc_port: 0,
        ..RuntimeConfig::default()
    };
    let services = Services::with_stores(&config, payload, Arc::new(StaticStoreFactory(store)))
        .await
        .unwrap();

    let mut join_set = tokio::task::JoinSet::new();
    let port = faasr_runtime::bootstrap::start_rpc_server(&services, &config, &mut join_set)
        .await
        .unwrap();
    check!(port != 0);

    faasr_runtime::bootstrap::wait_for_ready(port, std::time::Duration::from_secs(5))
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/return"))
        .json(&json!({"FunctionResult": true}))
        .send()
        .await
        .unwrap();
    check!(response.status().is_success());

    let outcome = services.outcome.read().await;
    check!(outcome.result == Some(json!(true)));

    join_set.abort_all();
}

#[test]
async fn s3_creds_expose_the_named_store() {
    let (client, _, _) = rpc_client().await;

    let body = call_action(&client, json!({"ProcedureID": "faasr_get_s3_creds"})).await;
    check!(body["Success"] == json!(true));
    check!(
        body["Data"]["s3_creds"]
            == json!({
                "bucket": "faasr",
                "region": "us-east-1",
                "endpoint": "http://localhost:9000",
                "access_key": "minio",
                "secret_key": "secret",
                "anonymous": false
            })
    );
}
