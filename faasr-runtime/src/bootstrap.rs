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

use crate::api;
use crate::api::{EchoResponse, InvocationOutcome};
use crate::config::RuntimeConfig;
use crate::drivers::default_drivers;
use crate::payload::Payload;
use crate::service::files::FileService;
use crate::service::lock::LockService;
use crate::service::logs::WorkflowLog;
use crate::service::procedures::ProcedureRegistry;
use crate::service::scheduler::Scheduler;
use crate::storage::s3::S3ObjectStoreFactory;
use crate::storage::{ObjectStore, ObjectStoreFactory};
use anyhow::{anyhow, bail, Context};
use poem::listener::{Acceptor, Listener};
use poem::{EndpointExt, Route};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument};

/// Everything one invocation runs on, wired once at startup.
#[derive(Clone)]
pub struct Services {
    pub payload: Arc<RwLock<Payload>>,
    pub store: Arc<dyn ObjectStore>,
    pub log: Arc<WorkflowLog>,
    pub lock: Arc<LockService>,
    pub files: Arc<FileService>,
    pub procedures: Arc<ProcedureRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub outcome: Arc<RwLock<InvocationOutcome>>,
}

impl Services {
    /// Production wiring: the default data store named by the payload backs
    /// the run log, the lock service and the file procedures.
    pub async fn new(config: &RuntimeConfig, payload: Payload) -> Result<Self, anyhow::Error> {
        Self::with_stores(config, payload, Arc::new(S3ObjectStoreFactory)).await
    }

    /// Same wiring with a caller-supplied store factory; tests run the full
    /// stack against in-memory stores through this entry point.
    pub async fn with_stores(
        config: &RuntimeConfig,
        payload: Payload,
        stores: Arc<dyn ObjectStoreFactory>,
    ) -> Result<Self, anyhow::Error> {
        debug!("Initializing runtime services");

        if let Err(errors) = payload.document().validate() {
            bail!("invalid workflow document: {}", errors.join("; "));
        }

        let default_store_config = payload
            .default_data_store()
            .map_err(|err| anyhow!(err))
            .context("resolving the default data store")?
            .clone();
        let store = stores
            .open(&default_store_config)
            .await
            .context("opening the default data store")?;

        let log = Arc::new(WorkflowLog::new(store.clone(), &payload));
        let payload = Arc::new(RwLock::new(payload));
        let lock = Arc::new(LockService::new(store.clone(), log.clone()));
        let files = Arc::new(FileService::new(
            payload.clone(),
            stores,
            log.clone(),
            config.debug.clone(),
        ));
        let procedures = Arc::new(ProcedureRegistry::new(payload.clone(), files.clone()));
        let scheduler = Arc::new(Scheduler::new(
            payload.clone(),
            log.clone(),
            lock.clone(),
            default_drivers(config.invoke_timeout, log.clone()),
            config.debug.clone(),
        ));

        Ok(Self {
            payload,
            store,
            log,
            lock,
            files,
            procedures,
            scheduler,
            outcome: Arc::new(RwLock::new(InvocationOutcome::default())),
        })
    }

    /// Runs after the user process exited: a recorded error state fails the
    /// invocation, otherwise the collected return value gates the trigger
    /// of the successors.
    pub async fn finish(&self) -> Result<(), anyhow::Error> {
        let (error, message, result) = {
            let outcome = self.outcome.read().await;
            (outcome.error, outcome.message.clone(), outcome.result.clone())
        };
        if error {
            let message = format!(
                r#"{{"faasr_runtime":"user function signaled an error -- {}"}}"#,
                message.unwrap_or_default()
            );
            error!("{message}");
            self.log.append_best_effort(&message).await;
            bail!("user function signaled an error");
        }
        self.scheduler
            .trigger(result)
            .await
            .context("triggering successors")
    }
}

/// Binds the RPC sidecar on loopback and serves it from the join set;
/// returns the actual port (relevant when the configured port is 0).
pub async fn start_rpc_server(
    services: &Services,
    config: &RuntimeConfig,
    join_set: &mut JoinSet<Result<(), anyhow::Error>>,
) -> Result<u16, anyhow::Error> {
    let api_service = api::make_open_api_service(services);
    let app = Route::new().nest("/", api_service).boxed();

    let poem_listener =
        poem::listener::TcpListener::bind(format!("127.0.0.1:{}", config.rpc_port));
    let acceptor = poem_listener.into_acceptor().await?;
    let port = acceptor.local_addr()[0]
        .as_socket_addr()
        .expect("socket address")
        .port();

    join_set.spawn(
        async move {
            poem::Server::new_with_acceptor(acceptor)
                .run(app)
                .await
                .map_err(|err| err.into())
        }
        .in_current_span(),
    );

    info!("Started RPC sidecar on 127.0.0.1:{port}");
    Ok(port)
}

/// Polls `/echo` until the sidecar answers; the user process must not be
/// started before this returns.
pub async fn wait_for_ready(port: u16, timeout: Duration) -> Result<(), anyhow::Error> {
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let response = client
            .get(format!("http://127.0.0.1:{port}/echo"))
            .query(&[("message", "echo")])
            .send()
            .await;
        if let Ok(response) = response {
            if let Ok(body) = response.json::<EchoResponse>().await {
                if body.message == "echo" {
                    return Ok(());
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("RPC sidecar did not become ready within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
