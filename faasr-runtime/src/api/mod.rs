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

use crate::bootstrap::Services;
use poem_openapi::{OpenApiService, Tags};

mod rpc;

pub use rpc::{
    EchoResponse, ExitRequest, InvocationOutcome, ReturnRequest, ReturnStatus, RpcApi, RpcRequest,
    RpcResponse,
};

#[derive(Tags)]
enum ApiTags {
    /// The local procedure surface consumed by the user function.
    Rpc,
}

pub type Apis = RpcApi;

pub fn make_open_api_service(services: &Services) -> OpenApiService<Apis, ()> {
    OpenApiService::new(
        RpcApi {
            procedures: services.procedures.clone(),
            log: services.log.clone(),
            outcome: services.outcome.clone(),
        },
        "FaaSr Runtime RPC",
        crate::VERSION,
    )
}
