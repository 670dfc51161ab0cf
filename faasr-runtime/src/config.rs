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

use faasr_common::config::ConfigLoader;
use faasr_common::tracing::TracingConfig;
use faasr_common::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub tracing: TracingConfig,
    /// Loopback port of the RPC sidecar; 0 picks an ephemeral port.
    pub rpc_port: u16,
    /// Applied to every outbound provider invocation.
    #[serde(with = "humantime_serde")]
    pub invoke_timeout: Duration,
    /// How long the readiness probe may poll `/echo` before giving up.
    #[serde(with = "humantime_serde")]
    pub readiness_timeout: Duration,
    pub debug: DebugConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::local_dev("faasr-runtime"),
            rpc_port: 8000,
            invoke_timeout: Duration::from_secs(30),
            readiness_timeout: Duration::from_secs(10),
            debug: DebugConfig::default(),
        }
    }
}

impl SafeDisplay for RuntimeConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "tracing:");
        let _ = writeln!(&mut result, "{}", self.tracing.to_safe_string_indented());
        let _ = writeln!(&mut result, "RPC port: {}", self.rpc_port);
        let _ = writeln!(&mut result, "invoke timeout: {:?}", self.invoke_timeout);
        let _ = writeln!(
            &mut result,
            "readiness timeout: {:?}",
            self.readiness_timeout
        );
        let _ = writeln!(&mut result, "debug:");
        let _ = writeln!(&mut result, "{}", self.debug.to_safe_string_indented());
        result
    }
}

/// Process-wide debug switches, threaded explicitly into the scheduler and
/// the file service instead of living in ambient global state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Replaces provider invocations with simulated-trigger log lines.
    pub skip_real_triggers: bool,
    /// Redirects `put_file` under `local_file_system_dir` instead of the
    /// object store.
    pub use_local_file_system: bool,
    pub local_file_system_dir: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            skip_real_triggers: false,
            use_local_file_system: false,
            local_file_system_dir: PathBuf::from("/tmp/faasr"),
        }
    }
}

impl SafeDisplay for DebugConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(
            &mut result,
            "skip real triggers: {}",
            self.skip_real_triggers
        );
        let _ = writeln!(
            &mut result,
            "use local file system: {}",
            self.use_local_file_system
        );
        let _ = writeln!(
            &mut result,
            "local file system dir: {}",
            self.local_file_system_dir.display()
        );
        result
    }
}

pub fn make_config_loader() -> ConfigLoader<RuntimeConfig> {
    ConfigLoader::new(&PathBuf::from("config/faasr-runtime.toml"))
}
