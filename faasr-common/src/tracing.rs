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

use crate::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    pub service_name: String,
    pub json: bool,
    pub ansi: bool,
    pub without_time: bool,
}

impl TracingConfig {
    pub fn local_dev(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            json: false,
            ansi: true,
            without_time: false,
        }
    }

    pub fn deployment(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            json: true,
            ansi: false,
            without_time: false,
        }
    }

    pub fn test_pretty_without_time(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            json: false,
            ansi: true,
            without_time: true,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::local_dev("faasr")
    }
}

impl SafeDisplay for TracingConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "service name: {}", self.service_name);
        let _ = writeln!(&mut result, "JSON: {}", self.json);
        let _ = writeln!(&mut result, "ANSI: {}", self.ansi);
        let _ = writeln!(&mut result, "without time: {}", self.without_time);
        result
    }
}

pub fn init_tracing_with_default_env_filter(config: &TracingConfig) {
    init_tracing(config, default_env_filter(LevelFilter::INFO));
}

pub fn init_tracing_with_default_debug_env_filter(config: &TracingConfig) {
    init_tracing(config, default_env_filter(LevelFilter::DEBUG));
}

fn default_env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

/// Installs the global subscriber. Safe to call more than once, repeated
/// initialization (common in tests) is ignored.
pub fn init_tracing(config: &TracingConfig, env_filter: EnvFilter) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(config.ansi);

    if config.json {
        let _ = builder.json().try_init();
    } else if config.without_time {
        let _ = builder.without_time().try_init();
    } else {
        let _ = builder.try_init();
    }
}
