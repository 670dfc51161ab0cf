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

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FAASR__";
const ENV_SEPARATOR: &str = "__";

pub trait ConfigLoaderConfig: DeserializeOwned + Serialize + Default {}

impl<T: DeserializeOwned + Serialize + Default> ConfigLoaderConfig for T {}

/// Loads a service configuration by layering, in increasing priority:
/// the `Default` instance, the given TOML file and `FAASR__`-prefixed
/// environment variables (with `__` as the nesting separator).
pub struct ConfigLoader<T: ConfigLoaderConfig> {
    pub config_file_name: PathBuf,
    phantom_data: PhantomData<T>,
}

impl<T: ConfigLoaderConfig> ConfigLoader<T> {
    pub fn new(config_file_name: &Path) -> ConfigLoader<T> {
        ConfigLoader {
            config_file_name: config_file_name.to_path_buf(),
            phantom_data: PhantomData,
        }
    }

    pub fn figment(&self) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(T::default()))
            .merge(Toml::file(&self.config_file_name))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
    }

    pub fn load(&self) -> figment::Result<T> {
        self.figment().extract()
    }

    /// Used by service entrypoints: `--dump-config-default` prints the
    /// default configuration as TOML and yields `None`, otherwise the
    /// loaded configuration is returned. Load failures are fatal at this
    /// point, there is nothing useful to continue with.
    pub fn load_or_dump_config(&self) -> Option<T> {
        if std::env::args().any(|arg| arg == "--dump-config-default") {
            self.dump_config();
            None
        } else {
            match self.load() {
                Ok(config) => Some(config),
                Err(error) => {
                    eprintln!("Failed to load config: {error}");
                    std::process::exit(1);
                }
            }
        }
    }

    fn dump_config(&self) {
        match toml::to_string(&T::default()) {
            Ok(dump) => println!("# Default configuration\n{dump}"),
            Err(error) => eprintln!("Failed to serialize default config: {error}"),
        }
    }
}
