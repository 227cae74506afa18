/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Configuration for the framework core, loaded from `core.toml` in
/// XDG-compliant directories.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    /// Tracing and logging configuration.
    pub tracing: TracingConfig,
    /// Message bus configuration.
    pub bus: BusConfig,
}

/// Tracing and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub env_filter: String,
    /// Whether log output additionally goes to a file.
    pub log_to_file: bool,
    /// Directory for log files.
    pub log_directory: String,
}

/// Message bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// How long shutdown waits for dispatchers to drain, in milliseconds.
    pub quiesce_timeout_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            env_filter: "info".to_string(),
            log_to_file: false,
            log_directory: "logs".to_string(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            quiesce_timeout_ms: 3_000,
        }
    }
}

impl CoreConfig {
    /// Loads the core config from `<prefix>/core.toml` in the XDG config
    /// directories, falling back to the defaults when no file exists.
    pub fn load(prefix: &str) -> anyhow::Result<Self> {
        let Ok(base) = xdg::BaseDirectories::with_prefix(prefix) else {
            return Ok(Self::default());
        };
        match base.find_config_file("core.toml") {
            Some(path) => {
                debug!("loading core config from '{}'", path.display());
                let contents = std::fs::read_to_string(&path)?;
                Ok(toml::from_str(&contents)?)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Process-wide context owning the logging lifecycle.
///
/// Replaces module-level logger state with an explicit object: `init` sets
/// the tracing subscriber up once, `shutdown` flushes the file writer. The
/// context lives on the [`Application`](crate::application::Application) and
/// is dropped with it.
pub struct CoreContext {
    config: CoreConfig,
    guard: Mutex<Option<WorkerGuard>>,
}

impl CoreContext {
    /// Initialises the context for an application prefix: loads the core
    /// config and installs the tracing subscriber.
    ///
    /// Installing the subscriber is best-effort so that several contexts in
    /// one process (as happens under test) do not fight over it.
    pub fn init(prefix: &str) -> anyhow::Result<Self> {
        let config = CoreConfig::load(prefix)?;
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.tracing.env_filter));

        let guard = if config.tracing.log_to_file {
            std::fs::create_dir_all(&config.tracing.log_directory)?;
            let appender = tracing_appender::rolling::never(
                &config.tracing.log_directory,
                format!("{prefix}.log"),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .try_init();
            Some(guard)
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
            None
        };

        Ok(Self {
            config,
            guard: Mutex::new(guard),
        })
    }

    /// The loaded core config.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The shutdown drain budget for the message bus.
    pub fn quiesce_timeout(&self) -> Duration {
        Duration::from_millis(self.config.bus.quiesce_timeout_ms)
    }

    /// Flushes and releases the logging resources.
    pub fn shutdown(&self) {
        debug!("shutting down core context");
        self.guard.lock().expect("poisoned guard lock").take();
    }
}

impl std::fmt::Debug for CoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreContext")
            .field("config", &self.config)
            .finish()
    }
}
