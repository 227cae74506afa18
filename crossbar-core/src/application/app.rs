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

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::application::context::CoreContext;
use crate::bus::MessageBus;
use crate::command::CoreServices;
use crate::component::{ComponentFactory, ComponentRegistry, ScopeHandle, SCOPE_SESSION};
use crate::config::{priority, ConfigManager, ConfigOption, ConfigValue};
use crate::extension::{command_option, Extension, ExtensionLoader, ExtensionRegistry};

/// Exit code used when extension loading or config resolution fails.
pub const CONFIGURATION_ERROR_EXIT_CODE: i32 = 2;

/// Pre-parsed command-line input for the loader: the selected command and
/// raw option values at command-line priority.
///
/// Flag parsing itself is out of scope for the core; whatever front end
/// exists turns its arguments into this structure.
#[derive(Debug, Clone, Default)]
pub struct CommandLineConfig {
    /// The command name to execute.
    pub command: Option<String>,
    /// Raw-keyed config values from the command line.
    pub values: Vec<(String, ConfigValue)>,
}

impl CommandLineConfig {
    /// Creates a command line selecting the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            values: Vec::new(),
        }
    }

    /// Adds a raw config value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }
}

/// Builder for an [`Application`].
pub struct ApplicationBuilder {
    name: String,
    registry: ExtensionRegistry,
    command_line: CommandLineConfig,
    core_config_options: Vec<ConfigOption>,
}

impl ApplicationBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            registry: ExtensionRegistry::new(),
            command_line: CommandLineConfig::default(),
            core_config_options: Vec::new(),
        }
    }

    /// Registers a framework extension.
    pub fn register_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.registry.register_framework(extension);
        self
    }

    /// Registers a plugin-provided extension.
    pub fn register_plugin(mut self, extension: Arc<dyn Extension>) -> Self {
        self.registry.register_plugin(extension);
        self
    }

    /// Declares a config option owned by the application core itself.
    pub fn core_config_option(mut self, option: ConfigOption) -> Self {
        self.core_config_options.push(option);
        self
    }

    /// Provides the pre-parsed command line.
    pub fn command_line(mut self, command_line: CommandLineConfig) -> Self {
        self.command_line = command_line;
        self
    }

    /// Initialises the process context and assembles the application.
    pub fn build(self) -> anyhow::Result<Application> {
        let context = CoreContext::init(&self.name)?;
        let config = ConfigManager::new();
        let components = ComponentRegistry::new();
        let factory = Arc::new(ComponentFactory::new(components.clone()));
        let session_scope = factory.enter_scope(SCOPE_SESSION, None)?;
        let bus = MessageBus::with_components(factory.clone(), session_scope.clone());

        Ok(Application {
            name: self.name,
            context,
            config,
            components,
            factory,
            session_scope,
            bus,
            registry: self.registry,
            command_line: self.command_line,
            core_config_options: self.core_config_options,
        })
    }
}

/// The assembled application: context, bus, config, components and
/// extensions, ready to load and execute one command.
///
/// Control flow: the extension loader configures the bus, extensions
/// register dispatchers, the selected command runs and communicates through
/// the bus, then teardown drains the bus and destroys the extensions.
pub struct Application {
    name: String,
    context: CoreContext,
    config: ConfigManager,
    components: ComponentRegistry,
    factory: Arc<ComponentFactory>,
    session_scope: ScopeHandle,
    bus: MessageBus,
    registry: ExtensionRegistry,
    command_line: CommandLineConfig,
    core_config_options: Vec<ConfigOption>,
}

impl Application {
    /// Starts building an application with the given name; the name doubles
    /// as the XDG config prefix.
    pub fn builder(name: impl Into<String>) -> ApplicationBuilder {
        ApplicationBuilder::new(name.into())
    }

    /// The application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The application's message bus.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// The application's config manager.
    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    /// Loads all extensions, runs the selected command and tears the
    /// process down. The returned value is the process exit code.
    ///
    /// Configuration errors are reported with the offending option,
    /// extension or command named, and produce a non-zero exit code without
    /// any command logic running.
    pub async fn run(mut self) -> anyhow::Result<i32> {
        if let Some(command) = self.command_line.command.clone() {
            self.config.set(
                &command_option(),
                command.into(),
                priority::COMMAND_LINE,
                "command-line",
                None,
            )?;
        }
        self.config.update_config(
            self.command_line.values.clone(),
            priority::COMMAND_LINE,
            "command-line",
        )?;

        let loader = ExtensionLoader::new(
            self.config.clone(),
            self.bus.clone(),
            self.components.clone(),
            self.core_config_options.clone(),
        );
        let selected = match loader.load(&mut self.registry).await {
            Ok(selected) => selected,
            Err(e) => {
                error!("configuration error: {e:#}");
                self.teardown().await;
                return Ok(CONFIGURATION_ERROR_EXIT_CODE);
            }
        };

        info!(command = selected.command.name(), "executing command");
        let core = CoreServices {
            bus: self.bus.clone(),
            config: selected.config.clone(),
            factory: self.factory.clone(),
            session_scope: self.session_scope.clone(),
        };
        let exit_code = match selected.command.handler().run(core).await {
            Ok(exit_code) => exit_code,
            Err(e) => {
                error!("command '{}' failed: {e:#}", selected.command.name());
                1
            }
        };

        self.teardown().await;
        Ok(exit_code)
    }

    /// Drains the bus and destroys extensions and scopes. A bus that fails
    /// to quiesce is logged and teardown proceeds forcibly rather than
    /// hanging.
    async fn teardown(&self) {
        if let Err(e) = self
            .bus
            .wait_for_not_active(Some(self.context.quiesce_timeout()))
            .await
        {
            error!("proceeding with forced teardown: {e}");
            debug!(dispatchers = ?self.bus.get_dispatchers(), "dispatchers at teardown");
        }
        self.registry.destroy_enabled().await;
        let result = self.factory.exit_scope(self.session_scope.clone());
        for error in &result.errors {
            error!("error exiting session scope: {error}");
        }
        self.context.shutdown();
    }
}
