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

use std::collections::HashMap;
use std::ops::RangeInclusive;

use async_trait::async_trait;

use crate::bus::MessageBus;
use crate::command::CommandDescriptor;
use crate::component::ComponentRegistry;
use crate::config::{ConfigManager, ConfigOption, ConfigOptionId, ConfigValue, ConfigView};
use crate::message::{EndpointId, MessageId};

pub use builtin::{
    all_extensions_option, command_option, commands_option, config_file_option,
    disableable_extensions_option, enabled_extensions_option, extension_enabled_option,
    extensions_default_enabled_option, plugins_paths_option, FileConfigExtension,
};
pub use loader::{ExtensionLoader, LoaderError, SelectedCommand};
pub use registry::ExtensionRegistry;

mod builtin;
mod loader;
mod registry;

/// Extensions with a load order in this range are enabled unconditionally.
pub const LOAD_ORDER_ALWAYS_ENABLED: RangeInclusive<u32> = 1..=20;
/// Window in which plugin paths must be resolved.
pub const LOAD_ORDER_PLUGIN_PATH: RangeInclusive<u32> = 1..=10;
/// Window in which enable/disable decisions are read.
pub const LOAD_ORDER_DISABLE: RangeInclusive<u32> = 11..=20;
/// Window for all remaining framework extensions.
pub const LOAD_ORDER_REST: RangeInclusive<u32> = 21..=1000;
/// Load order of command extensions.
pub const LOAD_ORDER_COMMAND: u32 = 1000;

/// Static description of an extension: what it contributes and when it
/// loads.
///
/// Descriptors are built with explicit calls at process startup; there is no
/// runtime discovery.
#[derive(Debug, Clone)]
pub struct ExtensionDescriptor {
    name: String,
    description: String,
    load_order: u32,
    config_options: Vec<ConfigOption>,
    commands: Vec<CommandDescriptor>,
    extends: Vec<String>,
    endpoints_and_messages: Vec<(EndpointId, Vec<MessageId>)>,
    default_enabled: bool,
    activate_on: Vec<ConfigOptionId>,
    replaces: Vec<String>,
}

impl ExtensionDescriptor {
    /// Starts a descriptor for a framework extension with the given load
    /// order.
    pub fn new(name: impl Into<String>, load_order: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            load_order,
            config_options: Vec::new(),
            commands: Vec::new(),
            extends: Vec::new(),
            endpoints_and_messages: Vec::new(),
            default_enabled: true,
            activate_on: Vec::new(),
            replaces: Vec::new(),
        }
    }

    /// Starts a descriptor for a command extension: one that extends an
    /// existing command instead of running early.
    pub fn command_extension(name: impl Into<String>, extends: &[&str]) -> Self {
        let mut descriptor = Self::new(name, LOAD_ORDER_COMMAND);
        descriptor.extends = extends.iter().map(|c| c.to_string()).collect();
        descriptor
    }

    /// Sets the human readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a config option consumed by the extension.
    pub fn with_config_option(mut self, option: ConfigOption) -> Self {
        self.config_options.push(option);
        self
    }

    /// Declares a command created by the extension.
    pub fn with_command(mut self, command: CommandDescriptor) -> Self {
        self.commands.push(command);
        self
    }

    /// Declares the endpoints and messages defined by the extension.
    pub fn with_endpoints_and_messages(
        mut self,
        endpoint: EndpointId,
        messages: &[MessageId],
    ) -> Self {
        self.endpoints_and_messages
            .push((endpoint, messages.to_vec()));
        self
    }

    /// Sets whether the extension is enabled unless configured otherwise.
    pub fn default_enabled(mut self, default_enabled: bool) -> Self {
        self.default_enabled = default_enabled;
        self
    }

    /// Requires the given option to be truthy for the extension to
    /// activate. All declared options must be truthy.
    pub fn activate_on(mut self, option_id: ConfigOptionId) -> Self {
        self.activate_on.push(option_id);
        self
    }

    /// Declares that enabling this extension suppresses the named one.
    pub fn replaces(mut self, extension: &str) -> Self {
        self.replaces.push(extension.to_string());
        self
    }

    /// The extension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The load order controlling when the extension takes part in the
    /// loading passes.
    pub fn load_order(&self) -> u32 {
        self.load_order
    }

    /// The extension's declared config options.
    pub fn config_options(&self) -> &[ConfigOption] {
        &self.config_options
    }

    /// The commands created by the extension.
    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// The commands this extension extends; non-empty marks a command
    /// extension.
    pub fn extends(&self) -> &[String] {
        &self.extends
    }

    /// The endpoints and messages the extension defines.
    pub fn endpoints_and_messages(&self) -> &[(EndpointId, Vec<MessageId>)] {
        &self.endpoints_and_messages
    }

    /// Whether the extension is enabled unless configured otherwise.
    pub fn is_default_enabled(&self) -> bool {
        self.default_enabled
    }

    /// The options gating activation.
    pub fn activation_options(&self) -> &[ConfigOptionId] {
        &self.activate_on
    }

    /// The extensions suppressed when this one is enabled.
    pub fn replaced_extensions(&self) -> &[String] {
        &self.replaces
    }

    /// Whether this is a command extension.
    pub fn is_command_extension(&self) -> bool {
        !self.extends.is_empty()
    }
}

/// A config contribution from an extension's `get_config`.
#[derive(Debug, Clone, Default)]
pub struct ExtensionConfig {
    /// Raw-keyed config values to add.
    pub values: Vec<(String, ConfigValue)>,
    /// The priority the values are added at; later passes only override
    /// earlier ones when their priority is numerically higher.
    pub priority: i32,
    /// Source name recorded for the values; defaults to the extension name.
    pub source: Option<String>,
}

impl ExtensionConfig {
    /// Creates a contribution at a priority.
    pub fn new(values: Vec<(String, ConfigValue)>, priority: i32) -> Self {
        Self {
            values,
            priority,
            source: None,
        }
    }

    /// Overrides the recorded source name.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A self-contained unit contributing config options, commands, endpoints,
/// components and dispatchers to the running process.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    /// The extension's static description.
    fn descriptor(&self) -> ExtensionDescriptor;

    /// Contributes additional config values during the loading passes.
    ///
    /// Called once per pass window the extension's load order falls in, with
    /// the config resolved so far and the options requested by the main
    /// command and each subcommand.
    fn get_config(
        &self,
        _config: &ConfigManager,
        _requested_options: &[ConfigOption],
        _command_options: &HashMap<String, Vec<ConfigOption>>,
    ) -> anyhow::Result<Vec<ExtensionConfig>> {
        Ok(Vec::new())
    }

    /// Registers the extension's components.
    fn register_components(&self, _components: &ComponentRegistry) {}

    /// Registers the extension's dispatchers on the fully configured bus.
    ///
    /// The loader guarantees all declared required options are resolved
    /// before this is called.
    async fn register_dispatchers(
        &self,
        _bus: &MessageBus,
        _config: &ConfigView,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Tears the extension down at application shutdown.
    async fn destroy(&self) {}
}
