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

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::bus::{BusError, MessageBus};
use crate::command::CommandDescriptor;
use crate::component::ComponentRegistry;
use crate::config::{priority, ConfigError, ConfigManager, ConfigOption, ConfigValue, ConfigView};
use crate::extension::builtin::{
    all_extensions_option, command_option, commands_option, disableable_extensions_option,
    enabled_extensions_option, extension_enabled_option, extensions_default_enabled_option,
    plugins_paths_option,
};
use crate::extension::registry::ExtensionRegistry;
use crate::extension::{
    ExtensionDescriptor, LOAD_ORDER_ALWAYS_ENABLED, LOAD_ORDER_DISABLE, LOAD_ORDER_PLUGIN_PATH,
    LOAD_ORDER_REST,
};
use crate::message::{EndpointId, MessageId};

/// Errors raised while loading extensions and resolving configuration.
///
/// All of these abort the application before any command logic runs.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Configuration resolution failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wiring the message bus failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// No command was selected on the command line.
    #[error("no command selected")]
    NoCommandSelected,

    /// The selected command is not provided by any enabled extension.
    #[error("unknown command '{command}'")]
    UnknownCommand {
        /// The unmatched command name.
        command: String,
    },

    /// An extension failed during one of the loading phases.
    #[error("extension '{extension}' failed during {phase}: {message}")]
    Extension {
        /// The failing extension.
        extension: String,
        /// The loading phase that failed.
        phase: String,
        /// The extension's error rendering.
        message: String,
    },
}

/// The loader's result: the command to run and the config view scoped to
/// it.
pub struct SelectedCommand {
    /// The selected command.
    pub command: CommandDescriptor,
    /// Config view covering the command's and core options.
    pub config: ConfigView,
}

/// Turns the registered extensions plus command-line and config-file input
/// into a fully resolved configuration and a fully wired message bus.
///
/// The loading process is multi-pass and order matters; see the step
/// comments in [`ExtensionLoader::load`]. Later passes can override earlier
/// values only through a numerically higher priority, never by pass order
/// alone.
pub struct ExtensionLoader {
    config: ConfigManager,
    bus: MessageBus,
    components: ComponentRegistry,
    core_config_options: Vec<ConfigOption>,
}

impl ExtensionLoader {
    /// Creates a loader around the application's core collaborators.
    pub fn new(
        config: ConfigManager,
        bus: MessageBus,
        components: ComponentRegistry,
        core_config_options: Vec<ConfigOption>,
    ) -> Self {
        Self {
            config,
            bus,
            components,
            core_config_options,
        }
    }

    /// Runs the loading process against the registry and returns the
    /// selected command.
    #[instrument(skip(self, registry))]
    pub async fn load(
        &self,
        registry: &mut ExtensionRegistry,
    ) -> Result<SelectedCommand, LoaderError> {
        let mut main_options = self.initial_config_options()?;
        let mut command_options: HashMap<String, Vec<ConfigOption>> = HashMap::new();

        // Extensions in the reserved low load-order range are enabled
        // unconditionally; nothing can turn them off.
        for (descriptor, _) in
            registry.framework_in_range(&LOAD_ORDER_ALWAYS_ENABLED, false, false)
        {
            self.config.set(
                &extension_enabled_option(),
                true.into(),
                priority::CORE,
                "core",
                Some(descriptor.name()),
            )?;
            registry.enable(descriptor.name());
        }
        self.collect_config_options(
            registry,
            &mut main_options,
            &mut command_options,
            &LOAD_ORDER_ALWAYS_ENABLED,
            false,
        )?;
        self.run_get_config(
            registry,
            &main_options,
            &command_options,
            &LOAD_ORDER_PLUGIN_PATH,
            false,
        )?;

        // Plugin paths are resolved now; bring the plugin-provided
        // extensions into the working set.
        self.publish_extension_sets(registry)?;
        self.seed_enabled_flags(registry, &mut main_options)?;
        self.run_get_config(
            registry,
            &main_options,
            &command_options,
            &LOAD_ORDER_DISABLE,
            true,
        )?;
        self.enable_rest_of_extensions(registry)?;

        self.collect_config_options(
            registry,
            &mut main_options,
            &mut command_options,
            &LOAD_ORDER_REST,
            true,
        )?;
        self.run_get_config(
            registry,
            &main_options,
            &command_options,
            &LOAD_ORDER_REST,
            true,
        )?;

        self.validate_required_options(registry, &command_options)?;
        self.config.log_config();
        self.config.freeze();

        let command = self.select_command(registry, &command_options)?;
        self.wire_bus(registry, &command).await?;

        let view_options = self.view_option_names(registry, &command, &command_options);
        Ok(SelectedCommand {
            config: self.config.filter_config(view_options, None),
            command,
        })
    }

    fn initial_config_options(&self) -> Result<Vec<ConfigOption>, LoaderError> {
        let mut initial = vec![
            ConfigOption::new(plugins_paths_option()),
            ConfigOption::new(extensions_default_enabled_option()),
            ConfigOption::new(command_option()),
            ConfigOption::new(commands_option()),
        ];
        initial.extend(self.core_config_options.iter().cloned());
        let option_ids: Vec<_> = initial
            .iter()
            .map(|option| option.option_id.clone())
            .collect();
        self.config.set_default_values(&option_ids)?;
        Ok(initial)
    }

    /// Collects config options from extensions in the load-order window
    /// into the running option set and seeds their defaults.
    fn collect_config_options(
        &self,
        registry: &ExtensionRegistry,
        main_options: &mut Vec<ConfigOption>,
        command_options: &mut HashMap<String, Vec<ConfigOption>>,
        range: &RangeInclusive<u32>,
        include_plugins: bool,
    ) -> Result<(), LoaderError> {
        for (descriptor, _) in registry.framework_in_range(range, true, include_plugins) {
            for option in descriptor.config_options() {
                self.config
                    .set_default_values(std::slice::from_ref(&option.option_id))?;
                if !main_options
                    .iter()
                    .any(|existing| existing.option_id == option.option_id)
                {
                    main_options.push(option.clone());
                }
            }
            for command in descriptor.commands() {
                let options = command_options
                    .entry(command.name().to_string())
                    .or_default();
                for option in command.config_options() {
                    self.config
                        .set_default_values(std::slice::from_ref(&option.option_id))?;
                    options.push(option.clone());
                }
            }
        }

        // Command extensions contribute options to the commands they
        // extend.
        for (descriptor, _) in registry.command_extensions(true) {
            for command in descriptor.extends() {
                let options = command_options.entry(command.clone()).or_default();
                for option in descriptor.config_options() {
                    self.config
                        .set_default_values(std::slice::from_ref(&option.option_id))?;
                    options.push(option.clone());
                }
            }
        }

        let mut command_names: Vec<ConfigValue> = command_options
            .keys()
            .map(|name| ConfigValue::Str(name.clone()))
            .collect();
        command_names.sort_by_key(|value| value.to_string());
        self.config.set(
            &commands_option(),
            ConfigValue::List(command_names),
            1,
            "core",
            None,
        )?;
        Ok(())
    }

    /// Calls `get_config` on enabled framework extensions in the window, in
    /// ascending load order, feeding each contribution into the config at
    /// the contribution's priority.
    fn run_get_config(
        &self,
        registry: &ExtensionRegistry,
        main_options: &[ConfigOption],
        command_options: &HashMap<String, Vec<ConfigOption>>,
        range: &RangeInclusive<u32>,
        include_plugins: bool,
    ) -> Result<(), LoaderError> {
        for (descriptor, instance) in registry.framework_in_range(range, true, include_plugins) {
            let contributions = instance
                .get_config(&self.config, main_options, command_options)
                .map_err(|e| LoaderError::Extension {
                    extension: descriptor.name().to_string(),
                    phase: "get_config".to_string(),
                    message: format!("{e:#}"),
                })?;
            for contribution in contributions {
                let source = contribution
                    .source
                    .unwrap_or_else(|| descriptor.name().to_string());
                self.config
                    .update_config(contribution.values, contribution.priority, &source)?;
            }
        }
        Ok(())
    }

    /// Publishes the full and disableable extension name sets into config
    /// so that they can be used as entities by other options.
    fn publish_extension_sets(&self, registry: &ExtensionRegistry) -> Result<(), LoaderError> {
        let mut all: Vec<String> = registry.all_names();
        all.sort();
        self.config.set(
            &all_extensions_option(),
            ConfigValue::List(all.iter().map(|name| name.as_str().into()).collect()),
            priority::CORE,
            "core",
            None,
        )?;

        let mut disableable: Vec<String> = registry
            .not_enabled()
            .iter()
            .map(|descriptor| descriptor.name().to_string())
            .collect();
        disableable.sort();
        self.config.set(
            &disableable_extensions_option(),
            ConfigValue::List(
                disableable
                    .iter()
                    .map(|name| name.as_str().into())
                    .collect(),
            ),
            priority::CORE,
            "core",
            None,
        )?;
        Ok(())
    }

    /// Seeds the per-extension enabled flag from the global default and the
    /// descriptor's own default, at the lowest priority so any config
    /// source overrides it.
    fn seed_enabled_flags(
        &self,
        registry: &ExtensionRegistry,
        main_options: &mut Vec<ConfigOption>,
    ) -> Result<(), LoaderError> {
        let default_enabled = self
            .config
            .get(&extensions_default_enabled_option(), None)?
            .map(|value| value.is_truthy())
            .unwrap_or(true);
        for descriptor in registry.not_enabled() {
            self.config.set(
                &extension_enabled_option(),
                (default_enabled && descriptor.is_default_enabled()).into(),
                1,
                "core",
                Some(descriptor.name()),
            )?;
        }
        main_options.push(ConfigOption::new(extension_enabled_option()));
        Ok(())
    }

    /// Enables the remaining extensions according to config, honouring
    /// `replaces` suppression and `activate_on` gating.
    fn enable_rest_of_extensions(
        &self,
        registry: &mut ExtensionRegistry,
    ) -> Result<(), LoaderError> {
        let mut replaced: HashSet<String> = HashSet::new();
        let mut candidates: Vec<String> = Vec::new();
        for descriptor in registry.not_enabled() {
            let enabled = self
                .config
                .get(&extension_enabled_option(), Some(descriptor.name()))?
                .map(|value| value.is_truthy())
                .unwrap_or(false);
            if !enabled {
                continue;
            }
            if !self.is_activated(&descriptor)? {
                debug!(
                    "extension '{}' not activated, activation options not satisfied",
                    descriptor.name()
                );
                continue;
            }
            replaced.extend(descriptor.replaced_extensions().iter().cloned());
            candidates.push(descriptor.name().to_string());
        }
        for name in candidates {
            if !replaced.contains(&name) {
                registry.enable(&name);
            }
        }

        let enabled = registry.enabled_names();
        self.config.set(
            &enabled_extensions_option(),
            ConfigValue::List(enabled.iter().map(|name| name.as_str().into()).collect()),
            priority::CORE,
            "core",
            None,
        )?;
        Ok(())
    }

    fn is_activated(&self, descriptor: &ExtensionDescriptor) -> Result<bool, ConfigError> {
        for option_id in descriptor.activation_options() {
            let truthy = self
                .config
                .get(option_id, None)?
                .map(|value| value.is_truthy())
                .unwrap_or(false);
            if !truthy {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A required config option with no value after all passes is a fatal
    /// configuration error, reported before any command logic runs.
    fn validate_required_options(
        &self,
        registry: &ExtensionRegistry,
        command_options: &HashMap<String, Vec<ConfigOption>>,
    ) -> Result<(), LoaderError> {
        let check = |option: &ConfigOption, required_by: &str| -> Result<(), LoaderError> {
            if !option.required || option.option_id.is_entity_scoped() {
                return Ok(());
            }
            if !self.config.is_set(&option.option_id, None) {
                return Err(ConfigError::MissingRequiredOption {
                    option: option.option_id.name().to_string(),
                    required_by: required_by.to_string(),
                }
                .into());
            }
            Ok(())
        };

        for (descriptor, _) in registry.enabled_entries() {
            for option in descriptor.config_options() {
                check(option, descriptor.name())?;
            }
        }
        for (command, options) in command_options {
            for option in options {
                check(option, command)?;
            }
        }
        Ok(())
    }

    /// Matches the parsed command name against all declared commands across
    /// enabled extensions.
    fn select_command(
        &self,
        registry: &ExtensionRegistry,
        _command_options: &HashMap<String, Vec<ConfigOption>>,
    ) -> Result<CommandDescriptor, LoaderError> {
        let command_name = self
            .config
            .get(&command_option(), None)?
            .and_then(|value| value.as_str().map(str::to_owned))
            .ok_or(LoaderError::NoCommandSelected)?;

        for (descriptor, _) in registry.enabled_entries() {
            for command in descriptor.commands() {
                if command.name() == command_name {
                    return Ok(command.clone());
                }
            }
        }
        Err(LoaderError::UnknownCommand {
            command: command_name,
        })
    }

    /// Defines the enabled extensions' endpoints and messages on the bus,
    /// then lets each extension register components and dispatchers.
    async fn wire_bus(
        &self,
        registry: &ExtensionRegistry,
        command: &CommandDescriptor,
    ) -> Result<(), LoaderError> {
        let mut applicable = registry.enabled_entries();
        applicable.retain(|(descriptor, _)| {
            !descriptor.is_command_extension()
                || descriptor.extends().iter().any(|c| c == command.name())
        });

        // Merge declarations so two extensions can share an endpoint
        // without tripping the bus's duplicate check.
        let mut merged: Vec<(EndpointId, Vec<MessageId>)> = Vec::new();
        for (descriptor, _) in &applicable {
            for (endpoint, messages) in descriptor.endpoints_and_messages() {
                match merged.iter_mut().find(|(existing, _)| *existing == *endpoint) {
                    Some((_, merged_messages)) => {
                        for message in messages {
                            if !merged_messages.contains(message) {
                                merged_messages.push(*message);
                            }
                        }
                    }
                    None => merged.push((*endpoint, messages.clone())),
                }
            }
        }
        self.bus.define_endpoints_and_messages(&merged)?;

        for (_, instance) in &applicable {
            instance.register_components(&self.components);
        }
        self.components.log_components_info();

        for (descriptor, instance) in &applicable {
            let view = self.config.filter_config(
                self.extension_view_options(descriptor),
                None,
            );
            instance
                .register_dispatchers(&self.bus, &view)
                .await
                .map_err(|e| LoaderError::Extension {
                    extension: descriptor.name().to_string(),
                    phase: "register_dispatchers".to_string(),
                    message: format!("{e:#}"),
                })?;
        }
        Ok(())
    }

    fn extension_view_options(&self, descriptor: &ExtensionDescriptor) -> Vec<String> {
        let mut names: Vec<String> = descriptor
            .config_options()
            .iter()
            .map(|option| option.option_id.name().to_string())
            .collect();
        names.extend(
            self.core_config_options
                .iter()
                .map(|option| option.option_id.name().to_string()),
        );
        names
    }

    fn view_option_names(
        &self,
        registry: &ExtensionRegistry,
        command: &CommandDescriptor,
        command_options: &HashMap<String, Vec<ConfigOption>>,
    ) -> Vec<String> {
        let mut names: Vec<String> = command
            .config_options()
            .iter()
            .map(|option| option.option_id.name().to_string())
            .collect();
        if let Some(options) = command_options.get(command.name()) {
            names.extend(
                options
                    .iter()
                    .map(|option| option.option_id.name().to_string()),
            );
        }
        names.extend(
            self.core_config_options
                .iter()
                .map(|option| option.option_id.name().to_string()),
        );
        for (descriptor, _) in registry.enabled_entries() {
            names.extend(
                descriptor
                    .config_options()
                    .iter()
                    .map(|option| option.option_id.name().to_string()),
            );
        }
        names.push(command_option().name().to_string());
        names.push(commands_option().name().to_string());
        names.push(enabled_extensions_option().name().to_string());
        names
    }
}
