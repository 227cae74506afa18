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

//! Core config options and the built-in config-file extension.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::config::{
    load_toml_file, priority, ConfigManager, ConfigOption, ConfigOptionId, OptionKind,
};
use crate::extension::{Extension, ExtensionConfig, ExtensionDescriptor};

/// Paths plugins are loaded from.
pub fn plugins_paths_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "plugins.paths",
        "Paths to load plugins from.",
        OptionKind::Path,
    )
    .multiple()
}

/// Whether extensions are enabled unless told otherwise.
pub fn extensions_default_enabled_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "extensions.default.enabled",
        "Default enabled state for disableable extensions.",
        OptionKind::Bool,
    )
    .with_default(true)
}

/// Per-extension enabled flag; the entity is the extension name.
pub fn extension_enabled_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "enabled",
        "Enables or disables the extension.",
        OptionKind::Bool,
    )
    .entity_scoped()
}

/// Names of all known extensions.
pub fn all_extensions_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "extensions.all",
        "Names of all registered extensions.",
        OptionKind::Str,
    )
    .multiple()
}

/// Names of the enabled extensions.
pub fn enabled_extensions_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "extensions.enabled",
        "Names of the enabled extensions.",
        OptionKind::Str,
    )
    .multiple()
}

/// Names of the extensions that may be disabled.
pub fn disableable_extensions_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "extensions.disableable",
        "Names of the extensions that can be disabled.",
        OptionKind::Str,
    )
    .multiple()
}

/// The command selected on the command line.
pub fn command_option() -> ConfigOptionId {
    ConfigOptionId::new("command", "The command to execute.", OptionKind::Str)
}

/// Names of all available commands.
pub fn commands_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "commands",
        "Names of all available commands.",
        OptionKind::Str,
    )
    .multiple()
}

/// Explicitly given config files, highest priority last.
pub fn config_file_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "config.file",
        "Additional config files to load.",
        OptionKind::Path,
    )
    .multiple()
}

/// Built-in framework extension that loads TOML config files.
///
/// Looks for `<prefix>/config.toml` in the XDG config directories and loads
/// any files given through the `config.file` option; explicit files win over
/// the XDG default through their higher priority.
pub struct FileConfigExtension {
    prefix: String,
}

impl FileConfigExtension {
    /// Creates the extension for an application prefix (the XDG
    /// subdirectory name).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn default_config_file(&self) -> Option<PathBuf> {
        let base = xdg::BaseDirectories::with_prefix(&self.prefix).ok()?;
        base.find_config_file("config.toml")
    }
}

#[async_trait::async_trait]
impl Extension for FileConfigExtension {
    fn descriptor(&self) -> ExtensionDescriptor {
        ExtensionDescriptor::new("config-loader", 5)
            .with_description("Loads configuration from TOML files.")
            .with_config_option(ConfigOption::new(config_file_option()))
    }

    fn get_config(
        &self,
        config: &ConfigManager,
        _requested_options: &[ConfigOption],
        _command_options: &HashMap<String, Vec<ConfigOption>>,
    ) -> anyhow::Result<Vec<ExtensionConfig>> {
        let mut contributions = Vec::new();

        if let Some(path) = self.default_config_file() {
            debug!("found default config file '{}'", path.display());
            contributions.push(
                ExtensionConfig::new(load_toml_file(&path)?, priority::CONFIG_FILE_DEFAULT)
                    .with_source(path.display().to_string()),
            );
        }

        if let Some(files) = config.get(&config_file_option(), None)? {
            for file in files.as_list().unwrap_or_default() {
                let Some(path) = file.as_str() else { continue };
                let path = PathBuf::from(path);
                contributions.push(
                    ExtensionConfig::new(load_toml_file(&path)?, priority::CONFIG_FILE)
                        .with_source(path.display().to_string()),
                );
            }
        }

        Ok(contributions)
    }
}
