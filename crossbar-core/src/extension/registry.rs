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

use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::debug;

use crate::extension::{Extension, ExtensionDescriptor};

pub(crate) struct ExtensionEntry {
    pub(crate) descriptor: ExtensionDescriptor,
    pub(crate) instance: Arc<dyn Extension>,
    pub(crate) plugin: bool,
}

/// The explicit manifest of all extensions known to the process.
///
/// Framework extensions and plugin extensions are registered with explicit
/// calls at startup; the loader decides which end up enabled. Plugin
/// extensions only take part in loading once the loader reaches its plugin
/// discovery step.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: Vec<ExtensionEntry>,
    enabled: HashSet<String>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a framework extension.
    pub fn register_framework(&mut self, instance: Arc<dyn Extension>) {
        let descriptor = instance.descriptor();
        debug!(
            "registering framework extension '{}' with load order {}",
            descriptor.name(),
            descriptor.load_order()
        );
        self.entries.push(ExtensionEntry {
            descriptor,
            instance,
            plugin: false,
        });
    }

    /// Registers a plugin-provided extension.
    pub fn register_plugin(&mut self, instance: Arc<dyn Extension>) {
        let descriptor = instance.descriptor();
        debug!("registering plugin extension '{}'", descriptor.name());
        self.entries.push(ExtensionEntry {
            descriptor,
            instance,
            plugin: true,
        });
    }

    /// All registered extension names.
    pub fn all_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.name().to_string())
            .collect()
    }

    /// Whether the named extension is currently enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Marks the named extension enabled.
    pub(crate) fn enable(&mut self, name: &str) {
        debug!("enabling extension '{name}'");
        self.enabled.insert(name.to_string());
    }

    /// Names of the currently enabled extensions, sorted.
    pub fn enabled_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.enabled.iter().cloned().collect();
        names.sort();
        names
    }

    /// Framework extensions with a load order inside `range`, ascending by
    /// load order.
    pub(crate) fn framework_in_range(
        &self,
        range: &RangeInclusive<u32>,
        only_enabled: bool,
        include_plugins: bool,
    ) -> Vec<(ExtensionDescriptor, Arc<dyn Extension>)> {
        let mut selected: Vec<&ExtensionEntry> = self
            .entries
            .iter()
            .filter(|entry| !entry.descriptor.is_command_extension())
            .filter(|entry| range.contains(&entry.descriptor.load_order()))
            .filter(|entry| include_plugins || !entry.plugin)
            .filter(|entry| !only_enabled || self.is_enabled(entry.descriptor.name()))
            .collect();
        selected.sort_by_key(|entry| entry.descriptor.load_order());
        selected
            .into_iter()
            .map(|entry| (entry.descriptor.clone(), entry.instance.clone()))
            .collect()
    }

    /// Command extensions extending the given command.
    pub(crate) fn command_extensions_for(
        &self,
        command: &str,
        only_enabled: bool,
    ) -> Vec<(ExtensionDescriptor, Arc<dyn Extension>)> {
        self.entries
            .iter()
            .filter(|entry| entry.descriptor.extends().iter().any(|c| c == command))
            .filter(|entry| !only_enabled || self.is_enabled(entry.descriptor.name()))
            .map(|entry| (entry.descriptor.clone(), entry.instance.clone()))
            .collect()
    }

    /// All command extensions.
    pub(crate) fn command_extensions(
        &self,
        only_enabled: bool,
    ) -> Vec<(ExtensionDescriptor, Arc<dyn Extension>)> {
        self.entries
            .iter()
            .filter(|entry| entry.descriptor.is_command_extension())
            .filter(|entry| !only_enabled || self.is_enabled(entry.descriptor.name()))
            .map(|entry| (entry.descriptor.clone(), entry.instance.clone()))
            .collect()
    }

    /// Descriptors and instances of extensions not yet enabled, plugins
    /// included.
    pub(crate) fn not_enabled(&self) -> Vec<ExtensionDescriptor> {
        self.entries
            .iter()
            .filter(|entry| !self.is_enabled(entry.descriptor.name()))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Every enabled extension in load order, command extensions last.
    pub(crate) fn enabled_entries(&self) -> Vec<(ExtensionDescriptor, Arc<dyn Extension>)> {
        let mut selected: Vec<&ExtensionEntry> = self
            .entries
            .iter()
            .filter(|entry| self.is_enabled(entry.descriptor.name()))
            .collect();
        selected.sort_by_key(|entry| entry.descriptor.load_order());
        selected
            .into_iter()
            .map(|entry| (entry.descriptor.clone(), entry.instance.clone()))
            .collect()
    }

    /// Destroys every enabled extension, in reverse load order.
    pub async fn destroy_enabled(&self) {
        let mut entries = self.enabled_entries();
        entries.reverse();
        for (descriptor, instance) in entries {
            debug!("destroying extension '{}'", descriptor.name());
            instance.destroy().await;
        }
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.entries.len())
            .field("enabled", &self.enabled.len())
            .finish()
    }
}
