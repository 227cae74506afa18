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

use std::fmt;

use crate::config::value::ConfigValue;

/// The value type a config option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Free-form string.
    Str,
    /// Integer.
    Int,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Bool,
    /// Filesystem path, carried as a string.
    Path,
}

impl OptionKind {
    /// Whether `value` is acceptable for this kind.
    pub fn accepts(&self, value: &ConfigValue) -> bool {
        match self {
            OptionKind::Str | OptionKind::Path => matches!(value, ConfigValue::Str(_)),
            OptionKind::Int => matches!(value, ConfigValue::Int(_)),
            OptionKind::Float => matches!(value, ConfigValue::Float(_) | ConfigValue::Int(_)),
            OptionKind::Bool => matches!(value, ConfigValue::Bool(_)),
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::Str => "str",
            OptionKind::Int => "int",
            OptionKind::Float => "float",
            OptionKind::Bool => "bool",
            OptionKind::Path => "path",
        };
        f.write_str(name)
    }
}

/// Identifier for a config option.
///
/// Option ids can be shared by multiple extensions to declare interest in
/// the same option; identity is the name.
#[derive(Debug, Clone)]
pub struct ConfigOptionId {
    name: &'static str,
    description: &'static str,
    kind: OptionKind,
    multiple: bool,
    default: Option<ConfigValue>,
    entity_scoped: bool,
}

impl ConfigOptionId {
    /// Defines a new option id.
    pub fn new(name: &'static str, description: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            description,
            kind,
            multiple: false,
            default: None,
            entity_scoped: false,
        }
    }

    /// Declares the option as holding a list of values.
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Sets the default value used when no source contributes one.
    pub fn with_default(mut self, default: impl Into<ConfigValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Declares that values of this option are stored per entity.
    pub fn entity_scoped(mut self) -> Self {
        self.entity_scoped = true;
        self
    }

    /// The unique option name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Human readable description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// The accepted value type.
    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    /// Whether the option holds a list of values.
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// The declared default value, if any.
    pub fn default(&self) -> Option<&ConfigValue> {
        self.default.as_ref()
    }

    /// Whether values are stored per entity.
    pub fn is_entity_scoped(&self) -> bool {
        self.entity_scoped
    }

    /// The internal storage key for this option, with entity inserted for
    /// entity-scoped options. Dashes and underscores normalise to dots.
    pub fn key(&self, entity: Option<&str>) -> String {
        let normalise = |value: &str| value.replace(['-', '_'], ".");
        match entity {
            Some(entity) if self.entity_scoped => {
                format!("{}.{}", normalise(entity), normalise(self.name))
            }
            _ => normalise(self.name),
        }
    }
}

impl PartialEq for ConfigOptionId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ConfigOptionId {}

impl fmt::Display for ConfigOptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An extension's declared interest in a config option.
#[derive(Debug, Clone)]
pub struct ConfigOption {
    /// The option this declaration refers to.
    pub option_id: ConfigOptionId,
    /// Whether loading must fail if no value is resolved for the option.
    pub required: bool,
}

impl ConfigOption {
    /// Declares an optional option.
    pub fn new(option_id: ConfigOptionId) -> Self {
        Self {
            option_id,
            required: false,
        }
    }

    /// Declares a required option.
    pub fn required(option_id: ConfigOptionId) -> Self {
        Self {
            option_id,
            required: true,
        }
    }
}
