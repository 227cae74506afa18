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

/// A configuration value as stored by the [`ConfigManager`](crate::config::ConfigManager).
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// A string value.
    Str(String),
    /// An integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// A list of values; used by options declared as `multiple`.
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// The string content, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(value) => Some(value),
            _ => None,
        }
    }

    /// The integer content, if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The float content, if this is a float value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(value) => Some(*value),
            ConfigValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// The boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The list content, if this is a list value.
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(values) => Some(values),
            _ => None,
        }
    }

    /// Truthiness used by extension activation predicates: false for
    /// `false`, `0`, `0.0`, empty strings and empty lists.
    pub fn is_truthy(&self) -> bool {
        match self {
            ConfigValue::Str(value) => !value.is_empty(),
            ConfigValue::Int(value) => *value != 0,
            ConfigValue::Float(value) => *value != 0.0,
            ConfigValue::Bool(value) => *value,
            ConfigValue::List(values) => !values.is_empty(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Str(value) => f.write_str(value),
            ConfigValue::Int(value) => write!(f, "{value}"),
            ConfigValue::Float(value) => write!(f, "{value}"),
            ConfigValue::Bool(value) => write!(f, "{value}"),
            ConfigValue::List(values) => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{}", rendered.join(","))
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        ConfigValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(value) => ConfigValue::Str(value),
            toml::Value::Integer(value) => ConfigValue::Int(value),
            toml::Value::Float(value) => ConfigValue::Float(value),
            toml::Value::Boolean(value) => ConfigValue::Bool(value),
            toml::Value::Array(values) => {
                ConfigValue::List(values.into_iter().map(Into::into).collect())
            }
            toml::Value::Datetime(value) => ConfigValue::Str(value.to_string()),
            // Tables are flattened into dotted keys before values reach here;
            // a nested table in value position renders as its TOML text.
            toml::Value::Table(table) => ConfigValue::Str(toml::Value::Table(table).to_string()),
        }
    }
}
