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

use thiserror::Error;

use crate::config::options::OptionKind;

/// Errors raised while resolving configuration values.
///
/// All of these are fatal configuration errors: they are reported before any
/// command logic runs and are never retried.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// An option was requested that is not part of the current view.
    #[error("the requested option '{option}' does not exist")]
    UnknownOption {
        /// Name of the unknown option.
        option: String,
    },

    /// An entity-scoped option was accessed without an entity.
    #[error("reading entity config option '{option}' without an entity")]
    MissingEntity {
        /// Name of the option.
        option: String,
    },

    /// A value of the wrong type was contributed for an option.
    #[error("invalid value '{value}' for option '{option}' of type {expected}")]
    TypeMismatch {
        /// Name of the option.
        option: String,
        /// The declared option kind.
        expected: OptionKind,
        /// Rendering of the rejected value.
        value: String,
    },

    /// A value was set after extension loading froze the config.
    #[error("config is frozen, cannot set option '{option}'")]
    Frozen {
        /// Name of the option.
        option: String,
    },

    /// A `${reference}` in a value points to a key with no value.
    #[error("error expanding value '{value}': no value found for reference '{reference}'")]
    InvalidReference {
        /// The value being expanded.
        value: String,
        /// The dangling reference.
        reference: String,
    },

    /// `${reference}` expansion hit a reference cycle.
    #[error("circular reference found when evaluating config value for '{key}'")]
    CircularReference {
        /// The key whose expansion cycled.
        key: String,
    },

    /// A required option ended up with no value after all passes.
    #[error("missing required config option '{option}' required by '{required_by}'")]
    MissingRequiredOption {
        /// Name of the option.
        option: String,
        /// The extension or command that declared the requirement.
        required_by: String,
    },

    /// Two extensions declared the same option name with different types.
    #[error("conflicting declarations for config option '{option}'")]
    ConflictingOption {
        /// Name of the option.
        option: String,
    },

    /// A config file could not be read or parsed.
    #[error("could not load config file '{path}': {message}")]
    FileError {
        /// The offending file.
        path: String,
        /// What went wrong.
        message: String,
    },
}
