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

pub use error::ConfigError;
pub use file::{flatten_toml, load_toml_file};
pub use manager::{ConfigManager, ConfigView};
pub use options::{ConfigOption, ConfigOptionId, OptionKind};
pub use value::ConfigValue;

mod error;
mod file;
mod manager;
mod options;
mod value;

/// Well-known priorities for configuration sources. A numerically higher
/// priority always wins, regardless of insertion order.
pub mod priority {
    /// Option defaults.
    pub const DEFAULT: i32 = 0;
    /// Values contributed by extensions during loading.
    pub const EXTENSION: i32 = 10;
    /// Values from default config files found in XDG directories.
    pub const CONFIG_FILE_DEFAULT: i32 = 40;
    /// Values from explicitly given config files.
    pub const CONFIG_FILE: i32 = 50;
    /// Values parsed from the command line.
    pub const COMMAND_LINE: i32 = 100;
    /// Values forced by the framework core.
    pub const CORE: i32 = 101;
}
