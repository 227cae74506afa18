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

use std::path::Path;

use tracing::debug;

use crate::config::error::ConfigError;
use crate::config::value::ConfigValue;

/// Reads a TOML config file into raw-keyed config values.
///
/// Nested tables flatten into dotted keys, so
///
/// ```toml
/// [suite]
/// timeout = 30
/// ```
///
/// contributes `suite.timeout = 30`.
pub fn load_toml_file(path: &Path) -> Result<Vec<(String, ConfigValue)>, ConfigError> {
    debug!("loading config file '{}'", path.display());
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let table: toml::Table = toml::from_str(&contents).map_err(|e| ConfigError::FileError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(flatten_toml(table))
}

/// Flattens a parsed TOML table into dotted-key config values.
pub fn flatten_toml(table: toml::Table) -> Vec<(String, ConfigValue)> {
    let mut values = Vec::new();
    flatten_into(&mut values, String::new(), table);
    values
}

fn flatten_into(values: &mut Vec<(String, ConfigValue)>, prefix: String, table: toml::Table) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_into(values, key, nested),
            other => values.push((key, other.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_tables_flatten_to_dotted_keys() {
        let table: toml::Table = toml::from_str(
            r#"
            top = "value"

            [suite]
            timeout = 30

            [suite.report]
            enabled = true
            "#,
        )
        .unwrap();

        let mut values = flatten_toml(table);
        values.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            values,
            vec![
                ("suite.report.enabled".to_string(), ConfigValue::Bool(true)),
                ("suite.timeout".to_string(), ConfigValue::Int(30)),
                ("top".to_string(), ConfigValue::Str("value".to_string())),
            ]
        );
    }
}
