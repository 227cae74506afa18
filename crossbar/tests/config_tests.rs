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

use std::io::Write;

use crossbar::prelude::*;

use crate::setup::initialize_tracing;

mod setup;

fn timeout_option() -> ConfigOptionId {
    ConfigOptionId::new("suite.timeout", "Suite timeout in seconds.", OptionKind::Int)
        .with_default(60i64)
}

/// Values loaded from a TOML file land in the manager at file priority and
/// lose to command-line values.
#[test]
fn config_files_feed_the_manager_below_the_command_line() -> anyhow::Result<()> {
    initialize_tracing();
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
        [suite]
        timeout = 30
        name = "nightly"
        "#
    )?;

    let config = ConfigManager::new();
    let timeout = timeout_option();
    let name = ConfigOptionId::new("suite.name", "Suite name.", OptionKind::Str);
    config.set_default_values(&[timeout.clone(), name.clone()])?;

    let values = load_toml_file(file.path())?;
    config.update_config(values, priority::CONFIG_FILE, "config-file")?;
    assert_eq!(
        config.get(&timeout, None)?,
        Some(ConfigValue::Int(30)),
        "file beats the default"
    );

    config.update_config(
        vec![("suite.timeout".to_string(), ConfigValue::Int(5))],
        priority::COMMAND_LINE,
        "command-line",
    )?;
    assert_eq!(
        config.get(&timeout, None)?,
        Some(ConfigValue::Int(5)),
        "command line beats the file"
    );
    assert_eq!(
        config.get(&name, None)?,
        Some(ConfigValue::Str("nightly".to_string()))
    );
    Ok(())
}

/// A filtered view only exposes its declared options and fixates the
/// entity for entity-scoped lookups.
#[test]
fn config_views_restrict_and_fixate() -> anyhow::Result<()> {
    initialize_tracing();
    let config = ConfigManager::new();
    let timeout = timeout_option();
    let address = ConfigOptionId::new("device.address", "Device address.", OptionKind::Str)
        .entity_scoped();

    config.set(&timeout, 30i64.into(), priority::CONFIG_FILE, "file", None)?;
    config.set(
        &address,
        "10.0.0.7".into(),
        priority::CONFIG_FILE,
        "file",
        Some("gadget"),
    )?;

    let view = config.filter_config(
        vec!["suite.timeout".to_string(), "device.address".to_string()],
        Some("gadget".to_string()),
    );
    assert_eq!(view.get(&timeout)?, Some(ConfigValue::Int(30)));
    assert_eq!(
        view.get(&address)?,
        Some(ConfigValue::Str("10.0.0.7".to_string()))
    );
    assert_eq!(view.entity(), Some("gadget"));

    let hidden = ConfigOptionId::new("suite.secret", "Not in the view.", OptionKind::Str);
    assert!(matches!(
        view.get(&hidden),
        Err(ConfigError::UnknownOption { .. })
    ));
    Ok(())
}
