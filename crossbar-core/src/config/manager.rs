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
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::error::ConfigError;
use crate::config::options::ConfigOptionId;
use crate::config::value::ConfigValue;

const MAX_REFERENCE_DEPTH: usize = 16;

#[derive(Debug, Clone)]
struct ConfigEntry {
    value: ConfigValue,
    priority: i32,
    source: String,
    seq: u64,
}

#[derive(Debug, Default)]
struct ValueHolder {
    entries: Vec<ConfigEntry>,
}

impl ValueHolder {
    fn add(&mut self, value: ConfigValue, priority: i32, source: &str, seq: u64) {
        self.entries.push(ConfigEntry {
            value,
            priority,
            source: source.to_string(),
            seq,
        });
    }

    /// The winning entry: numerically highest priority, ties broken by the
    /// most recently set value.
    fn highest(&self) -> Option<&ConfigEntry> {
        self.entries
            .iter()
            .max_by_key(|entry| (entry.priority, entry.seq))
    }

    /// Combines the entries of a multiple-valued option: all contributed
    /// items, highest priority first, exact duplicates dropped.
    fn combined(&self) -> ConfigValue {
        let mut entries: Vec<&ConfigEntry> = self.entries.iter().collect();
        entries.sort_by_key(|entry| std::cmp::Reverse((entry.priority, entry.seq)));
        let mut combined: Vec<ConfigValue> = Vec::new();
        for entry in entries {
            match &entry.value {
                ConfigValue::List(values) => {
                    for value in values {
                        if !combined.contains(value) {
                            combined.push(value.clone());
                        }
                    }
                }
                other => {
                    if !combined.contains(other) {
                        combined.push(other.clone());
                    }
                }
            }
        }
        ConfigValue::List(combined)
    }
}

#[derive(Default)]
struct ConfigInner {
    values: DashMap<String, ValueHolder>,
    options: DashMap<String, ConfigOptionId>,
    seq: AtomicU64,
    frozen: AtomicBool,
}

/// Holds all contributed configuration values and resolves them by priority.
///
/// Multiple entries may exist per option and entity; resolution always picks
/// the entry with the numerically highest priority, and the most recently
/// set value among equal priorities. Entries accumulate during the loader's
/// multi-pass resolution and are frozen once extension loading completes.
///
/// Cloning the manager is cheap; all clones share the same value table.
#[derive(Clone, Default)]
pub struct ConfigManager {
    inner: Arc<ConfigInner>,
}

impl ConfigManager {
    /// Creates an empty config manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an option known to the manager.
    ///
    /// Redeclaring an option is fine as long as the declarations agree on
    /// type and multiplicity.
    pub fn declare_option(&self, option_id: &ConfigOptionId) -> Result<(), ConfigError> {
        if let Some(existing) = self.inner.options.get(option_id.name()) {
            if existing.kind() != option_id.kind()
                || existing.is_multiple() != option_id.is_multiple()
            {
                return Err(ConfigError::ConflictingOption {
                    option: option_id.name().to_string(),
                });
            }
            return Ok(());
        }
        self.inner
            .options
            .insert(option_id.name().to_string(), option_id.clone());
        Ok(())
    }

    /// Sets the value for an option with a priority and source.
    ///
    /// An entity is required for entity-scoped options and ignored for
    /// others.
    pub fn set(
        &self,
        option_id: &ConfigOptionId,
        value: ConfigValue,
        priority: i32,
        source: &str,
        entity: Option<&str>,
    ) -> Result<(), ConfigError> {
        if self.inner.frozen.load(Ordering::Acquire) {
            return Err(ConfigError::Frozen {
                option: option_id.name().to_string(),
            });
        }
        if option_id.is_entity_scoped() && entity.is_none() {
            return Err(ConfigError::MissingEntity {
                option: option_id.name().to_string(),
            });
        }
        let value = self.check_type(option_id, value)?;
        self.declare_option(option_id)?;
        let key = option_id.key(entity);
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        self.inner
            .values
            .entry(key)
            .or_default()
            .add(value, priority, source, seq);
        Ok(())
    }

    /// Records the declared defaults for options that have one, at the
    /// default priority so that any other source overrides them.
    ///
    /// Defaults for entity-scoped options are skipped; those are seeded per
    /// entity by whoever knows the entities.
    pub fn set_default_values(&self, option_ids: &[ConfigOptionId]) -> Result<(), ConfigError> {
        for option_id in option_ids {
            self.declare_option(option_id)?;
            if option_id.is_entity_scoped() {
                continue;
            }
            let Some(default) = option_id.default() else {
                continue;
            };
            let key = option_id.key(None);
            if self.inner.values.contains_key(&key) {
                continue;
            }
            self.set(
                option_id,
                default.clone(),
                crate::config::priority::DEFAULT,
                "default",
                None,
            )?;
        }
        Ok(())
    }

    /// Updates the manager with raw-keyed values, all at the same priority
    /// and source. Used for extension contributions and config files.
    pub fn update_config(
        &self,
        values: impl IntoIterator<Item = (String, ConfigValue)>,
        priority: i32,
        source: &str,
    ) -> Result<(), ConfigError> {
        for (key, value) in values {
            if self.inner.frozen.load(Ordering::Acquire) {
                return Err(ConfigError::Frozen { option: key });
            }
            let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
            self.inner
                .values
                .entry(key)
                .or_default()
                .add(value, priority, source, seq);
        }
        Ok(())
    }

    /// Gets the resolved value for an option, falling back to its declared
    /// default. `${reference}` expansion is applied to string values.
    pub fn get(
        &self,
        option_id: &ConfigOptionId,
        entity: Option<&str>,
    ) -> Result<Option<ConfigValue>, ConfigError> {
        if option_id.is_entity_scoped() && entity.is_none() {
            return Err(ConfigError::MissingEntity {
                option: option_id.name().to_string(),
            });
        }
        let key = option_id.key(entity);
        let resolved = match self.inner.values.get(&key) {
            Some(holder) => {
                if option_id.is_multiple() {
                    Some(holder.combined())
                } else {
                    holder.highest().map(|entry| entry.value.clone())
                }
            }
            None => option_id.default().cloned(),
        };
        match resolved {
            Some(value) => Ok(Some(self.expand(value, 0)?)),
            None => Ok(None),
        }
    }

    /// Whether any value (or default) resolves for the option.
    pub fn is_set(&self, option_id: &ConfigOptionId, entity: Option<&str>) -> bool {
        matches!(self.get(option_id, entity), Ok(Some(_)))
    }

    /// Freezes the manager; any further `set` or `update_config` fails.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }

    /// Whether the manager has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Logs every resolved key with its winning source, for startup
    /// debugging.
    pub fn log_config(&self) {
        let mut keys: Vec<String> = self
            .inner
            .values
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        for key in keys {
            if let Some(holder) = self.inner.values.get(&key) {
                if let Some(entry) = holder.highest() {
                    debug!(
                        "config: {key}={value} (priority={priority}, source={source})",
                        value = entry.value,
                        priority = entry.priority,
                        source = entry.source
                    );
                }
            }
        }
    }

    /// Creates a filtered view of the config with only the given options,
    /// fixated to an entity.
    pub fn filter_config(
        &self,
        option_names: impl IntoIterator<Item = String>,
        entity: Option<String>,
    ) -> ConfigView {
        ConfigView {
            manager: self.clone(),
            options: Arc::new(option_names.into_iter().collect()),
            entity,
        }
    }

    fn check_type(
        &self,
        option_id: &ConfigOptionId,
        value: ConfigValue,
    ) -> Result<ConfigValue, ConfigError> {
        let mismatch = |value: &ConfigValue| ConfigError::TypeMismatch {
            option: option_id.name().to_string(),
            expected: option_id.kind(),
            value: value.to_string(),
        };
        if option_id.is_multiple() {
            let values = match value {
                ConfigValue::List(values) => values,
                single => vec![single],
            };
            for value in &values {
                if !option_id.kind().accepts(value) {
                    return Err(mismatch(value));
                }
            }
            Ok(ConfigValue::List(values))
        } else if option_id.kind().accepts(&value) {
            Ok(value)
        } else {
            Err(mismatch(&value))
        }
    }

    fn raw_lookup(&self, key: &str) -> Option<ConfigValue> {
        self.inner
            .values
            .get(key)
            .and_then(|holder| holder.highest().map(|entry| entry.value.clone()))
    }

    fn expand(&self, value: ConfigValue, depth: usize) -> Result<ConfigValue, ConfigError> {
        match value {
            ConfigValue::Str(value) => Ok(ConfigValue::Str(self.expand_str(&value, depth)?)),
            ConfigValue::List(values) => Ok(ConfigValue::List(
                values
                    .into_iter()
                    .map(|value| self.expand(value, depth))
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(other),
        }
    }

    fn expand_str(&self, original: &str, depth: usize) -> Result<String, ConfigError> {
        if !original.contains("${") {
            return Ok(original.to_string());
        }
        if depth >= MAX_REFERENCE_DEPTH {
            return Err(ConfigError::CircularReference {
                key: original.to_string(),
            });
        }
        let mut result = String::new();
        let mut rest = original;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated reference, keep it verbatim.
                result.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let reference = &after[..end];
            match self.raw_lookup(reference) {
                Some(value) => {
                    let expanded = self.expand(value, depth + 1)?;
                    result.push_str(&expanded.to_string());
                }
                None => {
                    return Err(ConfigError::InvalidReference {
                        value: original.to_string(),
                        reference: reference.to_string(),
                    });
                }
            }
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("values", &self.inner.values.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// An option-filtered, entity-fixated view of the config.
///
/// Commands and extensions receive a view restricted to the options they
/// declared; asking for anything else is a configuration error.
#[derive(Debug, Clone)]
pub struct ConfigView {
    manager: ConfigManager,
    options: Arc<HashSet<String>>,
    entity: Option<String>,
}

impl ConfigView {
    /// Gets the resolved value of an option declared in this view.
    pub fn get(&self, option_id: &ConfigOptionId) -> Result<Option<ConfigValue>, ConfigError> {
        if !self.options.contains(option_id.name()) {
            return Err(ConfigError::UnknownOption {
                option: option_id.name().to_string(),
            });
        }
        self.manager.get(option_id, self.entity.as_deref())
    }

    /// Gets the resolved value or a fallback.
    pub fn get_or(
        &self,
        option_id: &ConfigOptionId,
        fallback: ConfigValue,
    ) -> Result<ConfigValue, ConfigError> {
        Ok(self.get(option_id)?.unwrap_or(fallback))
    }

    /// Whether the view contains a resolved value for the option.
    pub fn contains(&self, option_id: &ConfigOptionId) -> bool {
        self.options.contains(option_id.name())
            && self.manager.is_set(option_id, self.entity.as_deref())
    }

    /// The entity this view is fixated to, if any.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::OptionKind;
    use crate::config::priority;

    fn int_option() -> ConfigOptionId {
        ConfigOptionId::new("suite.timeout", "Test suite timeout.", OptionKind::Int)
    }

    #[test]
    fn highest_priority_wins_regardless_of_insertion_order() {
        let config = ConfigManager::new();
        let option = int_option();

        config
            .set(&option, 2.into(), 20, "plugin", None)
            .unwrap();
        config
            .set(&option, 1.into(), 10, "defaults", None)
            .unwrap();

        assert_eq!(
            config.get(&option, None).unwrap(),
            Some(ConfigValue::Int(2))
        );
    }

    #[test]
    fn equal_priorities_resolve_to_most_recent_value() {
        let config = ConfigManager::new();
        let option = int_option();

        config.set(&option, 1.into(), 10, "first", None).unwrap();
        config.set(&option, 2.into(), 10, "second", None).unwrap();

        assert_eq!(
            config.get(&option, None).unwrap(),
            Some(ConfigValue::Int(2))
        );
    }

    #[test]
    fn multiple_options_combine_across_priorities() {
        let config = ConfigManager::new();
        let option = ConfigOptionId::new("plugins.paths", "Plugin paths.", OptionKind::Path)
            .multiple();

        config
            .set(&option, vec!["low"].into(), 10, "defaults", None)
            .unwrap();
        config
            .set(&option, vec!["high", "low"].into(), 50, "file", None)
            .unwrap();

        let combined = config.get(&option, None).unwrap().unwrap();
        assert_eq!(
            combined,
            ConfigValue::List(vec!["high".into(), "low".into()])
        );
    }

    #[test]
    fn entity_scoped_values_are_stored_per_entity() {
        let config = ConfigManager::new();
        let option = ConfigOptionId::new("device.ip", "Device address.", OptionKind::Str)
            .entity_scoped();

        config
            .set(&option, "10.0.0.1".into(), 10, "file", Some("left"))
            .unwrap();
        config
            .set(&option, "10.0.0.2".into(), 10, "file", Some("right"))
            .unwrap();

        assert_eq!(
            config.get(&option, Some("left")).unwrap(),
            Some(ConfigValue::Str("10.0.0.1".to_string()))
        );
        assert_eq!(
            config.get(&option, Some("right")).unwrap(),
            Some(ConfigValue::Str("10.0.0.2".to_string()))
        );
        assert!(matches!(
            config.get(&option, None),
            Err(ConfigError::MissingEntity { .. })
        ));
    }

    #[test]
    fn references_expand_recursively() {
        let config = ConfigManager::new();
        let base = ConfigOptionId::new("output.dir", "Output directory.", OptionKind::Str);
        let derived = ConfigOptionId::new("report.path", "Report path.", OptionKind::Str);

        config
            .set(&base, "/tmp/out".into(), 10, "file", None)
            .unwrap();
        config
            .set(&derived, "${output.dir}/report.txt".into(), 10, "file", None)
            .unwrap();

        assert_eq!(
            config.get(&derived, None).unwrap(),
            Some(ConfigValue::Str("/tmp/out/report.txt".to_string()))
        );
    }

    #[test]
    fn dangling_reference_is_an_error() {
        let config = ConfigManager::new();
        let option = ConfigOptionId::new("report.path", "Report path.", OptionKind::Str);
        config
            .set(&option, "${missing.key}/x".into(), 10, "file", None)
            .unwrap();

        assert!(matches!(
            config.get(&option, None),
            Err(ConfigError::InvalidReference { .. })
        ));
    }

    #[test]
    fn circular_references_are_detected() {
        let config = ConfigManager::new();
        config
            .update_config(
                vec![
                    ("a".to_string(), ConfigValue::Str("${b}".to_string())),
                    ("b".to_string(), ConfigValue::Str("${a}".to_string())),
                ],
                10,
                "file",
            )
            .unwrap();
        let option = ConfigOptionId::new("a", "Cycle start.", OptionKind::Str);

        assert!(matches!(
            config.get(&option, None),
            Err(ConfigError::CircularReference { .. })
        ));
    }

    #[test]
    fn set_after_freeze_fails() {
        let config = ConfigManager::new();
        let option = int_option();
        config.set(&option, 1.into(), 10, "file", None).unwrap();
        config.freeze();

        assert!(matches!(
            config.set(&option, 2.into(), 10, "late", None),
            Err(ConfigError::Frozen { .. })
        ));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let config = ConfigManager::new();
        let option = int_option();

        assert!(matches!(
            config.set(&option, "not a number".into(), 10, "file", None),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn defaults_lose_to_any_contributed_value() {
        let config = ConfigManager::new();
        let option = ConfigOptionId::new("suite.name", "Suite name.", OptionKind::Str)
            .with_default("default-suite");
        config.set_default_values(std::slice::from_ref(&option)).unwrap();
        config
            .set(&option, "custom".into(), priority::EXTENSION, "ext", None)
            .unwrap();

        assert_eq!(
            config.get(&option, None).unwrap(),
            Some(ConfigValue::Str("custom".to_string()))
        );
    }
}
