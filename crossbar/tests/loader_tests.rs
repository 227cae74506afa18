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

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use crossbar::prelude::*;

use crate::setup::initialize_tracing;

mod setup;

const RELAY: EndpointId = EndpointId::new("relay", "Answers ping requests.");
const PING: MessageId = MessageId::new("ping", "Request answered with the configured greeting.");

fn greeting_option() -> ConfigOptionId {
    ConfigOptionId::new(
        "relay.greeting",
        "Greeting returned by the relay.",
        OptionKind::Str,
    )
}

/// A framework extension wiring one request responder and a command that
/// exercises it end to end.
struct RelayExtension {
    wired: Arc<AtomicBool>,
    dispatchers: Mutex<Vec<SequentialDispatcher>>,
}

impl RelayExtension {
    fn new(wired: Arc<AtomicBool>) -> Self {
        Self {
            wired,
            dispatchers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Extension for RelayExtension {
    fn descriptor(&self) -> ExtensionDescriptor {
        ExtensionDescriptor::new("relay", 30)
            .with_description("Answers ping requests with a configured greeting.")
            .with_config_option(ConfigOption::required(greeting_option()))
            .with_endpoints_and_messages(RELAY, &[PING])
            .with_command(CommandDescriptor::new(
                "check-relay",
                "Sends one ping through the bus and verifies the response.",
                command_handler(|core: CoreServices| async move {
                    let futures = core
                        .bus
                        .send_request(PING, Some(RELAY), None, Some(payload("ping".to_string())))
                        .await;
                    anyhow::ensure!(futures.len() == 1, "expected exactly one responder");
                    let response = futures[0]
                        .result(Some(Duration::from_secs(2)))
                        .await?
                        .context("the responder returned no data")?;
                    let greeting = downcast_payload::<String>(&response)
                        .context("unexpected response type")?;
                    anyhow::ensure!(greeting.as_str() == "hello from the command line");
                    Ok(0)
                }),
            ))
    }

    async fn register_dispatchers(
        &self,
        bus: &MessageBus,
        config: &ConfigView,
    ) -> anyhow::Result<()> {
        let greeting = config
            .get(&greeting_option())?
            .and_then(|value| value.as_str().map(str::to_owned))
            .context("relay.greeting is resolved before dispatchers register")?;

        let dispatcher = SequentialDispatcher::new(
            bus,
            handler_fn("relay-responder", move |_invocation| {
                let greeting = greeting.clone();
                async move { Ok(Some(payload(greeting))) }
            }),
        );
        dispatcher.register(&[PING], Some(&[RELAY]), None)?;
        self.dispatchers.lock().unwrap().push(dispatcher);
        self.wired.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) {
        let dispatchers: Vec<SequentialDispatcher> =
            self.dispatchers.lock().unwrap().drain(..).collect();
        for dispatcher in dispatchers {
            dispatcher.destroy().await;
        }
    }
}

/// A minimal extension contributing only a no-op command to run loaders
/// against.
struct NoopCommandExtension;

#[async_trait::async_trait]
impl Extension for NoopCommandExtension {
    fn descriptor(&self) -> ExtensionDescriptor {
        ExtensionDescriptor::new("noop", 25)
            .with_description("Contributes a command that does nothing.")
            .with_command(CommandDescriptor::new(
                "noop",
                "Does nothing and succeeds.",
                command_handler(|_core: CoreServices| async move { Ok(0) }),
            ))
    }
}

/// An extension whose only observable behaviour is whether it got wired.
struct MarkerExtension {
    name: &'static str,
    wired: Arc<AtomicBool>,
    default_enabled: bool,
    replaces: Option<&'static str>,
    activate_on: Option<ConfigOptionId>,
}

impl MarkerExtension {
    fn new(name: &'static str, wired: Arc<AtomicBool>) -> Self {
        Self {
            name,
            wired,
            default_enabled: true,
            replaces: None,
            activate_on: None,
        }
    }

    fn default_enabled(mut self, default_enabled: bool) -> Self {
        self.default_enabled = default_enabled;
        self
    }

    fn replaces(mut self, replaced: &'static str) -> Self {
        self.replaces = Some(replaced);
        self
    }

    fn activate_on(mut self, option: ConfigOptionId) -> Self {
        self.activate_on = Some(option);
        self
    }
}

#[async_trait::async_trait]
impl Extension for MarkerExtension {
    fn descriptor(&self) -> ExtensionDescriptor {
        let mut descriptor = ExtensionDescriptor::new(self.name, 40)
            .default_enabled(self.default_enabled);
        if let Some(replaced) = self.replaces {
            descriptor = descriptor.replaces(replaced);
        }
        if let Some(option) = &self.activate_on {
            descriptor = descriptor.activate_on(option.clone());
        }
        descriptor
    }

    async fn register_dispatchers(
        &self,
        _bus: &MessageBus,
        _config: &ConfigView,
    ) -> anyhow::Result<()> {
        self.wired.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// An extension pair used to observe config contribution priorities.
struct KnobExtension {
    name: &'static str,
    load_order: u32,
    contributed: i64,
    priority: i32,
    declare: bool,
}

fn knob_option() -> ConfigOptionId {
    ConfigOptionId::new("tune.knob", "A knob observed by the probe command.", OptionKind::Int)
}

#[async_trait::async_trait]
impl Extension for KnobExtension {
    fn descriptor(&self) -> ExtensionDescriptor {
        let mut descriptor = ExtensionDescriptor::new(self.name, self.load_order);
        if self.declare {
            descriptor = descriptor
                .with_config_option(ConfigOption::new(knob_option()))
                .with_command(CommandDescriptor::new(
                    "probe-knob",
                    "Returns the resolved knob value as its exit code.",
                    command_handler(|core: CoreServices| async move {
                        let knob = core
                            .config
                            .get(&knob_option())?
                            .and_then(|value| value.as_int())
                            .context("knob must be resolved")?;
                        Ok(knob as i32)
                    }),
                ));
        }
        descriptor
    }

    fn get_config(
        &self,
        _config: &ConfigManager,
        _requested_options: &[ConfigOption],
        _command_options: &HashMap<String, Vec<ConfigOption>>,
    ) -> anyhow::Result<Vec<ExtensionConfig>> {
        Ok(vec![ExtensionConfig::new(
            vec![("tune.knob".to_string(), ConfigValue::Int(self.contributed))],
            self.priority,
        )])
    }
}

/// Full end-to-end pass: loading resolves config, wires the bus, runs the
/// command, and tears everything down.
#[tokio::test]
async fn application_loads_extensions_and_runs_the_command() -> anyhow::Result<()> {
    initialize_tracing();
    let wired = Arc::new(AtomicBool::new(false));

    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(RelayExtension::new(wired.clone())))
        .command_line(
            CommandLineConfig::new("check-relay")
                .with_value("relay.greeting", "hello from the command line"),
        )
        .build()?
        .run()
        .await?;

    assert_eq!(exit_code, 0);
    assert!(wired.load(Ordering::SeqCst), "dispatchers were registered");
    Ok(())
}

/// A required option with no value aborts loading before any dispatcher or
/// command logic runs.
#[tokio::test]
async fn missing_required_option_is_a_configuration_error() -> anyhow::Result<()> {
    initialize_tracing();
    let wired = Arc::new(AtomicBool::new(false));

    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(RelayExtension::new(wired.clone())))
        .command_line(CommandLineConfig::new("check-relay"))
        .build()?
        .run()
        .await?;

    assert_eq!(exit_code, CONFIGURATION_ERROR_EXIT_CODE);
    assert!(!wired.load(Ordering::SeqCst), "loading stopped early");
    Ok(())
}

/// A command that no enabled extension declares is a configuration error.
#[tokio::test]
async fn unknown_commands_are_rejected() -> anyhow::Result<()> {
    initialize_tracing();

    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .command_line(CommandLineConfig::new("does-not-exist"))
        .build()?
        .run()
        .await?;

    assert_eq!(exit_code, CONFIGURATION_ERROR_EXIT_CODE);
    Ok(())
}

/// Extensions disabled by default stay off until config turns them on.
#[tokio::test]
async fn default_disabled_extensions_require_an_enable_flag() -> anyhow::Result<()> {
    initialize_tracing();

    let wired = Arc::new(AtomicBool::new(false));
    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .register_extension(Arc::new(
            MarkerExtension::new("gadget", wired.clone()).default_enabled(false),
        ))
        .command_line(CommandLineConfig::new("noop"))
        .build()?
        .run()
        .await?;
    assert_eq!(exit_code, 0);
    assert!(!wired.load(Ordering::SeqCst), "disabled by default");

    let wired = Arc::new(AtomicBool::new(false));
    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .register_extension(Arc::new(
            MarkerExtension::new("gadget", wired.clone()).default_enabled(false),
        ))
        .command_line(CommandLineConfig::new("noop").with_value("gadget.enabled", true))
        .build()?
        .run()
        .await?;
    assert_eq!(exit_code, 0);
    assert!(wired.load(Ordering::SeqCst), "enabled through config");
    Ok(())
}

/// An enabled extension that replaces another suppresses the replaced one.
#[tokio::test]
async fn replaces_suppresses_the_replaced_extension() -> anyhow::Result<()> {
    initialize_tracing();
    let legacy_wired = Arc::new(AtomicBool::new(false));
    let modern_wired = Arc::new(AtomicBool::new(false));

    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .register_extension(Arc::new(MarkerExtension::new("legacy", legacy_wired.clone())))
        .register_extension(Arc::new(
            MarkerExtension::new("modern", modern_wired.clone()).replaces("legacy"),
        ))
        .command_line(CommandLineConfig::new("noop"))
        .build()?
        .run()
        .await?;

    assert_eq!(exit_code, 0);
    assert!(modern_wired.load(Ordering::SeqCst));
    assert!(!legacy_wired.load(Ordering::SeqCst), "replaced extension stays off");
    Ok(())
}

/// `activate_on` options gate activation: all of them must be truthy.
#[tokio::test]
async fn activation_options_gate_extensions() -> anyhow::Result<()> {
    initialize_tracing();
    let flag = ConfigOptionId::new(
        "feature.flag",
        "Gates the gated extension.",
        OptionKind::Bool,
    )
    .with_default(false);

    let wired = Arc::new(AtomicBool::new(false));
    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .register_extension(Arc::new(
            MarkerExtension::new("gated", wired.clone()).activate_on(flag.clone()),
        ))
        .command_line(CommandLineConfig::new("noop"))
        .build()?
        .run()
        .await?;
    assert_eq!(exit_code, 0);
    assert!(!wired.load(Ordering::SeqCst), "flag defaults to off");

    let wired = Arc::new(AtomicBool::new(false));
    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .register_extension(Arc::new(
            MarkerExtension::new("gated", wired.clone()).activate_on(flag),
        ))
        .command_line(CommandLineConfig::new("noop").with_value("feature.flag", true))
        .build()?
        .run()
        .await?;
    assert_eq!(exit_code, 0);
    assert!(wired.load(Ordering::SeqCst), "truthy flag activates");
    Ok(())
}

/// Contribution priority decides config resolution across loader passes: a
/// later pass with a lower priority never overrides an earlier value.
#[tokio::test]
async fn config_contributions_resolve_by_priority_not_pass_order() -> anyhow::Result<()> {
    initialize_tracing();

    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(KnobExtension {
            name: "early-strong",
            load_order: 30,
            contributed: 1,
            priority: 20,
            declare: true,
        }))
        .register_extension(Arc::new(KnobExtension {
            name: "late-weak",
            load_order: 50,
            contributed: 2,
            priority: 10,
            declare: false,
        }))
        .command_line(CommandLineConfig::new("probe-knob"))
        .build()?
        .run()
        .await?;

    assert_eq!(exit_code, 1, "the higher-priority contribution wins");
    Ok(())
}

/// Plugin-provided extensions join the working set during plugin discovery
/// and can contribute commands like any other extension.
#[tokio::test]
async fn plugin_extensions_take_part_after_discovery() -> anyhow::Result<()> {
    initialize_tracing();
    let wired = Arc::new(AtomicBool::new(false));

    let exit_code = Application::builder("crossbar-loader-test")
        .register_extension(Arc::new(NoopCommandExtension))
        .register_plugin(Arc::new(MarkerExtension::new("plugged-in", wired.clone())))
        .command_line(CommandLineConfig::new("noop"))
        .build()?
        .run()
        .await?;

    assert_eq!(exit_code, 0);
    assert!(wired.load(Ordering::SeqCst), "plugin extension was wired");
    Ok(())
}
