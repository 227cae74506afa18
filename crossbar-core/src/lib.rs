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

#![forbid(unsafe_code)]

//! Crossbar Core Library
//!
//! This library provides the core functionality for the Crossbar automation
//! framework: the in-process message bus with its dispatcher strategies and
//! request futures, the priority-resolved configuration manager, the
//! scope-aware component factory and the extension loading process that wires
//! everything together before a command runs.

/// Application shell: process context and command execution wiring.
pub(crate) mod application;

/// Message bus, routing registry and request futures.
pub(crate) mod bus;

/// Command declarations consumed by the extension loader.
pub(crate) mod command;

/// Scope-aware component registry and factory.
pub(crate) mod component;

/// Priority-resolved configuration values and options.
pub(crate) mod config;

/// Dispatcher strategies and the message handler contract.
pub(crate) mod dispatch;

/// Extension descriptors, registry and the multi-pass loader.
pub(crate) mod extension;

/// Message, endpoint and payload definitions.
pub(crate) mod message;

/// Prelude module for convenient imports.
///
/// This module re-exports commonly used items from the bus, dispatch,
/// configuration, component and extension modules, as well as the
/// `async_trait` crate.
pub mod prelude {
    pub use async_trait;

    pub use crate::application::{
        Application, ApplicationBuilder, CommandLineConfig, CoreConfig, CoreContext,
        CONFIGURATION_ERROR_EXIT_CODE,
    };
    pub use crate::bus::{
        BusError, DispatchError, DispatchFuture, DispatcherState, FutureCollection, MessageBus,
        MessageQueue, QueueError, DEFAULT_QUIESCE_TIMEOUT,
    };
    pub use crate::command::{command_handler, CommandDescriptor, CommandHandler, CoreServices};
    pub use crate::component::{
        downcast_component, ComponentBuilder, ComponentError, ComponentFactory,
        ComponentInstance, ComponentRegistration, ComponentRegistry, ExitScopeResult,
        Requirement, ResolvedComponents, ScopeHandle, SCOPE_DISPATCHER, SCOPE_MESSAGE,
        SCOPE_SESSION, SCOPE_TEST, SCOPE_TRANSIENT,
    };
    pub use crate::config::{
        flatten_toml, load_toml_file, priority, ConfigError, ConfigManager, ConfigOption,
        ConfigOptionId, ConfigValue, ConfigView, OptionKind,
    };
    pub use crate::dispatch::{
        handler_fn, CallbackDispatcher, ComponentAccess, ConcurrentDispatcher, FnHandler,
        HandlerResult, Invocation, MessageHandler, SequentialDispatcher, ThreadPoolDispatcher,
    };
    pub use crate::extension::{
        all_extensions_option, command_option, commands_option, config_file_option,
        disableable_extensions_option, enabled_extensions_option, extension_enabled_option,
        extensions_default_enabled_option, plugins_paths_option, Extension, ExtensionConfig,
        ExtensionDescriptor, ExtensionLoader, ExtensionRegistry, FileConfigExtension, LoaderError,
        SelectedCommand, LOAD_ORDER_ALWAYS_ENABLED, LOAD_ORDER_COMMAND, LOAD_ORDER_DISABLE,
        LOAD_ORDER_PLUGIN_PATH, LOAD_ORDER_REST,
    };
    pub use crate::message::{
        downcast_payload, payload, EndpointId, Message, MessageData, MessageId, Payload,
    };
}
