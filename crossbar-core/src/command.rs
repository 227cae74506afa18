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
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::MessageBus;
use crate::component::{ComponentFactory, ScopeHandle};
use crate::config::{ConfigOption, ConfigView};

/// The core services handed to a running command: the wired message bus,
/// the command's config view and the component factory with the session
/// scope.
#[derive(Clone)]
pub struct CoreServices {
    /// The fully wired message bus.
    pub bus: MessageBus,
    /// Config view restricted to the command's declared options.
    pub config: ConfigView,
    /// The component factory.
    pub factory: Arc<ComponentFactory>,
    /// The session scope commands resolve components in.
    pub session_scope: ScopeHandle,
}

/// The entry point of a command declared by an extension.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Runs the command; the returned value becomes the process exit code.
    async fn run(&self, core: CoreServices) -> anyhow::Result<i32>;
}

struct FnCommand<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommand<F>
where
    F: Fn(CoreServices) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<i32>> + Send + 'static,
{
    async fn run(&self, core: CoreServices) -> anyhow::Result<i32> {
        (self.f)(core).await
    }
}

/// Wraps an async closure into a [`CommandHandler`].
pub fn command_handler<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(CoreServices) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<i32>> + Send + 'static,
{
    Arc::new(FnCommand { f })
}

/// A command an extension contributes to the application.
#[derive(Clone)]
pub struct CommandDescriptor {
    name: String,
    description: String,
    config_options: Vec<ConfigOption>,
    handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    /// Declares a command.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            config_options: Vec::new(),
            handler,
        }
    }

    /// Declares a config option consumed by this command.
    pub fn with_config_option(mut self, option: ConfigOption) -> Self {
        self.config_options.push(option);
        self
    }

    /// The command name matched against the parsed command line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The command's declared config options.
    pub fn config_options(&self) -> &[ConfigOption] {
        &self.config_options
    }

    /// The command's entry point.
    pub fn handler(&self) -> Arc<dyn CommandHandler> {
        self.handler.clone()
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("options", &self.config_options.len())
            .finish()
    }
}
