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

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::component::{
    ComponentError, ComponentFactory, ComponentInstance, Requirement, ScopeHandle,
};
use crate::message::{Message, Payload};

/// Outcome of one handler invocation: the request's return value (if any) or
/// the handler's error.
pub type HandlerResult = anyhow::Result<Option<Payload>>;

/// The handler contract implemented by everything a dispatcher can run.
///
/// Handlers may run concurrently with themselves depending on the dispatcher
/// kind they are wrapped in; see the individual dispatcher types for the
/// guarantees they provide.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one delivered message.
    async fn handle(&self, invocation: Invocation) -> HandlerResult;

    /// Name used in logs and timeout diagnostics.
    fn name(&self) -> &str {
        "handler"
    }
}

/// One delivery handed to a [`MessageHandler`]: the message plus access to
/// components scoped to this single handling.
pub struct Invocation {
    message: Message,
    components: Option<ComponentAccess>,
}

impl Invocation {
    pub(crate) fn new(message: Message, components: Option<ComponentAccess>) -> Self {
        Self {
            message,
            components,
        }
    }

    /// The delivered message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Component access for this handling, when the bus was wired with a
    /// component factory.
    pub fn components(&self) -> Option<&ComponentAccess> {
        self.components.as_ref()
    }

    /// Resolves a required component in the per-message scope.
    pub fn require(&self, requirement: &Requirement) -> Result<ComponentInstance, ComponentError> {
        match &self.components {
            Some(access) => access.resolve(requirement),
            None => Err(ComponentError::ComponentsUnavailable {
                component: requirement.component().to_string(),
            }),
        }
    }
}

/// Component resolution bound to one message handling.
///
/// Instances resolve within a per-message scope parented to the dispatcher's
/// scope; the message's entity, when present, fixates entity-bound
/// components.
pub struct ComponentAccess {
    factory: Arc<ComponentFactory>,
    scope: ScopeHandle,
    fixated_entities: Vec<String>,
}

impl ComponentAccess {
    pub(crate) fn new(
        factory: Arc<ComponentFactory>,
        scope: ScopeHandle,
        fixated_entities: Vec<String>,
    ) -> Self {
        Self {
            factory,
            scope,
            fixated_entities,
        }
    }

    /// The per-message scope components are instantiated in.
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    /// Resolves a component requirement, creating missing instances in the
    /// appropriate scope as a side effect.
    pub fn resolve(&self, requirement: &Requirement) -> Result<ComponentInstance, ComponentError> {
        self.factory
            .resolve_fixated(requirement, &self.scope, &self.fixated_entities)
    }
}

/// A [`MessageHandler`] built from a named async closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wraps an async closure into a [`MessageHandler`].
///
/// The name shows up in logs and in timeout diagnostics, so pick something a
/// stuck-shutdown report is readable with.
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, invocation: Invocation) -> HandlerResult {
        (self.f)(invocation).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
