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

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace};

use crate::bus::{BusError, DispatchError, MessageBus, ResponseSlot};
use crate::component::{ComponentFactory, ScopeHandle, SCOPE_DISPATCHER, SCOPE_MESSAGE};
use crate::dispatch::handler::{ComponentAccess, Invocation, MessageHandler};
use crate::message::{EndpointId, Message, MessageId};

/// One unit of work submitted to a dispatcher: the message and, for
/// requests, the slot the outcome is reported through.
pub(crate) struct Delivery {
    pub(crate) message: Message,
    pub(crate) reply: Option<ResponseSlot>,
}

/// The submission interface the bus uses for every dispatcher kind.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync + 'static {
    fn id(&self) -> u64;
    fn priority(&self) -> i32;
    fn log_name(&self) -> String;
    fn active_count(&self) -> usize;
    fn queue_count(&self) -> usize;
    async fn deliver(&self, delivery: Delivery);
}

/// Counter of handler invocations currently in flight.
#[derive(Clone, Default)]
pub(crate) struct ActiveCount {
    count: Arc<AtomicUsize>,
}

impl ActiveCount {
    pub(crate) fn enter(&self) -> ActiveGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            count: self.count.clone(),
        }
    }

    pub(crate) fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub(crate) struct ActiveGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ComponentBinding {
    factory: Arc<ComponentFactory>,
    dispatcher_scope: ScopeHandle,
}

/// State shared by all dispatcher kinds: identity, priority, the wrapped
/// handler, activity accounting and the component scope the dispatcher owns.
pub(crate) struct DispatcherCore {
    id: u64,
    name: String,
    priority: i32,
    bus: MessageBus,
    handler: Arc<dyn MessageHandler>,
    active: ActiveCount,
    destroyed: AtomicBool,
    tracker: TaskTracker,
    components: Option<ComponentBinding>,
}

impl DispatcherCore {
    pub(crate) fn new(
        bus: &MessageBus,
        handler: Arc<dyn MessageHandler>,
        priority: i32,
        kind: &str,
    ) -> Self {
        let name = format!("{kind}({handler})", handler = handler.name());
        let components = bus.component_wiring().and_then(|(factory, parent)| {
            match factory.enter_scope(SCOPE_DISPATCHER, Some(&parent)) {
                Ok(dispatcher_scope) => Some(ComponentBinding {
                    factory,
                    dispatcher_scope,
                }),
                Err(e) => {
                    error!(dispatcher = %name, "could not enter dispatcher scope: {e}");
                    None
                }
            }
        });

        Self {
            id: bus.next_dispatcher_id(),
            name,
            priority,
            bus: bus.clone(),
            handler,
            active: ActiveCount::default(),
            destroyed: AtomicBool::new(false),
            tracker: TaskTracker::new(),
            components,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub(crate) fn active(&self) -> &ActiveCount {
        &self.active
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Registers `dispatcher` on the bus for the given filters.
    ///
    /// With `optional` set, undeclared message/endpoint combinations are
    /// ignored with a debug log instead of failing, allowing a dispatcher to
    /// listen for messages that may not be defined in this process.
    pub(crate) fn register_on_bus(
        &self,
        dispatcher: Arc<dyn Dispatch>,
        message_ids: &[MessageId],
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
        optional: bool,
    ) -> Result<(), BusError> {
        match self
            .bus
            .register_dispatcher(dispatcher, message_ids, endpoint_ids, entities)
        {
            Ok(()) => Ok(()),
            Err(e @ (BusError::NoSuchMessage(_) | BusError::NoSuchEndpoint { .. })) if optional => {
                debug!(dispatcher = %self.name, "ignoring optional dispatcher: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs one delivery through the handler, reporting the outcome into the
    /// reply slot for requests or the error log for events.
    pub(crate) async fn run(&self, delivery: Delivery) {
        let Delivery { message, reply } = delivery;
        if self.is_destroyed() {
            self.reject(message, reply);
            return;
        }

        trace!(handler = %self.name, message = %message, "receiving message");
        let message_scope = self.enter_message_scope();
        let invocation = Invocation::new(
            message.clone(),
            message_scope.as_ref().map(|scope| {
                let binding = self
                    .components
                    .as_ref()
                    .expect("message scope without component binding");
                let fixated = message
                    .entity()
                    .map(|entity| vec![entity.to_string()])
                    .unwrap_or_default();
                ComponentAccess::new(binding.factory.clone(), scope.clone(), fixated)
            }),
        );

        let outcome = {
            let _guard = self.active.enter();
            self.handler.handle(invocation).await
        };
        self.exit_message_scope(message_scope);

        match reply {
            Some(slot) => {
                let outcome = outcome.map_err(|error| DispatchError::Handler {
                    handler: self.name.clone(),
                    subject: slot.subject().to_string(),
                    error: Arc::new(error),
                });
                slot.resolve(outcome);
            }
            None => {
                if let Err(error) = outcome {
                    // Events have no future to report into; one bad
                    // subscriber must not break the fan-out.
                    error!(
                        handler = %self.name,
                        message = %message,
                        entity = message.entity().unwrap_or("-"),
                        "error occurred when handling event: {error:#}"
                    );
                }
            }
        }
    }

    /// Rejects a delivery that arrived after the dispatcher was destroyed or
    /// before it had a running worker.
    pub(crate) fn reject(&self, message: Message, reply: Option<ResponseSlot>) {
        error!(
            handler = %self.name,
            message = %message,
            "dispatcher cannot accept message, it has been destroyed"
        );
        if let Some(slot) = reply {
            let subject = slot.subject().to_string();
            slot.resolve(Err(DispatchError::Handler {
                handler: self.name.clone(),
                subject,
                error: Arc::new(anyhow::anyhow!(
                    "dispatcher '{}' has been destroyed",
                    self.name
                )),
            }));
        }
    }

    /// Deregisters from the bus, drains workers and releases the dispatcher
    /// scope. Safe to call more than once.
    pub(crate) async fn teardown(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.bus.deregister_all(self.id) {
            debug!(dispatcher = %self.name, "nothing to deregister on destroy: {e}");
        }
        self.tracker.close();
        self.tracker.wait().await;
        if let Some(binding) = &self.components {
            let result = binding
                .factory
                .exit_scope(binding.dispatcher_scope.clone());
            for error in &result.errors {
                error!(dispatcher = %self.name, "error exiting dispatcher scope: {error}");
            }
        }
        trace!(dispatcher = %self.name, "destroyed");
    }

    fn enter_message_scope(&self) -> Option<ScopeHandle> {
        let binding = self.components.as_ref()?;
        match binding
            .factory
            .enter_scope(SCOPE_MESSAGE, Some(&binding.dispatcher_scope))
        {
            Ok(scope) => Some(scope),
            Err(e) => {
                error!(dispatcher = %self.name, "could not enter message scope: {e}");
                None
            }
        }
    }

    fn exit_message_scope(&self, scope: Option<ScopeHandle>) {
        let (Some(binding), Some(scope)) = (self.components.as_ref(), scope) else {
            return;
        };
        let result = binding.factory.exit_scope(scope);
        for error in &result.errors {
            error!(dispatcher = %self.name, "error exiting message scope: {error}");
        }
    }
}
