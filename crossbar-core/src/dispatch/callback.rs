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
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{BusError, MessageBus};
use crate::dispatch::core::{Delivery, Dispatch, DispatcherCore};
use crate::dispatch::handler::MessageHandler;
use crate::message::{EndpointId, MessageId};

/// Runs the handler inline on the task the message was sent from.
///
/// This dispatcher pauses the sender until the handler has finished; there
/// is no queueing and no concurrency. Handler failures follow the same rules
/// as every other dispatcher kind: captured into the future for requests,
/// logged for events.
pub struct CallbackDispatcher {
    shared: Arc<CallbackShared>,
}

struct CallbackShared {
    core: Arc<DispatcherCore>,
}

impl CallbackDispatcher {
    /// Creates a callback dispatcher with the default priority of 0.
    pub fn new(bus: &MessageBus, handler: impl MessageHandler) -> Self {
        Self::with_priority(bus, handler, 0)
    }

    /// Creates a callback dispatcher with an explicit priority.
    pub fn with_priority(bus: &MessageBus, handler: impl MessageHandler, priority: i32) -> Self {
        let core = Arc::new(DispatcherCore::new(
            bus,
            Arc::new(handler),
            priority,
            "callback",
        ));
        Self {
            shared: Arc::new(CallbackShared { core }),
        }
    }

    /// Registers this dispatcher on the bus for the given combination of
    /// message ids, endpoint ids and entities.
    pub fn register(
        &self,
        message_ids: &[MessageId],
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> Result<(), BusError> {
        self.shared.core.register_on_bus(
            self.shared.clone(),
            message_ids,
            endpoint_ids,
            entities,
            false,
        )
    }

    /// Like [`register`](Self::register), but silently ignores undeclared
    /// message/endpoint combinations.
    pub fn register_optional(
        &self,
        message_ids: &[MessageId],
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> Result<(), BusError> {
        self.shared.core.register_on_bus(
            self.shared.clone(),
            message_ids,
            endpoint_ids,
            entities,
            true,
        )
    }

    /// Removes registrations matching the filters; returns whether any
    /// registrations remain.
    pub fn deregister(
        &self,
        message_ids: Option<&[MessageId]>,
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> Result<bool, BusError> {
        self.shared
            .core
            .bus()
            .deregister_dispatcher(self.shared.core.id(), message_ids, endpoint_ids, entities)
    }

    /// Deregisters from the bus and releases the dispatcher scope.
    pub async fn destroy(&self) {
        self.shared.core.teardown().await;
    }

    /// The dispatcher's submission priority.
    pub fn priority(&self) -> i32 {
        self.shared.core.priority()
    }
}

#[async_trait]
impl Dispatch for CallbackShared {
    fn id(&self) -> u64 {
        self.core.id()
    }

    fn priority(&self) -> i32 {
        self.core.priority()
    }

    fn log_name(&self) -> String {
        self.core.name().to_string()
    }

    fn active_count(&self) -> usize {
        self.core.active().get()
    }

    fn queue_count(&self) -> usize {
        0
    }

    async fn deliver(&self, delivery: Delivery) {
        self.core.run(delivery).await;
    }
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("name", &self.shared.core.name())
            .finish()
    }
}
