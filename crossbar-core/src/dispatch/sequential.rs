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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::bus::{BusError, MessageBus};
use crate::dispatch::core::{Delivery, Dispatch, DispatcherCore};
use crate::dispatch::handler::MessageHandler;
use crate::message::{EndpointId, MessageId};

/// Puts messages in a queue and calls the handler one message at a time.
///
/// This dispatcher has its own worker task; messages received while the
/// handler is busy are queued, which guarantees that messages are handled in
/// the same order as they are submitted and that the handler is never
/// invoked concurrently with itself.
pub struct SequentialDispatcher {
    shared: Arc<SequentialShared>,
}

struct SequentialShared {
    core: DispatcherCore,
    queue: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    queued: AtomicUsize,
}

impl SequentialDispatcher {
    /// Creates a sequential dispatcher with the default priority of 0.
    pub fn new(bus: &MessageBus, handler: impl MessageHandler) -> Self {
        Self::with_priority(bus, handler, 0)
    }

    /// Creates a sequential dispatcher with an explicit priority.
    pub fn with_priority(bus: &MessageBus, handler: impl MessageHandler, priority: i32) -> Self {
        let core = DispatcherCore::new(bus, Arc::new(handler), priority, "sequential");
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let shared = Arc::new(SequentialShared {
            core,
            queue: Mutex::new(Some(tx)),
            queued: AtomicUsize::new(0),
        });

        let worker = shared.clone();
        shared.core.tracker().spawn(async move {
            while let Some(delivery) = rx.recv().await {
                worker.queued.fetch_sub(1, Ordering::SeqCst);
                worker.core.run(delivery).await;
            }
            trace!(dispatcher = %worker.core.name(), "worker drained");
        });

        Self { shared }
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

    /// Deregisters from the bus, drains the queue and stops the worker.
    pub async fn destroy(&self) {
        self.shared.queue.lock().expect("poisoned queue lock").take();
        self.shared.core.teardown().await;
    }

    /// The dispatcher's submission priority.
    pub fn priority(&self) -> i32 {
        self.shared.core.priority()
    }
}

#[async_trait]
impl Dispatch for SequentialShared {
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
        self.queued.load(Ordering::SeqCst)
    }

    async fn deliver(&self, delivery: Delivery) {
        let tx = self.queue.lock().expect("poisoned queue lock").clone();
        match tx {
            Some(tx) => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                if let Err(undelivered) = tx.send(delivery) {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    let delivery = undelivered.0;
                    self.core.reject(delivery.message, delivery.reply);
                }
            }
            None => self.core.reject(delivery.message, delivery.reply),
        }
    }
}

impl fmt::Debug for SequentialDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialDispatcher")
            .field("name", &self.shared.core.name())
            .finish()
    }
}
