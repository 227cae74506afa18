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
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::bus::{BusError, MessageBus};
use crate::dispatch::core::{Delivery, Dispatch, DispatcherCore};
use crate::dispatch::handler::MessageHandler;
use crate::message::{EndpointId, MessageId};

/// Runs the handler on a bounded pool of workers.
///
/// Like [`ConcurrentDispatcher`](crate::dispatch::ConcurrentDispatcher) but
/// with an explicit cap on parallelism; messages beyond the cap wait for a
/// worker slot. Used when an external resource limits how many handlers may
/// run at once.
pub struct ThreadPoolDispatcher {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    core: Arc<DispatcherCore>,
    slots: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_workers: usize,
}

impl ThreadPoolDispatcher {
    /// Creates a pool dispatcher; `max_workers` of `None` sizes the pool to
    /// five slots per available CPU.
    pub fn new(bus: &MessageBus, handler: impl MessageHandler, max_workers: Option<usize>) -> Self {
        Self::with_priority(bus, handler, max_workers, 0)
    }

    /// Creates a pool dispatcher with an explicit priority.
    pub fn with_priority(
        bus: &MessageBus,
        handler: impl MessageHandler,
        max_workers: Option<usize>,
        priority: i32,
    ) -> Self {
        let max_workers = max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                * 5
        });
        let core = Arc::new(DispatcherCore::new(
            bus,
            Arc::new(handler),
            priority,
            "pool",
        ));
        Self {
            shared: Arc::new(PoolShared {
                core,
                slots: Arc::new(Semaphore::new(max_workers)),
                waiting: Arc::new(AtomicUsize::new(0)),
                max_workers,
            }),
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

    /// Deregisters from the bus and waits for queued and in-flight work.
    pub async fn destroy(&self) {
        self.shared.core.teardown().await;
    }

    /// The number of worker slots in the pool.
    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// The dispatcher's submission priority.
    pub fn priority(&self) -> i32 {
        self.shared.core.priority()
    }
}

#[async_trait]
impl Dispatch for PoolShared {
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
        self.waiting.load(Ordering::SeqCst)
    }

    async fn deliver(&self, delivery: Delivery) {
        if self.core.is_destroyed() {
            self.core.reject(delivery.message, delivery.reply);
            return;
        }
        let core = self.core.clone();
        let slots = self.slots.clone();
        let waiting = self.waiting.clone();
        waiting.fetch_add(1, Ordering::SeqCst);
        self.core.tracker().spawn(async move {
            let permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    waiting.fetch_sub(1, Ordering::SeqCst);
                    debug!(dispatcher = %core.name(), "worker pool closed, dropping delivery");
                    core.reject(delivery.message, delivery.reply);
                    return;
                }
            };
            waiting.fetch_sub(1, Ordering::SeqCst);
            core.run(delivery).await;
            drop(permit);
        });
    }
}

impl fmt::Debug for ThreadPoolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolDispatcher")
            .field("name", &self.shared.core.name())
            .field("max_workers", &self.shared.max_workers)
            .finish()
    }
}
