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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, instrument, trace};

use crate::bus::error::BusError;
use crate::bus::future::{DispatchFuture, FutureCollection};
use crate::bus::registry::{MessageRoutes, Registration};
use crate::component::{ComponentFactory, ScopeHandle};
use crate::dispatch::{Delivery, Dispatch};
use crate::message::{EndpointId, Message, MessageId, Payload};

/// How long [`MessageBus::wait_for_not_active`] waits when no explicit
/// timeout is given.
pub const DEFAULT_QUIESCE_TIMEOUT: Duration = Duration::from_secs(3);

/// Execution state snapshot of one registered dispatcher, used when
/// debugging stuck shutdowns.
#[derive(Debug, Clone)]
pub struct DispatcherState {
    /// The dispatcher's log name.
    pub name: String,
    /// The dispatcher's submission priority.
    pub priority: i32,
    /// Handler invocations currently running.
    pub active_count: usize,
    /// Messages accepted but not yet handled.
    pub queue_count: usize,
}

struct BusInner {
    endpoints: Mutex<Vec<EndpointId>>,
    messages: DashMap<MessageId, MessageRoutes>,
    ids: AtomicU64,
    components: Option<(Arc<ComponentFactory>, ScopeHandle)>,
}

/// The central router of the framework.
///
/// The bus has knowledge of all defined [`EndpointId`]s and [`MessageId`]s.
/// It handles the registration and deregistration of dispatchers, and when a
/// message is triggered it submits a [`Message`] to each applicable
/// dispatcher: those whose message id, endpoint filter and entity filter all
/// match.
///
/// Cloning the bus is cheap; all clones share the same routing state.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    /// Creates a bus without component wiring.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                endpoints: Mutex::new(Vec::new()),
                messages: DashMap::new(),
                ids: AtomicU64::new(1),
                components: None,
            }),
        }
    }

    /// Creates a bus whose dispatchers get component access: each dispatcher
    /// owns a scope under `parent_scope` and every handled message gets a
    /// per-message child scope.
    pub fn with_components(factory: Arc<ComponentFactory>, parent_scope: ScopeHandle) -> Self {
        Self {
            inner: Arc::new(BusInner {
                endpoints: Mutex::new(Vec::new()),
                messages: DashMap::new(),
                ids: AtomicU64::new(1),
                components: Some((factory, parent_scope)),
            }),
        }
    }

    pub(crate) fn component_wiring(&self) -> Option<(Arc<ComponentFactory>, ScopeHandle)> {
        self.inner.components.clone()
    }

    pub(crate) fn next_dispatcher_id(&self) -> u64 {
        self.inner.ids.fetch_add(1, Ordering::SeqCst)
    }

    /// Checks if an endpoint is defined.
    pub fn is_endpoint_defined(&self, endpoint: EndpointId) -> bool {
        self.inner
            .endpoints
            .lock()
            .expect("poisoned endpoint lock")
            .contains(&endpoint)
    }

    /// Checks if a message is defined for an endpoint.
    pub fn is_message_defined_for_endpoint(&self, message: MessageId, endpoint: EndpointId) -> bool {
        self.inner
            .messages
            .get(&message)
            .map(|routes| routes.endpoints.contains(&endpoint))
            .unwrap_or(false)
    }

    /// Defines a new endpoint on the bus.
    pub fn define_endpoint(&self, endpoint: EndpointId) -> Result<(), BusError> {
        debug!("defining endpoint '{endpoint}'");
        let mut endpoints = self
            .inner
            .endpoints
            .lock()
            .expect("poisoned endpoint lock");
        if endpoints.contains(&endpoint) {
            return Err(BusError::EndpointAlreadyDefined(endpoint));
        }
        endpoints.push(endpoint);
        Ok(())
    }

    /// Defines a new message for an already defined endpoint.
    pub fn define_message(&self, message: MessageId, endpoint: EndpointId) -> Result<(), BusError> {
        debug!("defining message '{message}' for endpoint '{endpoint}'");
        if !self.is_endpoint_defined(endpoint) {
            return Err(BusError::NoSuchEndpoint { endpoint, message });
        }
        let mut routes = self.inner.messages.entry(message).or_default();
        if !routes.endpoints.insert(endpoint) {
            return Err(BusError::MessageAlreadyDefined { message, endpoint });
        }
        Ok(())
    }

    /// Defines multiple endpoints and their messages in one call.
    ///
    /// This must happen before dispatchers register against the pairs;
    /// registering against an undeclared pair fails.
    pub fn define_endpoints_and_messages(
        &self,
        definitions: &[(EndpointId, Vec<MessageId>)],
    ) -> Result<(), BusError> {
        for (endpoint, messages) in definitions {
            self.define_endpoint(*endpoint)?;
            for message in messages {
                self.define_message(*message, *endpoint)?;
            }
        }
        Ok(())
    }

    /// Registers a dispatcher for the given filters. A failed validation
    /// registers nothing.
    pub(crate) fn register_dispatcher(
        &self,
        dispatcher: Arc<dyn Dispatch>,
        message_ids: &[MessageId],
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> Result<(), BusError> {
        if message_ids.is_empty() {
            return Err(BusError::EmptyRegistration);
        }
        for message_id in message_ids {
            let routes = self
                .inner
                .messages
                .get(message_id)
                .ok_or(BusError::NoSuchMessage(*message_id))?;
            if let Some(endpoint_ids) = endpoint_ids {
                for endpoint in endpoint_ids {
                    if !routes.endpoints.contains(endpoint) {
                        return Err(BusError::NoSuchEndpoint {
                            endpoint: *endpoint,
                            message: *message_id,
                        });
                    }
                }
            }
        }

        for message_id in message_ids {
            debug!(
                dispatcher = %dispatcher.log_name(),
                message = %message_id,
                endpoints = endpoint_ids.map(|ids| ids.len()).unwrap_or(0),
                "registering dispatcher"
            );
            let seq = self.inner.ids.fetch_add(1, Ordering::SeqCst);
            let mut routes = self
                .inner
                .messages
                .get_mut(message_id)
                .expect("validated message disappeared from the registry");
            routes.registrations.push(Registration {
                seq,
                dispatcher: dispatcher.clone(),
                endpoints: endpoint_ids.map(|ids| ids.iter().copied().collect()),
                entities: entities
                    .map(|entities| entities.iter().map(|entity| entity.to_string()).collect()),
            });
        }
        Ok(())
    }

    /// Deregisters a dispatcher from the message ids, endpoint ids and
    /// entities given. `None` for a filter matches all registrations; `None`
    /// for every filter deregisters the dispatcher completely.
    ///
    /// Returns whether the dispatcher still has registrations.
    pub(crate) fn deregister_dispatcher(
        &self,
        dispatcher_id: u64,
        message_ids: Option<&[MessageId]>,
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> Result<bool, BusError> {
        let mut removed = 0usize;
        match message_ids {
            None => {
                for mut entry in self.inner.messages.iter_mut() {
                    removed += remove_registrations(
                        &mut entry.value_mut().registrations,
                        dispatcher_id,
                        endpoint_ids,
                        entities,
                    );
                }
            }
            Some([]) => return Err(BusError::EmptyRegistration),
            Some(message_ids) => {
                for message_id in message_ids {
                    let mut routes = self
                        .inner
                        .messages
                        .get_mut(message_id)
                        .ok_or(BusError::NoSuchMessage(*message_id))?;
                    removed += remove_registrations(
                        &mut routes.registrations,
                        dispatcher_id,
                        endpoint_ids,
                        entities,
                    );
                }
            }
        }

        if removed == 0 {
            return Err(BusError::NoSuchDispatcher);
        }
        Ok(self.dispatcher_is_registered(dispatcher_id))
    }

    /// Removes every registration of the dispatcher.
    pub(crate) fn deregister_all(&self, dispatcher_id: u64) -> Result<(), BusError> {
        self.deregister_dispatcher(dispatcher_id, None, None, None)
            .map(|_| ())
    }

    pub(crate) fn dispatcher_is_registered(&self, dispatcher_id: u64) -> bool {
        self.inner.messages.iter().any(|entry| {
            entry
                .registrations
                .iter()
                .any(|registration| registration.dispatcher_id() == dispatcher_id)
        })
    }

    /// Sends a message that triggers all applicable dispatchers and does not
    /// wait for them to finish.
    ///
    /// The order dispatchers are submitted in is descending priority, ties
    /// broken by registration order. Handler failures are logged, never
    /// propagated to the caller.
    #[instrument(skip(self, data), level = "debug")]
    pub async fn trigger_event(
        &self,
        message_id: MessageId,
        sender_endpoint_id: EndpointId,
        entity: Option<&str>,
        data: Option<Payload>,
    ) -> Result<(), BusError> {
        debug!(
            "triggering event '{message_id}' from endpoint '{sender_endpoint_id}'{}",
            entity.map(|e| format!(" for entity '{e}'")).unwrap_or_default()
        );
        let mut deliveries = {
            let routes = self
                .inner
                .messages
                .get(&message_id)
                .ok_or(BusError::NoSuchMessage(message_id))?;
            if !routes.endpoints.contains(&sender_endpoint_id) {
                trace!("event endpoint '{sender_endpoint_id}' not defined for '{message_id}'");
                return Ok(());
            }
            let base = Message::event(
                message_id,
                sender_endpoint_id,
                entity.map(str::to_owned),
                data,
            );
            collect_deliveries(&routes.registrations, &base, |registration| {
                registration.matches_endpoint(sender_endpoint_id)
            })
        };
        sort_deliveries(&mut deliveries);
        for (_, _, dispatcher, message) in deliveries {
            dispatcher
                .deliver(Delivery {
                    message,
                    reply: None,
                })
                .await;
        }
        Ok(())
    }

    /// Sends a request to all applicable dispatchers and returns one future
    /// per submission, in submission order.
    ///
    /// Zero matching dispatchers yields an empty collection; that is not an
    /// error by itself, the caller must check the length.
    #[instrument(skip(self, data), level = "debug")]
    pub async fn send_request(
        &self,
        message_id: MessageId,
        receiver_endpoint_id: Option<EndpointId>,
        entity: Option<&str>,
        data: Option<Payload>,
    ) -> FutureCollection {
        let mut futures = FutureCollection::new();
        debug!(
            "sending request '{message_id}' to {}{}",
            receiver_endpoint_id
                .map(|e| format!("endpoint '{e}'"))
                .unwrap_or_else(|| "all endpoints".to_string()),
            entity.map(|e| format!(" for entity '{e}'")).unwrap_or_default()
        );
        let Some(routes) = self.inner.messages.get(&message_id) else {
            return futures;
        };
        let base = Message::request(
            message_id,
            receiver_endpoint_id,
            entity.map(str::to_owned),
            data,
        );
        let mut deliveries =
            collect_deliveries(&routes.registrations, &base, |registration| {
                match receiver_endpoint_id {
                    None => true,
                    Some(endpoint) => {
                        routes.endpoints.contains(&endpoint)
                            && registration.matches_endpoint(endpoint)
                    }
                }
            });
        drop(routes);
        sort_deliveries(&mut deliveries);
        for (_, _, dispatcher, message) in deliveries {
            let subject = match message.entity() {
                Some(entity) => format!("{message_id}@{entity} -> {}", dispatcher.log_name()),
                None => format!("{message_id} -> {}", dispatcher.log_name()),
            };
            let (future, slot) = DispatchFuture::new(subject);
            futures.push(future);
            dispatcher
                .deliver(Delivery {
                    message,
                    reply: Some(slot),
                })
                .await;
        }
        futures
    }

    /// Checks whether any dispatcher is registered for the combination.
    pub fn has_registered_dispatchers(
        &self,
        message_id: MessageId,
        endpoint: EndpointId,
        entity: Option<&str>,
    ) -> bool {
        self.inner
            .messages
            .get(&message_id)
            .map(|routes| {
                routes.registrations.iter().any(|registration| {
                    registration.matches_endpoint(endpoint)
                        && !registration.delivery_entities(entity).is_empty()
                })
            })
            .unwrap_or(false)
    }

    /// Whether any dispatcher has queued or in-flight work.
    pub fn is_active(&self) -> bool {
        self.get_state()
            .iter()
            .any(|state| state.active_count > 0 || state.queue_count > 0)
    }

    /// Execution state of every registered dispatcher.
    pub fn get_state(&self) -> Vec<DispatcherState> {
        let mut seen = HashSet::new();
        let mut states = Vec::new();
        for entry in self.inner.messages.iter() {
            for registration in &entry.registrations {
                let dispatcher = &registration.dispatcher;
                if seen.insert(dispatcher.id()) {
                    states.push(DispatcherState {
                        name: dispatcher.log_name(),
                        priority: dispatcher.priority(),
                        active_count: dispatcher.active_count(),
                        queue_count: dispatcher.queue_count(),
                    });
                }
            }
        }
        states
    }

    /// Log names of all registered dispatchers; used for debugging stuck
    /// shutdowns.
    pub fn get_dispatchers(&self) -> Vec<String> {
        self.get_state().into_iter().map(|state| state.name).collect()
    }

    /// Blocks until no dispatcher has queued or in-flight work.
    ///
    /// Failing to quiesce within the timeout is a fatal condition reported
    /// to the caller; the error lists every still-active dispatcher.
    pub async fn wait_for_not_active(&self, timeout: Option<Duration>) -> Result<(), BusError> {
        let limit = timeout.unwrap_or(DEFAULT_QUIESCE_TIMEOUT);
        let deadline = tokio::time::Instant::now() + limit;
        while self.is_active() {
            if tokio::time::Instant::now() >= deadline {
                let details = self
                    .get_state()
                    .iter()
                    .filter(|state| state.active_count > 0 || state.queue_count > 0)
                    .map(|state| {
                        format!(
                            "  {}: queue_count={}, active_count={}",
                            state.name, state.queue_count, state.active_count
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                return Err(BusError::QuiesceTimeout { details });
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }
}

type PendingDelivery = (i32, u64, Arc<dyn Dispatch>, Message);

fn collect_deliveries(
    registrations: &[Registration],
    base: &Message,
    endpoint_filter: impl Fn(&Registration) -> bool,
) -> Vec<PendingDelivery> {
    let mut deliveries = Vec::new();
    for registration in registrations {
        if !endpoint_filter(registration) {
            continue;
        }
        for entity in registration.delivery_entities(base.entity()) {
            deliveries.push((
                registration.dispatcher.priority(),
                registration.seq,
                registration.dispatcher.clone(),
                base.with_entity(entity.as_deref()),
            ));
        }
    }
    deliveries
}

fn sort_deliveries(deliveries: &mut [PendingDelivery]) {
    deliveries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
}

fn remove_registrations(
    registrations: &mut Vec<Registration>,
    dispatcher_id: u64,
    endpoint_ids: Option<&[EndpointId]>,
    entities: Option<&[&str]>,
) -> usize {
    let before = registrations.len();
    registrations.retain(|registration| {
        !(registration.dispatcher_id() == dispatcher_id
            && registration.matches_filters(endpoint_ids, entities))
    });
    before - registrations.len()
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("messages", &self.inner.messages.len())
            .field(
                "endpoints",
                &self
                    .inner
                    .endpoints
                    .lock()
                    .expect("poisoned endpoint lock")
                    .len(),
            )
            .finish()
    }
}
