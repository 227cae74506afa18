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

use static_assertions::assert_impl_all;

use crate::message::payload::{downcast_payload, Payload};
use crate::message::{EndpointId, MessageId};

/// A dispatched message instance as delivered to dispatchers.
///
/// For events the endpoint is the sender; for requests it is the requested
/// receiver, or `None` for a request addressed to all endpoints. The entity
/// is a free-form scoping key; a message without an entity is a broadcast
/// regardless of entity.
#[derive(Clone)]
pub struct Message {
    message_id: MessageId,
    endpoint: Option<EndpointId>,
    entity: Option<String>,
    data: Option<Payload>,
    is_event: bool,
}

impl Message {
    /// Creates an event message originating from `sender`.
    pub fn event(
        message_id: MessageId,
        sender: EndpointId,
        entity: Option<String>,
        data: Option<Payload>,
    ) -> Self {
        Self {
            message_id,
            endpoint: Some(sender),
            entity,
            data,
            is_event: true,
        }
    }

    /// Creates a request message addressed to `receiver`, or to all endpoints
    /// when `receiver` is `None`.
    pub fn request(
        message_id: MessageId,
        receiver: Option<EndpointId>,
        entity: Option<String>,
        data: Option<Payload>,
    ) -> Self {
        Self {
            message_id,
            endpoint: receiver,
            entity,
            data,
            is_event: false,
        }
    }

    /// The id of the message kind.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// The endpoint the message was sent from (events) or to (requests).
    pub fn endpoint(&self) -> Option<EndpointId> {
        self.endpoint
    }

    /// The entity the message is scoped to, if any.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// The opaque payload carried by the message, if any.
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Downcasts the payload to a concrete type.
    pub fn data_as<T: 'static>(&self) -> Option<&T> {
        self.data.as_ref().and_then(downcast_payload::<T>)
    }

    /// Whether the message is a fire-and-forget event rather than a request.
    pub fn is_event(&self) -> bool {
        self.is_event
    }

    /// Returns a copy of this message scoped to the given entity.
    ///
    /// Used when a broadcast message fans out to entity-filtered
    /// registrations; each delivered copy carries the registration's entity.
    pub(crate) fn with_entity(&self, entity: Option<&str>) -> Self {
        let mut message = self.clone();
        message.entity = entity.map(str::to_owned);
        message
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("message_id", &self.message_id.name())
            .field("endpoint", &self.endpoint.map(|e| e.name()))
            .field("entity", &self.entity)
            .field("data", &self.data)
            .field("is_event", &self.is_event)
            .finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_id.name())
    }
}

// Ensures that Message implements the Send trait.
assert_impl_all!(Message: Send);
