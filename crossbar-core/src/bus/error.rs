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

use thiserror::Error;

use crate::message::{EndpointId, MessageId};

/// Errors raised by the message bus for wiring mistakes and shutdown drains.
///
/// All of these are configuration-time failures except [`BusError::QuiesceTimeout`],
/// which surfaces from [`MessageBus::wait_for_not_active`](crate::bus::MessageBus::wait_for_not_active)
/// when dispatchers fail to drain.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The endpoint has already been defined on this bus.
    #[error("endpoint '{0}' already defined")]
    EndpointAlreadyDefined(EndpointId),

    /// The message has already been defined for the endpoint.
    #[error("message '{message}' already defined for endpoint '{endpoint}'")]
    MessageAlreadyDefined {
        /// The message being redefined.
        message: MessageId,
        /// The endpoint it was already defined for.
        endpoint: EndpointId,
    },

    /// The referenced endpoint has not been defined.
    #[error("no such endpoint '{endpoint}' for message '{message}'")]
    NoSuchEndpoint {
        /// The undefined endpoint.
        endpoint: EndpointId,
        /// The message the endpoint was referenced for.
        message: MessageId,
    },

    /// The referenced message has not been defined.
    #[error("no such message '{0}'")]
    NoSuchMessage(MessageId),

    /// A deregistration matched no registered dispatcher.
    #[error("trying to deregister an unknown dispatcher")]
    NoSuchDispatcher,

    /// A dispatcher registration was attempted without any message ids.
    #[error("no message ids specified when registering dispatcher")]
    EmptyRegistration,

    /// The bus failed to drain its in-flight dispatch activity in time.
    #[error("waiting for message bus activity to stop timed out:\n{details}")]
    QuiesceTimeout {
        /// Per-dispatcher queue and active counts at the time of the timeout.
        details: String,
    },
}
