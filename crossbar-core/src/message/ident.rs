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
use std::hash::{Hash, Hasher};

/// Identity of a logical message source or destination on the bus.
///
/// Endpoints are declared once at startup and never mutated afterwards. Two
/// endpoint ids are the same endpoint when their names are equal; the
/// description only serves diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct EndpointId {
    name: &'static str,
    description: &'static str,
}

impl EndpointId {
    /// Defines a new endpoint identity.
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }

    /// The unique name of the endpoint.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Human readable description used in diagnostics.
    pub const fn description(&self) -> &'static str {
        self.description
    }
}

impl PartialEq for EndpointId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EndpointId {}

impl Hash for EndpointId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of a kind of message that can travel over the bus.
///
/// Like [`EndpointId`], message ids are created at startup and compared by
/// name only.
#[derive(Debug, Clone, Copy)]
pub struct MessageId {
    name: &'static str,
    description: &'static str,
}

impl MessageId {
    /// Defines a new message identity.
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }

    /// The unique name of the message.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Human readable description used in diagnostics.
    pub const fn description(&self) -> &'static str {
        self.description
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for MessageId {}

impl Hash for MessageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
