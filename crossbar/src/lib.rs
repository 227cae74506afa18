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

#![forbid(unsafe_code)]
#![forbid(missing_docs)] // Keep this to enforce coverage

//! # Crossbar
//!
//! This crate is the public face of the Crossbar automation framework. It
//! provides an in-process message bus with typed endpoints, multiple
//! dispatcher execution models, request futures, a priority-resolved
//! configuration manager, a scope-aware component factory and the extension
//! loading process that wires a process together before a command runs.
//!
//! ## Key Concepts
//!
//! - **Endpoints and Messages**: [`prelude::EndpointId`] and
//!   [`prelude::MessageId`] declare the legal message routes up front;
//!   wiring mistakes fail at registration time, not at send time.
//! - **Dispatchers**: sequential, concurrent, bounded-pool and callback
//!   execution strategies over one handler contract
//!   ([`prelude::MessageHandler`]).
//! - **Requests and Futures**: [`prelude::MessageBus::send_request`] returns
//!   one [`prelude::DispatchFuture`] per matched dispatcher.
//! - **Configuration**: values from defaults, extensions, config files and
//!   the command line resolve by priority ([`prelude::ConfigManager`]).
//! - **Components**: named units with scope lifetimes, capability tags and
//!   transitive requirements ([`prelude::ComponentFactory`]).
//! - **Extensions**: self-contained units loaded in a multi-pass process
//!   ([`prelude::ExtensionLoader`]) before the selected command executes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crossbar::prelude::*;
//!
//! const WORKER: EndpointId = EndpointId::new("worker", "Does the work.");
//! const JOB: MessageId = MessageId::new("job", "One unit of work.");
//! ```

/// A prelude module for conveniently importing the most commonly used
/// items.
pub mod prelude {
    pub use crossbar_core::prelude::*;
}
