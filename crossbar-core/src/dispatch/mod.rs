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

//! Dispatchers let you listen for events and requests on a message bus and
//! run a handler when they occur.
//!
//! If several dispatchers are registered on the same message they are
//! submitted in order of priority, highest first; ties are broken by
//! registration order.

pub use callback::CallbackDispatcher;
pub use concurrent::ConcurrentDispatcher;
pub(crate) use self::core::{Delivery, Dispatch};
pub use handler::{
    handler_fn, ComponentAccess, FnHandler, HandlerResult, Invocation, MessageHandler,
};
pub use pool::ThreadPoolDispatcher;
pub use sequential::SequentialDispatcher;

mod callback;
mod concurrent;
mod core;
mod handler;
mod pool;
mod sequential;
