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
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use dyn_clone::DynClone;

/// Trait for message payloads, providing methods for type erasure.
///
/// Any `Clone + Debug + Send + Sync` value qualifies; the bus never inspects
/// payloads, it only carries them to dispatchers.
pub trait MessageData: DynClone + Any + Send + Sync + Debug {
    /// Returns a reference to the payload as `Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T> MessageData for T
where
    T: Any + Send + Sync + Debug + DynClone + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared, type-erased message payload.
pub type Payload = Arc<dyn MessageData + Send + Sync + 'static>;

/// Wraps a concrete value into a [`Payload`].
pub fn payload<T: MessageData>(value: T) -> Payload {
    Arc::new(value)
}

/// Downcasts a payload back to its concrete type.
pub fn downcast_payload<T: 'static>(data: &Payload) -> Option<&T> {
    data.as_any().downcast_ref::<T>()
}
