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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::bus::error::BusError;
use crate::bus::messagebus::MessageBus;
use crate::dispatch::{handler_fn, CallbackDispatcher};
use crate::message::{EndpointId, Message, MessageId};

/// Errors returned when reading from a [`MessageQueue`].
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue was unblocked while a reader was waiting.
    #[error("queue was unblocked before receiving the next message")]
    Unblocked,
    /// No message arrived within the given budget.
    #[error("timed out after {0:?} waiting for the next message")]
    Timeout(Duration),
    /// The queue holds no message right now.
    #[error("no message available")]
    Empty,
    /// The queue's dispatcher is gone.
    #[error("queue is closed")]
    Closed,
}

/// A bus subscriber that collects matching messages into a local queue.
///
/// Makes it easy to wait for messages in test and orchestration code:
///
/// ```rust,ignore
/// let queue = MessageQueue::new(&bus, &[MESSAGE], Some(&[ENDPOINT]), None)?;
/// // start something that triggers messages
/// let message = queue.get(Some(Duration::from_secs(5))).await?;
/// ```
pub struct MessageQueue {
    dispatcher: CallbackDispatcher,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<Message>>>,
    tx: mpsc::UnboundedSender<Option<Message>>,
    pending: Arc<AtomicUsize>,
}

impl MessageQueue {
    /// Creates a queue registered for the given filters.
    pub fn new(
        bus: &MessageBus,
        message_ids: &[MessageId],
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
    ) -> Result<Self, BusError> {
        Self::with_match(bus, message_ids, endpoint_ids, entities, |_| true)
    }

    /// Creates a queue that only collects messages accepted by `matches`.
    pub fn with_match(
        bus: &MessageBus,
        message_ids: &[MessageId],
        endpoint_ids: Option<&[EndpointId]>,
        entities: Option<&[&str]>,
        matches: impl Fn(&Message) -> bool + Send + Sync + 'static,
    ) -> Result<Self, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let sender = tx.clone();
        let counter = pending.clone();
        let dispatcher = CallbackDispatcher::new(
            bus,
            handler_fn("message-queue", move |invocation| {
                let message = invocation.message().clone();
                let accepted = matches(&message);
                let sender = sender.clone();
                let counter = counter.clone();
                async move {
                    if accepted {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let _ = sender.send(Some(message));
                    }
                    Ok(None)
                }
            }),
        );
        dispatcher.register(message_ids, endpoint_ids, entities)?;
        Ok(Self {
            dispatcher,
            rx: tokio::sync::Mutex::new(rx),
            tx,
            pending,
        })
    }

    /// Waits for the next matching message.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<Message, QueueError> {
        let mut rx = self.rx.lock().await;
        let received = match timeout {
            None => rx.recv().await,
            Some(limit) => match tokio::time::timeout(limit, rx.recv()).await {
                Ok(received) => received,
                Err(_) => return Err(QueueError::Timeout(limit)),
            },
        };
        match received {
            Some(Some(message)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Ok(message)
            }
            Some(None) => Err(QueueError::Unblocked),
            None => Err(QueueError::Closed),
        }
    }

    /// Returns the next message if one is already queued.
    pub async fn get_nowait(&self) -> Result<Message, QueueError> {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(Some(message)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Ok(message)
            }
            Ok(None) => Err(QueueError::Unblocked),
            Err(mpsc::error::TryRecvError::Empty) => Err(QueueError::Empty),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Whether the queue currently holds no messages.
    pub fn empty(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Discards all currently queued messages.
    pub async fn clear(&self) {
        let mut rx = self.rx.lock().await;
        while let Ok(received) = rx.try_recv() {
            if received.is_some() {
                self.pending.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Unblocks the ongoing or next `get` call, making it return
    /// [`QueueError::Unblocked`]. Only meant for queues that will not be
    /// used anymore.
    pub fn unblock(&self) {
        let _ = self.tx.send(None);
    }

    /// Deregisters the queue's dispatcher from the bus.
    pub async fn destroy(&self) {
        self.dispatcher.destroy().await;
    }
}
