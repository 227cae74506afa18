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
use std::future::Future;
use std::ops::Index;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use thiserror::Error;
use tokio::sync::watch;
use tracing::trace;

use crate::message::Payload;

/// Errors surfaced when awaiting the outcome of a dispatched request.
///
/// Handler failures and timeouts are deliberately distinct variants so that
/// callers can tell "the handler failed" apart from "nobody answered in
/// time".
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The handler ran and returned an error; re-raised on every
    /// [`DispatchFuture::result`] call.
    #[error("handler '{handler}' failed while handling '{subject}': {error:#}")]
    Handler {
        /// Name of the failing handler.
        handler: String,
        /// What was being handled, including the entity if any.
        subject: String,
        /// The captured handler error.
        error: Arc<anyhow::Error>,
    },

    /// The awaited outcome did not materialise within the caller's budget.
    ///
    /// The in-flight handler keeps running; only the waiter gives up.
    #[error("timed out after {timeout:?} waiting for '{subject}'")]
    Timeout {
        /// What was being awaited, including the entity if any.
        subject: String,
        /// The timeout budget that elapsed.
        timeout: Duration,
    },
}

type DispatchOutcome = Result<Option<Payload>, DispatchError>;

struct FutureState {
    subject: String,
    outcome: Mutex<Option<DispatchOutcome>>,
    done: watch::Sender<bool>,
}

/// Single-result placeholder for one dispatcher's handling of one request.
///
/// Produced by [`MessageBus::send_request`](crate::bus::MessageBus::send_request),
/// one per matched dispatcher. The future resolves to the handler's return
/// value or captures its error; waiting never cancels the in-flight handler.
#[derive(Clone)]
pub struct DispatchFuture {
    state: Arc<FutureState>,
}

impl DispatchFuture {
    pub(crate) fn new(subject: impl Into<String>) -> (Self, ResponseSlot) {
        let (done, _) = watch::channel(false);
        let state = Arc::new(FutureState {
            subject: subject.into(),
            outcome: Mutex::new(None),
            done,
        });
        (
            Self {
                state: state.clone(),
            },
            ResponseSlot { state },
        )
    }

    /// What this future is waiting for; used in timeout diagnostics.
    pub fn subject(&self) -> &str {
        &self.state.subject
    }

    /// Whether the outcome is already available.
    pub fn is_done(&self) -> bool {
        *self.state.done.borrow()
    }

    /// Waits for completion without surfacing the handler's error.
    ///
    /// Returns whether the future completed within `timeout`. A timeout of
    /// `Some(Duration::ZERO)` only succeeds if the outcome is already
    /// available.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.state.done.subscribe();
        let resolved = rx.wait_for(|done| *done);
        match timeout {
            None => resolved.await.is_ok(),
            Some(limit) => matches!(
                tokio::time::timeout(limit, resolved).await,
                Ok(Ok(_))
            ),
        }
    }

    /// Waits for the outcome, re-raising the handler's error if it failed.
    ///
    /// A timeout of `Some(Duration::ZERO)` means the outcome must already be
    /// resolved; otherwise a [`DispatchError::Timeout`] is returned
    /// immediately.
    pub async fn result(&self, timeout: Option<Duration>) -> Result<Option<Payload>, DispatchError> {
        if !self.wait(timeout).await {
            return Err(DispatchError::Timeout {
                subject: self.state.subject.clone(),
                timeout: timeout.unwrap_or_default(),
            });
        }
        let outcome = self.state.outcome.lock().expect("poisoned future state");
        outcome
            .clone()
            .expect("completed future is missing its outcome")
    }
}

impl fmt::Debug for DispatchFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFuture")
            .field("subject", &self.state.subject)
            .field("done", &self.is_done())
            .finish()
    }
}

/// Write side of a [`DispatchFuture`], held by the dispatcher handling the
/// request.
pub(crate) struct ResponseSlot {
    state: Arc<FutureState>,
}

impl ResponseSlot {
    /// What the paired future is waiting for.
    pub(crate) fn subject(&self) -> &str {
        &self.state.subject
    }

    /// Stores the outcome and wakes every waiter. Resolving twice is a bug
    /// in the dispatcher; the first outcome wins.
    pub(crate) fn resolve(self, outcome: Result<Option<Payload>, DispatchError>) {
        {
            let mut slot = self.state.outcome.lock().expect("poisoned future state");
            if slot.is_some() {
                trace!(subject = %self.state.subject, "future already resolved, ignoring");
                return;
            }
            *slot = Some(outcome);
        }
        self.state.done.send_replace(true);
    }
}

/// Ordered collection of [`DispatchFuture`]s returned by a single
/// `send_request` call.
///
/// An empty collection is not an error; it means no dispatcher matched.
#[derive(Debug, Clone, Default)]
pub struct FutureCollection {
    futures: Vec<DispatchFuture>,
}

impl FutureCollection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, future: DispatchFuture) {
        self.futures.push(future);
    }

    /// Number of dispatchers the request was submitted to.
    pub fn len(&self) -> usize {
        self.futures.len()
    }

    /// Whether the request matched no dispatcher at all.
    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Iterates the futures in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &DispatchFuture> {
        self.futures.iter()
    }

    /// Whether every future has completed.
    pub fn is_done(&self) -> bool {
        self.futures.iter().all(DispatchFuture::is_done)
    }

    /// Waits for all contained futures within one aggregate timeout budget.
    ///
    /// Returns `self` for chaining:
    /// `bus.send_request(..).await.wait(None).await[0].result(None).await`.
    pub async fn wait(&self, timeout: Option<Duration>) -> &Self {
        match timeout {
            None => {
                for future in &self.futures {
                    future.wait(None).await;
                }
            }
            Some(limit) => {
                let deadline = tokio::time::Instant::now() + limit;
                for future in &self.futures {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if !future.wait(Some(remaining)).await {
                        break;
                    }
                }
            }
        }
        self
    }

    /// Yields the futures as they complete, not necessarily in submission
    /// order. Each call produces a fresh sequence over all futures.
    pub fn as_completed(&self) -> FuturesUnordered<impl Future<Output = DispatchFuture>> {
        self.futures
            .iter()
            .map(|future| {
                let future = future.clone();
                async move {
                    future.wait(None).await;
                    future
                }
            })
            .collect()
    }
}

impl Index<usize> for FutureCollection {
    type Output = DispatchFuture;

    fn index(&self, index: usize) -> &Self::Output {
        &self.futures[index]
    }
}

impl IntoIterator for FutureCollection {
    type Item = DispatchFuture;
    type IntoIter = std::vec::IntoIter<DispatchFuture>;

    fn into_iter(self) -> Self::IntoIter {
        self.futures.into_iter()
    }
}

impl<'a> IntoIterator for &'a FutureCollection {
    type Item = &'a DispatchFuture;
    type IntoIter = std::slice::Iter<'a, DispatchFuture>;

    fn into_iter(self) -> Self::IntoIter {
        self.futures.iter()
    }
}
