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

use std::time::Duration;

use crossbar::prelude::*;
use futures::StreamExt;

use crate::setup::initialize_tracing;

mod setup;

const ENDPOINT: EndpointId = EndpointId::new("responder", "Endpoint used by the future tests.");
const MESSAGE: MessageId = MessageId::new("question", "Message used by the future tests.");

fn bus_with_route() -> MessageBus {
    let bus = MessageBus::new();
    bus.define_endpoints_and_messages(&[(ENDPOINT, vec![MESSAGE])])
        .unwrap();
    bus
}

fn delayed_responder(label: &'static str, delay: Duration) -> impl MessageHandler {
    handler_fn(label, move |_invocation| async move {
        tokio::time::sleep(delay).await;
        Ok(Some(payload(label)))
    })
}

/// `result` with a zero timeout on an unresolved future fails immediately
/// with a timeout error naming what was awaited.
#[tokio::test]
async fn zero_timeout_on_unresolved_future_fails_immediately() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();

    let dispatcher =
        SequentialDispatcher::new(&bus, delayed_responder("slow", Duration::from_millis(200)));
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    let futures = bus.send_request(MESSAGE, Some(ENDPOINT), None, None).await;
    assert_eq!(futures.len(), 1);

    let started = std::time::Instant::now();
    let error = futures[0]
        .result(Some(Duration::ZERO))
        .await
        .expect_err("future cannot be resolved yet");
    assert!(started.elapsed() < Duration::from_millis(100), "no blocking");
    match &error {
        DispatchError::Timeout { subject, .. } => {
            assert!(subject.contains("question"), "subject was '{subject}'");
        }
        other => panic!("expected a timeout, got {other}"),
    }

    // Walking away from the wait does not cancel the handler.
    let result = futures[0].result(Some(Duration::from_secs(5))).await?;
    assert_eq!(
        *downcast_payload::<&str>(&result.expect("data")).unwrap(),
        "slow"
    );

    dispatcher.destroy().await;
    Ok(())
}

/// `wait` reports completion without raising the handler's error; `result`
/// re-raises it on every call.
#[tokio::test]
async fn wait_does_not_raise_handler_errors() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();

    let dispatcher = SequentialDispatcher::new(
        &bus,
        handler_fn("broken", |_invocation| async move {
            Err(anyhow::anyhow!("wires crossed"))
        }),
    );
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    let futures = bus.send_request(MESSAGE, Some(ENDPOINT), None, None).await;
    assert!(futures[0].wait(Some(Duration::from_secs(2))).await);
    assert!(futures[0].is_done());

    for _ in 0..2 {
        let error = futures[0]
            .result(Some(Duration::ZERO))
            .await
            .expect_err("handler failed");
        assert!(error.to_string().contains("wires crossed"));
    }

    dispatcher.destroy().await;
    Ok(())
}

/// `FutureCollection::wait` spends one aggregate budget across all futures
/// and returns itself for chaining.
#[tokio::test]
async fn collection_wait_uses_an_aggregate_budget() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();

    let quick =
        SequentialDispatcher::new(&bus, delayed_responder("quick", Duration::from_millis(5)));
    let slow = SequentialDispatcher::new(
        &bus,
        delayed_responder("very-slow", Duration::from_millis(400)),
    );
    quick.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;
    slow.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    let futures = bus.send_request(MESSAGE, Some(ENDPOINT), None, None).await;
    assert_eq!(futures.len(), 2);

    let started = std::time::Instant::now();
    futures.wait(Some(Duration::from_millis(50))).await;
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "the budget covers the whole collection, not each future"
    );
    assert!(!futures.is_done(), "the slow future is still pending");

    // Chaining: wait through to a resolved result.
    let result = futures
        .wait(None)
        .await[0]
        .result(Some(Duration::ZERO))
        .await?;
    assert!(result.is_some());
    assert!(futures.is_done());

    quick.destroy().await;
    slow.destroy().await;
    Ok(())
}

/// `as_completed` yields futures in completion order, not submission order.
#[tokio::test]
async fn as_completed_yields_in_completion_order() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();

    // The slow responder has the higher priority, so it is submitted first.
    let slow = SequentialDispatcher::with_priority(
        &bus,
        delayed_responder("tortoise", Duration::from_millis(200)),
        10,
    );
    let quick =
        SequentialDispatcher::new(&bus, delayed_responder("hare", Duration::from_millis(5)));
    slow.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;
    quick.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    let futures = bus.send_request(MESSAGE, Some(ENDPOINT), None, None).await;
    assert!(futures[0].subject().contains("tortoise"), "submission order");

    let mut completed = futures.as_completed();
    let first = completed.next().await.expect("two futures");
    assert!(first.subject().contains("hare"), "completion order");
    let second = completed.next().await.expect("two futures");
    assert!(second.subject().contains("tortoise"));
    assert!(completed.next().await.is_none(), "the sequence is finite");

    slow.destroy().await;
    quick.destroy().await;
    Ok(())
}
