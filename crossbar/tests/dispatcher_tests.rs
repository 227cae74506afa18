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
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbar::prelude::*;
use tokio::time::Instant;

use crate::setup::initialize_tracing;

mod setup;

const ENDPOINT: EndpointId = EndpointId::new("worker", "Endpoint used by the dispatcher tests.");
const MESSAGE: MessageId = MessageId::new("job", "Message used by the dispatcher tests.");

fn bus_with_route() -> MessageBus {
    let bus = MessageBus::new();
    bus.define_endpoints_and_messages(&[(ENDPOINT, vec![MESSAGE])])
        .unwrap();
    bus
}

/// A sequential dispatcher handles messages strictly in submission order,
/// with no two handler invocations overlapping in time.
#[tokio::test]
async fn sequential_dispatcher_preserves_order_without_overlap() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();
    let spans: Arc<Mutex<Vec<(i64, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

    let recorded = spans.clone();
    let dispatcher = SequentialDispatcher::new(
        &bus,
        handler_fn("recorder", move |invocation| {
            let recorded = recorded.clone();
            let index = *invocation.message().data_as::<i64>().expect("index");
            async move {
                let entered = Instant::now();
                tokio::time::sleep(Duration::from_millis(5)).await;
                recorded.lock().unwrap().push((index, entered, Instant::now()));
                Ok(None)
            }
        }),
    );
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    for index in 0..8i64 {
        bus.trigger_event(MESSAGE, ENDPOINT, None, Some(payload(index)))
            .await?;
    }
    bus.wait_for_not_active(Some(Duration::from_secs(5))).await?;

    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 8);
    let indexes: Vec<i64> = spans.iter().map(|(index, _, _)| *index).collect();
    assert_eq!(indexes, (0..8).collect::<Vec<i64>>(), "order preserved");
    for window in spans.windows(2) {
        let (_, _, exited) = window[0];
        let (_, entered, _) = window[1];
        assert!(exited <= entered, "handler invocations must not overlap");
    }

    dispatcher.destroy().await;
    Ok(())
}

/// Two concurrent dispatchers on the same route are each invoked exactly
/// once per event, in no particular order.
#[tokio::test]
async fn concurrent_dispatchers_both_receive_the_event() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let make_handler = |counter: &Arc<AtomicUsize>| {
        let counter = counter.clone();
        handler_fn("counting", move |_invocation| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
    };

    let first_dispatcher = ConcurrentDispatcher::new(&bus, make_handler(&first));
    let second_dispatcher = ConcurrentDispatcher::new(&bus, make_handler(&second));
    first_dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;
    second_dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    bus.trigger_event(MESSAGE, ENDPOINT, None, None).await?;
    bus.wait_for_not_active(Some(Duration::from_secs(5))).await?;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    first_dispatcher.destroy().await;
    second_dispatcher.destroy().await;
    Ok(())
}

/// A pool dispatcher never runs more handlers at once than it has workers.
#[tokio::test]
async fn pool_dispatcher_caps_parallelism() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let (current, highest, done) = (running.clone(), peak.clone(), handled.clone());
    let dispatcher = ThreadPoolDispatcher::new(
        &bus,
        handler_fn("bounded", move |_invocation| {
            let (current, highest, done) = (current.clone(), highest.clone(), done.clone());
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                highest.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }),
        Some(2),
    );
    assert_eq!(dispatcher.max_workers(), 2);
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    for _ in 0..6 {
        bus.trigger_event(MESSAGE, ENDPOINT, None, None).await?;
    }
    bus.wait_for_not_active(Some(Duration::from_secs(5))).await?;

    assert_eq!(handled.load(Ordering::SeqCst), 6);
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "at most two handlers at once, saw {}",
        peak.load(Ordering::SeqCst)
    );

    dispatcher.destroy().await;
    Ok(())
}

/// A callback dispatcher runs the handler inline: by the time
/// `trigger_event` returns, the handler has completed.
#[tokio::test]
async fn callback_dispatcher_runs_inline() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();
    let counter = Arc::new(AtomicUsize::new(0));

    let seen = counter.clone();
    let dispatcher = CallbackDispatcher::new(
        &bus,
        handler_fn("inline", move |_invocation| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }),
    );
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    bus.trigger_event(MESSAGE, ENDPOINT, None, None).await?;
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    dispatcher.destroy().await;
    Ok(())
}

/// A handler error inside a request is captured into the future and
/// re-raised by `result`; the same handler on an event path is logged and
/// does not interrupt delivery to other dispatchers.
#[tokio::test]
async fn handler_errors_follow_the_event_request_asymmetry() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();
    let survivor = Arc::new(AtomicUsize::new(0));

    let failing = SequentialDispatcher::with_priority(
        &bus,
        handler_fn("failing", |_invocation| async move {
            Err(anyhow::anyhow!("boom"))
        }),
        1,
    );
    failing.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    let seen = survivor.clone();
    let surviving = SequentialDispatcher::new(
        &bus,
        handler_fn("surviving", move |_invocation| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }),
    );
    surviving.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    // Event path: the failure is logged, the other dispatcher still runs.
    bus.trigger_event(MESSAGE, ENDPOINT, None, None).await?;
    bus.wait_for_not_active(Some(Duration::from_secs(5))).await?;
    assert_eq!(survivor.load(Ordering::SeqCst), 1);

    // Request path: the failure surfaces through the future.
    let futures = bus.send_request(MESSAGE, Some(ENDPOINT), None, None).await;
    assert_eq!(futures.len(), 2);
    futures.wait(Some(Duration::from_secs(2))).await;
    let error = futures[0]
        .result(Some(Duration::from_secs(2)))
        .await
        .expect_err("failing handler");
    match &error {
        DispatchError::Handler { handler, .. } => {
            assert!(handler.contains("failing"));
            assert!(error.to_string().contains("boom"));
        }
        other => panic!("expected a handler error, got {other}"),
    }
    assert!(futures[1].result(Some(Duration::from_secs(2))).await.is_ok());

    failing.destroy().await;
    surviving.destroy().await;
    Ok(())
}

/// Destroying a sequential dispatcher drains its queue before stopping the
/// worker.
#[tokio::test]
async fn destroy_drains_queued_messages() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();
    let handled = Arc::new(AtomicUsize::new(0));

    let seen = handled.clone();
    let dispatcher = SequentialDispatcher::new(
        &bus,
        handler_fn("slow", move |_invocation| {
            let seen = seen.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }),
    );
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    for _ in 0..5 {
        bus.trigger_event(MESSAGE, ENDPOINT, None, None).await?;
    }
    dispatcher.destroy().await;

    assert_eq!(handled.load(Ordering::SeqCst), 5);
    assert!(!bus.has_registered_dispatchers(MESSAGE, ENDPOINT, None));
    Ok(())
}

/// A bus that cannot drain in time reports which dispatcher is stuck.
#[tokio::test]
async fn wait_for_not_active_reports_stuck_dispatchers() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();

    let dispatcher = SequentialDispatcher::new(
        &bus,
        handler_fn("sleepy", |_invocation| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(None)
        }),
    );
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    bus.trigger_event(MESSAGE, ENDPOINT, None, None).await?;
    let error = bus
        .wait_for_not_active(Some(Duration::from_millis(20)))
        .await
        .expect_err("bus is busy");
    match &error {
        BusError::QuiesceTimeout { details } => assert!(details.contains("sleepy")),
        other => panic!("expected a quiesce timeout, got {other}"),
    }

    // The handler was never cancelled; the bus drains eventually.
    bus.wait_for_not_active(Some(Duration::from_secs(5))).await?;
    dispatcher.destroy().await;
    Ok(())
}

/// Dispatcher state introspection exposes names and activity counts.
#[tokio::test]
async fn bus_state_lists_registered_dispatchers() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = bus_with_route();

    let dispatcher = SequentialDispatcher::with_priority(
        &bus,
        handler_fn("introspected", |_invocation| async move { Ok(None) }),
        7,
    );
    dispatcher.register(&[MESSAGE], Some(&[ENDPOINT]), None)?;

    let state = bus.get_state();
    assert_eq!(state.len(), 1);
    assert!(state[0].name.contains("introspected"));
    assert_eq!(state[0].priority, 7);
    assert_eq!(state[0].active_count, 0);
    assert!(bus.get_dispatchers()[0].contains("introspected"));
    assert!(!bus.is_active());

    dispatcher.destroy().await;
    assert!(bus.get_state().is_empty());
    Ok(())
}
