//! End-to-end queue behavior driven by hand, on a manual clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use driftq_core::config::RetryConfig;
use driftq_core::ports::{Clock, ManualClock, MemoryEventSink};
use driftq_core::worker::{Dedicated, DispatchOutcome, FailureReason};
use driftq_core::{
    Event, EventStatus, OfflineQueue, Payload, Priority, QueueBuilder, QueueConfig, QueueError,
    QueueEvent, handler_fn,
};

struct Harness {
    queue: OfflineQueue,
    clock: Arc<ManualClock>,
    sink: Arc<MemoryEventSink>,
}

fn harness(config: QueueConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
    ));
    let sink = Arc::new(MemoryEventSink::new());
    let queue = QueueBuilder::new()
        .with_config(QueueConfig {
            auto_start: false,
            retry: RetryConfig {
                jitter: false,
                ..RetryConfig::default()
            },
            ..config
        })
        .clock(clock.clone())
        .event_sink(sink.clone())
        .strategy(Box::new(Dedicated))
        .build()
        .unwrap();
    Harness { queue, clock, sink }
}

fn counting_handler(calls: &Arc<AtomicU32>, fail: bool) -> impl driftq_core::EventHandler + 'static {
    let calls = Arc::clone(calls);
    handler_fn(move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        if fail { Err("remote rejected".into()) } else { Ok(()) }
    })
}

fn types_of(events: &[Event]) -> Vec<String> {
    let mut types: Vec<String> = events.iter().map(|e| e.event_type().to_string()).collect();
    types.sort();
    types
}

#[test]
fn scenario_a_capacity_three_evicts_oldest_low() {
    let h = harness(QueueConfig {
        max_queue_size: 3,
        ..QueueConfig::default()
    });
    for (t, p) in [
        ("a", Priority::Low),
        ("b", Priority::Normal),
        ("c", Priority::High),
        ("d", Priority::Low),
    ] {
        h.queue.queue_event(t, Payload::new(), p).unwrap();
    }

    assert_eq!(types_of(&h.queue.queued_events()), ["b", "c", "d"]);
    assert_eq!(h.queue.get_queue_stats().events_evicted_total, 1);
    assert!(matches!(
        &h.sink.events()[..],
        [QueueEvent::Evicted(e)] if e.event_type() == "a"
    ));
}

#[tokio::test]
async fn scenario_b_always_failing_handler_ends_failed_after_two_retries() {
    let h = harness(QueueConfig {
        default_max_retries: 2,
        ..QueueConfig::default()
    });
    let calls = Arc::new(AtomicU32::new(0));
    h.queue.register_processor("ping", counting_handler(&calls, true));
    h.queue.queue_event("ping", Payload::new(), Priority::Normal).unwrap();

    // Run to quiescence, letting backoff timers elapse.
    let dispatcher = h.queue.dispatcher();
    for _ in 0..10 {
        dispatcher.run_until_idle().await;
        if h.queue.queued_events().is_empty() {
            break;
        }
        h.clock.advance(Duration::from_secs(3600));
    }

    let terminal = h.sink.terminal();
    let [QueueEvent::Failed(event)] = &terminal[..] else {
        panic!("expected one failed event, got {terminal:?}");
    };
    assert_eq!(event.status(), EventStatus::Failed);
    assert_eq!(event.retry_count(), 2);
    assert_eq!(event.last_error(), Some("remote rejected"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = h.queue.get_queue_stats();
    assert_eq!(stats.events_failed_total, 1);
    assert_eq!(stats.events_retried_total, 1);
    assert_eq!(stats.queue_size, 0);
}

#[tokio::test]
async fn scenario_c_offline_event_is_deferred_then_delivered_once() {
    let h = harness(QueueConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    h.queue
        .register_processor("metrics_submission", counting_handler(&calls, false));
    h.queue.set_online_status(false);

    let mut payload = Payload::new();
    payload.insert("cpu".into(), serde_json::json!(0.93));
    let id = h
        .queue
        .queue_event("metrics_submission", payload, Priority::High)
        .unwrap();

    let dispatcher = h.queue.dispatcher();
    let deferred = dispatcher.process_next().await.unwrap();
    assert_eq!(
        deferred.outcome,
        DispatchOutcome::RetryScheduled { deferred: true }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let queued = h.queue.queued_events();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id(), id);
    assert_eq!(queued[0].status(), EventStatus::Retrying);
    let next_retry_at = queued[0].next_retry_at().unwrap();
    assert!(next_retry_at > h.clock.now());

    h.queue.set_online_status(true);
    assert!(dispatcher.process_next().await.is_none());

    h.clock.set(next_retry_at + chrono::Duration::milliseconds(1));
    let delivered = dispatcher.process_next().await.unwrap();
    assert_eq!(delivered.outcome, DispatchOutcome::Completed);
    assert_eq!(delivered.event.id(), id);

    assert_eq!(dispatcher.run_until_idle().await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.queue.get_queue_stats().events_deferred_total, 1);
}

#[tokio::test]
async fn scenario_d_missing_processor_fails_immediately() {
    let h = harness(QueueConfig::default());
    for _ in 0..2 {
        h.queue
            .queue_event("no_handler_registered", Payload::new(), Priority::Normal)
            .unwrap();
    }

    let dispatcher = h.queue.dispatcher();
    for _ in 0..2 {
        let done = dispatcher.process_next().await.unwrap();
        assert_eq!(
            done.outcome,
            DispatchOutcome::Failed(FailureReason::NoProcessor)
        );
    }
    assert!(dispatcher.process_next().await.is_none());

    let terminal = h.sink.terminal();
    assert_eq!(terminal.len(), 2);
    for notification in terminal {
        let QueueEvent::Failed(event) = notification else {
            panic!("expected failure, got {notification:?}");
        };
        assert_eq!(event.status(), EventStatus::Failed);
        assert_eq!(event.retry_count(), 0);
        assert_eq!(
            event.last_error(),
            Some("No processor registered for event type: no_handler_registered")
        );
    }

    let stats = h.queue.get_queue_stats();
    assert_eq!(stats.events_failed_total, 2);
    assert_eq!(stats.events_retried_total, 0);
}

#[test]
fn overfilling_with_low_events_evicts_exactly_one() {
    let h = harness(QueueConfig {
        max_queue_size: 50,
        ..QueueConfig::default()
    });
    for i in 0..51 {
        h.queue
            .queue_event(&format!("low-{i}"), Payload::new(), Priority::Low)
            .unwrap();
    }

    let stats = h.queue.get_queue_stats();
    assert_eq!(stats.queue_size, 50);
    assert_eq!(stats.events_evicted_total, 1);
    assert_eq!(stats.events_queued_total, 51);
    assert_eq!(h.queue.queued_events()[0].event_type(), "low-1");
}

#[test]
fn critical_saturated_queue_never_evicts_critical() {
    let h = harness(QueueConfig {
        max_queue_size: 4,
        ..QueueConfig::default()
    });
    for i in 0..5 {
        h.queue
            .queue_event(&format!("crit-{i}"), Payload::new(), Priority::Critical)
            .unwrap();
    }

    let stats = h.queue.get_queue_stats();
    assert_eq!(stats.queued_by_priority.critical, 5);
    assert_eq!(stats.events_evicted_total, 0);
}

#[tokio::test]
async fn drain_order_respects_priority_for_random_sequences() {
    for seed in [1_u64, 7, 42, 1234] {
        let h = harness(QueueConfig::default());
        h.queue.register_processor("work", handler_fn(|_| Ok(())));
        let mut rng = StdRng::seed_from_u64(seed);
        for seq in 0..200_u64 {
            let p = Priority::DRAIN_ORDER[rng.gen_range(0..4)];
            let mut payload = Payload::new();
            payload.insert("seq".into(), seq.into());
            h.queue.queue_event("work", payload, p).unwrap();
        }

        let dispatcher = h.queue.dispatcher();
        let mut last: Option<(usize, u64)> = None;
        let mut handled = 0;
        while let Some(done) = dispatcher.process_next().await {
            let rank = done.event.priority().index();
            let seq = done.event.payload()["seq"].as_u64().unwrap();
            if let Some((last_rank, last_seq)) = last {
                assert!(rank >= last_rank, "seed {seed}: priority went backwards");
                if rank == last_rank {
                    assert!(seq > last_seq, "seed {seed}: FIFO broken within {rank}");
                }
            }
            last = Some((rank, seq));
            handled += 1;
        }
        assert_eq!(handled, 200);
    }
}

#[tokio::test]
async fn retry_count_is_monotonic_and_terminal_is_final() {
    let h = harness(QueueConfig {
        default_max_retries: 4,
        ..QueueConfig::default()
    });
    let calls = Arc::new(AtomicU32::new(0));
    h.queue.register_processor("api_call", counting_handler(&calls, true));
    h.queue.queue_event("api_call", Payload::new(), Priority::Low).unwrap();

    let dispatcher = h.queue.dispatcher();
    let mut seen = Vec::new();
    for _ in 0..10 {
        if let Some(done) = dispatcher.process_next().await {
            seen.push(done.event.retry_count());
            assert!(done.event.retry_count() <= done.event.max_retries());
        }
        h.clock.advance(Duration::from_secs(600));
    }
    assert_eq!(seen, [1, 2, 3, 4]);

    let [QueueEvent::Failed(failed)] = &h.sink.terminal()[..] else {
        panic!("expected one failed event");
    };
    assert_eq!(
        h.queue.enqueue_event(failed.clone()),
        Err(QueueError::TerminalEvent(failed.id()))
    );
}

#[tokio::test]
async fn restored_event_keeps_its_retry_state() {
    let h = harness(QueueConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    h.queue.register_processor("data_sync", counting_handler(&calls, false));

    let original = Event::new("data_sync", Payload::new(), Priority::Normal).with_max_retries(1);
    let restored = Event::from_map(original.to_map()).unwrap();
    assert_eq!(restored, original);

    h.queue.enqueue_event(restored).unwrap();
    let done = h.queue.dispatcher().process_next().await.unwrap();
    assert_eq!(done.event.id(), original.id());
    assert_eq!(done.outcome, DispatchOutcome::Completed);
}
